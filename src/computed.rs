//! Lazy cached derived values.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::arena::{EffectBody, EffectId, EffectKind, EffectNode, InactiveHook, SignalId};
use crate::runtime::Runtime;

/// A read-only signal whose value is produced by a tracked derivation.
///
/// Semantics are push-invalidation, pull-computation: an upstream write
/// marks the computed dirty (and cascades dirtiness through chains of
/// computeds), but the body only executes on the next read. Reads while
/// clean return the cache without running anything, so the body runs
/// exactly once per dirty period.
///
/// Reading a computed inside an effect subscribes that effect to the
/// computed, exactly like a signal read.
///
/// A derivation body that synchronously writes one of its own
/// dependencies can re-dirty itself forever; the runtime does not
/// detect such loops. Keep derivation bodies read-only.
///
/// # Example
/// ```ignore
/// let rt = Runtime::new();
/// let base = Signal::new(&rt, 1);
/// let doubled = Computed::new(&rt, {
///     let base = base.clone();
///     move || base.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 2); // first read computes
/// assert_eq!(doubled.get(), 2); // cached
/// base.set(3);                  // marks dirty, computes nothing
/// assert_eq!(doubled.get(), 6); // recomputes now
/// ```
pub struct Computed<T> {
    runtime: Arc<Runtime>,
    signal: SignalId,
    effect: EffectId,
    value: Arc<RwLock<Option<T>>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a lazy derived value.
    ///
    /// Nothing computes until the first [`Computed::get`]; afterwards
    /// the cache is reused until an upstream write marks it dirty. When
    /// the computed's last subscriber unlinks, the internal effect is
    /// closed and the cache discarded.
    pub fn new<F>(runtime: &Arc<Runtime>, mut body: F) -> Arc<Self>
    where
        F: FnMut() -> T + Send + 'static,
    {
        let value: Arc<RwLock<Option<T>>> = Arc::new(RwLock::new(None));

        let (signal, effect) = {
            let mut state = runtime.state.lock();
            let signal = state.graph.add_signal();
            let compute: EffectBody = {
                let value = Arc::clone(&value);
                Box::new(move || {
                    let next = body();
                    *value.write() = Some(next);
                })
            };
            let effect = state
                .graph
                .effects
                .insert(EffectNode::computed(compute, signal));
            (signal, effect)
        };

        // Once the last subscriber unlinks, tear the internal effect
        // down and drop the cache; the next read recomputes from
        // scratch.
        let hook: InactiveHook = {
            let weak = Arc::downgrade(runtime);
            let value = Arc::clone(&value);
            Box::new(move || {
                if let Some(runtime) = weak.upgrade() {
                    runtime.close_effect(effect);
                }
                *value.write() = None;
            })
        };
        {
            let mut state = runtime.state.lock();
            if let Some(node) = state.graph.signals.get_mut(signal.index()) {
                node.inactive = Some(hook);
            }
        }

        Arc::new(Self {
            runtime: Arc::clone(runtime),
            signal,
            effect,
            value,
        })
    }

    /// Read the derived value, recomputing first if an upstream write
    /// marked it dirty.
    ///
    /// Also tracks this computed as a dependency of the currently
    /// running effect, exactly like a signal read. Computing never
    /// happens outside a read.
    ///
    /// # Panics
    ///
    /// Panics if the derivation body failed to produce a value, which
    /// is a programming-contract violation (for instance a body that
    /// recursively discards its own cache).
    pub fn get(&self) -> T {
        self.runtime.track(self.signal);

        let recompute = {
            let mut state = self.runtime.state.lock();
            match state.graph.effects.get_mut(self.effect) {
                Some(node) => match &mut node.kind {
                    EffectKind::Computed { dirty, .. } => std::mem::replace(dirty, false),
                    EffectKind::Watch { .. } => false,
                },
                None => false,
            }
        };
        if recompute {
            self.runtime.run_effect(self.effect);
        }

        self.value
            .read()
            .clone()
            .expect("computed body did not produce a value")
    }

}

impl<T> Drop for Computed<T> {
    fn drop(&mut self) {
        // Detach the hook first so releasing the graph nodes cannot
        // re-enter it.
        {
            let mut state = self.runtime.state.lock();
            if let Some(node) = state.graph.signals.get_mut(self.signal.index()) {
                node.inactive = None;
            }
        }
        self.runtime.close_effect(self.effect);
        {
            let mut state = self.runtime.state.lock();
            state.graph.effects.remove(self.effect);
        }
        self.runtime.release_signal(self.signal);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::{Computed, Runtime, Signal};

    #[test]
    fn body_runs_lazily_on_first_read() {
        let rt = Runtime::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let answer = Computed::new(&rt, {
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::Relaxed);
                42
            }
        });

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(answer.get(), 42);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn clean_reads_reuse_the_cache() {
        let rt = Runtime::new();
        let base = Signal::new(&rt, 1);
        let calls = Arc::new(AtomicUsize::new(0));

        let doubled = Computed::new(&rt, {
            let base = base.clone();
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::Relaxed);
                base.get() * 2
            }
        });

        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.get(), 2);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        base.set(3);
        // Dirty, but nothing computed yet.
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(doubled.get(), 6);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn unequal_upstream_write_marks_dirty_without_executing() {
        let rt = Runtime::new();
        let base = Signal::new(&rt, 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let tens = Computed::new(&rt, {
            let base = base.clone();
            let calls = calls.clone();
            move || {
                calls.fetch_add(1, Ordering::Relaxed);
                base.get() / 10
            }
        });
        assert_eq!(tens.get(), 1);

        base.set(20);
        base.set(30);

        // Two writes, still a single pending recomputation.
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(tens.get(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
