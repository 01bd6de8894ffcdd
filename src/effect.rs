//! Watch effects: tracked side-effecting computations.

use std::sync::Arc;

use crate::arena::{EffectBody, EffectId, EffectKind, EffectNode};
use crate::runtime::Runtime;

/// A tracked effect and its disposal handle.
///
/// Dropping the handle does NOT close the effect: effects outlive
/// their creation scope until closed explicitly, by their parent
/// effect's re-run or disposal, or by a bound lifecycle reaching its
/// terminal state.
pub struct Effect {
    runtime: Arc<Runtime>,
    id: EffectId,
}

impl Effect {
    /// Run `body` as a tracked effect.
    ///
    /// The body executes immediately; every signal or computed read
    /// during a run becomes a dependency, and any write to one of those
    /// re-runs the body. The dependency set is re-discovered on each
    /// run, so conditional reads subscribe and unsubscribe on their
    /// own.
    ///
    /// When called from inside another effect's body, the new effect
    /// becomes a child of that effect and is disposed whenever the
    /// parent re-runs or closes.
    pub fn new<F>(runtime: &Arc<Runtime>, body: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let id = runtime.spawn_watch(Box::new(body), true);
        runtime.run_effect(id);
        Self {
            runtime: Arc::clone(runtime),
            id,
        }
    }

    /// Dispose the effect: unlink every source edge, recursively close
    /// all children, and prevent it from ever running again.
    ///
    /// Closing twice, or closing an effect a parent already disposed,
    /// is a no-op.
    pub fn close(&self) {
        self.runtime.dispose_effect(self.id);
    }

    #[cfg(test)]
    pub(crate) fn id(&self) -> EffectId {
        self.id
    }
}

impl Runtime {
    /// Run `body` with dependency tracking suspended: reads inside
    /// create no edges, so later writes to those signals do not re-run
    /// the enclosing effect.
    pub fn untracked<R>(&self, body: impl FnOnce() -> R) -> R {
        struct UntrackedGuard<'a> {
            runtime: &'a Runtime,
            previous: Option<EffectId>,
        }
        impl Drop for UntrackedGuard<'_> {
            fn drop(&mut self) {
                self.runtime.state.lock().current = self.previous;
            }
        }

        let previous = {
            let mut state = self.state.lock();
            state.current.take()
        };
        let _guard = UntrackedGuard {
            runtime: self,
            previous,
        };
        body()
    }

    /// Allocate a watch effect without running it. With `nested`, the
    /// currently running watch effect (if any) becomes the parent; an
    /// effect created inside a computed body is rooted.
    pub(crate) fn spawn_watch(&self, body: EffectBody, nested: bool) -> EffectId {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let parent = if nested {
            state.current.filter(|id| {
                matches!(
                    state.graph.effects.get(*id).map(|node| &node.kind),
                    Some(EffectKind::Watch { .. })
                )
            })
        } else {
            None
        };
        let id = state.graph.effects.insert(EffectNode::watch(body, parent));
        if let Some(parent) = parent {
            state.graph.effects.attach_child(parent, id);
        }
        id
    }

    /// Close `id` and free its slot if nothing owns it any more.
    pub(crate) fn dispose_effect(&self, id: EffectId) {
        if self.close_effect(id) {
            let mut state = self.state.lock();
            state.graph.effects.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::{Effect, Runtime, Signal};

    #[test]
    fn body_runs_immediately() {
        let rt = Runtime::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let _effect = Effect::new(&rt, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });

        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicUsize::new(0));

        let effect = Effect::new(&rt, {
            let count = count.clone();
            let runs = runs.clone();
            move || {
                count.get();
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });

        effect.close();
        effect.close();
        count.set(1);

        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn dropping_the_handle_keeps_the_effect_alive() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicUsize::new(0));

        {
            let _effect = Effect::new(&rt, {
                let count = count.clone();
                let runs = runs.clone();
                move || {
                    count.get();
                    runs.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        count.set(1);

        assert_eq!(runs.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn untracked_reads_create_no_edges() {
        let rt = Runtime::new();
        let tracked = Signal::new(&rt, 1);
        let ignored = Signal::new(&rt, 2);
        let runs = Arc::new(AtomicUsize::new(0));

        let _effect = Effect::new(&rt, {
            let rt = rt.clone();
            let tracked = tracked.clone();
            let ignored = ignored.clone();
            let runs = runs.clone();
            move || {
                tracked.get();
                rt.untracked(|| ignored.get());
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        ignored.set(20);
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        tracked.set(10);
        assert_eq!(runs.load(Ordering::Relaxed), 2);
    }
}
