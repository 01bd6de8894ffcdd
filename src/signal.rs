//! Mutable reactive cells.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::arena::SignalId;
use crate::runtime::Runtime;

/// A mutable value cell whose reads are tracked and whose writes notify
/// subscribers.
///
/// Reading inside an effect body subscribes that effect automatically;
/// no manual wiring. Writing an unequal value re-runs every subscriber
/// at the end of the enclosing batch (immediately for a bare write).
///
/// # Example
/// ```ignore
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
///
/// let _e = Effect::new(&rt, {
///     let count = count.clone();
///     move || println!("count = {}", count.get())
/// });
///
/// count.set(1); // prints "count = 1"
/// count.set(1); // equal value: no re-run
/// ```
pub struct Signal<T> {
    runtime: Arc<Runtime>,
    id: SignalId,
    value: RwLock<T>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a signal holding `initial` in the given runtime's graph.
    pub fn new(runtime: &Arc<Runtime>, initial: T) -> Arc<Self> {
        let id = {
            let mut state = runtime.state.lock();
            state.graph.add_signal()
        };
        Arc::new(Self {
            runtime: Arc::clone(runtime),
            id,
            value: RwLock::new(initial),
        })
    }

    /// Read the current value.
    ///
    /// When an effect is running, this links (or refreshes) the edge
    /// between the signal and that effect. Outside any effect it is a
    /// plain read with no side effect.
    pub fn get(&self) -> T {
        self.runtime.track(self.id);
        self.value.read().clone()
    }

    /// Store a new value and notify subscribers.
    ///
    /// Writing a value equal to the current one never triggers any
    /// re-evaluation. The write runs inside an implicit batch: a bare
    /// write flushes its dependents immediately, a write inside
    /// [`Runtime::batch`] defers to the outermost exit.
    pub fn set(&self, value: T) {
        if *self.value.read() == value {
            cov_mark::hit!(write_value_unchanged);
            return;
        }
        self.runtime.batch(|| {
            *self.value.write() = value;
            self.runtime.notify(self.id);
        });
    }

    #[cfg(test)]
    pub(crate) fn id(&self) -> SignalId {
        self.id
    }
}

impl<T> Drop for Signal<T> {
    fn drop(&mut self) {
        self.runtime.release_signal(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::{Effect, Runtime, Signal};

    #[test]
    fn plain_read_outside_effects_tracks_nothing() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 5);

        assert_eq!(count.get(), 5);
        assert_eq!(rt.subscriber_count(count.id()), 0);
    }

    #[test]
    fn repeated_reads_keep_a_single_edge() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 0);

        let _effect = Effect::new(&rt, {
            let count = count.clone();
            move || {
                count.get();
                count.get();
                count.get();
            }
        });

        assert_eq!(rt.subscriber_count(count.id()), 1);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let rt = Runtime::new();
        let count = Signal::new(&rt, 5);

        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = Effect::new(&rt, {
            let count = count.clone();
            let runs = runs.clone();
            move || {
                count.get();
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        cov_mark::check!(write_value_unchanged);
        count.set(5);

        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }
}
