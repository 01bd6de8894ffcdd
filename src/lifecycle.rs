//! Host-managed lifecycle binding.
//!
//! The runtime has no opinion about when an effect should start; a host
//! (a screen, a widget, a service) drives a [`Lifecycle`] through its
//! states and bound effects follow: first run on `Active`, disposal at
//! `Destroyed`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::Runtime;

/// States a host-managed lifecycle moves through.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LifecycleState {
    /// Created, not yet active.
    Initialized,
    /// The host is active; bound effects run.
    Active,
    /// Temporarily inactive. Bound effects keep their subscriptions;
    /// only `Destroyed` tears them down.
    Inactive,
    /// Terminal state. Transitions after this are ignored.
    Destroyed,
}

/// Observer return value: keep receiving transitions, or unregister.
type Observer = Box<dyn FnMut(LifecycleState) -> bool + Send>;

/// A miniature lifecycle owner.
///
/// Hosts call [`Lifecycle::set_state`] as their own state machine
/// advances; bound effects react to the transitions.
pub struct Lifecycle {
    inner: Mutex<LifecycleInner>,
}

struct LifecycleInner {
    state: LifecycleState,
    observers: Vec<Observer>,
}

impl Lifecycle {
    /// Create a lifecycle in the `Initialized` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LifecycleInner {
                state: LifecycleState::Initialized,
                observers: Vec::new(),
            }),
        }
    }

    /// The current state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Move to `next` and notify observers.
    ///
    /// Re-entering the current state and any transition after
    /// `Destroyed` are ignored.
    pub fn set_state(&self, next: LifecycleState) {
        let mut observers = {
            let mut inner = self.inner.lock();
            if inner.state == LifecycleState::Destroyed || inner.state == next {
                return;
            }
            inner.state = next;
            std::mem::take(&mut inner.observers)
        };
        tracing::trace!(state = ?next, "lifecycle transition");

        // Dispatch outside the lock: observers run effects, which may
        // read this lifecycle again.
        observers.retain_mut(|observer| observer(next));

        let mut inner = self.inner.lock();
        observers.append(&mut inner.observers);
        inner.observers = observers;
    }

    /// Bind an effect to this lifecycle.
    ///
    /// The effect first runs when the lifecycle reaches `Active` (at
    /// most once, even if `Active` recurs or is already the current
    /// state at bind time) and is disposed exactly once when the
    /// lifecycle reaches `Destroyed`. Bound effects are always rooted:
    /// they belong to the host, not to whichever effect happened to be
    /// running at bind time.
    pub fn bind_effect<F>(&self, runtime: &Arc<Runtime>, body: F)
    where
        F: FnMut() + Send + 'static,
    {
        let id = runtime.spawn_watch(Box::new(body), false);
        let runtime = Arc::clone(runtime);
        let mut started = false;
        self.observe(Box::new(move |state| match state {
            LifecycleState::Active => {
                if !started {
                    started = true;
                    runtime.run_effect(id);
                }
                true
            }
            LifecycleState::Destroyed => {
                runtime.dispose_effect(id);
                false
            }
            LifecycleState::Initialized | LifecycleState::Inactive => true,
        }));
    }

    /// Register an observer, replaying the current state first so a
    /// late registrant sees where the lifecycle already is.
    fn observe(&self, mut observer: Observer) {
        let state = self.state();
        if observer(state) {
            self.inner.lock().observers.push(observer);
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{Lifecycle, LifecycleState};
    use crate::{Runtime, Signal};

    #[test]
    fn effect_starts_on_first_active_only() {
        let rt = Runtime::new();
        let lifecycle = Lifecycle::new();
        let runs = Arc::new(AtomicUsize::new(0));

        lifecycle.bind_effect(&rt, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(runs.load(Ordering::Relaxed), 0);

        lifecycle.set_state(LifecycleState::Active);
        assert_eq!(runs.load(Ordering::Relaxed), 1);

        lifecycle.set_state(LifecycleState::Inactive);
        lifecycle.set_state(LifecycleState::Active);
        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn binding_after_active_starts_immediately() {
        let rt = Runtime::new();
        let lifecycle = Lifecycle::new();
        lifecycle.set_state(LifecycleState::Active);

        let runs = Arc::new(AtomicUsize::new(0));
        lifecycle.bind_effect(&rt, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });

        assert_eq!(runs.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn destroy_disposes_the_effect() {
        let rt = Runtime::new();
        let lifecycle = Lifecycle::new();
        let count = Signal::new(&rt, 0);
        let runs = Arc::new(AtomicUsize::new(0));

        lifecycle.bind_effect(&rt, {
            let count = count.clone();
            let runs = runs.clone();
            move || {
                count.get();
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });

        lifecycle.set_state(LifecycleState::Active);
        count.set(1);
        assert_eq!(runs.load(Ordering::Relaxed), 2);

        lifecycle.set_state(LifecycleState::Destroyed);
        count.set(2);
        assert_eq!(runs.load(Ordering::Relaxed), 2);

        // Terminal: reactivating does nothing.
        lifecycle.set_state(LifecycleState::Active);
        assert_eq!(runs.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn destroy_before_active_never_runs_the_body() {
        let rt = Runtime::new();
        let lifecycle = Lifecycle::new();
        let runs = Arc::new(AtomicUsize::new(0));

        lifecycle.bind_effect(&rt, {
            let runs = runs.clone();
            move || {
                runs.fetch_add(1, Ordering::Relaxed);
            }
        });

        lifecycle.set_state(LifecycleState::Destroyed);

        assert_eq!(runs.load(Ordering::Relaxed), 0);
    }
}
