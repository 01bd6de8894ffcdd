//! Batch scopes: coalesce multiple writes into a single flush.
//!
//! A batch increments the runtime's nesting depth; when the outermost
//! scope exits, the pending queue is flushed once. A bare
//! `Signal::set` wraps itself in an implicit single-write batch, so
//! immediate writes and explicit batches share one flush discipline.

use crate::runtime::Runtime;

impl Runtime {
    /// Run `body` with effect re-execution deferred until the scope
    /// exits.
    ///
    /// Writes inside the scope mark their dependents pending; the flush
    /// happens once, at the exit of the outermost batch, so an effect
    /// depending on several written signals re-runs a single time and
    /// observes all new values together. Nested batches only delay the
    /// flush further. The flush also runs when `body` unwinds.
    ///
    /// ```ignore
    /// rt.batch(|| {
    ///     width.set(10);
    ///     height.set(20);
    /// });
    /// // area effect ran once, seeing 10 and 20 together
    /// ```
    pub fn batch<R>(&self, body: impl FnOnce() -> R) -> R {
        {
            let mut state = self.state.lock();
            state.batch_depth += 1;
        }
        let _guard = BatchGuard { runtime: self };
        body()
    }
}

struct BatchGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let outermost = {
            let mut state = self.runtime.state.lock();
            state.batch_depth -= 1;
            state.batch_depth == 0
        };
        if outermost {
            self.runtime.flush();
        }
    }
}
