//! The reactive context.
//!
//! One [`Runtime`] owns one dependency graph: the signal, effect, and
//! edge arenas, the "currently running effect" pointer, the pending
//! queue, and the batch nesting depth. Multiple runtimes are fully
//! independent, so tests (and embedders with several logical graphs)
//! never share state.
//!
//! All graph state sits behind a single mutex. The lock is held only
//! for pointer surgery and never across user code: effect bodies and
//! inactive hooks are taken out of the arena, run unlocked, and
//! restored afterwards. Execution is single logical context; nested
//! synchronous re-entry (an effect body writing a signal, which
//! batches and flushes) is the supported shape, parallelism is not.

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::arena::{DepGraph, EffectBody, EffectId, EffectKind, SignalId};
use crate::hash::FastHashBuilder;

/// A fine-grained reactive graph.
///
/// Entry points: [`Signal::new`](crate::Signal::new),
/// [`Computed::new`](crate::Computed::new),
/// [`Effect::new`](crate::Effect::new), [`Runtime::batch`], and
/// [`Lifecycle::bind_effect`](crate::Lifecycle::bind_effect).
/// Everything else (tracking, scheduling, disposal) happens
/// automatically through those.
pub struct Runtime {
    pub(crate) state: Mutex<RuntimeState>,
}

pub(crate) struct RuntimeState {
    pub(crate) graph: DepGraph,
    /// Effect whose body is currently executing; reads attribute new
    /// edges to it.
    pub(crate) current: Option<EffectId>,
    /// Watch effects awaiting flush, in preparation order. Membership
    /// is separate from the ownership tree, so disposal and scheduling
    /// never share link fields.
    pub(crate) pending: IndexSet<EffectId, FastHashBuilder>,
    /// Re-entrant batch nesting; the flush runs when this drops back to
    /// zero.
    pub(crate) batch_depth: usize,
}

impl RuntimeState {
    /// Queue a watch effect for the next flush.
    ///
    /// Dedup rules: never queue twice; skip when an ancestor is already
    /// queued (its re-run disposes and recreates this subtree anyway);
    /// evict queued descendants for the same reason.
    fn enqueue(&mut self, effect: EffectId) {
        if self.pending.contains(&effect) {
            cov_mark::hit!(already_queued);
            return;
        }
        let mut ancestor = self.graph.effects.get(effect).and_then(|node| node.parent());
        while let Some(id) = ancestor {
            if self.pending.contains(&id) {
                cov_mark::hit!(ancestor_already_queued);
                return;
            }
            ancestor = self.graph.effects.get(id).and_then(|node| node.parent());
        }
        let superseded: Vec<EffectId> = self
            .pending
            .iter()
            .copied()
            .filter(|queued| self.graph.is_ancestor(effect, *queued))
            .collect();
        for queued in superseded {
            cov_mark::hit!(descendant_dequeued);
            self.pending.shift_remove(&queued);
        }
        self.pending.insert(effect);
    }
}

/// Restores the scheduler around a body execution, including when the
/// body unwinds: previous current-effect pointer, running flag, and the
/// body slot in the arena.
struct RunGuard<'a> {
    runtime: &'a Runtime,
    effect: EffectId,
    previous: Option<EffectId>,
    body: Option<EffectBody>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.runtime.state.lock();
        state.current = self.previous;
        if let Some(node) = state.graph.effects.get_mut(self.effect) {
            node.running = false;
            node.restore_body(self.body.take());
        }
    }
}

impl Runtime {
    /// Create an empty reactive graph.
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            state: Mutex::new(RuntimeState {
                graph: DepGraph::new(),
                current: None,
                pending: IndexSet::with_hasher(FastHashBuilder),
                batch_depth: 0,
            }),
        })
    }

    /// Record that the currently running effect (if any) reads
    /// `signal`. Outside any effect this is a no-op.
    pub(crate) fn track(&self, signal: SignalId) {
        let mut state = self.state.lock();
        let Some(effect) = state.current else { return };
        state.graph.track(signal, effect);
    }

    /// Walk `signal`'s subscriber chain tail->head and ask each effect
    /// to schedule itself.
    pub(crate) fn notify(&self, signal: SignalId) {
        let subscribers = {
            let state = self.state.lock();
            state.graph.subscribers(signal)
        };
        for effect in subscribers {
            self.prepare(effect);
        }
    }

    /// Mark `effect` as needing re-evaluation: queue a watch effect for
    /// the next flush, or mark a computed dirty and cascade to the
    /// computed's own subscribers without executing anything.
    pub(crate) fn prepare(&self, effect: EffectId) {
        let cascade = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(node) = state.graph.effects.get_mut(effect) else {
                return;
            };
            let owner = match &mut node.kind {
                EffectKind::Watch { closed: true, .. } => return,
                EffectKind::Watch { .. } => None,
                EffectKind::Computed { dirty, owner, .. } => {
                    *dirty = true;
                    Some(*owner)
                }
            };
            match owner {
                None => {
                    state.enqueue(effect);
                    return;
                }
                Some(owner) => state.graph.subscribers(owner),
            }
        };
        for dependent in cascade {
            self.prepare(dependent);
        }
    }

    /// Drain the pending queue and run each queued effect once,
    /// last-prepared-first. The queue is detached up front: effects
    /// prepared mid-flush belong to their own write's implicit batch
    /// and flush inside it, on a fresh queue.
    pub(crate) fn flush(&self) {
        let drained: Vec<EffectId> = {
            let mut state = self.state.lock();
            state.pending.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }
        tracing::trace!(count = drained.len(), "flushing pending effects");
        for effect in drained.into_iter().rev() {
            self.run_effect(effect);
        }
    }

    /// The base run protocol: destroy the previous run's children
    /// (watch effects), mark every source edge stale, execute the body
    /// with this effect current, then prune the edges the body did not
    /// re-read. After this returns, the dependency set equals exactly
    /// the signals read during the run.
    ///
    /// Re-entrant calls while the effect is already running are no-ops,
    /// as are calls on closed or disposed effects.
    pub(crate) fn run_effect(&self, effect: EffectId) {
        {
            let state = self.state.lock();
            match state.graph.effects.get(effect) {
                Some(node) if !node.running && !node.is_closed() => {}
                _ => return,
            }
        }
        self.destroy_children(effect);

        let (body, previous) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let body = {
                let Some(node) = state.graph.effects.get_mut(effect) else {
                    return;
                };
                if node.running || node.is_closed() {
                    return;
                }
                node.running = true;
                node.take_body()
            };
            state.graph.mark_sources_stale(effect);
            (body, state.current.replace(effect))
        };

        let mut guard = RunGuard {
            runtime: self,
            effect,
            previous,
            body,
        };
        if let Some(body) = guard.body.as_mut() {
            body();
        }
        drop(guard);

        let drained = {
            let mut state = self.state.lock();
            state.graph.prune_stale(effect)
        };
        self.fire_inactive(drained);
    }

    /// Recursively close and free every child created during the
    /// effect's previous run, newest first. Stale conditional subtrees
    /// vanish before the parent re-executes.
    pub(crate) fn destroy_children(&self, effect: EffectId) {
        let children = {
            let mut state = self.state.lock();
            state.graph.effects.take_children(effect)
        };
        for child in children {
            self.close_effect(child);
            let mut state = self.state.lock();
            state.graph.effects.remove(child);
        }
    }

    /// Close an effect: idempotent teardown. Watch effects cascade to
    /// their children, leave the pending queue, and detach from the
    /// parent chain; computed internals become dirty again so a later
    /// read recomputes from scratch. All source edges are unlinked.
    ///
    /// Returns true when the slot has no owner left and the caller
    /// should free it.
    pub(crate) fn close_effect(&self, effect: EffectId) -> bool {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(node) = state.graph.effects.get_mut(effect) else {
                return true;
            };
            match &mut node.kind {
                EffectKind::Watch { closed, .. } => {
                    if *closed {
                        return false;
                    }
                    *closed = true;
                }
                EffectKind::Computed { dirty, .. } => *dirty = true,
            }
            state.pending.shift_remove(&effect);
        }
        tracing::trace!(?effect, "closing effect");
        self.destroy_children(effect);

        let (unowned, drained) = {
            let mut state = self.state.lock();
            let unowned = state.graph.effects.detach_from_parent(effect);
            let drained = state.graph.unlink_all_sources(effect);
            (unowned, drained)
        };
        self.fire_inactive(drained);
        unowned
    }

    /// Unlink every subscriber edge and free the signal slot. Called by
    /// the owning wrapper's `Drop`; no inactive hook fires.
    pub(crate) fn release_signal(&self, signal: SignalId) {
        let mut state = self.state.lock();
        state.graph.unlink_subscribers(signal);
        if state.graph.signals.contains(signal.index()) {
            state.graph.signals.remove(signal.index());
        }
    }

    /// Fire the on-inactive hook of each signal whose subscriber chain
    /// just drained. Hooks run outside the lock: a computed's hook
    /// closes its internal effect, which may drain further signals and
    /// re-enter here.
    pub(crate) fn fire_inactive(&self, drained: Vec<SignalId>) {
        for signal in drained {
            let hook = {
                let mut state = self.state.lock();
                state
                    .graph
                    .signals
                    .get_mut(signal.index())
                    .and_then(|node| node.inactive.take())
            };
            let Some(mut hook) = hook else { continue };
            cov_mark::hit!(signal_inactive);
            hook();
            let mut state = self.state.lock();
            if let Some(node) = state.graph.signals.get_mut(signal.index()) {
                node.inactive = Some(hook);
            }
        }
    }
}

#[cfg(test)]
impl Runtime {
    pub(crate) fn source_count(&self, effect: EffectId) -> usize {
        self.state.lock().graph.source_count(effect)
    }

    pub(crate) fn has_source(&self, effect: EffectId, signal: SignalId) -> bool {
        self.state.lock().graph.has_source(effect, signal)
    }

    pub(crate) fn subscriber_count(&self, signal: SignalId) -> usize {
        self.state.lock().graph.subscriber_count(signal)
    }
}
