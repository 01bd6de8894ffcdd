// Effect arena - slot storage for watch effects and computed-internal
// effects.
//
// EffectId carries a generation alongside the slot index. Disposal bumps
// the slot's generation, so handles and queue snapshots that outlive the
// node resolve to "absent" instead of aliasing whatever reuses the slot.
//
// The two effect kinds are a tagged enum dispatched with an explicit
// `match` in the runtime:
// - Watch: tree-scoped user effect; participates in the pending queue
//   and owns the children created during its last run.
// - Computed: internal effect of a `Computed`; never queued, recomputes
//   only when the owning value is read while dirty.

use slab::Slab;

use crate::arena::dep_arena::DepId;
use crate::arena::signal_arena::SignalId;

/// Generational handle to an effect slot.
///
/// A stale id (slot freed, possibly reused) fails the generation check
/// and every arena accessor returns `None` for it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct EffectId {
    index: u32,
    generation: u32,
}

/// The body type stored in the arena. Taken out of the slot while the
/// effect runs so the runtime lock is never held across user code.
pub(crate) type EffectBody = Box<dyn FnMut() + Send>;

/// Kind-specific effect state.
pub(crate) enum EffectKind {
    /// Tree-scoped user effect.
    Watch {
        body: Option<EffectBody>,
        parent: Option<EffectId>,
        /// Most recently created child; siblings chain through
        /// `child_prev` and are walked tail->head.
        child_tail: Option<EffectId>,
        child_prev: Option<EffectId>,
        /// A closed effect never runs again and has no edges.
        closed: bool,
    },
    /// Internal effect of a lazy derived value.
    Computed {
        /// Runs the derivation and stores the cache.
        body: Option<EffectBody>,
        /// The computed's own output signal.
        owner: SignalId,
        dirty: bool,
    },
}

/// Graph-side state of one effect.
pub(crate) struct EffectNode {
    /// Most recently linked source edge; walked tail->head over
    /// `DepEdge::src_prev`.
    pub(crate) src_tail: Option<DepId>,
    /// Re-entrancy guard: a run requested while already running is a
    /// no-op.
    pub(crate) running: bool,
    pub(crate) kind: EffectKind,
}

impl EffectNode {
    pub(crate) fn watch(body: EffectBody, parent: Option<EffectId>) -> Self {
        Self {
            src_tail: None,
            running: false,
            kind: EffectKind::Watch {
                body: Some(body),
                parent,
                child_tail: None,
                child_prev: None,
                closed: false,
            },
        }
    }

    pub(crate) fn computed(body: EffectBody, owner: SignalId) -> Self {
        Self {
            src_tail: None,
            running: false,
            kind: EffectKind::Computed {
                body: Some(body),
                owner,
                dirty: true,
            },
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.kind, EffectKind::Watch { closed: true, .. })
    }

    pub(crate) fn parent(&self) -> Option<EffectId> {
        match self.kind {
            EffectKind::Watch { parent, .. } => parent,
            EffectKind::Computed { .. } => None,
        }
    }

    fn child_prev(&self) -> Option<EffectId> {
        match self.kind {
            EffectKind::Watch { child_prev, .. } => child_prev,
            EffectKind::Computed { .. } => None,
        }
    }

    pub(crate) fn take_body(&mut self) -> Option<EffectBody> {
        match &mut self.kind {
            EffectKind::Watch { body, .. } | EffectKind::Computed { body, .. } => body.take(),
        }
    }

    pub(crate) fn restore_body(&mut self, body: Option<EffectBody>) {
        if body.is_none() {
            return;
        }
        match &mut self.kind {
            EffectKind::Watch { body: slot, .. } | EffectKind::Computed { body: slot, .. } => {
                *slot = body;
            }
        }
    }
}

/// Slab of effect nodes with a per-slot generation counter.
pub(crate) struct EffectArena {
    slots: Slab<EffectNode>,
    generations: Vec<u32>,
}

impl EffectArena {
    pub(crate) fn new() -> Self {
        Self {
            slots: Slab::new(),
            generations: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, node: EffectNode) -> EffectId {
        let index = self.slots.insert(node);
        if index == self.generations.len() {
            self.generations.push(0);
        }
        EffectId {
            index: index as u32,
            generation: self.generations[index],
        }
    }

    /// Access a node if the id is still current. Stale ids resolve to
    /// `None`.
    pub(crate) fn get(&self, id: EffectId) -> Option<&EffectNode> {
        let index = id.index as usize;
        if self.generations.get(index) != Some(&id.generation) {
            return None;
        }
        self.slots.get(index)
    }

    pub(crate) fn get_mut(&mut self, id: EffectId) -> Option<&mut EffectNode> {
        let index = id.index as usize;
        if self.generations.get(index) != Some(&id.generation) {
            return None;
        }
        self.slots.get_mut(index)
    }

    /// Free the slot and invalidate every outstanding id for it.
    pub(crate) fn remove(&mut self, id: EffectId) -> Option<EffectNode> {
        let index = id.index as usize;
        if self.generations.get(index) != Some(&id.generation) || !self.slots.contains(index) {
            return None;
        }
        self.generations[index] = self.generations[index].wrapping_add(1);
        Some(self.slots.remove(index))
    }

    /// Register `child` as the newest child of `parent`.
    pub(crate) fn attach_child(&mut self, parent: EffectId, child: EffectId) {
        let prev_tail = match self.get_mut(parent) {
            Some(node) => match &mut node.kind {
                EffectKind::Watch { child_tail, .. } => child_tail.replace(child),
                EffectKind::Computed { .. } => return,
            },
            None => return,
        };
        if let Some(node) = self.get_mut(child) {
            if let EffectKind::Watch { child_prev, .. } = &mut node.kind {
                *child_prev = prev_tail;
            }
        }
    }

    /// Take the whole child chain of `parent`, newest first.
    pub(crate) fn take_children(&mut self, parent: EffectId) -> Vec<EffectId> {
        let mut cursor = match self.get_mut(parent) {
            Some(node) => match &mut node.kind {
                EffectKind::Watch { child_tail, .. } => child_tail.take(),
                EffectKind::Computed { .. } => None,
            },
            None => None,
        };
        let mut children = Vec::new();
        while let Some(child) = cursor {
            children.push(child);
            cursor = self.get(child).and_then(EffectNode::child_prev);
        }
        children
    }

    /// Detach a closing effect from its parent's child chain.
    ///
    /// Only a chain-tail child can be spliced out (siblings link through
    /// `child_prev` alone); a mid-chain node stays linked, closed, until
    /// the parent sweeps its children. Returns true when the slot has no
    /// owner left afterwards and the caller should free it.
    pub(crate) fn detach_from_parent(&mut self, id: EffectId) -> bool {
        let (parent, child_prev) = match self.get_mut(id) {
            Some(node) => match &mut node.kind {
                EffectKind::Watch {
                    parent, child_prev, ..
                } => (parent.take(), *child_prev),
                EffectKind::Computed { .. } => return true,
            },
            None => return true,
        };
        let Some(parent) = parent else { return true };
        match self.get_mut(parent) {
            Some(node) => match &mut node.kind {
                EffectKind::Watch { child_tail, .. } if *child_tail == Some(id) => {
                    *child_tail = child_prev;
                    true
                }
                _ => false,
            },
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> EffectBody {
        Box::new(|| {})
    }

    #[test]
    fn stale_access_returns_none() {
        let mut arena = EffectArena::new();
        let id = arena.insert(EffectNode::watch(noop(), None));

        arena.remove(id);

        assert!(arena.get(id).is_none());
        assert!(arena.get_mut(id).is_none());
        assert!(arena.remove(id).is_none());
    }

    #[test]
    fn reused_slot_does_not_alias_old_id() {
        let mut arena = EffectArena::new();
        let first = arena.insert(EffectNode::watch(noop(), None));
        arena.remove(first);

        let second = arena.insert(EffectNode::watch(noop(), None));

        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
    }

    #[test]
    fn child_chain_is_taken_newest_first() {
        let mut arena = EffectArena::new();
        let parent = arena.insert(EffectNode::watch(noop(), None));
        let a = arena.insert(EffectNode::watch(noop(), Some(parent)));
        let b = arena.insert(EffectNode::watch(noop(), Some(parent)));
        arena.attach_child(parent, a);
        arena.attach_child(parent, b);

        assert_eq!(arena.take_children(parent), vec![b, a]);
        assert_eq!(arena.take_children(parent), Vec::new());
    }

    #[test]
    fn only_the_tail_child_detaches() {
        let mut arena = EffectArena::new();
        let parent = arena.insert(EffectNode::watch(noop(), None));
        let a = arena.insert(EffectNode::watch(noop(), Some(parent)));
        let b = arena.insert(EffectNode::watch(noop(), Some(parent)));
        arena.attach_child(parent, a);
        arena.attach_child(parent, b);

        // Mid-chain: stays owned by the parent.
        assert!(!arena.detach_from_parent(a));
        // Tail: spliced out, caller owns the slot.
        assert!(arena.detach_from_parent(b));
        assert_eq!(arena.take_children(parent), vec![a]);
    }
}
