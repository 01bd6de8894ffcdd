// Dep edges - the subscription records of the graph.
//
// Exactly one DepEdge exists per active (signal, effect) pair. An edge
// is a member of two independent doubly-linked chains at once: the
// signal's subscriber chain and the effect's source chain. Both chains
// are anchored by a tail pointer and traversed tail->head over the
// `*_prev` links; the `*_next` links exist so a mid-chain splice stays
// O(1). Chains store slab indices rather than references, which keeps
// the records free of lifetime entanglement.

use slab::Slab;

use crate::arena::effect_arena::{EffectArena, EffectId, EffectNode};
use crate::arena::signal_arena::{SignalId, SignalNode};

/// Index of an edge slot in the dep slab.
///
/// Dep ids never escape the graph: they only live in chain links that
/// are spliced coherently, so no generation counter is needed.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct DepId(u32);

impl DepId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One subscription record connecting a signal and an effect.
pub(crate) struct DepEdge {
    pub(crate) signal: SignalId,
    /// Cleared when the edge is unlinked.
    pub(crate) effect: Option<EffectId>,
    /// Set at the start of the owning effect's run, cleared by a
    /// re-read. Edges still stale after the run are pruned.
    pub(crate) stale: bool,
    sub_prev: Option<DepId>,
    sub_next: Option<DepId>,
    src_prev: Option<DepId>,
    src_next: Option<DepId>,
}

/// The dependency graph: signal, effect, and edge storage plus the
/// chain operations that keep the three consistent.
pub(crate) struct DepGraph {
    pub(crate) signals: Slab<SignalNode>,
    pub(crate) effects: EffectArena,
    pub(crate) deps: Slab<DepEdge>,
}

impl DepGraph {
    pub(crate) fn new() -> Self {
        Self {
            signals: Slab::new(),
            effects: EffectArena::new(),
            deps: Slab::new(),
        }
    }

    pub(crate) fn add_signal(&mut self) -> SignalId {
        SignalId::new(self.signals.insert(SignalNode::new()))
    }

    /// Ensure the edge for `(signal, effect)` exists and is not stale.
    ///
    /// Called on every tracked read: an existing edge is refreshed, a
    /// missing one is linked fresh.
    pub(crate) fn track(&mut self, signal: SignalId, effect: EffectId) {
        match self.find_dep(signal, effect) {
            Some(dep) => self.deps[dep.index()].stale = false,
            None => self.link(signal, effect),
        }
    }

    /// At most one edge exists per (signal, effect) pair; find it by
    /// walking the signal's subscriber chain tail->head.
    fn find_dep(&self, signal: SignalId, effect: EffectId) -> Option<DepId> {
        let mut cursor = self.signals[signal.index()].sub_tail;
        while let Some(dep) = cursor {
            let edge = &self.deps[dep.index()];
            if edge.effect == Some(effect) {
                return Some(dep);
            }
            cursor = edge.sub_prev;
        }
        None
    }

    /// Create the edge for `(signal, effect)` and append it to both
    /// chain tails. O(1).
    fn link(&mut self, signal: SignalId, effect: EffectId) {
        let dep = DepId::new(self.deps.insert(DepEdge {
            signal,
            effect: Some(effect),
            stale: false,
            sub_prev: None,
            sub_next: None,
            src_prev: None,
            src_next: None,
        }));

        let sub_prev = {
            let node = &mut self.signals[signal.index()];
            let prev = node.sub_tail;
            node.sub_tail = Some(dep);
            prev
        };
        self.deps[dep.index()].sub_prev = sub_prev;
        if let Some(prev) = sub_prev {
            self.deps[prev.index()].sub_next = Some(dep);
        }

        let src_prev = match self.effects.get_mut(effect) {
            Some(node) => {
                let prev = node.src_tail;
                node.src_tail = Some(dep);
                prev
            }
            None => None,
        };
        self.deps[dep.index()].src_prev = src_prev;
        if let Some(prev) = src_prev {
            self.deps[prev.index()].src_next = Some(dep);
        }
    }

    /// Splice an edge out of both chains and free it. O(1), touching
    /// only the four neighbors. Returns true when the signal's
    /// subscriber chain became empty.
    fn unlink(&mut self, dep: DepId) -> bool {
        let edge = self.deps.remove(dep.index());

        let signal = &mut self.signals[edge.signal.index()];
        if signal.sub_tail == Some(dep) {
            signal.sub_tail = edge.sub_prev;
        }
        let drained = signal.sub_tail.is_none();
        if let Some(prev) = edge.sub_prev {
            self.deps[prev.index()].sub_next = edge.sub_next;
        }
        if let Some(next) = edge.sub_next {
            self.deps[next.index()].sub_prev = edge.sub_prev;
        }

        if let Some(effect) = edge.effect {
            if let Some(node) = self.effects.get_mut(effect) {
                if node.src_tail == Some(dep) {
                    node.src_tail = edge.src_prev;
                }
            }
            if let Some(prev) = edge.src_prev {
                self.deps[prev.index()].src_next = edge.src_next;
            }
            if let Some(next) = edge.src_next {
                self.deps[next.index()].src_prev = edge.src_prev;
            }
        }

        drained
    }

    /// Mark every source edge of `effect` stale. Runs before the body so
    /// the dependency set can be re-discovered from scratch.
    pub(crate) fn mark_sources_stale(&mut self, effect: EffectId) {
        let mut cursor = self.effects.get(effect).and_then(|node| node.src_tail);
        while let Some(dep) = cursor {
            let edge = &mut self.deps[dep.index()];
            cursor = edge.src_prev;
            edge.stale = true;
        }
    }

    /// Unlink every source edge still stale after a run: dependencies
    /// that existed last run but were not read this run. Returns the
    /// signals whose subscriber chains drained so the caller can fire
    /// their inactive hooks once the lock is released.
    pub(crate) fn prune_stale(&mut self, effect: EffectId) -> Vec<SignalId> {
        let mut drained = Vec::new();
        let mut cursor = self.effects.get(effect).and_then(|node| node.src_tail);
        while let Some(dep) = cursor {
            let edge = &self.deps[dep.index()];
            cursor = edge.src_prev;
            if edge.stale {
                cov_mark::hit!(stale_edge_pruned);
                let signal = edge.signal;
                if self.unlink(dep) {
                    drained.push(signal);
                }
            }
        }
        drained
    }

    /// Unlink every source edge of `effect`, stale or not. Permanent
    /// teardown; same drained-signal contract as [`Self::prune_stale`].
    pub(crate) fn unlink_all_sources(&mut self, effect: EffectId) -> Vec<SignalId> {
        let mut drained = Vec::new();
        let mut cursor = self.effects.get(effect).and_then(|node| node.src_tail);
        while let Some(dep) = cursor {
            let edge = &self.deps[dep.index()];
            cursor = edge.src_prev;
            let signal = edge.signal;
            if self.unlink(dep) {
                drained.push(signal);
            }
        }
        drained
    }

    /// Unlink every subscriber edge of `signal`. Used when the owning
    /// wrapper releases the signal; no inactive hook fires for a signal
    /// that is going away rather than going idle.
    pub(crate) fn unlink_subscribers(&mut self, signal: SignalId) {
        let mut cursor = self.signals[signal.index()].sub_tail;
        while let Some(dep) = cursor {
            cursor = self.deps[dep.index()].sub_prev;
            self.unlink(dep);
        }
    }

    /// Subscriber effects of `signal`, tail->head (most recent first).
    pub(crate) fn subscribers(&self, signal: SignalId) -> Vec<EffectId> {
        let mut subs = Vec::new();
        let mut cursor = self.signals[signal.index()].sub_tail;
        while let Some(dep) = cursor {
            let edge = &self.deps[dep.index()];
            cursor = edge.sub_prev;
            if let Some(effect) = edge.effect {
                subs.push(effect);
            }
        }
        subs
    }

    /// Whether `ancestor` appears on `effect`'s parent chain.
    pub(crate) fn is_ancestor(&self, ancestor: EffectId, effect: EffectId) -> bool {
        let mut cursor = self.effects.get(effect).and_then(EffectNode::parent);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.effects.get(id).and_then(EffectNode::parent);
        }
        false
    }
}

#[cfg(test)]
impl DepGraph {
    pub(crate) fn source_count(&self, effect: EffectId) -> usize {
        let mut count = 0;
        let mut cursor = self.effects.get(effect).and_then(|node| node.src_tail);
        while let Some(dep) = cursor {
            count += 1;
            cursor = self.deps[dep.index()].src_prev;
        }
        count
    }

    pub(crate) fn subscriber_count(&self, signal: SignalId) -> usize {
        self.subscribers(signal).len()
    }

    pub(crate) fn has_source(&self, effect: EffectId, signal: SignalId) -> bool {
        let mut cursor = self.effects.get(effect).and_then(|node| node.src_tail);
        while let Some(dep) = cursor {
            let edge = &self.deps[dep.index()];
            if edge.signal == signal {
                return true;
            }
            cursor = edge.src_prev;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(graph: &mut DepGraph) -> EffectId {
        graph.effects.insert(EffectNode::watch(Box::new(|| {}), None))
    }

    #[test]
    fn track_links_once_per_pair() {
        let mut graph = DepGraph::new();
        let signal = graph.add_signal();
        let effect = watch(&mut graph);

        graph.track(signal, effect);
        graph.track(signal, effect);
        graph.track(signal, effect);

        assert_eq!(graph.subscriber_count(signal), 1);
        assert_eq!(graph.source_count(effect), 1);
    }

    #[test]
    fn unlink_splices_both_chains() {
        let mut graph = DepGraph::new();
        let a = graph.add_signal();
        let b = graph.add_signal();
        let c = graph.add_signal();
        let effect = watch(&mut graph);
        graph.track(a, effect);
        graph.track(b, effect);
        graph.track(c, effect);

        // Stale-mark everything, refresh the middle edge, prune.
        graph.mark_sources_stale(effect);
        graph.track(b, effect);
        let drained = graph.prune_stale(effect);

        assert_eq!(graph.source_count(effect), 1);
        assert!(graph.has_source(effect, b));
        assert_eq!(graph.subscriber_count(a), 0);
        assert_eq!(graph.subscriber_count(c), 0);
        assert_eq!(drained.len(), 2);
        assert!(drained.contains(&a) && drained.contains(&c));
    }

    #[test]
    fn subscribers_walk_tail_to_head() {
        let mut graph = DepGraph::new();
        let signal = graph.add_signal();
        let first = watch(&mut graph);
        let second = watch(&mut graph);
        graph.track(signal, first);
        graph.track(signal, second);

        assert_eq!(graph.subscribers(signal), vec![second, first]);
    }

    #[test]
    fn teardown_unlinks_every_source() {
        let mut graph = DepGraph::new();
        let a = graph.add_signal();
        let b = graph.add_signal();
        let effect = watch(&mut graph);
        graph.track(a, effect);
        graph.track(b, effect);

        let drained = graph.unlink_all_sources(effect);

        assert_eq!(graph.source_count(effect), 0);
        assert_eq!(drained.len(), 2);
    }
}
