// Arena storage for the dependency graph.
//
// Three slabs, all owned by the runtime and guarded by its single lock:
// - signal arena: SignalNode (subscriber-chain tail, inactive hook)
// - effect arena: EffectNode (source-chain tail, tagged kind), with a
//   per-slot generation counter so stale ids resolve to None
// - dep arena: DepEdge, the intrusive edge records themselves
//
// dep_arena also hosts DepGraph, the struct combining the three with
// the chain operations (link/unlink/track/prune) that keep them
// consistent.

pub(crate) mod dep_arena;
pub(crate) mod effect_arena;
pub(crate) mod signal_arena;

pub(crate) use dep_arena::DepGraph;
pub(crate) use effect_arena::{EffectBody, EffectId, EffectKind, EffectNode};
pub(crate) use signal_arena::{InactiveHook, SignalId};
