// Signal arena types.
//
// A SignalNode is the graph-side state of one signal: the tail of its
// subscriber edge chain plus the hook fired when that chain drains.
// The signal's value itself lives in the public `Signal<T>` wrapper,
// keeping the arena type-erased and small.

use crate::arena::dep_arena::DepId;

/// Index of a signal slot in the runtime's signal slab.
///
/// Plain (non-generational) index: a `SignalId` is only held by the
/// owning `Signal`/`Computed` wrapper and by linked dep edges, and every
/// edge is unlinked before the slot is released.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub(crate) struct SignalId(u32);

impl SignalId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Convert to usize for slab indexing.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Hook fired when a signal's subscriber chain becomes empty.
///
/// Installed by `Computed` to close its internal effect and drop the
/// cached value. Plain signals have none.
pub(crate) type InactiveHook = Box<dyn FnMut() + Send>;

/// Graph-side state of one signal.
pub(crate) struct SignalNode {
    /// Most recently linked subscriber edge. The chain is walked
    /// tail->head over `DepEdge::sub_prev`.
    pub(crate) sub_tail: Option<DepId>,
    /// Fired outside the runtime lock when `sub_tail` drains to `None`.
    /// Taken out of the slot while running so a re-entrant drain cannot
    /// alias it.
    pub(crate) inactive: Option<InactiveHook>,
}

impl SignalNode {
    pub(crate) fn new() -> Self {
        Self {
            sub_tail: None,
            inactive: None,
        }
    }
}
