//! Zero-sized hash builder for the runtime's internal sets.
//!
//! Provides [`FastHashBuilder`], a zero-sized `BuildHasher` backed by
//! foldhash with a fixed seed. The pending queue and other internal
//! collections never hash untrusted input, so HashDoS resistance is not
//! needed and the per-collection `RandomState` overhead can be dropped.

use std::hash::BuildHasher;

pub use foldhash::fast::FixedState;

/// A zero-sized `BuildHasher` using foldhash with a fixed seed.
///
/// Every instance produces identical hash values, which keeps the
/// builder zero-sized and the hashing deterministic across runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = <FixedState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x2d35_8dcc_aa6c_78a5).build_hasher()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_is_zero_sized() {
        assert_eq!(std::mem::size_of::<FastHashBuilder>(), 0);
    }

    #[test]
    fn builder_is_deterministic() {
        let a = FastHashBuilder.hash_one("pending");
        let b = FastHashBuilder.hash_one("pending");

        assert_eq!(a, b);
    }
}
