//! Deterministic hasher for property maps.
//!
//! [`Properties`](crate::Properties) and [`Value::Map`](crate::Value::Map)
//! key their entries by caller-chosen strings. Iteration order comes from
//! `IndexMap`'s insertion order; the hasher only has to be fast, so a
//! fixed-seed foldhash is used instead of the randomly seeded std hasher.

use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

const SEED: u64 = 0x517c_c1b7_2722_0a95;

/// Zero-sized `BuildHasher` backed by foldhash with a fixed seed.
///
/// Every instance builds identical hashers, so a map can be created with
/// `Default` and no per-map state.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(SEED).build_hasher()
    }
}

/// Insertion-ordered map keyed by property name.
pub type PropertyMap<V> = indexmap::IndexMap<String, V, FastHashBuilder>;
