//! Zero-sized hasher shared by the notifier, node and type tables.
//!
//! Keys in those tables are short property names, attribute names and class
//! names chosen by template authors, so HashDoS resistance buys nothing here.
//! `FastHashBuilder` hashes with foldhash under a fixed seed.

use std::collections::HashMap;
use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

/// A zero-sized `BuildHasher` backed by foldhash with a constant seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastHashBuilder;

impl BuildHasher for FastHashBuilder {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(0x2d35_8dcc_aa6c_78a5).build_hasher()
    }
}

/// `HashMap` keyed through [`FastHashBuilder`].
pub type FastHashMap<K, V> = HashMap<K, V, FastHashBuilder>;

/// `IndexMap` keyed through [`FastHashBuilder`]; keeps insertion order.
pub type FastIndexMap<K, V> = indexmap::IndexMap<K, V, FastHashBuilder>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn builder_carries_no_state() {
        assert_eq!(std::mem::size_of::<FastHashBuilder>(), 0);
    }

    #[test]
    fn rc_str_keys_are_found_by_borrowed_str() {
        let mut map: FastHashMap<Rc<str>, u32> = FastHashMap::default();
        map.insert(Rc::from("value"), 7);
        assert_eq!(map.get("value"), Some(&7));
    }

    #[test]
    fn index_map_keeps_declaration_order() {
        let mut map: FastIndexMap<&str, ()> = FastIndexMap::default();
        for name in ["zeta", "alpha", "mid"] {
            map.insert(name, ());
        }
        let names: Vec<_> = map.keys().copied().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }
}
