//! Property tests for `Bitmap`'s set algebra against a `BTreeSet` oracle.

use backup_bitmap::Bitmap;
use backup_core::BlockId;
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn to_bitmap(ids: &[u64]) -> Bitmap {
    ids.iter().copied().map(BlockId::new).collect()
}

fn to_set(ids: &[u64]) -> BTreeSet<u64> {
    ids.iter().copied().collect()
}

proptest! {
    #[test]
    fn union_matches_oracle(a in vec(0u64..5000, 0..200), b in vec(0u64..5000, 0..200)) {
        let bitmap_union = to_bitmap(&a).union(&to_bitmap(&b));
        let set_union: BTreeSet<u64> = to_set(&a).union(&to_set(&b)).copied().collect();
        prop_assert_eq!(bitmap_union.cardinality() as usize, set_union.len());
        for id in &set_union {
            prop_assert!(bitmap_union.contains(BlockId::new(*id)));
        }
    }

    #[test]
    fn intersection_matches_oracle(a in vec(0u64..5000, 0..200), b in vec(0u64..5000, 0..200)) {
        let bitmap_inter = to_bitmap(&a).intersection(&to_bitmap(&b));
        let set_inter: BTreeSet<u64> = to_set(&a).intersection(&to_set(&b)).copied().collect();
        prop_assert_eq!(bitmap_inter.cardinality() as usize, set_inter.len());
        for id in &set_inter {
            prop_assert!(bitmap_inter.contains(BlockId::new(*id)));
        }
    }

    #[test]
    fn difference_matches_oracle(a in vec(0u64..5000, 0..200), b in vec(0u64..5000, 0..200)) {
        let mut bitmap_diff = to_bitmap(&a);
        bitmap_diff.difference_with(&to_bitmap(&b));
        let set_diff: BTreeSet<u64> = to_set(&a).difference(&to_set(&b)).copied().collect();
        prop_assert_eq!(bitmap_diff.cardinality() as usize, set_diff.len());
        for id in &set_diff {
            prop_assert!(bitmap_diff.contains(BlockId::new(*id)));
        }
    }

    #[test]
    fn portable_roundtrip_any_reachable_state(ids in vec(0u64..1_000_000, 0..500)) {
        let bitmap = to_bitmap(&ids);
        let bytes = bitmap.portable_serialize();
        prop_assert_eq!(bytes.len(), bitmap.serialized_size());
        let back = Bitmap::portable_deserialize(&bytes).unwrap();
        prop_assert_eq!(bitmap, back);
    }
}
