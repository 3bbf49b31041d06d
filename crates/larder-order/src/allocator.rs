//! Sort-key allocation.
//!
//! Computes a key that places a moved entity at a target index among its
//! siblings without touching any sibling's key. Keys are integers spaced by
//! [`SORT_KEY_GAP`] at the ends; inserts between two siblings take the
//! floored midpoint.
//!
//! Once two neighbours become adjacent integers there is no room left
//! between them. The allocator then falls back to `prev + 1`, which ties
//! with `next` (render order still stays total thanks to the id tiebreak).
//! Callers that care detect this with [`Allocation::degenerate`] and
//! renumber the group via [`rebalance`].

use larder_types::{EntityId, OrderedEntity, SortKey};
use tracing::trace;

/// Headroom left before the first / after the last sibling.
pub const SORT_KEY_GAP: SortKey = 1000;

/// Result of an allocation, with neighbour context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub key: SortKey,
    /// True when the key does not sort strictly between its neighbours.
    pub degenerate: bool,
}

/// Key for inserting at `target_index` into `siblings`.
///
/// `siblings` must be in render order and must not contain the moved entity.
/// A `target_index` past the end is treated as "append".
pub fn allocate_sort_key(siblings: &[OrderedEntity], target_index: usize) -> SortKey {
    allocate(siblings, target_index).key
}

/// Like [`allocate_sort_key`], but also reports whether precision ran out.
pub fn allocate(siblings: &[OrderedEntity], target_index: usize) -> Allocation {
    let target_index = target_index.min(siblings.len());

    if siblings.is_empty() {
        return Allocation { key: 0, degenerate: false };
    }

    if target_index == 0 {
        let key = siblings[0].sort_key.saturating_sub(SORT_KEY_GAP);
        return Allocation { key, degenerate: key >= siblings[0].sort_key };
    }

    if target_index == siblings.len() {
        let last = siblings[siblings.len() - 1].sort_key;
        let key = last.saturating_add(SORT_KEY_GAP);
        return Allocation { key, degenerate: key <= last };
    }

    let prev = siblings[target_index - 1].sort_key;
    let next = siblings[target_index].sort_key;
    let mid = floor_midpoint(prev, next);

    if prev < mid && mid < next {
        Allocation { key: mid, degenerate: false }
    } else {
        trace!(prev, next, "sort keys exhausted between neighbours, falling back to prev + 1");
        let key = prev.saturating_add(1);
        Allocation { key, degenerate: true }
    }
}

/// `floor((a + b) / 2)` without overflowing.
fn floor_midpoint(a: SortKey, b: SortKey) -> SortKey {
    ((a as i128 + b as i128).div_euclid(2)) as SortKey
}

/// Evenly spaced keys for a group, in the given order.
///
/// Returns `(id, new_key)` only for entities whose key actually changes, so
/// callers can issue the minimum number of writes.
pub fn rebalance<'a>(ordered: impl IntoIterator<Item = &'a OrderedEntity>) -> Vec<(EntityId, SortKey)> {
    ordered
        .into_iter()
        .enumerate()
        .filter_map(|(i, entity)| {
            let key = i as SortKey * SORT_KEY_GAP;
            (entity.sort_key != key).then_some((entity.id, key))
        })
        .collect()
}
