//! Surrogate id allocation
//!
//! One counter per [`EntityKind`]. Counters only move forward, so an id is
//! never handed out twice by the same allocator.

use reviewdb_common::EntityKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct IdentifierAllocator {
    next: BTreeMap<EntityKind, i64>,
}

impl IdentifierAllocator {
    /// Fresh schema: every kind starts at 0
    pub fn bulk() -> Self {
        Self::default()
    }

    /// Existing schema: each kind continues after its stored maximum.
    ///
    /// A kind with no stored rows (`None`) starts at 0.
    pub fn seeded<I>(maxima: I) -> Self
    where
        I: IntoIterator<Item = (EntityKind, Option<i64>)>,
    {
        let next = maxima
            .into_iter()
            .map(|(kind, max)| (kind, max.unwrap_or(-1) + 1))
            .collect();
        Self { next }
    }

    pub fn next_id(&mut self, kind: EntityKind) -> i64 {
        let slot = self.next.entry(kind).or_insert(0);
        let id = *slot;
        *slot += 1;
        id
    }

    /// The id the next call to [`IdentifierAllocator::next_id`] will return
    pub fn peek(&self, kind: EntityKind) -> i64 {
        self.next.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bulk_starts_at_zero() {
        let mut ids = IdentifierAllocator::bulk();
        for kind in EntityKind::ALL {
            assert_eq!(ids.next_id(kind), 0);
        }
        assert_eq!(ids.next_id(EntityKind::Person), 1);
        assert_eq!(ids.peek(EntityKind::Review), 1);
    }

    #[test]
    fn test_seeded_continues_after_max() {
        let mut ids = IdentifierAllocator::seeded([
            (EntityKind::Person, Some(41)),
            (EntityKind::Product, None),
        ]);
        assert_eq!(ids.next_id(EntityKind::Person), 42);
        assert_eq!(ids.next_id(EntityKind::Person), 43);
        assert_eq!(ids.next_id(EntityKind::Product), 0);
        assert_eq!(ids.next_id(EntityKind::Review), 0);
    }

    proptest! {
        #[test]
        fn prop_ids_are_consecutive_per_kind(seed in proptest::option::of(-1i64..10_000), kinds in prop::collection::vec(0usize..4, 0..200)) {
            let mut ids = IdentifierAllocator::seeded(
                EntityKind::ALL.iter().map(|kind| (*kind, seed)),
            );
            let start = seed.unwrap_or(-1) + 1;
            let mut seen: BTreeMap<EntityKind, Vec<i64>> = BTreeMap::new();

            for index in kinds {
                let kind = EntityKind::ALL[index];
                seen.entry(kind).or_default().push(ids.next_id(kind));
            }

            for allocated in seen.values() {
                let expected: Vec<i64> = (start..start + allocated.len() as i64).collect();
                prop_assert_eq!(allocated, &expected);
            }
        }
    }
}
