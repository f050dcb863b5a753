//! In-memory natural key to surrogate id index
//!
//! Keeps the entities seen so far in a run (and, for incremental loads, the
//! ones already stored) so that records never need a per-line existence query.

use std::collections::HashMap;
use std::hash::Hash;

/// Surrogate id plus the attributes last written for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Known<A> {
    pub id: i64,
    pub attributes: A,
}

#[derive(Debug, Clone)]
pub struct EntityDeduplicator<K, A = ()> {
    entries: HashMap<K, Known<A>>,
}

impl<K, A> Default for EntityDeduplicator<K, A> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, A> EntityDeduplicator<K, A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, key: &K) -> Option<i64> {
        self.entries.get(key).map(|known| known.id)
    }

    /// Remember `key` as `id`, replacing any earlier entry
    pub fn record(&mut self, key: K, id: i64, attributes: A) {
        self.entries.insert(key, Known { id, attributes });
    }

    pub fn attributes(&self, key: &K) -> Option<&A> {
        self.entries.get(key).map(|known| &known.attributes)
    }

    /// Replace the cached attributes of a known key. Returns false for unknown keys.
    pub fn update_attributes(&mut self, key: &K, attributes: A) -> bool {
        match self.entries.get_mut(key) {
            Some(known) => {
                known.attributes = attributes;
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, A> FromIterator<(K, i64, A)> for EntityDeduplicator<K, A> {
    fn from_iter<I: IntoIterator<Item = (K, i64, A)>>(iter: I) -> Self {
        let mut dedup = Self::new();
        for (key, id, attributes) in iter {
            dedup.record(key, id, attributes);
        }
        dedup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_and_record() {
        let mut persons: EntityDeduplicator<String, Option<String>> = EntityDeduplicator::new();
        assert!(persons.is_empty());
        assert_eq!(persons.resolve(&"A1".to_string()), None);

        persons.record("A1".to_string(), 0, None);
        assert_eq!(persons.resolve(&"A1".to_string()), Some(0));
        assert_eq!(persons.attributes(&"A1".to_string()), Some(&None));

        assert!(persons.update_attributes(&"A1".to_string(), Some("Ana".to_string())));
        assert_eq!(
            persons.attributes(&"A1".to_string()),
            Some(&Some("Ana".to_string()))
        );
        assert!(!persons.update_attributes(&"B2".to_string(), None));
        assert_eq!(persons.len(), 1);
    }

    #[test]
    fn test_composite_keys() {
        let products: EntityDeduplicator<(String, i64)> = [
            (("B0001".to_string(), 0), 0, ()),
            (("B0001".to_string(), 1), 1, ()),
        ]
        .into_iter()
        .collect();

        assert_eq!(products.len(), 2);
        assert_eq!(products.resolve(&("B0001".to_string(), 1)), Some(1));
        assert_eq!(products.resolve(&("B0001".to_string(), 2)), None);
    }
}
