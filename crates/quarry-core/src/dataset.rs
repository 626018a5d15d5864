//! The working candidate collection.

use quarry_expr::ObjectId;
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::slice;

/// The candidate collection threaded through the query pipeline.
///
/// During filtering the candidates form a set; ordering turns the same
/// collection into a sequence. Converting between the two states never
/// introduces duplicates: a set becomes its ascending-id sequence, and a
/// sequence produced by the engine is duplicate-free by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dataset {
    /// Unordered candidates (filter phase output).
    Set(BTreeSet<ObjectId>),
    /// Ordered candidates (order/range phase output).
    Sequence(Vec<ObjectId>),
}

impl Dataset {
    /// Number of candidates.
    pub fn len(&self) -> usize {
        match self {
            Dataset::Set(set) => set.len(),
            Dataset::Sequence(seq) => seq.len(),
        }
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership test.
    pub fn contains(&self, id: ObjectId) -> bool {
        match self {
            Dataset::Set(set) => set.contains(&id),
            Dataset::Sequence(seq) => seq.contains(&id),
        }
    }

    /// Iterate the candidates in the dataset's current order.
    pub fn iter(&self) -> Iter<'_> {
        match self {
            Dataset::Set(set) => Iter::Set(set.iter()),
            Dataset::Sequence(seq) => Iter::Sequence(seq.iter()),
        }
    }

    /// Convert into a set, discarding any ordering.
    pub fn into_set(self) -> BTreeSet<ObjectId> {
        match self {
            Dataset::Set(set) => set,
            Dataset::Sequence(seq) => seq.into_iter().collect(),
        }
    }

    /// Convert into a sequence. A set yields ascending id order.
    pub fn into_sequence(self) -> Vec<ObjectId> {
        match self {
            Dataset::Set(set) => set.into_iter().collect(),
            Dataset::Sequence(seq) => seq,
        }
    }
}

impl From<BTreeSet<ObjectId>> for Dataset {
    fn from(set: BTreeSet<ObjectId>) -> Self {
        Dataset::Set(set)
    }
}

impl From<Vec<ObjectId>> for Dataset {
    fn from(seq: Vec<ObjectId>) -> Self {
        Dataset::Sequence(seq)
    }
}

/// Iterator over a dataset's candidates.
pub enum Iter<'a> {
    /// Set iteration, ascending by id.
    Set(btree_set::Iter<'a, ObjectId>),
    /// Sequence iteration in stored order.
    Sequence(slice::Iter<'a, ObjectId>),
}

impl Iterator for Iter<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        match self {
            Iter::Set(inner) => inner.next().copied(),
            Iter::Sequence(inner) => inner.next().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<ObjectId> {
        raw.iter().copied().map(ObjectId::new).collect()
    }

    #[test]
    fn test_set_to_sequence_is_ascending() {
        let set: BTreeSet<ObjectId> = ids(&[3, 1, 2]).into_iter().collect();
        let dataset = Dataset::Set(set);
        assert_eq!(dataset.into_sequence(), ids(&[1, 2, 3]));
    }

    #[test]
    fn test_sequence_preserves_order() {
        let dataset = Dataset::Sequence(ids(&[3, 1, 2]));
        assert_eq!(dataset.clone().into_sequence(), ids(&[3, 1, 2]));
        assert_eq!(
            dataset.into_set(),
            ids(&[1, 2, 3]).into_iter().collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_contains_and_iter() {
        let dataset = Dataset::Sequence(ids(&[5, 7]));
        assert!(dataset.contains(ObjectId::new(5)));
        assert!(!dataset.contains(ObjectId::new(6)));
        assert_eq!(dataset.iter().count(), 2);
    }
}
