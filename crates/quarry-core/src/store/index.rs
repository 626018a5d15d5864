//! In-memory member indexes.
//!
//! A member index maps an order-preserving byte encoding of a member value to
//! the ids of the objects holding that value. The encoding gives byte-wise
//! comparison the same order as value comparison, so point lookups, bounded
//! range scans, and directional walks all run on a plain `BTreeMap`. The map
//! iterators are double-ended, so descending walks are native.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use quarry_expr::{ObjectId, Value};

/// Order-preserving encoding of a member value.
///
/// Layout: a type tag byte followed by a payload whose byte order matches the
/// value order within that type. `Null` gets the lowest tag so null values
/// sort before everything else; integers flip the sign bit, floats use the
/// usual IEEE 754 bit tricks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(Vec<u8>);

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_ID: u8 = 0x06;
const TAG_OTHER: u8 = 0x07;

impl IndexKey {
    /// Encode a scalar value.
    pub fn encode(value: &Value) -> Self {
        let mut buf = Vec::new();
        match value {
            Value::Null => {
                buf.push(TAG_NULL);
            }
            Value::Bool(b) => {
                buf.push(TAG_BOOL);
                buf.push(u8::from(*b));
            }
            Value::Int(n) => {
                buf.push(TAG_INT);
                // Flip the sign bit so negatives sort before positives
                let sortable = (*n as u64) ^ 0x8000_0000_0000_0000;
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::Float(n) => {
                buf.push(TAG_FLOAT);
                let bits = n.to_bits();
                let sortable = if (bits & 0x8000_0000_0000_0000) != 0 {
                    !bits
                } else {
                    bits ^ 0x8000_0000_0000_0000
                };
                buf.extend_from_slice(&sortable.to_be_bytes());
            }
            Value::String(s) => {
                buf.push(TAG_STRING);
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.push(TAG_BYTES);
                buf.extend_from_slice(b);
            }
            Value::Id(id) => {
                buf.push(TAG_ID);
                buf.extend_from_slice(&id.raw().to_be_bytes());
            }
            Value::IdArray(_) => {
                // Multi-valued references are indexed per element, never as a
                // single key; this arm only keeps stray keys ordered.
                buf.push(TAG_OTHER);
            }
        }
        Self(buf)
    }

    fn tag(value: &Value) -> u8 {
        match value {
            Value::Null => TAG_NULL,
            Value::Bool(_) => TAG_BOOL,
            Value::Int(_) => TAG_INT,
            Value::Float(_) => TAG_FLOAT,
            Value::String(_) => TAG_STRING,
            Value::Bytes(_) => TAG_BYTES,
            Value::Id(_) => TAG_ID,
            Value::IdArray(_) => TAG_OTHER,
        }
    }

    /// The smallest key of the value's type class.
    fn tag_floor(value: &Value) -> Self {
        Self(vec![Self::tag(value)])
    }

    /// The exclusive upper fence of the value's type class.
    fn tag_ceiling(value: &Value) -> Self {
        Self(vec![Self::tag(value) + 1])
    }
}

/// The keys a stored member value contributes to its index.
///
/// Scalars contribute one key, multi-valued references one key per element,
/// and a null contributes the null key so every live object stays reachable
/// through its indexed members.
pub(crate) fn entry_keys(value: &Value) -> Vec<IndexKey> {
    match value {
        Value::IdArray(ids) => ids.iter().map(|id| IndexKey::encode(&Value::Id(*id))).collect(),
        other => vec![IndexKey::encode(other)],
    }
}

/// A sorted secondary index for one member.
#[derive(Debug, Default)]
pub struct MemberIndex {
    unique: bool,
    map: BTreeMap<IndexKey, BTreeSet<ObjectId>>,
}

impl MemberIndex {
    /// Create an index. A unique index holds at most one object per
    /// non-null key.
    pub fn new(unique: bool) -> Self {
        Self {
            unique,
            map: BTreeMap::new(),
        }
    }

    /// Whether a key may map to more than one object.
    pub fn accepts_multiple_values(&self) -> bool {
        !self.unique
    }

    /// Whether inserting `value` for a new object would collide with an
    /// existing non-null unique key.
    pub(crate) fn would_violate(&self, value: &Value) -> bool {
        if !self.unique || value.is_null() {
            return false;
        }
        entry_keys(value)
            .iter()
            .any(|key| self.map.get(key).is_some_and(|ids| !ids.is_empty()))
    }

    pub(crate) fn insert(&mut self, value: &Value, id: ObjectId) {
        for key in entry_keys(value) {
            self.map.entry(key).or_default().insert(id);
        }
    }

    pub(crate) fn remove(&mut self, value: &Value, id: ObjectId) {
        for key in entry_keys(value) {
            if let Some(ids) = self.map.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.map.remove(&key);
                }
            }
        }
    }

    /// Point lookup: the ids stored under `value`'s key.
    pub fn get(&self, value: &Value) -> BTreeSet<ObjectId> {
        self.map
            .get(&IndexKey::encode(value))
            .cloned()
            .unwrap_or_default()
    }

    /// Bounded range scan over keys of the bound values' type class.
    ///
    /// `None` bounds are open on that side (but stay inside the type class of
    /// the other bound, and never include the null group). Exclusive flags
    /// make the corresponding end strict.
    pub fn range(
        &self,
        min: Option<&Value>,
        exclude_min: bool,
        max: Option<&Value>,
        exclude_max: bool,
    ) -> BTreeSet<ObjectId> {
        let lower: Bound<IndexKey> = match min {
            Some(v) => {
                let key = IndexKey::encode(v);
                if exclude_min {
                    Bound::Excluded(key)
                } else {
                    Bound::Included(key)
                }
            }
            None => match max {
                // Stay above the null group and below the class of the bound
                Some(v) => Bound::Included(IndexKey::tag_floor(v)),
                None => Bound::Excluded(IndexKey::encode(&Value::Null)),
            },
        };
        let upper: Bound<IndexKey> = match max {
            Some(v) => {
                let key = IndexKey::encode(v);
                if exclude_max {
                    Bound::Excluded(key)
                } else {
                    Bound::Included(key)
                }
            }
            None => match min {
                Some(v) => Bound::Excluded(IndexKey::tag_ceiling(v)),
                None => Bound::Unbounded,
            },
        };

        let mut out = BTreeSet::new();
        for (_, ids) in self.map.range((lower, upper)) {
            out.extend(ids.iter().copied());
        }
        out
    }

    /// All ids in key order, grouped per distinct key. Descending reverses
    /// the group order; ids within a group stay in ascending id order.
    pub fn key_groups(&self, descending: bool) -> Vec<Vec<ObjectId>> {
        let groups = self.map.values().map(|ids| ids.iter().copied().collect());
        if descending {
            let mut collected: Vec<Vec<ObjectId>> = groups.collect();
            collected.reverse();
            collected
        } else {
            groups.collect()
        }
    }

    /// All ids flattened in directional key order.
    pub fn ordered_ids(&self, descending: bool) -> Vec<ObjectId> {
        self.key_groups(descending).into_iter().flatten().collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.values().map(BTreeSet::len).sum()
    }
}

/// A token index for full-text members.
#[derive(Debug, Default)]
pub struct TokenIndex {
    map: BTreeMap<String, BTreeSet<ObjectId>>,
}

/// Split text into lowercased alphanumeric tokens.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl TokenIndex {
    pub(crate) fn insert_text(&mut self, text: &str, id: ObjectId) {
        for token in tokenize(text) {
            self.map.entry(token).or_default().insert(id);
        }
    }

    pub(crate) fn remove_text(&mut self, text: &str, id: ObjectId) {
        for token in tokenize(text) {
            if let Some(ids) = self.map.get_mut(&token) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.map.remove(&token);
                }
            }
        }
    }

    /// The ids whose indexed text contains `term`.
    pub fn lookup(&self, term: &str) -> BTreeSet<ObjectId> {
        self.map.get(term).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ObjectId {
        ObjectId::new(raw)
    }

    #[test]
    fn test_key_order_matches_value_order() {
        let neg = IndexKey::encode(&Value::Int(-10));
        let zero = IndexKey::encode(&Value::Int(0));
        let pos = IndexKey::encode(&Value::Int(10));
        assert!(neg < zero && zero < pos);

        let small = IndexKey::encode(&Value::Float(-1.5));
        let big = IndexKey::encode(&Value::Float(2.25));
        assert!(small < big);

        let a = IndexKey::encode(&Value::String("ab".into()));
        let b = IndexKey::encode(&Value::String("abc".into()));
        assert!(a < b);

        // Null sorts before every other value
        let null = IndexKey::encode(&Value::Null);
        assert!(null < neg && null < a);
    }

    #[test]
    fn test_point_lookup_and_removal() {
        let mut index = MemberIndex::new(false);
        index.insert(&Value::String("active".into()), id(1));
        index.insert(&Value::String("active".into()), id(2));
        index.insert(&Value::String("archived".into()), id(3));

        assert_eq!(index.get(&Value::String("active".into())).len(), 2);

        index.remove(&Value::String("active".into()), id(1));
        assert_eq!(index.get(&Value::String("active".into())).len(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_range_scan_bounds() {
        let mut index = MemberIndex::new(false);
        for age in [20i64, 25, 30, 35, 40] {
            index.insert(&Value::Int(age), id(age as u64));
        }
        index.insert(&Value::Null, id(99));

        // age > 30
        let gt = index.range(Some(&Value::Int(30)), true, None, false);
        assert_eq!(gt.len(), 2);

        // age >= 30
        let ge = index.range(Some(&Value::Int(30)), false, None, false);
        assert_eq!(ge.len(), 3);

        // age < 30 must not pick up the null group
        let lt = index.range(None, false, Some(&Value::Int(30)), true);
        assert_eq!(lt.len(), 2);
        assert!(!lt.contains(&id(99)));

        // 25 <= age <= 35
        let between = index.range(Some(&Value::Int(25)), false, Some(&Value::Int(35)), false);
        assert_eq!(between.len(), 3);
    }

    #[test]
    fn test_unique_violation_ignores_null() {
        let mut index = MemberIndex::new(true);
        index.insert(&Value::String("a".into()), id(1));
        assert!(index.would_violate(&Value::String("a".into())));
        assert!(!index.would_violate(&Value::String("b".into())));

        index.insert(&Value::Null, id(2));
        assert!(!index.would_violate(&Value::Null));
    }

    #[test]
    fn test_directional_walks() {
        let mut index = MemberIndex::new(false);
        index.insert(&Value::Int(2), id(20));
        index.insert(&Value::Int(2), id(21));
        index.insert(&Value::Int(1), id(10));

        assert_eq!(index.ordered_ids(false), vec![id(10), id(20), id(21)]);
        // Group order flips, within-group id order stays ascending
        assert_eq!(index.ordered_ids(true), vec![id(20), id(21), id(10)]);
    }

    #[test]
    fn test_multi_reference_entries() {
        let mut index = MemberIndex::new(false);
        index.insert(&Value::IdArray(vec![id(1), id(2)]), id(7));

        assert!(index.get(&Value::Id(id(1))).contains(&id(7)));
        assert!(index.get(&Value::Id(id(2))).contains(&id(7)));

        index.remove(&Value::IdArray(vec![id(1), id(2)]), id(7));
        assert!(index.get(&Value::Id(id(1))).is_empty());
    }

    #[test]
    fn test_tokenize_and_token_index() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);

        let mut index = TokenIndex::default();
        index.insert_text("The quick brown fox", id(1));
        index.insert_text("quick silver", id(2));

        assert_eq!(index.lookup("quick").len(), 2);
        assert_eq!(index.lookup("fox").len(), 1);
        assert!(index.lookup("missing").is_empty());

        index.remove_text("The quick brown fox", id(1));
        assert_eq!(index.lookup("quick").len(), 1);
    }
}
