//! The `Database`: catalog plus in-memory tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::RwLock;

use quarry_expr::{ObjectId, Value};

use crate::catalog::Catalog;
use crate::error::Error;
use crate::query::Query;

use super::index::{MemberIndex, TokenIndex};
use super::object::Object;

/// Cheap operation counters, updated on every store access.
///
/// The loads counter in particular distinguishes index-backed execution
/// (no object materialization) from brute-force evaluation.
#[derive(Debug, Default)]
pub struct StoreCounters {
    loads: AtomicU64,
    index_scans: AtomicU64,
    deletes: AtomicU64,
}

impl StoreCounters {
    /// Objects materialized through `get`.
    pub fn loads(&self) -> u64 {
        self.loads.load(AtomicOrdering::Relaxed)
    }

    /// Index lookups and scans performed.
    pub fn index_scans(&self) -> u64 {
        self.index_scans.load(AtomicOrdering::Relaxed)
    }

    /// Objects deleted.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(AtomicOrdering::Relaxed)
    }

    fn count_load(&self) {
        self.loads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn count_scan(&self) {
        self.index_scans.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn count_delete(&self) {
        self.deletes.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Tables {
    objects: HashMap<ObjectId, Object>,
    /// Ids per concrete type. Ascending id order doubles as the primary
    /// index: identity order.
    by_type: HashMap<String, BTreeSet<ObjectId>>,
    /// Secondary indexes keyed by (declaring type, member).
    indexes: HashMap<(String, String), MemberIndex>,
    /// Token indexes keyed by (declaring type, member).
    tokens: HashMap<(String, String), TokenIndex>,
    next_id: u64,
}

/// An in-memory object store with secondary indexes.
///
/// Single-writer by assumption: the lock exists so deletion can run through a
/// shared reference during bulk operations, not to provide isolation.
pub struct Database {
    catalog: Catalog,
    tables: RwLock<Tables>,
    counters: StoreCounters,
}

impl Database {
    /// Create a store over a catalog, pre-building an index per indexed
    /// member and a token index per full-text member.
    pub fn new(catalog: Catalog) -> Result<Self, Error> {
        let mut tables = Tables {
            next_id: 1,
            ..Tables::default()
        };

        let type_names: Vec<String> =
            catalog.type_names().into_iter().map(String::from).collect();

        for type_name in &type_names {
            tables.by_type.entry(type_name.clone()).or_default();
            let type_def = catalog.type_def(type_name)?;
            for member in &type_def.members {
                if member.indexed && !member.primary {
                    tables.indexes.insert(
                        (type_name.clone(), member.name.clone()),
                        MemberIndex::new(member.unique_index()),
                    );
                }
                if member.full_text {
                    tables
                        .tokens
                        .insert((type_name.clone(), member.name.clone()), TokenIndex::default());
                }
            }
        }

        Ok(Self {
            catalog,
            tables: RwLock::new(tables),
            counters: StoreCounters::default(),
        })
    }

    /// The catalog this store was built over.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Store operation counters.
    pub fn counters(&self) -> &StoreCounters {
        &self.counters
    }

    /// Start a query over a type.
    pub fn query(&self, type_name: &str) -> Result<Query<'_>, Error> {
        Query::new(self, type_name)
    }

    /// Insert an object of `type_name` with the given member values.
    ///
    /// The identity is allocated by the store; unique-index collisions are
    /// rejected before anything is written.
    pub fn insert<K: Into<String>>(
        &self,
        type_name: &str,
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<ObjectId, Error> {
        let members = self.catalog.effective_members(type_name)?;

        let fields: BTreeMap<String, Value> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();

        let mut tables = self.tables.write();

        // Validate unique constraints before touching any table; absent
        // members read as null, which never collides
        for (declaring, member) in &members {
            if member.indexed && member.unique && !member.primary {
                if let Some(value) = fields.get(&member.name) {
                    let key = (declaring.to_string(), member.name.clone());
                    if let Some(index) = tables.indexes.get(&key) {
                        if index.would_violate(value) {
                            return Err(Error::UniqueViolation {
                                type_name: declaring.to_string(),
                                member: member.name.clone(),
                            });
                        }
                    }
                }
            }
        }

        let id = ObjectId::new(tables.next_id);
        tables.next_id += 1;

        for (declaring, member) in &members {
            let value = fields.get(&member.name).cloned().unwrap_or(Value::Null);
            if member.indexed && !member.primary {
                let key = (declaring.to_string(), member.name.clone());
                if let Some(index) = tables.indexes.get_mut(&key) {
                    index.insert(&value, id);
                }
            }
            if member.full_text {
                if let Value::String(text) = &value {
                    let key = (declaring.to_string(), member.name.clone());
                    if let Some(index) = tables.tokens.get_mut(&key) {
                        index.insert_text(text, id);
                    }
                }
            }
        }

        tables
            .by_type
            .entry(type_name.to_string())
            .or_default()
            .insert(id);
        tables
            .objects
            .insert(id, Object::new(id, type_name, fields));

        Ok(id)
    }

    /// Load an object by id.
    pub fn get(&self, id: ObjectId) -> Option<Object> {
        self.counters.count_load();
        self.tables.read().objects.get(&id).cloned()
    }

    /// Delete an object, unwinding its index entries.
    ///
    /// Returns `false` when the id is already gone, so bulk deletion can
    /// treat racing removals as a no-op.
    pub fn delete(&self, id: ObjectId) -> bool {
        let mut tables = self.tables.write();
        let Some(object) = tables.objects.remove(&id) else {
            return false;
        };

        if let Ok(members) = self.catalog.effective_members(object.type_name()) {
            for (declaring, member) in members {
                let value = object.get(&member.name);
                if member.indexed && !member.primary {
                    let key = (declaring.to_string(), member.name.clone());
                    if let Some(index) = tables.indexes.get_mut(&key) {
                        index.remove(value, id);
                    }
                }
                if member.full_text {
                    if let Value::String(text) = value {
                        let key = (declaring.to_string(), member.name.clone());
                        if let Some(index) = tables.tokens.get_mut(&key) {
                            index.remove_text(text, id);
                        }
                    }
                }
            }
        }

        if let Some(ids) = tables.by_type.get_mut(object.type_name()) {
            ids.remove(&id);
        }

        self.counters.count_delete();
        true
    }

    /// All ids of a type, including derived types. Identity order.
    pub fn all_ids(&self, type_name: &str) -> Result<BTreeSet<ObjectId>, Error> {
        let type_def = self.catalog.type_def(type_name)?;
        if !type_def.indexed {
            return Err(Error::NotIndexed(type_name.to_string()));
        }

        let tables = self.tables.read();
        let mut ids = tables
            .by_type
            .get(type_name)
            .cloned()
            .unwrap_or_default();
        for descendant in self.catalog.descendants(type_name) {
            if let Some(more) = tables.by_type.get(descendant) {
                ids.extend(more.iter().copied());
            }
        }
        Ok(ids)
    }

    /// Ids whose concrete type is exactly `type_name`.
    pub fn exact_ids(&self, type_name: &str) -> BTreeSet<ObjectId> {
        self.tables
            .read()
            .by_type
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Point lookup on a member index.
    pub fn index_get(&self, declaring: &str, member: &str, value: &Value) -> BTreeSet<ObjectId> {
        self.counters.count_scan();
        self.tables
            .read()
            .indexes
            .get(&(declaring.to_string(), member.to_string()))
            .map(|index| index.get(value))
            .unwrap_or_default()
    }

    /// Bounded range scan on a member index.
    pub fn index_range(
        &self,
        declaring: &str,
        member: &str,
        min: Option<&Value>,
        exclude_min: bool,
        max: Option<&Value>,
        exclude_max: bool,
    ) -> BTreeSet<ObjectId> {
        self.counters.count_scan();
        self.tables
            .read()
            .indexes
            .get(&(declaring.to_string(), member.to_string()))
            .map(|index| index.range(min, exclude_min, max, exclude_max))
            .unwrap_or_default()
    }

    /// Directional walk of a member index, grouped per distinct key.
    pub fn index_key_groups(
        &self,
        declaring: &str,
        member: &str,
        descending: bool,
    ) -> Vec<Vec<ObjectId>> {
        self.counters.count_scan();
        self.tables
            .read()
            .indexes
            .get(&(declaring.to_string(), member.to_string()))
            .map(|index| index.key_groups(descending))
            .unwrap_or_default()
    }

    /// Directional walk of a member index, flattened.
    pub fn index_ordered_ids(
        &self,
        declaring: &str,
        member: &str,
        descending: bool,
    ) -> Vec<ObjectId> {
        self.counters.count_scan();
        self.tables
            .read()
            .indexes
            .get(&(declaring.to_string(), member.to_string()))
            .map(|index| index.ordered_ids(descending))
            .unwrap_or_default()
    }

    /// Token lookup on a full-text index.
    pub fn token_get(&self, declaring: &str, member: &str, term: &str) -> BTreeSet<ObjectId> {
        self.counters.count_scan();
        self.tables
            .read()
            .tokens
            .get(&(declaring.to_string(), member.to_string()))
            .map(|index| index.lookup(term))
            .unwrap_or_default()
    }
}
