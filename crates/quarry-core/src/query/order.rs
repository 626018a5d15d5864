//! The order executor.
//!
//! Turns the filtered set into a deterministic sequence. A single indexed
//! criterion walks its index directly; the general path assigns each
//! candidate a rank per criterion (one directional index walk per indexed
//! criterion, a value key per unindexed one) and runs a stable multi-key
//! sort. Null and missing values sort first ascending, last descending;
//! candidates with equal keys keep ascending id order in both directions.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use quarry_expr::{ObjectId, OrderCriterion, Value};
use tracing::{debug, trace};

use crate::dataset::Dataset;
use crate::error::Error;

use super::QueryCtx;

/// One candidate's sort key for one criterion.
enum OrderKey {
    /// Position of the candidate's key group in a directional index walk.
    /// Candidates sharing a key value share a rank.
    Rank(usize),
    /// Direction-aware value comparison for unindexed members.
    Value { value: Option<Value>, desc: bool },
}

impl OrderKey {
    fn compare(&self, other: &OrderKey) -> Ordering {
        match (self, other) {
            (OrderKey::Rank(a), OrderKey::Rank(b)) => a.cmp(b),
            (
                OrderKey::Value { value: a, desc },
                OrderKey::Value { value: b, .. },
            ) => {
                let ordering = match (a, b) {
                    (None, None) => Ordering::Equal,
                    // Nulls first ascending; reversed below for descending
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(a), Some(b)) => Value::compare(a, b).unwrap_or(Ordering::Equal),
                };
                if *desc {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            // Key kinds never mix within a criterion
            _ => Ordering::Equal,
        }
    }
}

/// Order the candidate set.
///
/// With no criteria: an ordered base collection dictates the order; absent
/// one, a requested range substitutes ascending identity order, and without
/// a range the set passes through unordered.
pub(crate) fn apply_order(
    ctx: &QueryCtx<'_>,
    set: BTreeSet<ObjectId>,
    criteria: &[OrderCriterion],
    base: Option<&[ObjectId]>,
    range_requested: bool,
) -> Result<Dataset, Error> {
    if criteria.is_empty() {
        if let Some(base) = base {
            trace!("preserving base collection order");
            let ordered: Vec<ObjectId> =
                base.iter().copied().filter(|id| set.contains(id)).collect();
            return Ok(Dataset::Sequence(ordered));
        }
        if !range_requested {
            return Ok(Dataset::Set(set));
        }
        // A range needs a deterministic order: default to ascending identity
        trace!("range without order criteria, using identity order");
        return Ok(Dataset::Sequence(set.into_iter().collect()));
    }

    // Fast path: one directional index walk replaces materializing and
    // sorting every candidate. Valid when the first criterion is the only
    // one, or when its unique index leaves no ties for later criteria.
    let first = &criteria[0];
    let (declaring, member) = ctx.member(&first.field)?;
    if member.has_index() && (criteria.len() == 1 || member.unique_index()) {
        let desc = first.is_descending();
        debug!(criterion = %first, "index-ordered scan");
        if member.primary {
            let mut ordered: Vec<ObjectId> = set.into_iter().collect();
            if desc {
                ordered.reverse();
            }
            return Ok(Dataset::Sequence(ordered));
        }
        let walk = ctx.db.index_ordered_ids(declaring, &member.name, desc);
        let ordered: Vec<ObjectId> =
            walk.into_iter().filter(|id| set.contains(id)).collect();
        return Ok(Dataset::Sequence(ordered));
    }

    // General path: per-criterion ranks/values, then one stable sort
    debug!(criteria = criteria.len(), candidates = set.len(), "multi-key sort");
    let sequence: Vec<ObjectId> = set.iter().copied().collect();
    let mut keys: HashMap<ObjectId, Vec<OrderKey>> = sequence
        .iter()
        .map(|id| (*id, Vec::with_capacity(criteria.len())))
        .collect();

    for criterion in criteria {
        let (declaring, member) = ctx.member(&criterion.field)?;
        let desc = criterion.is_descending();

        if member.primary {
            // Identity order needs no index walk
            let mut rank = 0usize;
            let mut push = |id: ObjectId| {
                rank += 1;
                if let Some(entry) = keys.get_mut(&id) {
                    entry.push(OrderKey::Rank(rank));
                }
            };
            if desc {
                for id in sequence.iter().rev() {
                    push(*id);
                }
            } else {
                for id in &sequence {
                    push(*id);
                }
            }
        } else if member.indexed {
            let groups = ctx.db.index_key_groups(declaring, &member.name, desc);
            let mut ranks: HashMap<ObjectId, usize> = HashMap::new();
            let mut rank = 0usize;
            for group in groups {
                let mut group_seen = false;
                for id in group {
                    if set.contains(&id) {
                        if !group_seen {
                            rank += 1;
                            group_seen = true;
                        }
                        ranks.insert(id, rank);
                    }
                }
            }
            for id in &sequence {
                let rank = ranks.get(id).copied().unwrap_or(0);
                if let Some(entry) = keys.get_mut(id) {
                    entry.push(OrderKey::Rank(rank));
                }
            }
        } else {
            for id in &sequence {
                let object = ctx.db.get(*id).ok_or(Error::NotFound(*id))?;
                let value = object.member_value(member);
                let value = if value.is_null() { None } else { Some(value) };
                if let Some(entry) = keys.get_mut(id) {
                    entry.push(OrderKey::Value { value, desc });
                }
            }
        }
    }

    let mut ordered = sequence;
    ordered.sort_by(|a, b| {
        let (Some(a_keys), Some(b_keys)) = (keys.get(a), keys.get(b)) else {
            return Ordering::Equal;
        };
        for (a_key, b_key) in a_keys.iter().zip(b_keys.iter()) {
            let ordering = a_key.compare(b_key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(Dataset::Sequence(ordered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, MemberDef, TypeDef};
    use crate::store::Database;
    use quarry_expr::Value;

    fn sample_db() -> Database {
        let mut catalog = Catalog::new();
        catalog
            .register(
                TypeDef::new("Track")
                    .with_member(MemberDef::primary("id"))
                    .with_member(MemberDef::new("album").with_index())
                    .with_member(MemberDef::new("title").with_unique_index())
                    .with_member(MemberDef::new("plays")),
            )
            .unwrap();
        Database::new(catalog).unwrap()
    }

    fn order(
        db: &Database,
        set: BTreeSet<ObjectId>,
        criteria: &[OrderCriterion],
        base: Option<&[ObjectId]>,
        range_requested: bool,
    ) -> Dataset {
        let ctx = QueryCtx {
            db,
            type_name: "Track",
        };
        apply_order(&ctx, set, criteria, base, range_requested).unwrap()
    }

    #[test]
    fn test_no_criteria_no_range_stays_unordered() {
        let db = sample_db();
        let id = db.insert("Track", Vec::<(&str, Value)>::new()).unwrap();
        let result = order(&db, BTreeSet::from([id]), &[], None, false);
        assert!(matches!(result, Dataset::Set(_)));
    }

    #[test]
    fn test_range_without_criteria_uses_identity_order() {
        let db = sample_db();
        let a = db.insert("Track", Vec::<(&str, Value)>::new()).unwrap();
        let b = db.insert("Track", Vec::<(&str, Value)>::new()).unwrap();
        let result = order(&db, BTreeSet::from([b, a]), &[], None, true);
        assert_eq!(result.into_sequence(), vec![a, b]);
    }

    #[test]
    fn test_base_collection_order_wins() {
        let db = sample_db();
        let a = db.insert("Track", Vec::<(&str, Value)>::new()).unwrap();
        let b = db.insert("Track", Vec::<(&str, Value)>::new()).unwrap();
        let c = db.insert("Track", Vec::<(&str, Value)>::new()).unwrap();

        let base = vec![c, a, b];
        let set = BTreeSet::from([a, c]);
        let result = order(&db, set, &[], Some(&base), true);
        assert_eq!(result.into_sequence(), vec![c, a]);
    }

    #[test]
    fn test_single_indexed_criterion_walks_index() {
        let db = sample_db();
        let b = db.insert("Track", vec![("title", Value::from("b"))]).unwrap();
        let a = db.insert("Track", vec![("title", Value::from("a"))]).unwrap();
        let c = db.insert("Track", vec![("title", Value::from("c"))]).unwrap();

        let set = BTreeSet::from([a, b, c]);
        let asc = order(&db, set.clone(), &[OrderCriterion::asc("title")], None, false);
        assert_eq!(asc.into_sequence(), vec![a, b, c]);

        let desc = order(&db, set, &[OrderCriterion::desc("title")], None, false);
        assert_eq!(desc.into_sequence(), vec![c, b, a]);
    }

    #[test]
    fn test_multi_key_sort_with_ties_and_nulls() {
        let db = sample_db();
        let insert = |album: Value, plays: Value| {
            db.insert("Track", vec![("album", album), ("plays", plays)])
                .unwrap()
        };
        let t1 = insert(Value::from("x"), Value::Int(10));
        let t2 = insert(Value::from("x"), Value::Int(30));
        let t3 = insert(Value::from("w"), Value::Int(20));
        let t4 = insert(Value::Null, Value::Int(5));

        let set = BTreeSet::from([t1, t2, t3, t4]);

        // album ascending (nulls first), plays descending within an album
        let criteria = [OrderCriterion::asc("album"), OrderCriterion::desc("plays")];
        let result = order(&db, set.clone(), &criteria, None, false);
        assert_eq!(result.into_sequence(), vec![t4, t3, t2, t1]);

        // album descending puts the null album last
        let criteria = [OrderCriterion::desc("album"), OrderCriterion::asc("plays")];
        let result = order(&db, set, &criteria, None, false);
        assert_eq!(result.into_sequence(), vec![t1, t2, t3, t4]);
    }

    #[test]
    fn test_sort_is_deterministic_across_runs() {
        let db = sample_db();
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(
                db.insert("Track", vec![("album", Value::from("same")), ("plays", Value::Int(i % 2))])
                    .unwrap(),
            );
        }
        let set: BTreeSet<ObjectId> = ids.iter().copied().collect();
        let criteria = [OrderCriterion::asc("album")];

        let first = order(&db, set.clone(), &criteria, None, false).into_sequence();
        let second = order(&db, set, &criteria, None, false).into_sequence();
        assert_eq!(first, second);
        // Equal keys keep ascending id order
        assert_eq!(first, ids);
    }
}
