//! Expression resolution: cost classes and index strategies.
//!
//! Every filter expression resolves to a two-level cost and, when an index
//! can serve it, a strategy value describing the index operation. Resolution
//! is pure: it reads catalog metadata only, and a strategy touches the store
//! exclusively through the dataset it is applied to. Costs order the
//! execution plan; they never affect the result set.

use std::collections::BTreeSet;

use quarry_expr::{Expression, ObjectId, SearchLogic, Value};

use crate::error::Error;
use crate::store::tokenize;

use super::query::Query;
use super::QueryCtx;

/// Two-level execution priority; lower runs first.
///
/// The first level is the index-availability class (−4 constant, −3 id-set
/// operations, −2 unique-index access, −1 multi-valued-index access, 0 brute
/// force, 1 unindexed relation subqueries). The second level breaks ties
/// within a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cost(pub i8, pub i8);

/// An index-backed narrowing operation.
///
/// Strategies are plain values rather than closures so plans can be
/// inspected, and applying one is idempotent for a fixed store state: it
/// reads indexes and intersects with (or subtracts from) the dataset passed
/// in, never mutating shared structures.
#[derive(Debug, Clone)]
pub(crate) enum IndexStrategy {
    /// Keep everything or nothing.
    Constant(bool),
    /// Identity equality: keep the single id when present.
    PrimaryEq { id: ObjectId },
    /// Identity inequality: drop the id.
    PrimaryNe { id: ObjectId },
    /// Identity range: keep ids inside the bounds.
    PrimaryRange {
        min: Option<ObjectId>,
        exclude_min: bool,
        max: Option<ObjectId>,
        exclude_max: bool,
    },
    /// Point lookup on a member index; `negate` subtracts instead of
    /// intersecting.
    KeyLookup {
        declaring: String,
        member: String,
        value: Value,
        negate: bool,
    },
    /// Bounded range scan on a member index.
    RangeScan {
        declaring: String,
        member: String,
        min: Option<Value>,
        exclude_min: bool,
        max: Option<Value>,
        exclude_max: bool,
    },
    /// Intersect with (or subtract) an explicit id set.
    IdSet { ids: BTreeSet<ObjectId>, negate: bool },
    /// Interval-overlap test through the two end members' indexes.
    IntervalOverlap {
        min_member: (String, String),
        max_member: (String, String),
        lo: Value,
        hi: Value,
        exclude_lo: bool,
        exclude_hi: bool,
    },
    /// Keep (or drop) ids whose concrete type is in the set.
    TypeNarrow { types: BTreeSet<String>, negate: bool },
    /// Descend a parent-pointer tree from `root` through the relation
    /// member's index.
    TreeDescend {
        declaring: String,
        member: String,
        root: ObjectId,
        include_self: bool,
    },
    /// Run the nested filters as a query over the related type, then map the
    /// matches back through the relation member's index.
    RelationJoin {
        declaring: String,
        member: String,
        related: String,
        filters: Vec<Expression>,
    },
    /// Token lookups over full-text indexes.
    TokenLookup {
        fields: Vec<(String, String)>,
        terms: Vec<String>,
        logic: SearchLogic,
    },
}

fn unresolvable(filter: &Expression, reason: impl Into<String>) -> Error {
    Error::Unresolvable {
        filter: filter.to_string(),
        reason: reason.into(),
    }
}

/// Resolve a filter to its cost and optional index strategy.
///
/// Structural problems (unknown members, non-boolean constants, an interval
/// with no usable bound) surface here, before any execution starts.
pub(crate) fn resolve_filter(
    expr: &Expression,
    ctx: &QueryCtx<'_>,
) -> Result<(Cost, Option<IndexStrategy>), Error> {
    match expr {
        Expression::Constant(value) => {
            let truth = value
                .as_bool()
                .ok_or_else(|| unresolvable(expr, "constant filters must be boolean"))?;
            Ok((Cost(-4, 0), Some(IndexStrategy::Constant(truth))))
        }

        Expression::Eq { field, value } => {
            let (declaring, member) = ctx.member(field)?;
            if member.primary {
                let strategy = match value.as_id() {
                    Some(id) => IndexStrategy::PrimaryEq { id },
                    // A non-identity operand can never equal an id
                    None => IndexStrategy::Constant(false),
                };
                Ok((Cost(-2, -1), Some(strategy)))
            } else if member.indexed {
                let cost = if member.unique_index() {
                    Cost(-2, -1)
                } else {
                    Cost(-1, -1)
                };
                let strategy = IndexStrategy::KeyLookup {
                    declaring: declaring.to_string(),
                    member: member.name.clone(),
                    value: value.clone(),
                    negate: false,
                };
                Ok((cost, Some(strategy)))
            } else {
                Ok((Cost(0, -1), None))
            }
        }

        Expression::Ne { field, value } => {
            let (declaring, member) = ctx.member(field)?;
            if member.primary {
                let strategy = match value.as_id() {
                    Some(id) => IndexStrategy::PrimaryNe { id },
                    None => IndexStrategy::Constant(true),
                };
                Ok((Cost(-2, 0), Some(strategy)))
            } else if member.indexed {
                let cost = if member.unique_index() {
                    Cost(-2, 0)
                } else {
                    Cost(-1, -1)
                };
                let strategy = IndexStrategy::KeyLookup {
                    declaring: declaring.to_string(),
                    member: member.name.clone(),
                    value: value.clone(),
                    negate: true,
                };
                Ok((cost, Some(strategy)))
            } else {
                Ok((Cost(0, 0), None))
            }
        }

        Expression::Gt { field, value } => resolve_comparison(expr, ctx, field, value, CmpOp::Gt),
        Expression::Ge { field, value } => resolve_comparison(expr, ctx, field, value, CmpOp::Ge),
        Expression::Lt { field, value } => resolve_comparison(expr, ctx, field, value, CmpOp::Lt),
        Expression::Le { field, value } => resolve_comparison(expr, ctx, field, value, CmpOp::Le),

        Expression::In { field, values } | Expression::NotIn { field, values } => {
            let negate = matches!(expr, Expression::NotIn { .. });
            let (_, member) = ctx.member(field)?;
            if member.primary {
                let ids: BTreeSet<ObjectId> =
                    values.iter().filter_map(Value::as_id).collect();
                Ok((Cost(-3, 0), Some(IndexStrategy::IdSet { ids, negate })))
            } else {
                Ok((Cost(0, 0), None))
            }
        }

        Expression::Intersects {
            min_field,
            max_field,
            lo,
            hi,
            exclude_lo,
            exclude_hi,
        } => {
            if lo.is_null() && hi.is_null() {
                return Err(unresolvable(expr, "neither interval bound is usable"));
            }
            let (min_declaring, min_member) = ctx.member(min_field)?;
            let (max_declaring, max_member) = ctx.member(max_field)?;

            // Identity members have no member index to scan
            let indexable = min_member.indexed
                && max_member.indexed
                && !min_member.primary
                && !max_member.primary;
            if !indexable {
                return Ok((Cost(0, 0), None));
            }

            let cost = if min_member.unique_index() && max_member.unique_index() {
                Cost(-2, 0)
            } else {
                Cost(-1, 0)
            };
            let strategy = IndexStrategy::IntervalOverlap {
                min_member: (min_declaring.to_string(), min_member.name.clone()),
                max_member: (max_declaring.to_string(), max_member.name.clone()),
                lo: lo.clone(),
                hi: hi.clone(),
                exclude_lo: *exclude_lo,
                exclude_hi: *exclude_hi,
            };
            Ok((cost, Some(strategy)))
        }

        // Conjunctions are flattened into the plan; a nested one that still
        // reaches resolution falls back to per-object evaluation
        Expression::And(_) => Ok((Cost(0, 0), None)),

        Expression::Has { relation, filters } => {
            let (declaring, member) = ctx.member(relation)?;
            let related = member
                .references
                .clone()
                .ok_or_else(|| unresolvable(expr, "member is not a reference"))?;
            if member.indexed {
                let strategy = IndexStrategy::RelationJoin {
                    declaring: declaring.to_string(),
                    member: member.name.clone(),
                    related,
                    filters: filters.clone(),
                };
                Ok((Cost(0, -1), Some(strategy)))
            } else {
                // Loading every candidate's referenced objects is the most
                // expensive step there is; sort it last
                Ok((Cost(1, 0), None))
            }
        }

        Expression::IsInstance { types, exact } | Expression::IsNotInstance { types, exact } => {
            let negate = matches!(expr, Expression::IsNotInstance { .. });
            let expanded = ctx
                .db
                .catalog()
                .expand(types, *exact)
                .map_err(|e| unresolvable(expr, e.to_string()))?;
            Ok((
                Cost(-3, 0),
                Some(IndexStrategy::TypeNarrow {
                    types: expanded,
                    negate,
                }),
            ))
        }

        Expression::DescendsFrom {
            relation,
            root,
            include_self,
        } => {
            let (declaring, member) = ctx.member(relation)?;
            if member.references.is_none() {
                return Err(unresolvable(expr, "member is not a reference"));
            }
            if member.indexed {
                let strategy = IndexStrategy::TreeDescend {
                    declaring: declaring.to_string(),
                    member: member.name.clone(),
                    root: *root,
                    include_self: *include_self,
                };
                Ok((Cost(-3, 0), Some(strategy)))
            } else {
                Ok((Cost(0, 0), None))
            }
        }

        Expression::Contains { field, .. } => {
            ctx.member(field)?;
            Ok((Cost(0, -2), None))
        }

        Expression::Search {
            field,
            terms,
            logic,
        } => {
            let term_list = tokenize(terms);
            if term_list.is_empty() {
                return Err(unresolvable(expr, "no search terms"));
            }
            let fields: Vec<(String, String)> = match field {
                Some(name) => {
                    let (declaring, member) = ctx.member(name)?;
                    if member.full_text {
                        vec![(declaring.to_string(), member.name.clone())]
                    } else {
                        Vec::new()
                    }
                }
                None => ctx
                    .db
                    .catalog()
                    .effective_members(ctx.type_name)?
                    .into_iter()
                    .filter(|(_, m)| m.full_text)
                    .map(|(declaring, m)| (declaring.to_string(), m.name.clone()))
                    .collect(),
            };
            if fields.is_empty() {
                Ok((Cost(0, -4), None))
            } else {
                let strategy = IndexStrategy::TokenLookup {
                    fields,
                    terms: term_list,
                    logic: *logic,
                };
                Ok((Cost(-1, 1), Some(strategy)))
            }
        }
    }
}

enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
}

fn resolve_comparison(
    expr: &Expression,
    ctx: &QueryCtx<'_>,
    field: &str,
    value: &Value,
    op: CmpOp,
) -> Result<(Cost, Option<IndexStrategy>), Error> {
    let (declaring, member) = ctx.member(field)?;
    if !member.has_index() {
        return Ok((Cost(0, 0), None));
    }
    let cost = if member.unique_index() {
        Cost(-2, 0)
    } else {
        Cost(-1, 0)
    };

    // Null is not ordered against anything, so the filter cannot match
    if value.is_null() {
        return Ok((cost, Some(IndexStrategy::Constant(false))));
    }

    if member.primary {
        let Some(id) = value.as_id() else {
            return Ok((cost, Some(IndexStrategy::Constant(false))));
        };
        let strategy = match op {
            CmpOp::Gt => IndexStrategy::PrimaryRange {
                min: Some(id),
                exclude_min: true,
                max: None,
                exclude_max: false,
            },
            CmpOp::Ge => IndexStrategy::PrimaryRange {
                min: Some(id),
                exclude_min: false,
                max: None,
                exclude_max: false,
            },
            CmpOp::Lt => IndexStrategy::PrimaryRange {
                min: None,
                exclude_min: false,
                max: Some(id),
                exclude_max: true,
            },
            CmpOp::Le => IndexStrategy::PrimaryRange {
                min: None,
                exclude_min: false,
                max: Some(id),
                exclude_max: false,
            },
        };
        return Ok((cost, Some(strategy)));
    }

    let (min, exclude_min, max, exclude_max) = match op {
        CmpOp::Gt => (Some(value.clone()), true, None, false),
        CmpOp::Ge => (Some(value.clone()), false, None, false),
        CmpOp::Lt => (None, false, Some(value.clone()), true),
        CmpOp::Le => (None, false, Some(value.clone()), false),
    };
    let strategy = IndexStrategy::RangeScan {
        declaring: declaring.to_string(),
        member: member.name.clone(),
        min,
        exclude_min,
        max,
        exclude_max,
    };
    Ok((cost, Some(strategy)))
}

impl IndexStrategy {
    /// Apply the strategy, narrowing the candidate set.
    pub(crate) fn apply(
        &self,
        ctx: &QueryCtx<'_>,
        mut set: BTreeSet<ObjectId>,
    ) -> Result<BTreeSet<ObjectId>, Error> {
        match self {
            IndexStrategy::Constant(true) => Ok(set),
            IndexStrategy::Constant(false) => Ok(BTreeSet::new()),

            IndexStrategy::PrimaryEq { id } => {
                let mut narrowed = BTreeSet::new();
                if set.contains(id) {
                    narrowed.insert(*id);
                }
                Ok(narrowed)
            }

            IndexStrategy::PrimaryNe { id } => {
                set.remove(id);
                Ok(set)
            }

            IndexStrategy::PrimaryRange {
                min,
                exclude_min,
                max,
                exclude_max,
            } => {
                set.retain(|id| {
                    if let Some(min) = min {
                        if id < min || (id == min && *exclude_min) {
                            return false;
                        }
                    }
                    if let Some(max) = max {
                        if id > max || (id == max && *exclude_max) {
                            return false;
                        }
                    }
                    true
                });
                Ok(set)
            }

            IndexStrategy::KeyLookup {
                declaring,
                member,
                value,
                negate,
            } => {
                let hits = ctx.db.index_get(declaring, member, value);
                if *negate {
                    Ok(&set - &hits)
                } else {
                    Ok(&set & &hits)
                }
            }

            IndexStrategy::RangeScan {
                declaring,
                member,
                min,
                exclude_min,
                max,
                exclude_max,
            } => {
                let hits = ctx.db.index_range(
                    declaring,
                    member,
                    min.as_ref(),
                    *exclude_min,
                    max.as_ref(),
                    *exclude_max,
                );
                Ok(&set & &hits)
            }

            IndexStrategy::IdSet { ids, negate } => {
                if *negate {
                    Ok(&set - ids)
                } else {
                    Ok(&set & ids)
                }
            }

            IndexStrategy::IntervalOverlap {
                min_member,
                max_member,
                lo,
                hi,
                exclude_lo,
                exclude_hi,
            } => {
                let mut subset: Option<BTreeSet<ObjectId>> = None;

                // Objects whose upper end reaches the query's lower bound,
                // plus open-ended upper ends
                if !lo.is_null() {
                    let (declaring, member) = max_member;
                    let mut upper_ok =
                        ctx.db
                            .index_range(declaring, member, Some(lo), *exclude_lo, None, false);
                    upper_ok.extend(ctx.db.index_get(declaring, member, &Value::Null));
                    subset = Some(upper_ok);
                }

                // Objects whose lower end stays under the query's upper
                // bound, plus open-ended lower ends
                if !hi.is_null() {
                    let (declaring, member) = min_member;
                    let mut lower_ok =
                        ctx.db
                            .index_range(declaring, member, None, false, Some(hi), *exclude_hi);
                    lower_ok.extend(ctx.db.index_get(declaring, member, &Value::Null));
                    subset = Some(match subset {
                        Some(prev) => &prev & &lower_ok,
                        None => lower_ok,
                    });
                }

                match subset {
                    Some(matching) => Ok(&set & &matching),
                    None => Ok(set),
                }
            }

            IndexStrategy::TypeNarrow { types, negate } => {
                let mut subset = BTreeSet::new();
                for type_name in types {
                    subset.extend(ctx.db.exact_ids(type_name));
                }
                if *negate {
                    Ok(&set - &subset)
                } else {
                    Ok(&set & &subset)
                }
            }

            IndexStrategy::TreeDescend {
                declaring,
                member,
                root,
                include_self,
            } => {
                let mut subset = BTreeSet::new();
                if *include_self {
                    subset.insert(*root);
                }
                let mut visited = BTreeSet::from([*root]);
                let mut frontier = vec![*root];
                while let Some(parent) = frontier.pop() {
                    for child in ctx.db.index_get(declaring, member, &Value::Id(parent)) {
                        if visited.insert(child) {
                            subset.insert(child);
                            frontier.push(child);
                        }
                    }
                }
                Ok(&set & &subset)
            }

            IndexStrategy::RelationJoin {
                declaring,
                member,
                related,
                filters,
            } => {
                let mut subquery = Query::new(ctx.db, related)?;
                subquery.set_filters(filters.clone());
                let related_ids = subquery.execute_opts(false, false)?.into_set();
                if related_ids.is_empty() {
                    return Ok(BTreeSet::new());
                }

                let mut referers = BTreeSet::new();
                for related_id in related_ids {
                    referers.extend(ctx.db.index_get(declaring, member, &Value::Id(related_id)));
                }
                Ok(&set & &referers)
            }

            IndexStrategy::TokenLookup {
                fields,
                terms,
                logic,
            } => {
                let mut matched = BTreeSet::new();
                for (declaring, member) in fields {
                    match logic {
                        SearchLogic::All => {
                            let mut acc: Option<BTreeSet<ObjectId>> = None;
                            for term in terms {
                                let hits = ctx.db.token_get(declaring, member, term);
                                if hits.is_empty() {
                                    acc = None;
                                    break;
                                }
                                acc = Some(match acc {
                                    Some(prev) => &prev & &hits,
                                    None => hits,
                                });
                            }
                            if let Some(hits) = acc {
                                matched.extend(hits);
                            }
                        }
                        SearchLogic::Any => {
                            for term in terms {
                                matched.extend(ctx.db.token_get(declaring, member, term));
                            }
                        }
                    }
                }
                Ok(&set & &matched)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, MemberDef, TypeDef};
    use crate::store::Database;

    fn sample_db() -> Database {
        let mut catalog = Catalog::new();
        catalog
            .register(
                TypeDef::new("User")
                    .with_member(MemberDef::primary("id"))
                    .with_member(MemberDef::new("name").with_unique_index())
                    .with_member(MemberDef::new("status").with_index())
                    .with_member(MemberDef::new("age"))
                    .with_member(MemberDef::new("bio").with_full_text()),
            )
            .unwrap();
        Database::new(catalog).unwrap()
    }

    fn resolve(db: &Database, expr: &Expression) -> (Cost, Option<IndexStrategy>) {
        let ctx = QueryCtx {
            db,
            type_name: "User",
        };
        resolve_filter(expr, &ctx).unwrap()
    }

    #[test]
    fn test_cost_ordering() {
        assert!(Cost(-4, 0) < Cost(-2, -1));
        assert!(Cost(-2, -1) < Cost(-2, 0));
        assert!(Cost(-2, 0) < Cost(0, -1));
        assert!(Cost(0, -4) < Cost(0, 0));
        assert!(Cost(0, 0) < Cost(1, 0));
    }

    #[test]
    fn test_constant_resolution() {
        let db = sample_db();
        let (cost, strategy) = resolve(&db, &Expression::constant(true));
        assert_eq!(cost, Cost(-4, 0));
        assert!(matches!(strategy, Some(IndexStrategy::Constant(true))));

        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };
        assert!(matches!(
            resolve_filter(&Expression::constant(3i64), &ctx),
            Err(Error::Unresolvable { .. })
        ));
    }

    #[test]
    fn test_eq_resolution_classes() {
        let db = sample_db();

        // Unique index: strong point lookup
        let (cost, strategy) = resolve(&db, &Expression::eq("name", "bob"));
        assert_eq!(cost, Cost(-2, -1));
        assert!(matches!(
            strategy,
            Some(IndexStrategy::KeyLookup { negate: false, .. })
        ));

        // Multi-valued index
        let (cost, _) = resolve(&db, &Expression::eq("status", "active"));
        assert_eq!(cost, Cost(-1, -1));

        // No index: brute force, but still ahead of plain inequality
        let (cost, strategy) = resolve(&db, &Expression::eq("age", 30i64));
        assert_eq!(cost, Cost(0, -1));
        assert!(strategy.is_none());
    }

    #[test]
    fn test_primary_resolution() {
        let db = sample_db();
        let (cost, strategy) = resolve(&db, &Expression::eq("id", ObjectId::new(3)));
        assert_eq!(cost, Cost(-2, -1));
        assert!(matches!(strategy, Some(IndexStrategy::PrimaryEq { .. })));

        // A non-identity operand short-circuits to an empty match
        let (_, strategy) = resolve(&db, &Expression::eq("id", 3i64));
        assert!(matches!(strategy, Some(IndexStrategy::Constant(false))));

        let (cost, strategy) = resolve(&db, &Expression::gt("id", ObjectId::new(3)));
        assert_eq!(cost, Cost(-2, 0));
        assert!(matches!(strategy, Some(IndexStrategy::PrimaryRange { .. })));
    }

    #[test]
    fn test_in_resolution() {
        let db = sample_db();
        let (cost, strategy) = resolve(
            &db,
            &Expression::in_values("id", vec![Value::Id(ObjectId::new(1))]),
        );
        assert_eq!(cost, Cost(-3, 0));
        assert!(matches!(
            strategy,
            Some(IndexStrategy::IdSet { negate: false, .. })
        ));

        // Inclusion over a plain member falls back to evaluation
        let (cost, strategy) = resolve(
            &db,
            &Expression::in_values("age", vec![Value::Int(1), Value::Int(2)]),
        );
        assert_eq!(cost, Cost(0, 0));
        assert!(strategy.is_none());
    }

    #[test]
    fn test_search_and_substring_tiebreakers() {
        let db = sample_db();

        let (cost, strategy) = resolve(&db, &Expression::search("bio", "rust"));
        assert_eq!(cost, Cost(-1, 1));
        assert!(matches!(strategy, Some(IndexStrategy::TokenLookup { .. })));

        // Search over a non-indexed member runs before other brute filters
        let (cost, strategy) = resolve(
            &db,
            &Expression::Search {
                field: Some("name".into()),
                terms: "bob".into(),
                logic: SearchLogic::All,
            },
        );
        assert_eq!(cost, Cost(0, -4));
        assert!(strategy.is_none());

        let (cost, _) = resolve(&db, &Expression::contains("name", "ob"));
        assert_eq!(cost, Cost(0, -2));
    }

    #[test]
    fn test_unknown_member_fails_fast() {
        let db = sample_db();
        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };
        assert!(matches!(
            resolve_filter(&Expression::eq("missing", 1i64), &ctx),
            Err(Error::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_interval_requires_a_bound() {
        let db = sample_db();
        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };
        let expr = Expression::intersects("age", "age", Value::Null, Value::Null);
        assert!(matches!(
            resolve_filter(&expr, &ctx),
            Err(Error::Unresolvable { .. })
        ));
    }
}
