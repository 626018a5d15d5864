//! The filter executor.
//!
//! Builds the cost-ordered execution plan and runs it against the candidate
//! set. Cost ordering is a performance decision only: any ordering of the
//! plan produces the same final set.

use std::collections::BTreeSet;

use quarry_expr::{Expression, ObjectId};
use tracing::{debug, trace};

use crate::error::Error;

use super::eval::eval;
use super::resolve::{resolve_filter, Cost, IndexStrategy};
use super::QueryCtx;

/// One planned filter: its cost, the expression, and the index strategy when
/// one exists.
pub(crate) struct PlanStep<'e> {
    pub cost: Cost,
    pub filter: &'e Expression,
    pub strategy: Option<IndexStrategy>,
}

/// Resolve every filter into a plan sorted ascending by cost.
///
/// Conjunctions are flattened recursively, so cost ordering is global across
/// the whole filter list rather than nested per sub-expression. The sort is
/// stable: equal costs keep the order the filters were given in.
pub(crate) fn build_plan<'e>(
    ctx: &QueryCtx<'_>,
    filters: &'e [Expression],
) -> Result<Vec<PlanStep<'e>>, Error> {
    let mut flat = Vec::new();
    flatten_into(filters, &mut flat);

    let mut plan = Vec::with_capacity(flat.len());
    for filter in flat {
        let (cost, strategy) = resolve_filter(filter, ctx)?;
        plan.push(PlanStep {
            cost,
            filter,
            strategy,
        });
    }
    plan.sort_by_key(|step| step.cost);
    Ok(plan)
}

fn flatten_into<'e>(filters: &'e [Expression], out: &mut Vec<&'e Expression>) {
    for filter in filters {
        match filter {
            Expression::And(operands) => flatten_into(operands, out),
            other => out.push(other),
        }
    }
}

/// Run the plan, narrowing the candidate set step by step.
///
/// An empty set short-circuits the remaining steps. A step with a strategy
/// applies it unless a single candidate survives, in which case evaluating
/// the predicate directly is cheaper than an index pass. An evaluation
/// failure aborts the phase, naming the filter and object that failed.
pub(crate) fn apply_filters(
    ctx: &QueryCtx<'_>,
    plan: &[PlanStep<'_>],
    mut set: BTreeSet<ObjectId>,
) -> Result<BTreeSet<ObjectId>, Error> {
    for step in plan {
        if set.is_empty() {
            trace!("candidate set empty, skipping remaining filters");
            break;
        }

        match &step.strategy {
            Some(strategy) if set.len() > 1 => {
                trace!(filter = %step.filter, "applying index strategy");
                set = strategy.apply(ctx, set)?;
            }
            _ => {
                trace!(filter = %step.filter, candidates = set.len(), "evaluating predicate");
                let mut kept = BTreeSet::new();
                for id in &set {
                    let object = ctx.db.get(*id).ok_or(Error::NotFound(*id))?;
                    let matched = eval(step.filter, &object, ctx)
                        .map_err(|source| annotate(step.filter, *id, source))?;
                    if matched {
                        kept.insert(*id);
                    }
                }
                set = kept;
            }
        }
        trace!(filter = %step.filter, remaining = set.len(), "filter applied");
    }

    debug!(remaining = set.len(), "filter phase done");
    Ok(set)
}

fn annotate(filter: &Expression, id: ObjectId, source: Error) -> Error {
    match source {
        already @ Error::FilterEval { .. } => already,
        other => Error::FilterEval {
            filter: filter.to_string(),
            id,
            reason: other.to_string(),
        },
    }
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
                TypeDef::new("User")
                    .with_member(MemberDef::primary("id"))
                    .with_member(MemberDef::new("name").with_unique_index())
                    .with_member(MemberDef::new("age")),
            )
            .unwrap();
        let db = Database::new(catalog).unwrap();
        for (name, age) in [("alice", 30i64), ("bob", 25), ("carol", 35)] {
            db.insert(
                "User",
                vec![("name", Value::from(name)), ("age", Value::Int(age))],
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn test_plan_is_cost_sorted_with_ands_flattened() {
        let db = sample_db();
        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };

        let filters = vec![
            Expression::gt("age", 20i64),
            Expression::and(vec![
                Expression::eq("name", "bob"),
                Expression::constant(true),
            ]),
        ];
        let plan = build_plan(&ctx, &filters).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].cost, Cost(-4, 0)); // constant first
        assert_eq!(plan[1].cost, Cost(-2, -1)); // unique point lookup
        assert_eq!(plan[2].cost, Cost(0, 0)); // brute-force inequality last
    }

    #[test]
    fn test_apply_narrows_to_conjunction() {
        let db = sample_db();
        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };
        let filters = vec![
            Expression::gt("age", 24i64),
            Expression::lt("age", 31i64),
        ];
        let plan = build_plan(&ctx, &filters).unwrap();
        let result = apply_filters(&ctx, &plan, db.all_ids("User").unwrap()).unwrap();

        assert_eq!(result.len(), 2); // alice (30) and bob (25)
    }

    #[test]
    fn test_false_constant_short_circuits_object_loads() {
        let db = sample_db();
        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };

        // The constant resolves cheapest, empties the set, and the
        // brute-force age filter never loads an object
        let filters = vec![
            Expression::gt("age", 0i64),
            Expression::constant(false),
        ];
        let plan = build_plan(&ctx, &filters).unwrap();
        let before = db.counters().loads();
        let result = apply_filters(&ctx, &plan, db.all_ids("User").unwrap()).unwrap();

        assert!(result.is_empty());
        assert_eq!(db.counters().loads(), before);
    }

    #[test]
    fn test_single_survivor_skips_index_pass() {
        let db = sample_db();
        let ctx = QueryCtx {
            db: &db,
            type_name: "User",
        };

        // After the unique lookup one candidate remains; the second indexed
        // filter evaluates the predicate instead of scanning its index
        let filters = vec![
            Expression::eq("name", "bob"),
            Expression::ne("name", "alice"),
        ];
        let plan = build_plan(&ctx, &filters).unwrap();
        let scans_before = db.counters().index_scans();
        let result = apply_filters(&ctx, &plan, db.all_ids("User").unwrap()).unwrap();

        assert_eq!(result.len(), 1);
        // One scan for the Eq lookup; the Ne ran brute-force on the survivor
        assert_eq!(db.counters().index_scans(), scans_before + 1);
    }
}
