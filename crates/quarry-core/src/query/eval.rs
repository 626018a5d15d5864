//! Brute-force predicate evaluation.
//!
//! The fallback path for filters with no index strategy, and for plans
//! reduced to a single surviving candidate. Semantics mirror the index
//! strategies exactly: the same filter must accept the same objects whether
//! it runs through an index or through this module.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use quarry_expr::{Expression, SearchLogic, Value};

use crate::error::Error;
use crate::store::{tokenize, Object};

use super::QueryCtx;

/// Equality as the indexes see it: multi-valued reference members match
/// element-wise (each element has its own index entry), everything else
/// compares by value with no cross-kind coercion.
fn values_equal(stored: &Value, operand: &Value) -> bool {
    match (stored, operand) {
        (Value::IdArray(ids), Value::Id(id)) => ids.contains(id),
        _ => stored == operand,
    }
}

/// Ordering comparison; null or cross-kind operands are never ordered.
fn cmp_matches(stored: &Value, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    if stored.is_null() || operand.is_null() {
        return false;
    }
    Value::compare(stored, operand).map(accept).unwrap_or(false)
}

/// Evaluate a filter against a loaded object.
pub(crate) fn eval(expr: &Expression, object: &Object, ctx: &QueryCtx<'_>) -> Result<bool, Error> {
    match expr {
        Expression::Constant(value) => value.as_bool().ok_or_else(|| Error::Unresolvable {
            filter: expr.to_string(),
            reason: "constant filters must be boolean".into(),
        }),

        Expression::Eq { field, value } => {
            let stored = member_value(ctx, object, field)?;
            Ok(values_equal(&stored, value))
        }

        Expression::Ne { field, value } => {
            let stored = member_value(ctx, object, field)?;
            Ok(!values_equal(&stored, value))
        }

        Expression::Gt { field, value } => {
            let stored = member_value(ctx, object, field)?;
            Ok(cmp_matches(&stored, value, Ordering::is_gt))
        }

        Expression::Ge { field, value } => {
            let stored = member_value(ctx, object, field)?;
            Ok(cmp_matches(&stored, value, Ordering::is_ge))
        }

        Expression::Lt { field, value } => {
            let stored = member_value(ctx, object, field)?;
            Ok(cmp_matches(&stored, value, Ordering::is_lt))
        }

        Expression::Le { field, value } => {
            let stored = member_value(ctx, object, field)?;
            Ok(cmp_matches(&stored, value, Ordering::is_le))
        }

        Expression::In { field, values } => {
            let stored = member_value(ctx, object, field)?;
            Ok(values.iter().any(|v| values_equal(&stored, v)))
        }

        Expression::NotIn { field, values } => {
            let stored = member_value(ctx, object, field)?;
            Ok(!values.iter().any(|v| values_equal(&stored, v)))
        }

        Expression::Intersects {
            min_field,
            max_field,
            lo,
            hi,
            exclude_lo,
            exclude_hi,
        } => {
            let object_lo = member_value(ctx, object, min_field)?;
            let object_hi = member_value(ctx, object, max_field)?;

            // A null end on either interval is unbounded
            let upper_reaches = lo.is_null()
                || object_hi.is_null()
                || Value::compare(&object_hi, lo)
                    .map(|ord| if *exclude_lo { ord.is_gt() } else { ord.is_ge() })
                    .unwrap_or(false);
            let lower_stays = hi.is_null()
                || object_lo.is_null()
                || Value::compare(&object_lo, hi)
                    .map(|ord| if *exclude_hi { ord.is_lt() } else { ord.is_le() })
                    .unwrap_or(false);
            Ok(upper_reaches && lower_stays)
        }

        Expression::And(operands) => {
            for operand in operands {
                if !eval(operand, object, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Expression::Has { relation, filters } => {
            let (_, member) = ctx.member(relation)?;
            let related_type = member.references.as_ref().ok_or_else(|| Error::Unresolvable {
                filter: expr.to_string(),
                reason: "member is not a reference".into(),
            })?;
            let child_ctx = QueryCtx {
                db: ctx.db,
                type_name: related_type,
            };

            for related_id in object.get(relation).ids() {
                // Dangling references do not match
                let Some(related) = ctx.db.get(related_id) else {
                    continue;
                };
                let mut all = true;
                for filter in filters {
                    if !eval(filter, &related, &child_ctx)? {
                        all = false;
                        break;
                    }
                }
                if all {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        Expression::IsInstance { types, exact } => {
            let expanded = ctx.db.catalog().expand(types, *exact)?;
            Ok(expanded.contains(object.type_name()))
        }

        Expression::IsNotInstance { types, exact } => {
            let expanded = ctx.db.catalog().expand(types, *exact)?;
            Ok(!expanded.contains(object.type_name()))
        }

        Expression::DescendsFrom {
            relation,
            root,
            include_self,
        } => {
            ctx.member(relation)?;
            if *include_self && object.id() == *root {
                return Ok(true);
            }
            // Walk the parent chain upward
            let mut visited = BTreeSet::from([object.id()]);
            let mut current = object.get(relation).as_id();
            while let Some(parent_id) = current {
                if parent_id == *root {
                    return Ok(true);
                }
                if !visited.insert(parent_id) {
                    break;
                }
                current = ctx
                    .db
                    .get(parent_id)
                    .and_then(|parent| parent.get(relation).as_id());
            }
            Ok(false)
        }

        Expression::Contains { field, needle } => {
            let stored = member_value(ctx, object, field)?;
            Ok(stored.as_str().is_some_and(|s| s.contains(needle.as_str())))
        }

        Expression::Search {
            field,
            terms,
            logic,
        } => {
            let term_list = tokenize(terms);
            if term_list.is_empty() {
                return Ok(false);
            }

            let mut texts: Vec<String> = Vec::new();
            match field {
                Some(name) => {
                    let stored = member_value(ctx, object, name)?;
                    if let Value::String(text) = stored {
                        texts.push(text);
                    }
                }
                None => {
                    // Mirror the token index: only full-text members count
                    for (_, member) in ctx.db.catalog().effective_members(ctx.type_name)? {
                        if member.full_text {
                            if let Value::String(text) = object.member_value(member) {
                                texts.push(text);
                            }
                        }
                    }
                }
            }

            let tokens: BTreeSet<String> =
                texts.iter().flat_map(|text| tokenize(text)).collect();
            Ok(match logic {
                SearchLogic::All => term_list.iter().all(|term| tokens.contains(term)),
                SearchLogic::Any => term_list.iter().any(|term| tokens.contains(term)),
            })
        }
    }
}

fn member_value(ctx: &QueryCtx<'_>, object: &Object, field: &str) -> Result<Value, Error> {
    let (_, member) = ctx.member(field)?;
    Ok(object.member_value(member))
}
