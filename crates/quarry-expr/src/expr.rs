//! The filter expression tree.
//!
//! Expressions are immutable descriptions of predicates over a target type's
//! members. The engine resolves each variant to an index-backed strategy when
//! one is available and falls back to per-object evaluation otherwise; this
//! crate only defines the tree shape.

use crate::id::ObjectId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Combination logic for token search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchLogic {
    /// Every term must match.
    All,
    /// At least one term must match.
    Any,
}

/// A filter expression over a target type.
///
/// Expressions reference members by name; member metadata (indexes,
/// uniqueness, references) is resolved against the engine's catalog when the
/// query is planned, so an expression tree is valid for any type that carries
/// the members it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// A constant predicate. Must hold a boolean to be executable.
    Constant(Value),
    /// Member equals value.
    Eq { field: String, value: Value },
    /// Member does not equal value.
    Ne { field: String, value: Value },
    /// Member is greater than value.
    Gt { field: String, value: Value },
    /// Member is greater than or equal to value.
    Ge { field: String, value: Value },
    /// Member is less than value.
    Lt { field: String, value: Value },
    /// Member is less than or equal to value.
    Le { field: String, value: Value },
    /// Member is one of an explicit set of values.
    In { field: String, values: Vec<Value> },
    /// Member is none of an explicit set of values.
    NotIn { field: String, values: Vec<Value> },
    /// The object's `[min_field, max_field]` interval overlaps `[lo, hi]`.
    ///
    /// A `Null` end on either interval is unbounded. `exclude_lo` /
    /// `exclude_hi` make the query interval's ends exclusive.
    Intersects {
        min_field: String,
        max_field: String,
        lo: Value,
        hi: Value,
        exclude_lo: bool,
        exclude_hi: bool,
    },
    /// Logical conjunction. Operands are flattened into the surrounding
    /// execution plan rather than evaluated as a nested unit.
    And(Vec<Expression>),
    /// The relation member references at least one object of the related
    /// type matching all of `filters`.
    Has {
        relation: String,
        filters: Vec<Expression>,
    },
    /// The object's type is one of `types` (or a derived type, unless
    /// `exact`).
    IsInstance { types: Vec<String>, exact: bool },
    /// The object's type is none of `types` (nor a derived type, unless
    /// `exact`).
    IsNotInstance { types: Vec<String>, exact: bool },
    /// The object descends from `root` through a parent-pointer relation.
    DescendsFrom {
        relation: String,
        root: ObjectId,
        include_self: bool,
    },
    /// String member contains `needle` as a substring.
    Contains { field: String, needle: String },
    /// Token search over a full-text member, or over every full-text member
    /// of the type when `field` is `None`.
    Search {
        field: Option<String>,
        terms: String,
        logic: SearchLogic,
    },
}

impl Expression {
    /// A constant predicate.
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant(value.into())
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not-equal filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a greater-than-or-equal filter.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a less-than-or-equal filter.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Expression::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create an inclusion filter over an explicit value set.
    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Expression::In {
            field: field.into(),
            values,
        }
    }

    /// Create an exclusion filter over an explicit value set.
    pub fn not_in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Expression::NotIn {
            field: field.into(),
            values,
        }
    }

    /// Create an interval-overlap filter with inclusive ends.
    pub fn intersects(
        min_field: impl Into<String>,
        max_field: impl Into<String>,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> Self {
        Expression::Intersects {
            min_field: min_field.into(),
            max_field: max_field.into(),
            lo: lo.into(),
            hi: hi.into(),
            exclude_lo: false,
            exclude_hi: false,
        }
    }

    /// Create a conjunction of expressions.
    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::And(operands)
    }

    /// Create a has-relation filter.
    pub fn has(relation: impl Into<String>, filters: Vec<Expression>) -> Self {
        Expression::Has {
            relation: relation.into(),
            filters,
        }
    }

    /// Create an is-instance filter including derived types.
    pub fn is_instance(types: Vec<String>) -> Self {
        Expression::IsInstance {
            types,
            exact: false,
        }
    }

    /// Create an is-not-instance filter including derived types.
    pub fn is_not_instance(types: Vec<String>) -> Self {
        Expression::IsNotInstance {
            types,
            exact: false,
        }
    }

    /// Create a descends-from filter.
    pub fn descends_from(relation: impl Into<String>, root: ObjectId) -> Self {
        Expression::DescendsFrom {
            relation: relation.into(),
            root,
            include_self: false,
        }
    }

    /// Create a substring filter.
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Expression::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    /// Create a token search over one member requiring every term.
    pub fn search(field: impl Into<String>, terms: impl Into<String>) -> Self {
        Expression::Search {
            field: Some(field.into()),
            terms: terms.into(),
            logic: SearchLogic::All,
        }
    }

    /// Create a token search over every full-text member of the type.
    pub fn global_search(terms: impl Into<String>, logic: SearchLogic) -> Self {
        Expression::Search {
            field: None,
            terms: terms.into(),
            logic,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant(v) => write!(f, "const({v})"),
            Expression::Eq { field, value } => write!(f, "{field} == {value}"),
            Expression::Ne { field, value } => write!(f, "{field} != {value}"),
            Expression::Gt { field, value } => write!(f, "{field} > {value}"),
            Expression::Ge { field, value } => write!(f, "{field} >= {value}"),
            Expression::Lt { field, value } => write!(f, "{field} < {value}"),
            Expression::Le { field, value } => write!(f, "{field} <= {value}"),
            Expression::In { field, values } => {
                write!(f, "{field} in {{{} values}}", values.len())
            }
            Expression::NotIn { field, values } => {
                write!(f, "{field} not in {{{} values}}", values.len())
            }
            Expression::Intersects {
                min_field,
                max_field,
                lo,
                hi,
                ..
            } => write!(f, "[{min_field}, {max_field}] overlaps [{lo}, {hi}]"),
            Expression::And(operands) => {
                write!(f, "(")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " and ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, ")")
            }
            Expression::Has { relation, filters } => {
                write!(f, "has {relation} matching {} filters", filters.len())
            }
            Expression::IsInstance { types, .. } => write!(f, "is {}", types.join(" | ")),
            Expression::IsNotInstance { types, .. } => {
                write!(f, "is not {}", types.join(" | "))
            }
            Expression::DescendsFrom { relation, root, .. } => {
                write!(f, "descends from {root} via {relation}")
            }
            Expression::Contains { field, needle } => {
                write!(f, "{field} contains {needle:?}")
            }
            Expression::Search { field, terms, .. } => match field {
                Some(field) => write!(f, "{field} search {terms:?}"),
                None => write!(f, "search {terms:?}"),
            },
        }
    }
}
