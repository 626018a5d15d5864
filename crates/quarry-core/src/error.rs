//! Engine error types.

use quarry_expr::{ObjectId, ParseOrderError};
use thiserror::Error;

/// Errors produced by the catalog, store, and query engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The named type is not registered in the catalog.
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// A type was registered twice.
    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    /// The named member does not exist on the type or its ancestors.
    #[error("unknown member '{member}' on type '{type_name}'")]
    UnknownMember {
        /// Queried type.
        type_name: String,
        /// Member name that failed to resolve.
        member: String,
    },

    /// An order criterion string failed to parse.
    #[error("invalid order criterion: {0}")]
    Order(#[from] ParseOrderError),

    /// The type carries no id universe, so a query over it needs an explicit
    /// base collection.
    #[error("type '{0}' is not indexed; an explicit base collection is required")]
    NotIndexed(String),

    /// A filter expression is structurally invalid for its variant.
    #[error("cannot resolve filter '{filter}': {reason}")]
    Unresolvable {
        /// Display form of the offending filter.
        filter: String,
        /// What made it unresolvable.
        reason: String,
    },

    /// Brute-force evaluation of a filter failed on a specific object.
    #[error("evaluating filter '{filter}' against {id} failed: {reason}")]
    FilterEval {
        /// Display form of the offending filter.
        filter: String,
        /// Object under evaluation.
        id: ObjectId,
        /// What went wrong.
        reason: String,
    },

    /// Inserting an object would duplicate a unique index key.
    #[error("unique index violation on {type_name}.{member}")]
    UniqueViolation {
        /// Declaring type.
        type_name: String,
        /// Unique member.
        member: String,
    },

    /// An object id resolved by an index was missing from the store.
    #[error("object {0} not found")]
    NotFound(ObjectId),
}
