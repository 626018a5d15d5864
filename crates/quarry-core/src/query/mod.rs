//! The query engine.
//!
//! This module implements the three-phase pipeline: filters narrow a
//! candidate set through a cost-ordered execution plan, ordering turns the
//! set into a sequence, and the range window slices it. [`Query`] is the
//! public entry point and owns result caching across the phases.

mod eval;
mod filter;
mod order;
mod query;
mod resolve;

pub use query::{Objects, PlanEntry, Query, Select};
pub use resolve::Cost;

use crate::catalog::MemberDef;
use crate::error::Error;
use crate::store::Database;

/// Shared lookup context for one query execution: the store and the queried
/// type. Nested executions (related-type subqueries) fork it with a
/// different type name.
pub(crate) struct QueryCtx<'a> {
    pub db: &'a Database,
    pub type_name: &'a str,
}

impl<'a> QueryCtx<'a> {
    /// Resolve a member of the queried type, walking the inheritance chain.
    pub fn member(&self, name: &str) -> Result<(&'a str, &'a MemberDef), Error> {
        self.db.catalog().member_of(self.type_name, name)
    }
}
