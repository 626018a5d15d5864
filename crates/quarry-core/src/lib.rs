//! Quarry Core - catalog, store, and the cost-ordered query engine.
//!
//! The engine answers "which objects satisfy these filters, in this order,
//! within this range" by planning each filter against the catalog's index
//! metadata, running the cheapest strategies first, and caching results with
//! per-phase invalidation.
//!
//! ```
//! use quarry_core::catalog::{Catalog, MemberDef, TypeDef};
//! use quarry_core::store::Database;
//! use quarry_core::expr::{Expression, Value};
//!
//! let mut catalog = Catalog::new();
//! catalog.register(
//!     TypeDef::new("User")
//!         .with_member(MemberDef::primary("id"))
//!         .with_member(MemberDef::new("name").with_unique_index()),
//! )?;
//! let db = Database::new(catalog)?;
//! db.insert("User", vec![("name", Value::from("ada"))])?;
//!
//! let mut query = db.query("User")?;
//! query.add_filter(Expression::eq("name", "ada"));
//! assert_eq!(query.len()?, 1);
//! # Ok::<(), quarry_core::Error>(())
//! ```

pub mod catalog;
pub mod dataset;
pub mod error;
pub mod query;
pub mod store;

pub use catalog::{Catalog, MemberDef, TypeDef};
pub use dataset::Dataset;
pub use error::Error;
pub use query::{Cost, Objects, PlanEntry, Query, Select};
pub use store::{Database, Object, StoreCounters};

/// Re-export the expression IR.
pub use quarry_expr as expr;
