//! The in-memory reference store.
//!
//! The engine consumes its collaborators — an object store keyed by id, an
//! index per indexed member, and a deletion hook — through [`Database`],
//! which bundles a catalog with in-memory tables. Concrete on-disk engines
//! are out of scope; anything that can answer the same lookups can sit
//! behind the same surface.

mod index;
mod memory;
mod object;

pub use index::{IndexKey, MemberIndex, TokenIndex};
pub use memory::{Database, StoreCounters};
pub use object::Object;

pub(crate) use index::tokenize;
