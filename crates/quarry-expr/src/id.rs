//! Opaque object identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque identifier for a persisted object.
///
/// Identifiers are totally ordered and hashable, and are never reused while
/// the object they name is alive. They are allocated by the store; callers
/// should treat the inner value as meaningless outside of ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Wrap a raw identifier value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_raw_value() {
        let a = ObjectId::new(1);
        let b = ObjectId::new(2);
        assert!(a < b);
        assert_eq!(a, ObjectId::from(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(ObjectId::new(42).to_string(), "#42");
    }
}
