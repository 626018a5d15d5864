//! Ordering criteria for query results.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

/// Error produced when parsing an order criterion from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseOrderError {
    /// The criterion string was empty, or held only a direction prefix.
    #[error("empty order criterion")]
    Empty,
}

/// A single ordering criterion: a member name and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCriterion {
    /// Member to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderCriterion {
    /// Create an ascending criterion.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending criterion.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse a criterion from a string.
    ///
    /// An optional `+` or `-` prefix selects ascending (default) or
    /// descending order: `"name"`, `"+name"`, `"-created"`.
    pub fn parse(spec: &str) -> Result<Self, ParseOrderError> {
        let (direction, field) = match spec.strip_prefix('-') {
            Some(rest) => (OrderDirection::Desc, rest),
            None => (OrderDirection::Asc, spec.strip_prefix('+').unwrap_or(spec)),
        };

        if field.is_empty() {
            return Err(ParseOrderError::Empty);
        }

        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }

    /// Whether this criterion sorts descending.
    pub fn is_descending(&self) -> bool {
        self.direction == OrderDirection::Desc
    }
}

impl fmt::Display for OrderCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.direction {
            OrderDirection::Asc => "+",
            OrderDirection::Desc => "-",
        };
        write!(f, "{prefix}{}", self.field)
    }
}
