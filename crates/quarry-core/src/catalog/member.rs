//! Member definitions.

/// A member (field) definition within a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDef {
    /// Member name.
    pub name: String,
    /// Whether this member carries a secondary index.
    pub indexed: bool,
    /// Whether the index maps each key to at most one object.
    pub unique: bool,
    /// Whether this member is the type's identity. Implies indexed + unique;
    /// its values are the object ids themselves.
    pub primary: bool,
    /// Whether this member carries a token (full-text) index.
    pub full_text: bool,
    /// Target type for reference members.
    pub references: Option<String>,
}

impl MemberDef {
    /// Create a plain, unindexed member.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: false,
            unique: false,
            primary: false,
            full_text: false,
            references: None,
        }
    }

    /// Create the type's identity member.
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: true,
            unique: true,
            primary: true,
            full_text: false,
            references: None,
        }
    }

    /// Add a secondary index that accepts multiple objects per key.
    pub fn with_index(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Add a unique secondary index.
    pub fn with_unique_index(mut self) -> Self {
        self.indexed = true;
        self.unique = true;
        self
    }

    /// Add a token index for full-text search.
    pub fn with_full_text(mut self) -> Self {
        self.full_text = true;
        self
    }

    /// Mark as a reference to another type.
    pub fn with_reference(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }

    /// Whether an index on this member maps a key to at most one object.
    pub fn unique_index(&self) -> bool {
        self.unique || self.primary
    }

    /// Whether any index (secondary or identity) backs this member.
    pub fn has_index(&self) -> bool {
        self.indexed || self.primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_builder() {
        let m = MemberDef::new("name").with_unique_index();
        assert!(m.indexed);
        assert!(m.unique);
        assert!(!m.primary);
        assert!(m.unique_index());

        let m = MemberDef::new("tags").with_index();
        assert!(m.indexed && !m.unique_index());
    }

    #[test]
    fn test_primary_member() {
        let m = MemberDef::primary("id");
        assert!(m.primary && m.has_index() && m.unique_index());
    }

    #[test]
    fn test_reference_member() {
        let m = MemberDef::new("author").with_index().with_reference("User");
        assert_eq!(m.references.as_deref(), Some("User"));
    }
}
