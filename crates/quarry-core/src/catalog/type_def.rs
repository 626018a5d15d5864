//! Type definitions.

use super::member::MemberDef;

/// A persisted type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Type name (unique within the catalog).
    pub name: String,
    /// Parent type, if this type derives from another.
    pub extends: Option<String>,
    /// Whether the type keeps an id universe. Unindexed types can only be
    /// queried through an explicit base collection.
    pub indexed: bool,
    /// Members declared directly on this type (inherited members live on the
    /// ancestor's definition).
    pub members: Vec<MemberDef>,
}

impl TypeDef {
    /// Create a new indexed type definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            indexed: true,
            members: Vec::new(),
        }
    }

    /// Add a member to the type.
    pub fn with_member(mut self, member: MemberDef) -> Self {
        self.members.push(member);
        self
    }

    /// Derive from a parent type.
    pub fn extending(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Drop the type's id universe.
    pub fn unindexed(mut self) -> Self {
        self.indexed = false;
        self
    }

    /// Get a directly declared member by name.
    pub fn member(&self, name: &str) -> Option<&MemberDef> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The type's identity member, if declared here.
    pub fn primary_member(&self) -> Option<&MemberDef> {
        self.members.iter().find(|m| m.primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_builder() {
        let t = TypeDef::new("Document")
            .with_member(MemberDef::primary("id"))
            .with_member(MemberDef::new("title").with_index());

        assert_eq!(t.name, "Document");
        assert!(t.indexed);
        assert!(t.member("title").is_some());
        assert!(t.member("missing").is_none());
        assert_eq!(t.primary_member().unwrap().name, "id");
    }

    #[test]
    fn test_extending() {
        let t = TypeDef::new("Article").extending("Document");
        assert_eq!(t.extends.as_deref(), Some("Document"));
    }
}
