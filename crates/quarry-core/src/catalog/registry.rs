//! The type registry.

use std::collections::{BTreeSet, HashMap};

use super::member::MemberDef;
use super::type_def::TypeDef;
use crate::error::Error;

/// Registry of type definitions with inheritance links.
#[derive(Debug, Default)]
pub struct Catalog {
    types: HashMap<String, TypeDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type definition.
    ///
    /// The parent named by `extends` must already be registered.
    pub fn register(&mut self, type_def: TypeDef) -> Result<(), Error> {
        if self.types.contains_key(&type_def.name) {
            return Err(Error::DuplicateType(type_def.name));
        }
        if let Some(parent) = &type_def.extends {
            if !self.types.contains_key(parent) {
                return Err(Error::UnknownType(parent.clone()));
            }
        }
        self.types.insert(type_def.name.clone(), type_def);
        Ok(())
    }

    /// Look up a type definition.
    pub fn type_def(&self, name: &str) -> Result<&TypeDef, Error> {
        self.types
            .get(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Whether the named type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Names of every registered type, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The type itself followed by its ancestors, nearest first.
    pub fn ancestry(&self, name: &str) -> Result<Vec<&TypeDef>, Error> {
        let mut chain = Vec::new();
        let mut current = Some(self.type_def(name)?);
        while let Some(type_def) = current {
            chain.push(type_def);
            current = match &type_def.extends {
                Some(parent) => Some(self.type_def(parent)?),
                None => None,
            };
        }
        Ok(chain)
    }

    /// Resolve a member on a type, searching the inheritance chain.
    ///
    /// Returns the declaring type's name alongside the member definition, so
    /// index handles can be keyed on the declaration site.
    pub fn member_of<'a>(
        &'a self,
        type_name: &str,
        member: &str,
    ) -> Result<(&'a str, &'a MemberDef), Error> {
        for type_def in self.ancestry(type_name)? {
            if let Some(def) = type_def.member(member) {
                return Ok((type_def.name.as_str(), def));
            }
        }
        Err(Error::UnknownMember {
            type_name: type_name.to_string(),
            member: member.to_string(),
        })
    }

    /// All members visible on a type (own and inherited), each with its
    /// declaring type name. Members shadowed by a derived declaration are
    /// reported once, from the nearest declaration.
    pub fn effective_members<'a>(
        &'a self,
        type_name: &str,
    ) -> Result<Vec<(&'a str, &'a MemberDef)>, Error> {
        let mut seen = BTreeSet::new();
        let mut members = Vec::new();
        for type_def in self.ancestry(type_name)? {
            for member in &type_def.members {
                if seen.insert(member.name.as_str()) {
                    members.push((type_def.name.as_str(), member));
                }
            }
        }
        Ok(members)
    }

    /// Transitive derived types of `name`, not including `name` itself.
    pub fn descendants(&self, name: &str) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        let mut frontier = vec![name];
        while let Some(current) = frontier.pop() {
            for type_def in self.types.values() {
                if type_def.extends.as_deref() == Some(current) {
                    found.push(type_def.name.as_str());
                    frontier.push(type_def.name.as_str());
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// Expand a list of type names into the concrete types they denote:
    /// the named types plus, unless `exact`, all their descendants.
    pub fn expand(&self, names: &[String], exact: bool) -> Result<BTreeSet<String>, Error> {
        let mut expanded = BTreeSet::new();
        for name in names {
            let type_def = self.type_def(name)?;
            expanded.insert(type_def.name.clone());
            if !exact {
                for descendant in self.descendants(name) {
                    expanded.insert(descendant.to_string());
                }
            }
        }
        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .register(
                TypeDef::new("Document")
                    .with_member(MemberDef::primary("id"))
                    .with_member(MemberDef::new("title").with_index()),
            )
            .unwrap();
        catalog
            .register(
                TypeDef::new("Article")
                    .extending("Document")
                    .with_member(MemberDef::new("body")),
            )
            .unwrap();
        catalog
            .register(TypeDef::new("NewsItem").extending("Article"))
            .unwrap();
        catalog
    }

    #[test]
    fn test_register_rejects_duplicates_and_unknown_parents() {
        let mut catalog = sample_catalog();
        assert!(matches!(
            catalog.register(TypeDef::new("Document")),
            Err(Error::DuplicateType(_))
        ));
        assert!(matches!(
            catalog.register(TypeDef::new("Orphan").extending("Nowhere")),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_member_of_walks_ancestry() {
        let catalog = sample_catalog();

        let (declaring, member) = catalog.member_of("Article", "title").unwrap();
        assert_eq!(declaring, "Document");
        assert!(member.indexed);

        let (declaring, _) = catalog.member_of("Article", "body").unwrap();
        assert_eq!(declaring, "Article");

        assert!(matches!(
            catalog.member_of("Article", "missing"),
            Err(Error::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_effective_members() {
        let catalog = sample_catalog();
        let members = catalog.effective_members("NewsItem").unwrap();
        let names: Vec<&str> = members.iter().map(|(_, m)| m.name.as_str()).collect();
        assert!(names.contains(&"id"));
        assert!(names.contains(&"title"));
        assert!(names.contains(&"body"));
    }

    #[test]
    fn test_descendants_and_expand() {
        let catalog = sample_catalog();
        assert_eq!(catalog.descendants("Document"), vec!["Article", "NewsItem"]);
        assert!(catalog.descendants("NewsItem").is_empty());

        let expanded = catalog.expand(&["Article".to_string()], false).unwrap();
        assert!(expanded.contains("Article") && expanded.contains("NewsItem"));

        let exact = catalog.expand(&["Article".to_string()], true).unwrap();
        assert!(exact.contains("Article") && !exact.contains("NewsItem"));

        assert!(catalog.expand(&["Nope".to_string()], false).is_err());
    }
}
