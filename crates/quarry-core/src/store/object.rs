//! Stored objects.

use std::collections::BTreeMap;

use quarry_expr::{ObjectId, Value};

use crate::catalog::MemberDef;

static NULL: Value = Value::Null;

/// A stored object: an identity, a concrete type, and member values.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    id: ObjectId,
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Object {
    pub(crate) fn new(
        id: ObjectId,
        type_name: impl Into<String>,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            fields,
        }
    }

    /// The object's identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The object's concrete type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Get a member value by name. Absent members read as `Null`.
    pub fn get(&self, member: &str) -> &Value {
        self.fields.get(member).unwrap_or(&NULL)
    }

    /// All stored member values.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// The value of a member as seen by the engine: identity members read as
    /// the object's id, everything else reads from the field map.
    pub fn member_value(&self, member: &MemberDef) -> Value {
        if member.primary {
            Value::Id(self.id)
        } else {
            self.get(&member.name).clone()
        }
    }
}
