//! Field-level write access.
//!
//! The executors only see the [`AccessGate`] capability; how a policy decides
//! which fields are off-limits is up to the implementation.


use crate::{model::EntityModel, path::FieldPath};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

///
/// Caller
/// Identity of the requester as far as access rules are concerned.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Caller {
    roles: BTreeSet<String>,
}

impl Caller {
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            roles: BTreeSet::new(),
        }
    }

    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &String> {
        self.roles.iter()
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

///
/// AccessGate
///
/// Computes the fields a caller may not write.
///
/// Insert mode judges the new document alone; update mode compares the new
/// document against the stored one.
///

pub trait AccessGate {
    fn inaccessible_fields_for_insert(&self, doc: &JsonValue) -> BTreeSet<FieldPath>;

    fn inaccessible_fields_for_update(
        &self,
        new_doc: &JsonValue,
        old_doc: &JsonValue,
    ) -> BTreeSet<FieldPath>;
}

///
/// RoleAccessGate
///
/// Role-based policy driven by per-field role grants in the entity model.
///
/// Insert: a restricted field is a violation when present (non-null).
/// Update: a restricted field is a violation only when its value changed.
///

pub struct RoleAccessGate<'a> {
    model: &'a EntityModel,
    caller: &'a Caller,
}

impl<'a> RoleAccessGate<'a> {
    #[must_use]
    pub const fn new(model: &'a EntityModel, caller: &'a Caller) -> Self {
        Self { model, caller }
    }
}

impl AccessGate for RoleAccessGate<'_> {
    fn inaccessible_fields_for_insert(&self, doc: &JsonValue) -> BTreeSet<FieldPath> {
        self.model
            .fields
            .iter()
            .filter(|f| !f.access.insert.allows(self.caller))
            .filter(|f| present(f.path.resolve(doc)).is_some())
            .map(|f| f.path.clone())
            .collect()
    }

    fn inaccessible_fields_for_update(
        &self,
        new_doc: &JsonValue,
        old_doc: &JsonValue,
    ) -> BTreeSet<FieldPath> {
        self.model
            .fields
            .iter()
            .filter(|f| !f.access.update.allows(self.caller))
            .filter(|f| present(f.path.resolve(new_doc)) != present(f.path.resolve(old_doc)))
            .map(|f| f.path.clone())
            .collect()
    }
}

// Explicit null and absence are the same thing to access rules.
fn present(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|v| !v.is_null())
}
