use crate::{access::Caller, path::FieldPath};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

///
/// FieldKind
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[remain::sorted]
pub enum FieldKind {
    #[default]
    Any,
    Array,
    Bool,
    Float,
    Id,
    Int,
    Object,
    Text,
}

impl FieldKind {
    /// Containers whose whole subtree belongs to the field.
    #[must_use]
    pub const fn owns_subtree(self) -> bool {
        matches!(self, Self::Any | Self::Array)
    }
}

///
/// MergePolicy
///
/// Overwrite  : the client document wins
/// Preserve   : the stored value is kept (field owned by another writer)
/// AppendOnly : stored list elements are kept, new elements are appended
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    Overwrite,
    Preserve,
    AppendOnly,
}

impl MergePolicy {
    #[must_use]
    pub const fn is_constrained(self) -> bool {
        !matches!(self, Self::Overwrite)
    }
}

///
/// RoleSet
/// Roles granted an operation. An empty set grants everyone.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    #[must_use]
    pub const fn anyone() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn allows(&self, caller: &Caller) -> bool {
        self.0.is_empty() || caller.roles().any(|role| self.0.contains(role))
    }
}

///
/// FieldAccess
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldAccess {
    #[serde(default)]
    pub insert: RoleSet,
    #[serde(default)]
    pub update: RoleSet,
}

///
/// FieldModel
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldModel {
    pub path: FieldPath,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub merge: MergePolicy,
    #[serde(default)]
    pub access: FieldAccess,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl FieldModel {
    #[must_use]
    pub fn new(path: &str, kind: FieldKind) -> Self {
        Self {
            path: FieldPath::parse(path),
            kind,
            merge: MergePolicy::Overwrite,
            access: FieldAccess::default(),
            required: false,
            case_insensitive: false,
        }
    }

    #[must_use]
    pub const fn with_merge(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    #[must_use]
    pub fn insert_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access.insert = RoleSet::of(roles);
        self
    }

    #[must_use]
    pub fn update_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access.update = RoleSet::of(roles);
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}
