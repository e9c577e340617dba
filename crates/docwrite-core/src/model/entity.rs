use crate::{
    access::Caller,
    model::{
        derived,
        field::{FieldKind, FieldModel, MergePolicy, RoleSet},
    },
    path::FieldPath,
};
use serde::{Deserialize, Serialize};

///
/// DataStoreInfo
/// Where an entity's documents live.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataStoreInfo {
    pub backend: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

///
/// EntityAccess
/// Entity-level role grants, checked before any field-level rule.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntityAccess {
    #[serde(default)]
    pub insert: RoleSet,
    #[serde(default)]
    pub update: RoleSet,
    #[serde(default)]
    pub find: RoleSet,
}

impl EntityAccess {
    #[must_use]
    pub fn can_insert(&self, caller: &Caller) -> bool {
        self.insert.allows(caller)
    }

    #[must_use]
    pub fn can_update(&self, caller: &Caller) -> bool {
        self.update.allows(caller)
    }

    #[must_use]
    pub fn can_find(&self, caller: &Caller) -> bool {
        self.find.allows(caller)
    }
}

///
/// EntityModel
///
/// Metadata for one entity: its store location, declared fields, identity
/// fields, access grants and index management flag.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntityModel {
    pub name: String,
    pub datastore: DataStoreInfo,
    pub fields: Vec<FieldModel>,
    pub identity: Vec<FieldPath>,
    pub access: EntityAccess,
    pub unique_indexes: Vec<Vec<FieldPath>>,
    pub manage_indexes: Option<bool>,
}

impl EntityModel {
    #[must_use]
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datastore: DataStoreInfo {
                backend: "document".to_string(),
                collection: collection.into(),
                database: None,
            },
            fields: Vec::new(),
            identity: Vec::new(),
            access: EntityAccess::default(),
            unique_indexes: Vec::new(),
            manage_indexes: None,
        }
    }

    // ======================================================================
    // Builder
    // ======================================================================

    #[must_use]
    pub fn with_field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn with_identity<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.identity = paths
            .into_iter()
            .map(|p| FieldPath::parse(p.as_ref()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_access(mut self, access: EntityAccess) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn with_unique_index<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.unique_indexes.push(
            paths
                .into_iter()
                .map(|p| FieldPath::parse(p.as_ref()))
                .collect(),
        );
        self
    }

    #[must_use]
    pub const fn with_manage_indexes(mut self, manage: Option<bool>) -> Self {
        self.manage_indexes = manage;
        self
    }

    // ======================================================================
    // Lookups
    // ======================================================================

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.datastore.collection
    }

    #[must_use]
    pub fn field(&self, path: &FieldPath) -> Option<&FieldModel> {
        self.fields.iter().find(|f| &f.path == path)
    }

    /// True when the path belongs to the schema: a declared field, a
    /// container of declared fields, anything inside an `Any`/`Array`
    /// field, or a derived array-size field.
    #[must_use]
    pub fn declares(&self, path: &FieldPath) -> bool {
        self.fields.iter().any(|f| {
            &f.path == path
                || path.is_ancestor_of(&f.path)
                || (f.kind.owns_subtree() && f.path.is_ancestor_of(path))
                || (f.kind == FieldKind::Array && &derived::array_size_path(&f.path) == path)
        })
    }

    /// Merge policy of the field at exactly this path.
    #[must_use]
    pub fn merge_policy(&self, path: &FieldPath) -> MergePolicy {
        self.field(path).map(|f| f.merge).unwrap_or_default()
    }

    /// True when some field strictly below `path` is merge-constrained or
    /// the subtree may hold undeclared fields that must survive a merge.
    #[must_use]
    pub fn needs_descent(&self, path: &FieldPath) -> bool {
        match self.field(path) {
            Some(f) if f.kind.owns_subtree() => false,
            Some(f) if f.kind == FieldKind::Object => true,
            Some(_) => self.has_constrained_below(path),
            None => true,
        }
    }

    /// True when some field strictly below `path` is merge-constrained.
    #[must_use]
    pub fn has_constrained_below(&self, path: &FieldPath) -> bool {
        self.fields
            .iter()
            .any(|f| path.is_ancestor_of(&f.path) && f.merge.is_constrained())
    }

    /// Fields flagged for case-insensitive matching.
    pub fn case_insensitive_fields(&self) -> impl Iterator<Item = &FieldModel> {
        self.fields.iter().filter(|f| f.case_insensitive)
    }
}
