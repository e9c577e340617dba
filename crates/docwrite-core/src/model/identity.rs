use crate::{model::EntityModel, path::FieldPath};

/// Identity field assumed when an entity declares none.
pub const ID_FIELD: &str = "_id";

///
/// EntityIdentity
///
/// Ordered identity fields of an entity, resolved once per save call.
/// `paths[i]` and `storage_fields[i]` describe the same field.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntityIdentity {
    paths: Vec<FieldPath>,
    storage_fields: Vec<String>,
}

impl EntityIdentity {
    #[must_use]
    pub fn resolve(model: &EntityModel) -> Self {
        let paths = if model.identity.is_empty() {
            vec![FieldPath::parse(ID_FIELD)]
        } else {
            model.identity.clone()
        };
        let storage_fields = paths.iter().map(FieldPath::to_string).collect();

        Self {
            paths,
            storage_fields,
        }
    }

    #[must_use]
    pub fn paths(&self) -> &[FieldPath] {
        &self.paths
    }

    #[must_use]
    pub fn storage_fields(&self) -> &[String] {
        &self.storage_fields
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
