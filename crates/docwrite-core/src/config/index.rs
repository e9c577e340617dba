use crate::model::EntityModel;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

///
/// IndexManagementCfg
///
/// Decides whether an entity's indexes are managed by the engine or
/// externally. An entity is managed when it is in `managed_entities` (or
/// that set is absent) and not in `unmanaged_entities` (or that set is
/// absent). An explicit `manage_indexes` flag on the entity wins over both.
/// Names match exactly, case-sensitively.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct IndexManagementCfg {
    #[serde(
        alias = "managedEntities",
        deserialize_with = "name_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub managed_entities: Option<BTreeSet<String>>,

    #[serde(
        alias = "unmanagedEntities",
        deserialize_with = "name_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub unmanaged_entities: Option<BTreeSet<String>>,
}

impl IndexManagementCfg {
    #[must_use]
    pub fn with_managed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.managed_entities = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_unmanaged<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unmanaged_entities = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn is_managed(&self, model: &EntityModel) -> bool {
        if let Some(explicit) = model.manage_indexes {
            return explicit;
        }

        self.is_name_managed(&model.name)
    }

    fn is_name_managed(&self, name: &str) -> bool {
        let included = self
            .managed_entities
            .as_ref()
            .is_none_or(|set| set.contains(name));
        let excluded = self
            .unmanaged_entities
            .as_ref()
            .is_some_and(|set| set.contains(name));

        included && !excluded
    }
}

// Null entries and empty names are dropped; a missing list stays `None`.
fn name_set<'de, D>(deserializer: D) -> Result<Option<BTreeSet<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let names = Option::<Vec<Option<String>>>::deserialize(deserializer)?;

    Ok(names.map(|names| {
        names
            .into_iter()
            .flatten()
            .filter(|name| !name.is_empty())
            .collect()
    }))
}
