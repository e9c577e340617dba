use crate::{
    config::ConfigError,
    model::{DataStoreInfo, EntityAccess, EntityModel, FieldModel},
    path::FieldPath,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;

///
/// DataStoreParser
/// Reads and writes the `datastore` block of entity metadata.
///

pub trait DataStoreParser {
    /// Backend name this parser understands.
    fn backend(&self) -> &'static str;

    fn parse(&self, node: &JsonValue) -> Result<DataStoreInfo, ConfigError>;

    fn format(&self, info: &DataStoreInfo) -> JsonValue;
}

///
/// DocumentDataStoreParser
/// Built-in parser: `{ "backend": "document", "collection": .., "database": .. }`.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentDataStoreParser;

impl DataStoreParser for DocumentDataStoreParser {
    fn backend(&self) -> &'static str {
        "document"
    }

    fn parse(&self, node: &JsonValue) -> Result<DataStoreInfo, ConfigError> {
        let collection = node
            .get("collection")
            .and_then(JsonValue::as_str)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConfigError::InvalidDataStore("missing 'collection'".to_string()))?;
        let database = node
            .get("database")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        Ok(DataStoreInfo {
            backend: self.backend().to_string(),
            collection: collection.to_string(),
            database,
        })
    }

    fn format(&self, info: &DataStoreInfo) -> JsonValue {
        let mut node = json!({
            "backend": self.backend(),
            "collection": info.collection,
        });
        if let (Some(database), Some(map)) = (&info.database, node.as_object_mut()) {
            map.insert("database".to_string(), JsonValue::from(database.as_str()));
        }

        node
    }
}

/// Constructor registered under a configuration key.
pub type ParserFactory = fn() -> Box<dyn DataStoreParser>;

fn document_parser() -> Box<dyn DataStoreParser> {
    Box::new(DocumentDataStoreParser)
}

///
/// ParserRegistry
///
/// Maps configuration keys to statically known parser factories. Keys are
/// resolved once at startup.
///

#[derive(Clone, Debug)]
pub struct ParserRegistry {
    factories: BTreeMap<String, ParserFactory>,
}

impl ParserRegistry {
    /// Registry with the built-in parsers.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            factories: BTreeMap::new(),
        };
        registry.register(super::DEFAULT_METADATA_PARSER, document_parser);

        registry
    }

    /// Register (or replace) a factory.
    pub fn register(&mut self, key: impl Into<String>, factory: ParserFactory) {
        self.factories.insert(key.into(), factory);
    }

    pub fn resolve(&self, key: &str) -> Result<Box<dyn DataStoreParser>, ConfigError> {
        self.factories
            .get(key)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownParser(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

///
/// EntityDef
/// Wire form of entity metadata.
///

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityDef {
    name: String,
    datastore: JsonValue,
    #[serde(default)]
    fields: Vec<FieldModel>,
    #[serde(default)]
    identity: Vec<FieldPath>,
    #[serde(default)]
    access: EntityAccess,
    #[serde(default)]
    unique_indexes: Vec<Vec<FieldPath>>,
    #[serde(default)]
    manage_indexes: Option<bool>,
}

/// Build an entity model from its JSON metadata.
pub fn parse_entity(
    parser: &dyn DataStoreParser,
    node: &JsonValue,
) -> Result<EntityModel, ConfigError> {
    let def = EntityDef::deserialize(node).map_err(|e| ConfigError::InvalidEntity(e.to_string()))?;
    if def.name.is_empty() {
        return Err(ConfigError::InvalidEntity("empty entity name".to_string()));
    }
    let datastore = parser.parse(&def.datastore)?;

    Ok(EntityModel {
        name: def.name,
        datastore,
        fields: def.fields,
        identity: def.identity,
        access: def.access,
        unique_indexes: def.unique_indexes,
        manage_indexes: def.manage_indexes,
    })
}
