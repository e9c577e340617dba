//! Engine configuration.
//!
//! Loaded from a TOML file or from a JSON options document. Keys are
//! snake_case; the camelCase spellings of JSON options are accepted too.

mod index;
mod parser;


pub use index::IndexManagementCfg;
pub use parser::{DataStoreParser, DocumentDataStoreParser, ParserFactory, ParserRegistry, parse_entity};

use crate::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error as ThisError;

/// Largest number of documents one update-by-query call may visit.
pub const DEFAULT_MAX_RESULT_SET_SIZE: usize = 10_000;

/// Metadata parser used when none is configured.
pub const DEFAULT_METADATA_PARSER: &str = "document";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("batch size must be a positive integer")]
    InvalidBatchSize,

    #[error("max result set size must be a positive integer")]
    InvalidMaxResultSetSize,

    #[error("unknown metadata parser '{0}'")]
    UnknownParser(String),

    #[error("invalid datastore metadata: {0}")]
    InvalidDataStore(String),

    #[error("invalid entity metadata: {0}")]
    InvalidEntity(String),

    #[error("failed to parse toml config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse json config: {0}")]
    Json(#[from] serde_json::Error),
}

///
/// WriteConcern
/// Acknowledgement level requested for single-document writes.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteConcern {
    Acknowledged,
    Unacknowledged,
    Journaled,
    Majority,
    Fsynced,
}

impl fmt::Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Acknowledged => "acknowledged",
            Self::Unacknowledged => "unacknowledged",
            Self::Journaled => "journaled",
            Self::Majority => "majority",
            Self::Fsynced => "fsynced",
        };
        write!(f, "{label}")
    }
}

///
/// EngineConfig
///
/// batch_size          : documents per lookup/bulk-write round trip
/// write_concern       : `None` defers to the store default
/// max_result_set_size : cap on documents visited by one update-by-query
/// database            : database the entity collections live in
/// metadata_parser     : registry key of the datastore metadata parser
/// index_management    : which entities get their indexes managed here
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(alias = "batchSize")]
    pub batch_size: usize,

    #[serde(alias = "writeConcern", skip_serializing_if = "Option::is_none")]
    pub write_concern: Option<WriteConcern>,

    #[serde(alias = "maxResultSetSize")]
    pub max_result_set_size: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(alias = "metadataDataStoreParser")]
    pub metadata_parser: String,

    #[serde(alias = "indexManagement")]
    pub index_management: IndexManagementCfg,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(source)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Parse and validate a JSON options document.
    pub fn from_json(options: &JsonValue) -> Result<Self, ConfigError> {
        let cfg = Self::deserialize(options)?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.max_result_set_size == 0 {
            return Err(ConfigError::InvalidMaxResultSetSize);
        }

        Ok(())
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_write_concern(mut self, write_concern: Option<WriteConcern>) -> Self {
        self.write_concern = write_concern;
        self
    }

    #[must_use]
    pub const fn with_max_result_set_size(mut self, size: usize) -> Self {
        self.max_result_set_size = size;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            write_concern: None,
            max_result_set_size: DEFAULT_MAX_RESULT_SET_SIZE,
            database: None,
            metadata_parser: DEFAULT_METADATA_PARSER.to_string(),
            index_management: IndexManagementCfg::default(),
        }
    }
}
