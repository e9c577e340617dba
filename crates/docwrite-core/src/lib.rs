//! Core runtime for docwrite: document values, entity models, the batched
//! save and query-driven update executors, and the store contract they run
//! against.

// public exports are one module level down
pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod intercept;
pub mod merge;
pub mod model;
pub mod obs;
pub mod path;
pub mod translate;
pub mod validate;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Documents per identity lookup and bulk write in a save call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

///
/// Prelude
///
/// Domain vocabulary only. Executors, stores and errors stay in their
/// modules.
///

pub mod prelude {
    pub use crate::{
        access::Caller,
        db::{CrudOperation, OpContext},
        model::{EntityModel, FieldKind, FieldModel, MergePolicy},
        path::FieldPath,
        value::{Document, Value},
    };
}
