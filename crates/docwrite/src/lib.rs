//! ## Crate layout
//! - `core`: document values, entity models, executors, the store contract
//!   and the in-memory store.
//! - `error`: the public error taxonomy.
//!
//! The `prelude` module carries the vocabulary needed to build requests
//! against a [`DbSession`](core::db::DbSession).

pub use docwrite_core as core;

pub mod error;

pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        access::Caller,
        config::{EngineConfig, WriteConcern},
        db::{
            CrudOperation, DbSession, OpContext, WriteOutcome,
            executor::SetFields,
            projection::FieldProjector,
            store::{MemoryStore, Query},
        },
        model::{EntityModel, FieldKind, FieldModel, MergePolicy},
        value::{Document, Value},
    };
    pub use crate::error::Error;
}
