//! Store client contract consumed by the executors.

mod cursor;
mod memory;
mod query;


pub use cursor::CursorGuard;
pub use memory::{MemoryStore, StoreStats};
pub use query::Query;

use crate::{
    config::WriteConcern,
    error::InternalError,
    path::FieldPath,
    value::{Document, Value},
};

/// Store error codes reported for unique-constraint violations.
pub const DUPLICATE_KEY_CODES: [i32; 2] = [11000, 11001];

///
/// DocumentStore
///
/// Synchronous client of a document store. Connection-level timeouts and
/// retries belong to the implementation.
///

pub trait DocumentStore {
    /// Open a cursor over the documents of `collection` matching `query`.
    fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Box<dyn DocumentCursor + '_>, InternalError>;

    /// Submit an unordered bulk write in one round trip.
    ///
    /// Item failures come back in the report; `Err` means the whole
    /// operation failed (transport).
    fn bulk_write(
        &self,
        collection: &str,
        ops: Vec<BulkOp>,
    ) -> Result<BulkWriteReport, InternalError>;

    /// Upsert one document by `_id`.
    fn save(
        &self,
        collection: &str,
        doc: Document,
        concern: Option<WriteConcern>,
    ) -> Result<WriteAck, InternalError>;

    /// Create a unique index over `fields` if it does not exist.
    fn ensure_unique_index(&self, collection: &str, fields: &[FieldPath])
    -> Result<(), InternalError>;
}

///
/// DocumentCursor
///

pub trait DocumentCursor {
    fn next_document(&mut self) -> Result<Option<Document>, InternalError>;

    fn close(&mut self);
}

///
/// BulkOp
///

#[derive(Clone, Debug, PartialEq)]
pub enum BulkOp {
    Insert(Document),
    Replace { id: Value, document: Document },
}

///
/// BulkItemError
/// Failure of one item, addressed by its position in the submitted list.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BulkItemError {
    pub index: usize,
    pub code: i32,
    pub message: String,
}

impl BulkItemError {
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        DUPLICATE_KEY_CODES.contains(&self.code)
    }
}

///
/// BulkWriteReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BulkWriteReport {
    pub attempted: usize,
    pub inserted: usize,
    pub matched: usize,
    pub errors: Vec<BulkItemError>,
}

///
/// WriteAck
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteAck {
    pub upserted: bool,
    pub concern: Option<WriteConcern>,
}
