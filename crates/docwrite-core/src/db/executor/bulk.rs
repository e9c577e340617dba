use crate::db::{
    doc::{DocError, ErrorCode},
    store::{BulkItemError, BulkOp},
};
use std::collections::BTreeMap;
use tracing::warn;

///
/// AttemptList
///
/// Ordered, append-only list of writes submitted in one bulk round trip.
/// Position `i` of the submitted operations belongs to document `docs[i]`;
/// the list offers no way to reorder or remove entries.
///

#[derive(Debug, Default)]
pub struct AttemptList {
    docs: Vec<usize>,
    ops: Vec<BulkOp>,
}

impl AttemptList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            docs: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Append the write for request document `doc`.
    pub fn push(&mut self, doc: usize, op: BulkOp) {
        self.docs.push(doc);
        self.ops.push(op);
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Request document indices in submission order.
    #[must_use]
    pub fn docs(&self) -> &[usize] {
        &self.docs
    }

    /// Split into the document order and the operations to submit.
    #[must_use]
    pub fn into_parts(self) -> (SubmittedList, Vec<BulkOp>) {
        (SubmittedList { docs: self.docs }, self.ops)
    }
}

///
/// SubmittedList
/// Document order of an attempt list whose operations were handed off.
///

#[derive(Debug)]
pub struct SubmittedList {
    docs: Vec<usize>,
}

impl SubmittedList {
    #[must_use]
    pub fn docs(&self) -> &[usize] {
        &self.docs
    }
}

/// Map positional bulk failures back to request documents.
///
/// Failures may arrive in any order. Indices outside the submitted list are
/// logged and ignored; when two failures name the same position the last
/// one wins.
#[must_use]
pub fn correlate(submitted: &SubmittedList, failures: &[BulkItemError]) -> BTreeMap<usize, DocError> {
    let mut out = BTreeMap::new();

    for failure in failures {
        let Some(&doc) = submitted.docs.get(failure.index) else {
            warn!(
                index = failure.index,
                submitted = submitted.docs.len(),
                code = failure.code,
                "bulk failure index outside attempt list"
            );
            continue;
        };

        out.insert(doc, classify(failure));
    }

    out
}

fn classify(failure: &BulkItemError) -> DocError {
    let code = if failure.is_duplicate_key() {
        ErrorCode::DuplicateKey
    } else {
        ErrorCode::GenericWriteError
    };

    DocError::new(code, failure.message.clone())
}

///
/// TESTS
///
