use crate::{
    access::Caller,
    db::doc::{CrudOperation, DocCtx, DocError},
};
use serde_json::Value as JsonValue;

///
/// OpContext
///
/// Per-request state shared by the executors and visible to interceptors:
/// the caller, the documents with their errors, and request-level errors.
///

#[derive(Clone, Debug)]
pub struct OpContext {
    entity: String,
    operation: CrudOperation,
    caller: Caller,
    documents: Vec<DocCtx>,
    errors: Vec<DocError>,
}

impl OpContext {
    pub fn new(
        entity: impl Into<String>,
        operation: CrudOperation,
        caller: Caller,
        documents: impl IntoIterator<Item = JsonValue>,
    ) -> Self {
        Self {
            entity: entity.into(),
            operation,
            caller,
            documents: documents.into_iter().map(DocCtx::new).collect(),
            errors: Vec::new(),
        }
    }

    /// Context for an update-by-query; documents arrive from the cursor.
    pub fn for_update(entity: impl Into<String>, caller: Caller) -> Self {
        Self::new(entity, CrudOperation::Update, caller, [])
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub const fn operation(&self) -> CrudOperation {
        self.operation
    }

    #[must_use]
    pub const fn caller(&self) -> &Caller {
        &self.caller
    }

    #[must_use]
    pub fn documents(&self) -> &[DocCtx] {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut [DocCtx] {
        &mut self.documents
    }

    #[must_use]
    pub fn document(&self, index: usize) -> Option<&DocCtx> {
        self.documents.get(index)
    }

    pub fn document_mut(&mut self, index: usize) -> Option<&mut DocCtx> {
        self.documents.get_mut(index)
    }

    /// Attach an error to document `index`.
    pub fn fail_document(&mut self, index: usize, error: DocError) {
        if let Some(doc) = self.documents.get_mut(index) {
            doc.add_error(error);
        }
    }

    /// Append a document and return its index.
    pub fn push_document(&mut self, doc: DocCtx) -> usize {
        self.documents.push(doc);
        self.documents.len() - 1
    }

    #[must_use]
    pub fn into_documents(self) -> Vec<DocCtx> {
        self.documents
    }

    #[must_use]
    pub fn errors(&self) -> &[DocError] {
        &self.errors
    }

    pub fn add_error(&mut self, error: DocError) {
        self.errors.push(error);
    }

    /// True when neither the request nor any document carries an error.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.documents.iter().all(|d| !d.has_errors())
    }
}
