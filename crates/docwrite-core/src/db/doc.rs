use crate::{
    merge::MergeConflict, path::FieldPath, translate::TranslationError,
    validate::ValidationIssue,
};
use serde_json::Value as JsonValue;
use std::fmt;

///
/// CrudOperation
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CrudOperation {
    Insert,
    Save,
    Update,
}

impl fmt::Display for CrudOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "insert",
            Self::Save => "save",
            Self::Update => "update",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorCode
/// Classification of document-scoped failures.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    InvalidRequest,
    AccessDenied,
    NoFieldInsertAccess,
    NoFieldUpdateAccess,
    TranslationError,
    MergeConflict,
    DuplicateKey,
    GenericWriteError,
    ValidationError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidRequest => "invalid_request",
            Self::AccessDenied => "access_denied",
            Self::NoFieldInsertAccess => "no_field_insert_access",
            Self::NoFieldUpdateAccess => "no_field_update_access",
            Self::TranslationError => "translation_error",
            Self::MergeConflict => "merge_conflict",
            Self::DuplicateKey => "duplicate_key",
            Self::GenericWriteError => "generic_write_error",
            Self::ValidationError => "validation_error",
        };
        write!(f, "{label}")
    }
}

///
/// DocError
///
/// Structured error attached to one document. Never aborts sibling
/// documents in the same request.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DocError {
    pub code: ErrorCode,
    pub path: Option<FieldPath>,
    pub message: String,
}

impl DocError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            path: None,
            message: message.into(),
        }
    }

    pub fn at(code: ErrorCode, path: FieldPath, message: impl Into<String>) -> Self {
        Self {
            code,
            path: Some(path),
            message: message.into(),
        }
    }
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} at '{path}': {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl From<TranslationError> for DocError {
    fn from(err: TranslationError) -> Self {
        Self::new(ErrorCode::TranslationError, err.to_string())
    }
}

impl From<MergeConflict> for DocError {
    fn from(err: MergeConflict) -> Self {
        Self::at(ErrorCode::MergeConflict, err.path().clone(), err.to_string())
    }
}

impl From<&ValidationIssue> for DocError {
    fn from(issue: &ValidationIssue) -> Self {
        Self {
            code: ErrorCode::ValidationError,
            path: issue.path.clone(),
            message: issue.message.clone(),
        }
    }
}

///
/// DocCtx
///
/// One document of a request.
///
/// input     : the document as the client submitted it (or as first read)
/// document  : the working copy; after a write, the written form
/// original  : the stored version an update started from
/// errors    : document-scoped failures
/// output    : projection handed back to the caller
/// performed : the write actually issued, if any
///

#[derive(Clone, Debug, PartialEq)]
pub struct DocCtx {
    input: JsonValue,
    document: JsonValue,
    original: Option<JsonValue>,
    errors: Vec<DocError>,
    output: Option<JsonValue>,
    performed: Option<CrudOperation>,
}

impl DocCtx {
    #[must_use]
    pub fn new(input: JsonValue) -> Self {
        Self {
            document: input.clone(),
            input,
            original: None,
            errors: Vec::new(),
            output: None,
            performed: None,
        }
    }

    #[must_use]
    pub const fn input(&self) -> &JsonValue {
        &self.input
    }

    #[must_use]
    pub const fn document(&self) -> &JsonValue {
        &self.document
    }

    pub const fn document_mut(&mut self) -> &mut JsonValue {
        &mut self.document
    }

    pub fn set_document(&mut self, document: JsonValue) {
        self.document = document;
    }

    #[must_use]
    pub const fn original(&self) -> Option<&JsonValue> {
        self.original.as_ref()
    }

    pub fn set_original(&mut self, original: JsonValue) {
        self.original = Some(original);
    }

    #[must_use]
    pub fn errors(&self) -> &[DocError] {
        &self.errors
    }

    #[must_use]
    pub const fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: DocError) {
        self.errors.push(error);
    }

    #[must_use]
    pub const fn output(&self) -> Option<&JsonValue> {
        self.output.as_ref()
    }

    pub fn set_output(&mut self, output: JsonValue) {
        self.output = Some(output);
    }

    #[must_use]
    pub const fn performed(&self) -> Option<CrudOperation> {
        self.performed
    }

    pub const fn set_performed(&mut self, op: CrudOperation) {
        self.performed = Some(op);
    }
}
