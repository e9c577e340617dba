//! Document constraint validation.
//!
//! Every call returns a fresh [`ValidationReport`]; validators hold no
//! per-document state between calls.


use crate::{
    model::{EntityModel, FieldKind},
    path::FieldPath,
    translate::json_label,
};
use derive_more::Display;
use serde_json::Value as JsonValue;

///
/// ValidationIssue
///

#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("{message}")]
pub struct ValidationIssue {
    pub path: Option<FieldPath>,
    pub message: String,
}

impl ValidationIssue {
    pub fn field(path: &FieldPath, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.clone()),
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }
}

///
/// ValidationReport
///
/// field_errors    : constraint failures tied to a path
/// document_errors : failures of the document as a whole
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationReport {
    pub field_errors: Vec<ValidationIssue>,
    pub document_errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.field_errors.is_empty() && self.document_errors.is_empty()
    }

    /// All issues, document-scoped first.
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.document_errors.iter().chain(&self.field_errors)
    }
}

///
/// ConstraintValidator
///

pub trait ConstraintValidator {
    fn validate(&self, doc: &JsonValue) -> ValidationReport;
}

///
/// SchemaValidator
/// Checks required fields and declared field kinds against the entity model.
///

pub struct SchemaValidator<'a> {
    model: &'a EntityModel,
}

impl<'a> SchemaValidator<'a> {
    #[must_use]
    pub const fn new(model: &'a EntityModel) -> Self {
        Self { model }
    }
}

impl ConstraintValidator for SchemaValidator<'_> {
    fn validate(&self, doc: &JsonValue) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !doc.is_object() {
            report.document_errors.push(ValidationIssue::document(format!(
                "entity '{}' expects a document, found {}",
                self.model.name,
                json_label(doc)
            )));
            return report;
        }

        for field in &self.model.fields {
            match field.path.resolve(doc) {
                None | Some(JsonValue::Null) => {
                    if field.required {
                        report
                            .field_errors
                            .push(ValidationIssue::field(&field.path, "required field is missing"));
                    }
                }
                Some(value) if !json_kind_accepts(field.kind, value) => {
                    report.field_errors.push(ValidationIssue::field(
                        &field.path,
                        format!("expected {}, found {}", field.kind, json_label(value)),
                    ));
                }
                Some(_) => {}
            }
        }

        report
    }
}

fn json_kind_accepts(kind: FieldKind, value: &JsonValue) -> bool {
    match kind {
        FieldKind::Any => true,
        FieldKind::Array => value.is_array(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::Float => value.is_number(),
        FieldKind::Id | FieldKind::Text => value.is_string(),
        FieldKind::Int => value.is_i64(),
        FieldKind::Object => value.is_object(),
    }
}
