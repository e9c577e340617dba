//! Wire (JSON) ⇄ storage document translation.

#[cfg(test)]
mod tests;

use crate::{
    model::{EntityModel, FieldKind, ID_FIELD},
    path::FieldPath,
    value::{Document, Value},
};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use thiserror::Error as ThisError;
use ulid::Ulid;

/// Top-level storage field holding store-managed hidden values.
pub const HIDDEN_FIELD: &str = "@hidden";

///
/// TranslationError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum TranslationError {
    #[error("document root must be an object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("field '{path}' expects {expected}, found {found}")]
    KindMismatch {
        path: FieldPath,
        expected: FieldKind,
        found: &'static str,
    },

    #[error("number at '{path}' does not fit a signed 64-bit integer")]
    NumberOutOfRange { path: FieldPath },
}

///
/// Translator
///
/// Bidirectional mapping between the wire form and the storage form, plus
/// the storage-side helpers the executors need.
///

pub trait Translator {
    fn to_storage(&self, model: &EntityModel, doc: &JsonValue)
    -> Result<Document, TranslationError>;

    fn to_json(&self, doc: &Document) -> JsonValue;

    fn field_value<'d>(&self, doc: &'d Document, path: &FieldPath) -> Option<&'d Value> {
        doc.get_path(path)
    }

    fn populate_hidden_fields(
        &self,
        model: &EntityModel,
        doc: &mut Document,
    ) -> Result<(), TranslationError>;
}

///
/// JsonTranslator
///
/// Kind-aware translator. Declared field kinds are enforced on the way in;
/// `_id` text that parses as a ULID becomes a native id.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonTranslator;

impl JsonTranslator {
    fn convert(
        model: &EntityModel,
        path: &FieldPath,
        json: &JsonValue,
    ) -> Result<Value, TranslationError> {
        let kind = model.field(path).map(|f| f.kind);
        let value = match json {
            JsonValue::Null => return Ok(Value::Null),
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Self::convert_number(path, kind, n)?,
            JsonValue::String(s) => Self::convert_text(path, kind, s)?,
            JsonValue::Array(items) => Value::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::convert(model, &path.child(i.to_string()), item))
                    .collect::<Result<_, _>>()?,
            ),
            JsonValue::Object(map) => Value::Document(Self::convert_object(model, path, map)?),
        };

        match kind {
            Some(kind) if !kind_accepts(kind, &value) => Err(TranslationError::KindMismatch {
                path: path.clone(),
                expected: kind,
                found: value.label(),
            }),
            _ => Ok(value),
        }
    }

    fn convert_object(
        model: &EntityModel,
        path: &FieldPath,
        map: &JsonMap<String, JsonValue>,
    ) -> Result<Document, TranslationError> {
        map.iter()
            .map(|(name, item)| {
                Self::convert(model, &path.child(name.as_str()), item)
                    .map(|value| (name.clone(), value))
            })
            .collect()
    }

    #[expect(clippy::cast_precision_loss)]
    fn convert_number(
        path: &FieldPath,
        kind: Option<FieldKind>,
        n: &Number,
    ) -> Result<Value, TranslationError> {
        if let Some(i) = n.as_i64() {
            return Ok(match kind {
                Some(FieldKind::Float) => Value::Float(i as f64),
                _ => Value::Int(i),
            });
        }
        if n.is_u64() {
            return Err(TranslationError::NumberOutOfRange { path: path.clone() });
        }

        Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN)))
    }

    fn convert_text(
        path: &FieldPath,
        kind: Option<FieldKind>,
        s: &str,
    ) -> Result<Value, TranslationError> {
        let wants_id = kind == Some(FieldKind::Id) || (kind.is_none() && is_id_path(path));
        if wants_id && let Ok(id) = Ulid::from_string(s) {
            return Ok(Value::Id(id));
        }

        Ok(Value::Text(s.to_string()))
    }

    fn to_json_value(value: &Value) -> JsonValue {
        match value {
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Document(doc) => JsonValue::Object(
                doc.iter()
                    .map(|(k, v)| (k.clone(), Self::to_json_value(v)))
                    .collect(),
            ),
            Value::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
            Value::Id(id) => JsonValue::String(id.to_string()),
            Value::Int(i) => JsonValue::from(*i),
            Value::List(items) => JsonValue::Array(items.iter().map(Self::to_json_value).collect()),
            Value::Null => JsonValue::Null,
            Value::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

impl Translator for JsonTranslator {
    fn to_storage(
        &self,
        model: &EntityModel,
        doc: &JsonValue,
    ) -> Result<Document, TranslationError> {
        match doc {
            JsonValue::Object(map) => Self::convert_object(model, &FieldPath::root(), map),
            other => Err(TranslationError::NotAnObject {
                found: json_label(other),
            }),
        }
    }

    fn to_json(&self, doc: &Document) -> JsonValue {
        JsonValue::Object(
            doc.iter()
                .filter(|(k, _)| k.as_str() != HIDDEN_FIELD)
                .map(|(k, v)| (k.clone(), Self::to_json_value(v)))
                .collect(),
        )
    }

    fn populate_hidden_fields(
        &self,
        model: &EntityModel,
        doc: &mut Document,
    ) -> Result<(), TranslationError> {
        let mut fields = model.case_insensitive_fields().peekable();
        if fields.peek().is_none() {
            return Ok(());
        }

        let mut hidden = Document::new();
        for field in fields {
            match doc.get_path(&field.path) {
                None | Some(Value::Null) => {}
                Some(Value::Text(s)) => {
                    hidden.set_path(&field.path, Value::Text(s.to_lowercase()));
                }
                Some(other) => {
                    return Err(TranslationError::KindMismatch {
                        path: field.path.clone(),
                        expected: FieldKind::Text,
                        found: other.label(),
                    });
                }
            }
        }

        doc.insert(HIDDEN_FIELD, hidden);

        Ok(())
    }
}

fn is_id_path(path: &FieldPath) -> bool {
    path.len() == 1 && path.last() == Some(ID_FIELD)
}

const fn kind_accepts(kind: FieldKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (FieldKind::Any, _)
            | (_, Value::Null)
            | (FieldKind::Array, Value::List(_))
            | (FieldKind::Bool, Value::Bool(_))
            | (FieldKind::Float, Value::Float(_) | Value::Int(_))
            | (FieldKind::Id, Value::Id(_))
            | (FieldKind::Int, Value::Int(_))
            | (FieldKind::Object, Value::Document(_))
            | (FieldKind::Text, Value::Text(_))
    )
}

pub(crate) const fn json_label(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "text",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "document",
    }
}
