//! Field-policy-aware merge of a stored document with a client document.


use crate::{
    model::{EntityModel, MergePolicy},
    path::FieldPath,
    value::{Document, Value, ValueShape},
};
use thiserror::Error as ThisError;

///
/// MergeConflict
/// The stored and modified documents cannot be reconciled at `path`.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MergeConflict {
    #[error("shape mismatch at '{path}': stored {stored}, modified {modified}")]
    ShapeMismatch {
        path: FieldPath,
        stored: &'static str,
        modified: &'static str,
    },

    #[error("append-only field '{path}' must hold a list, found {found}")]
    NotAppendable { path: FieldPath, found: &'static str },
}

impl MergeConflict {
    #[must_use]
    pub const fn path(&self) -> &FieldPath {
        match self {
            Self::ShapeMismatch { path, .. } | Self::NotAppendable { path, .. } => path,
        }
    }
}

///
/// DocumentMerger
///
/// Combines the stored and the client-modified document into a fresh one.
///
/// - fields the model does not declare are carried over from `stored`
/// - `Preserve` fields keep the stored value
/// - `AppendOnly` lists keep stored elements and append unseen new ones
/// - `Overwrite` fields take the modified value, descending into documents
///   that may hold constrained or undeclared children
///
/// Neither input is mutated.
///

#[derive(Clone, Copy, Debug)]
pub struct DocumentMerger<'a> {
    model: &'a EntityModel,
}

impl<'a> DocumentMerger<'a> {
    #[must_use]
    pub const fn new(model: &'a EntityModel) -> Self {
        Self { model }
    }

    pub fn merge(&self, stored: &Document, modified: &Document) -> Result<Document, MergeConflict> {
        self.merge_document(&FieldPath::root(), stored, modified)
    }

    fn merge_document(
        &self,
        path: &FieldPath,
        stored: &Document,
        modified: &Document,
    ) -> Result<Document, MergeConflict> {
        let mut merged = Document::new();

        for (name, value) in modified.iter() {
            let child = path.child(name.as_str());
            let value = self.merge_value(&child, stored.get(name), value)?;
            merged.insert(name.as_str(), value);
        }

        for (name, value) in stored.iter().filter(|(k, _)| !modified.contains_key(*k)) {
            let child = path.child(name.as_str());
            if let Some(kept) = self.carry_over(&child, value)? {
                merged.insert(name.as_str(), kept);
            }
        }

        Ok(merged)
    }

    fn merge_value(
        &self,
        path: &FieldPath,
        stored: Option<&Value>,
        modified: &Value,
    ) -> Result<Value, MergeConflict> {
        let stored = stored.filter(|v| !v.is_null());

        match self.model.merge_policy(path) {
            MergePolicy::Preserve => match stored {
                Some(s) if !modified.is_null() && s.shape() != modified.shape() => {
                    Err(shape_mismatch(path, s, modified))
                }
                Some(s) => Ok(s.clone()),
                None => Ok(modified.clone()),
            },

            MergePolicy::AppendOnly => match (stored, modified) {
                (Some(Value::List(old)), Value::List(new)) => {
                    let mut items = old.clone();
                    items.extend(new.iter().filter(|item| !old.contains(item)).cloned());
                    Ok(Value::List(items))
                }
                (Some(s), Value::Null) => Ok(s.clone()),
                (Some(s), m) if s == m => Ok(s.clone()),
                (Some(s), _) if s.shape() != ValueShape::List => Err(MergeConflict::NotAppendable {
                    path: path.clone(),
                    found: s.label(),
                }),
                (None, Value::List(_) | Value::Null) => Ok(modified.clone()),
                (_, m) => Err(MergeConflict::NotAppendable {
                    path: path.clone(),
                    found: m.label(),
                }),
            },

            MergePolicy::Overwrite => match (stored, modified) {
                (Some(Value::Document(old)), Value::Document(new))
                    if self.model.needs_descent(path) =>
                {
                    Ok(Value::Document(self.merge_document(path, old, new)?))
                }
                (Some(s), m)
                    if !m.is_null()
                        && s.shape() != m.shape()
                        && self.model.has_constrained_below(path) =>
                {
                    Err(shape_mismatch(path, s, m))
                }
                _ => Ok(modified.clone()),
            },
        }
    }

    // A stored field the client left out.
    fn carry_over(&self, path: &FieldPath, stored: &Value) -> Result<Option<Value>, MergeConflict> {
        if !self.model.declares(path) || self.model.merge_policy(path).is_constrained() {
            return Ok(Some(stored.clone()));
        }

        match stored {
            Value::Document(old) if self.model.needs_descent(path) => {
                let kept = self.merge_document(path, old, &Document::new())?;
                Ok((!kept.is_empty()).then_some(Value::Document(kept)))
            }
            _ => Ok(None),
        }
    }
}

fn shape_mismatch(path: &FieldPath, stored: &Value, modified: &Value) -> MergeConflict {
    MergeConflict::ShapeMismatch {
        path: path.clone(),
        stored: stored.label(),
        modified: modified.label(),
    }
}
