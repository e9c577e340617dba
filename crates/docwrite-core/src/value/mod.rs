#[cfg(test)]
mod tests;

use crate::path::FieldPath;
use derive_more::{Deref, IntoIterator};
use std::collections::BTreeMap;
use ulid::Ulid;

///
/// Value
/// Storage-native field value.
///
/// Null     → field present with no value (distinct from an absent field).
/// Id       → store-assigned identity; rendered as ULID text on the wire.
/// Document → nested field tree.
///

#[derive(Clone, Debug, PartialEq)]
#[remain::sorted]
pub enum Value {
    Bool(bool),
    Document(Document),
    Float(f64),
    Id(Ulid),
    Int(i64),
    List(Vec<Self>),
    Null,
    Text(String),
}

///
/// ValueShape
/// Structural class of a value, used by the merger to detect conflicts.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueShape {
    Document,
    List,
    Null,
    Scalar,
}

impl Value {
    #[must_use]
    pub const fn shape(&self) -> ValueShape {
        match self {
            Self::Document(_) => ValueShape::Document,
            Self::List(_) => ValueShape::List,
            Self::Null => ValueShape::Null,
            Self::Bool(_) | Self::Float(_) | Self::Id(_) | Self::Int(_) | Self::Text(_) => {
                ValueShape::Scalar
            }
        }
    }

    /// Stable lowercase label used in error messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Document(_) => "document",
            Self::Float(_) => "float",
            Self::Id(_) => "id",
            Self::Int(_) => "int",
            Self::List(_) => "list",
            Self::Null => "null",
            Self::Text(_) => "text",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<Self>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    // Step one segment down into a document field or list element.
    fn child(&self, segment: &str) -> Option<&Self> {
        match self {
            Self::Document(doc) => doc.get(segment),
            Self::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    fn child_mut(&mut self, segment: &str) -> Option<&mut Self> {
        match self {
            Self::Document(doc) => doc.0.get_mut(segment),
            Self::List(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(move |i| items.get_mut(i)),
            _ => None,
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Document(doc)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Ulid> for Value {
    fn from(id: Ulid) -> Self {
        Self::Id(id)
    }
}

///
/// Document
/// Storage-native document: an ordered map from field name to value.
///
/// Field order is canonical (sorted by name) so two documents with the
/// same fields compare and render identically.
///

#[derive(Clone, Debug, Default, Deref, IntoIterator, PartialEq)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.0.get_mut(field)
    }

    /// Resolve a logical path; numeric segments index into lists.
    #[must_use]
    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut current = self.0.get(first.as_str())?;

        for segment in segments {
            current = current.child(segment)?;
        }

        Some(current)
    }

    /// Set a value at a logical path, creating intermediate documents.
    ///
    /// Returns `false` when an intermediate segment exists and is not a
    /// document.
    pub fn set_path(&mut self, path: &FieldPath, value: Value) -> bool {
        let Some((last, parents)) = path.segments().split_last() else {
            return false;
        };

        let mut map = &mut self.0;
        for segment in parents {
            let slot = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Document(Self::new()));
            match slot {
                Value::Document(doc) => map = &mut doc.0,
                _ => return false,
            }
        }
        map.insert(last.clone(), value);

        true
    }

    /// Remove the value at a logical path, if present.
    pub fn remove_path(&mut self, path: &FieldPath) -> Option<Value> {
        let (last, parents) = path.segments().split_last()?;
        let Some((first, rest)) = parents.split_first() else {
            return self.0.remove(last.as_str());
        };

        let mut current = self.0.get_mut(first.as_str())?;
        for segment in rest {
            current = current.child_mut(segment)?;
        }

        match current {
            Value::Document(doc) => doc.0.remove(last.as_str()),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
