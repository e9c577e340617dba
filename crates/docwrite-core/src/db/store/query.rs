use crate::{
    path::FieldPath,
    value::{Document, Value},
};

///
/// Query
///
/// Store-side document filter.
///
/// `Eq` against `Null` matches a null or absent field.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    All,
    Eq { field: FieldPath, value: Value },
    And(Vec<Self>),
    Or(Vec<Self>),
}

impl Query {
    pub fn eq(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => match doc.get_path(field) {
                Some(found) => found == value,
                None => value.is_null(),
            },
            Self::And(items) => items.iter().all(|q| q.matches(doc)),
            Self::Or(items) => items.iter().any(|q| q.matches(doc)),
        }
    }

    /// Number of leaf predicates.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        match self {
            Self::All => 0,
            Self::Eq { .. } => 1,
            Self::And(items) | Self::Or(items) => items.iter().map(Self::predicate_count).sum(),
        }
    }
}
