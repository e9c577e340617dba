//! Output shaping for documents returned by update-by-query.

use crate::{db::doc::DocCtx, model::EntityIdentity, path::FieldPath};
use serde_json::{Map as JsonMap, Value as JsonValue};

///
/// Projector
///

pub trait Projector {
    fn project(&self, doc: &DocCtx) -> JsonValue;
}

///
/// FieldProjector
/// Keeps the listed paths; an empty list keeps the whole document.
///

#[derive(Clone, Debug, Default)]
pub struct FieldProjector {
    paths: Vec<FieldPath>,
}

impl FieldProjector {
    #[must_use]
    pub const fn all() -> Self {
        Self { paths: Vec::new() }
    }

    pub fn of<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| FieldPath::parse(p.as_ref()))
                .collect(),
        }
    }
}

impl Projector for FieldProjector {
    fn project(&self, doc: &DocCtx) -> JsonValue {
        if self.paths.is_empty() {
            return doc.document().clone();
        }

        project_paths(doc.document(), &self.paths)
    }
}

///
/// ErrorProjector
/// Identity fields only; what a caller needs to find a failed document.
///

#[derive(Clone, Debug)]
pub struct ErrorProjector {
    paths: Vec<FieldPath>,
}

impl ErrorProjector {
    #[must_use]
    pub fn new(identity: &EntityIdentity) -> Self {
        Self {
            paths: identity.paths().to_vec(),
        }
    }
}

impl Projector for ErrorProjector {
    fn project(&self, doc: &DocCtx) -> JsonValue {
        let source = doc.original().unwrap_or_else(|| doc.input());

        project_paths(source, &self.paths)
    }
}

fn project_paths(source: &JsonValue, paths: &[FieldPath]) -> JsonValue {
    let mut out = JsonValue::Object(JsonMap::new());
    for path in paths {
        if let Some(value) = path.resolve(source) {
            path.assign(&mut out, value.clone());
        }
    }

    out
}
