use crate::path::FieldPath;
use serde_json::Value as JsonValue;

///
/// UpdateTransform
///
/// Mutates one working document in wire form. Returns `true` when the
/// document changed; unchanged documents are neither written nor counted.
///

pub trait UpdateTransform {
    fn apply(&self, doc: &mut JsonValue) -> bool;
}

impl<F> UpdateTransform for F
where
    F: Fn(&mut JsonValue) -> bool,
{
    fn apply(&self, doc: &mut JsonValue) -> bool {
        self(doc)
    }
}

///
/// SetFields
/// Assigns fixed values; a field already holding its value is no change.
///

#[derive(Clone, Debug, Default)]
pub struct SetFields {
    assignments: Vec<(FieldPath, JsonValue)>,
}

impl SetFields {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            assignments: Vec::new(),
        }
    }

    #[must_use]
    pub fn set(mut self, path: impl Into<FieldPath>, value: impl Into<JsonValue>) -> Self {
        self.assignments.push((path.into(), value.into()));
        self
    }
}

impl UpdateTransform for SetFields {
    fn apply(&self, doc: &mut JsonValue) -> bool {
        let mut changed = false;

        for (path, value) in &self.assignments {
            if path.resolve(doc) == Some(value) {
                continue;
            }
            changed |= path.assign(doc, value.clone());
        }

        changed
    }
}
