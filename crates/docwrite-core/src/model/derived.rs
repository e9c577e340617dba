//! Derived fields maintained by the engine rather than the client.
//!
//! Every `Array` field `p` carries a sibling `p#` holding the element count.

use crate::{
    model::{EntityModel, FieldKind},
    path::FieldPath,
    value::{Document, Value},
};
use serde_json::Value as JsonValue;

pub const ARRAY_SIZE_SUFFIX: char = '#';

/// Path of the size field for the array at `path`.
#[must_use]
pub fn array_size_path(path: &FieldPath) -> FieldPath {
    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        return FieldPath::root();
    };

    parents
        .iter()
        .fold(FieldPath::root(), |acc, s| acc.child(s.as_str()))
        .child(format!("{last}{ARRAY_SIZE_SUFFIX}"))
}

/// Recompute every array-size field on a wire document.
///
/// Size fields of absent arrays are removed. Returns `true` when any size
/// field changed.
pub fn update_array_sizes(model: &EntityModel, doc: &mut JsonValue) -> bool {
    let mut changed = false;

    for field in model.fields.iter().filter(|f| f.kind == FieldKind::Array) {
        let size_path = array_size_path(&field.path);
        let current = size_path.resolve(doc).cloned();
        let expected = field
            .path
            .resolve(doc)
            .and_then(JsonValue::as_array)
            .map(|items| JsonValue::from(items.len()));

        if current == expected {
            continue;
        }
        changed = true;

        match expected {
            Some(size) => {
                size_path.assign(doc, size);
            }
            None => remove(doc, &size_path),
        }
    }

    changed
}

/// Storage-side counterpart of [`update_array_sizes`], applied after a merge
/// has changed list contents.
pub fn refresh_array_sizes(model: &EntityModel, doc: &mut Document) {
    for field in model.fields.iter().filter(|f| f.kind == FieldKind::Array) {
        let size_path = array_size_path(&field.path);
        let expected = doc
            .get_path(&field.path)
            .and_then(Value::as_list)
            .map(|items| Value::Int(i64::try_from(items.len()).unwrap_or(i64::MAX)));

        match expected {
            Some(size) => {
                doc.set_path(&size_path, size);
            }
            None => {
                doc.remove_path(&size_path);
            }
        }
    }
}

fn remove(doc: &mut JsonValue, path: &FieldPath) {
    let Some((last, parents)) = path.segments().split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        match current.get_mut(segment.as_str()) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let JsonValue::Object(map) = current {
        map.remove(last.as_str());
    }
}
