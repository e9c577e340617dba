//! Fixtures shared by executor and session tests.

use crate::{
    access::Caller,
    db::{context::OpContext, doc::DocCtx, store::MemoryStore},
    intercept::{InterceptPoint, Interceptor},
    model::{EntityModel, FieldKind, FieldModel, MergePolicy},
    translate::{JsonTranslator, Translator},
    value::Value,
};
use serde_json::{Value as JsonValue, json};
use std::cell::RefCell;

pub const PEOPLE: &str = "people";

/// `person`: identified by login, with a restricted `ssn`, an append-only
/// `tags` list and a preserved `created_by`.
pub fn person_model() -> EntityModel {
    EntityModel::new("person", PEOPLE)
        .with_field(FieldModel::new("_id", FieldKind::Id))
        .with_field(
            FieldModel::new("login", FieldKind::Text)
                .required()
                .case_insensitive(),
        )
        .with_field(FieldModel::new("name", FieldKind::Text))
        .with_field(FieldModel::new("age", FieldKind::Int))
        .with_field(
            FieldModel::new("ssn", FieldKind::Text)
                .insert_roles(["hr"])
                .update_roles(["hr"]),
        )
        .with_field(FieldModel::new("tags", FieldKind::Array).with_merge(MergePolicy::AppendOnly))
        .with_field(FieldModel::new("created_by", FieldKind::Text).with_merge(MergePolicy::Preserve))
        .with_identity(["login"])
}

/// `person` with a free-form `address` whose `geo` child is preserved, so
/// the address cannot change shape once stored.
pub fn addressed_person_model() -> EntityModel {
    person_model()
        .with_field(FieldModel::new("address", FieldKind::Any))
        .with_field(FieldModel::new("address.geo", FieldKind::Any).with_merge(MergePolicy::Preserve))
}

pub fn person(login: &str, name: &str) -> JsonValue {
    json!({ "login": login, "name": name })
}

/// Store a person directly, returning its `_id`.
pub fn seed(store: &MemoryStore, model: &EntityModel, doc: &JsonValue) -> Value {
    let translator = JsonTranslator;
    let mut stored = translator.to_storage(model, doc).unwrap();
    translator.populate_hidden_fields(model, &mut stored).unwrap();

    store.seed(model.collection(), stored).unwrap()
}

/// Stored document with the given login, in wire form.
pub fn stored_person(store: &MemoryStore, login: &str) -> Option<JsonValue> {
    store
        .documents(PEOPLE)
        .into_iter()
        .find(|d| d.get("login") == Some(&Value::from(login)))
        .map(|d| JsonTranslator.to_json(&d))
}

pub fn clerk() -> Caller {
    Caller::with_roles(["clerk"])
}

pub fn hr() -> Caller {
    Caller::with_roles(["hr"])
}

///
/// Recorder
/// Interceptor remembering each point with the login of its document.
///

#[derive(Default)]
pub struct Recorder {
    seen: RefCell<Vec<(InterceptPoint, Option<String>)>>,
}

impl Recorder {
    pub fn seen(&self) -> Vec<(InterceptPoint, Option<String>)> {
        self.seen.borrow().clone()
    }

    pub fn count(&self, point: InterceptPoint) -> usize {
        self.seen.borrow().iter().filter(|(p, _)| *p == point).count()
    }
}

impl Interceptor for Recorder {
    fn intercept(&self, point: InterceptPoint, _: &OpContext, doc: Option<&DocCtx>) {
        let login = doc.and_then(|d| {
            d.document()
                .get("login")
                .and_then(JsonValue::as_str)
                .map(ToString::to_string)
        });
        self.seen.borrow_mut().push((point, login));
    }
}
