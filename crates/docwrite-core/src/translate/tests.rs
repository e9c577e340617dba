use super::*;
use crate::model::FieldModel;
use serde_json::json;

fn model() -> EntityModel {
    EntityModel::new("user", "users")
        .with_field(FieldModel::new("_id", FieldKind::Id))
        .with_field(FieldModel::new("login", FieldKind::Text).case_insensitive())
        .with_field(FieldModel::new("age", FieldKind::Int))
        .with_field(FieldModel::new("score", FieldKind::Float))
        .with_field(FieldModel::new("address.city", FieldKind::Text).case_insensitive())
}

#[test]
fn converts_nested_documents_and_lists() {
    let doc = JsonTranslator
        .to_storage(
            &model(),
            &json!({ "login": "Ann", "age": 30, "address": { "city": "Oslo" }, "tags": ["a", 1] }),
        )
        .unwrap();

    assert_eq!(doc.get("login"), Some(&Value::from("Ann")));
    assert_eq!(doc.get("age"), Some(&Value::Int(30)));
    assert_eq!(
        doc.get_path(&FieldPath::parse("address.city")),
        Some(&Value::from("Oslo"))
    );
    assert_eq!(
        doc.get("tags"),
        Some(&Value::List(vec![Value::from("a"), Value::Int(1)]))
    );
}

#[test]
fn id_text_becomes_native_id() {
    let id = Ulid::new();
    let doc = JsonTranslator
        .to_storage(&model(), &json!({ "_id": id.to_string() }))
        .unwrap();

    assert_eq!(doc.get(ID_FIELD), Some(&Value::Id(id)));
}

#[test]
fn undeclared_id_keeps_non_ulid_text() {
    let model = EntityModel::new("tag", "tags");
    let doc = JsonTranslator
        .to_storage(&model, &json!({ "_id": "plain" }))
        .unwrap();

    assert_eq!(doc.get(ID_FIELD), Some(&Value::from("plain")));
}

#[test]
fn declared_kind_is_enforced() {
    let err = JsonTranslator
        .to_storage(&model(), &json!({ "age": "thirty" }))
        .unwrap_err();

    assert_eq!(
        err,
        TranslationError::KindMismatch {
            path: FieldPath::parse("age"),
            expected: FieldKind::Int,
            found: "text",
        }
    );
}

#[test]
fn integers_widen_into_float_fields() {
    let doc = JsonTranslator
        .to_storage(&model(), &json!({ "score": 3 }))
        .unwrap();

    assert_eq!(doc.get("score"), Some(&Value::Float(3.0)));
}

#[test]
fn rejects_non_object_roots_and_huge_numbers() {
    assert!(matches!(
        JsonTranslator.to_storage(&model(), &json!([1, 2])),
        Err(TranslationError::NotAnObject { found: "list" })
    ));
    assert!(matches!(
        JsonTranslator.to_storage(&model(), &json!({ "n": u64::MAX })),
        Err(TranslationError::NumberOutOfRange { .. })
    ));
}

#[test]
fn hidden_fields_hold_lowercased_copies() {
    let model = model();
    let mut doc = JsonTranslator
        .to_storage(&model, &json!({ "login": "AnN", "address": { "city": "OSLO" } }))
        .unwrap();

    JsonTranslator
        .populate_hidden_fields(&model, &mut doc)
        .unwrap();

    assert_eq!(
        doc.get_path(&FieldPath::parse("@hidden.login")),
        Some(&Value::from("ann"))
    );
    assert_eq!(
        doc.get_path(&FieldPath::parse("@hidden.address.city")),
        Some(&Value::from("oslo"))
    );

    // hidden values never leave the store
    let wire = JsonTranslator.to_json(&doc);
    assert!(wire.get(HIDDEN_FIELD).is_none());
    assert_eq!(wire["login"], json!("AnN"));
}

#[test]
fn hidden_fields_reject_non_text_values() {
    let model = model();
    let mut doc = Document::new();
    doc.insert("login", 5_i64);

    assert!(matches!(
        JsonTranslator.populate_hidden_fields(&model, &mut doc),
        Err(TranslationError::KindMismatch { .. })
    ));
}

#[test]
fn to_json_renders_ids_as_text() {
    let id = Ulid::new();
    let mut doc = Document::new();
    doc.insert(ID_FIELD, id);
    doc.insert("n", Value::Float(1.5));

    assert_eq!(
        JsonTranslator.to_json(&doc),
        json!({ "_id": id.to_string(), "n": 1.5 })
    );
}
