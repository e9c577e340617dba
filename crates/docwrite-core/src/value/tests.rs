use super::*;

fn address() -> Document {
    let mut address = Document::new();
    address.insert("city", "Oslo");
    address.insert("zip", 150_i64);

    address
}

#[test]
fn get_path_descends_documents_and_lists() {
    let mut doc = Document::new();
    doc.insert("address", address());
    doc.insert(
        "tags",
        Value::List(vec![Value::from("a"), Value::from("b")]),
    );

    assert_eq!(
        doc.get_path(&FieldPath::parse("address.city")),
        Some(&Value::from("Oslo"))
    );
    assert_eq!(
        doc.get_path(&FieldPath::parse("tags.1")),
        Some(&Value::from("b"))
    );
    assert_eq!(doc.get_path(&FieldPath::parse("tags.x")), None);
    assert_eq!(doc.get_path(&FieldPath::root()), None);
}

#[test]
fn set_path_creates_intermediate_documents() {
    let mut doc = Document::new();

    assert!(doc.set_path(&FieldPath::parse("a.b.c"), Value::Int(1)));
    assert_eq!(doc.get_path(&FieldPath::parse("a.b.c")), Some(&Value::Int(1)));

    // scalar in the way
    doc.insert("flat", 3_i64);
    assert!(!doc.set_path(&FieldPath::parse("flat.x"), Value::Null));
}

#[test]
fn remove_path_only_touches_the_leaf() {
    let mut doc = Document::new();
    doc.insert("address", address());

    assert_eq!(
        doc.remove_path(&FieldPath::parse("address.zip")),
        Some(Value::Int(150))
    );
    assert_eq!(doc.remove_path(&FieldPath::parse("address.zip")), None);
    assert!(doc.get_path(&FieldPath::parse("address.city")).is_some());
}

#[test]
fn shapes_classify_scalars_together() {
    assert_eq!(Value::Int(1).shape(), Value::from("x").shape());
    assert_eq!(Value::Document(Document::new()).shape(), ValueShape::Document);
    assert_eq!(Value::List(Vec::new()).shape(), ValueShape::List);
    assert_eq!(Value::Null.shape(), ValueShape::Null);
}
