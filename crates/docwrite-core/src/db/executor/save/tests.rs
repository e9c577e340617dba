use super::*;
use crate::{
    access::{Caller, RoleAccessGate},
    db::store::{MemoryStore, StoreStats},
    intercept::InterceptPoint,
    model::{EntityAccess, RoleSet},
    obs::sink::{MetricsSink, with_metrics_sink},
    path::FieldPath,
    test_support::{
        PEOPLE, Recorder, addressed_person_model, clerk, hr, person, person_model, seed,
        stored_person,
    },
    translate::JsonTranslator,
};
use serde_json::json;
use std::{cell::RefCell, rc::Rc, sync::Arc};

fn run(
    store: &MemoryStore,
    model: &EntityModel,
    interceptors: &InterceptorRegistry,
    op: &mut OpContext,
    upsert: bool,
    batch_size: usize,
) -> Result<WriteOutcome, WriteFailure> {
    let caller = op.caller().clone();
    let gate = RoleAccessGate::new(model, &caller);

    SaveExecutor::new(store, &JsonTranslator, &gate, model, interceptors)
        .with_batch_size(batch_size)
        .execute(op, upsert)
}

fn save(
    store: &MemoryStore,
    model: &EntityModel,
    op: &mut OpContext,
    upsert: bool,
) -> Result<WriteOutcome, WriteFailure> {
    run(store, model, &InterceptorRegistry::new(), op, upsert, DEFAULT_BATCH_SIZE)
}

fn codes(op: &OpContext, index: usize) -> Vec<ErrorCode> {
    op.documents()[index].errors().iter().map(|e| e.code).collect()
}

const fn outcome(matched: usize, updated: usize, inserted: usize, failed: usize) -> WriteOutcome {
    WriteOutcome {
        matched,
        updated,
        inserted,
        failed,
    }
}

// ============================================================================
// Insert
// ============================================================================

#[test]
fn insert_writes_every_document_in_one_round_trip() {
    let store = MemoryStore::new();
    let model = person_model();
    let mut op = OpContext::new(
        "person",
        CrudOperation::Insert,
        hr(),
        [
            json!({ "login": "Alice", "name": "Alice", "tags": ["a", "b"] }),
            person("bob", "Bob"),
        ],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(2, 2, 2, 0));
    assert_eq!(store.count(PEOPLE), 2);
    assert_eq!(store.stats().finds, 0);
    assert_eq!(store.stats().bulk_writes, 1);

    for doc in op.documents() {
        assert_eq!(doc.performed(), Some(CrudOperation::Insert));
        let output = doc.output().unwrap();
        assert!(output.get("_id").is_some());
        assert!(output.get("@hidden").is_none());
    }

    let alice = store
        .documents(PEOPLE)
        .into_iter()
        .find(|d| d.get("name") == Some(&Value::from("Alice")))
        .unwrap();
    assert_eq!(alice.get("tags#"), Some(&Value::Int(2)));
    assert_eq!(
        alice.get_path(&FieldPath::parse("@hidden.login")),
        Some(&Value::from("alice"))
    );
}

#[test]
fn failures_stay_with_their_document() {
    let store = MemoryStore::new();
    let model = person_model();
    store
        .ensure_unique_index(PEOPLE, &[FieldPath::parse("login")])
        .unwrap();
    seed(&store, &model, &person("bob", "Bob"));

    let mut op = OpContext::new(
        "person",
        CrudOperation::Insert,
        hr(),
        [
            person("alice", "Alice"),
            person("bob", "Bob again"),
            json!({ "login": "carol", "age": "old" }),
            person("dave", "Dave"),
        ],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(4, 2, 2, 2));
    assert!(codes(&op, 0).is_empty());
    assert_eq!(codes(&op, 1), [ErrorCode::DuplicateKey]);
    assert_eq!(codes(&op, 2), [ErrorCode::TranslationError]);
    assert!(codes(&op, 3).is_empty());
    assert_eq!(op.documents()[1].performed(), None);
    assert_eq!(store.count(PEOPLE), 3);
}

#[test]
fn restricted_fields_block_insert_per_document() {
    let store = MemoryStore::new();
    let model = person_model();
    let mut op = OpContext::new(
        "person",
        CrudOperation::Insert,
        clerk(),
        [
            json!({ "login": "dora", "ssn": "123" }),
            person("eve", "Eve"),
        ],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(2, 1, 1, 1));
    let error = &op.documents()[0].errors()[0];
    assert_eq!(error.code, ErrorCode::NoFieldInsertAccess);
    assert_eq!(error.path, Some(FieldPath::parse("ssn")));
    assert!(stored_person(&store, "dora").is_none());
    assert!(stored_person(&store, "eve").is_some());
}

#[test]
fn entity_insert_denial_fails_every_document() {
    let store = MemoryStore::new();
    let model = person_model().with_access(EntityAccess {
        insert: RoleSet::of(["admin"]),
        ..EntityAccess::default()
    });
    let mut op = OpContext::new(
        "person",
        CrudOperation::Insert,
        Caller::anonymous(),
        [person("a", "A"), person("b", "B")],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(2, 0, 0, 2));
    assert_eq!(codes(&op, 0), [ErrorCode::AccessDenied]);
    assert_eq!(codes(&op, 1), [ErrorCode::AccessDenied]);
    assert_eq!(store.stats().bulk_writes, 0);
}

// ============================================================================
// Save
// ============================================================================

#[test]
fn save_without_upsert_rejects_unmatched_documents() {
    let store = MemoryStore::new();
    let model = person_model();
    seed(&store, &model, &person("alice", "Alice"));

    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        clerk(),
        [person("alice", "Alicia"), person("zed", "Zed")],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(2, 1, 0, 1));
    assert_eq!(codes(&op, 1), [ErrorCode::InvalidRequest]);
    assert_eq!(store.count(PEOPLE), 1);
    assert_eq!(stored_person(&store, "alice").unwrap()["name"], json!("Alicia"));

    let alice = &op.documents()[0];
    assert_eq!(alice.performed(), Some(CrudOperation::Update));
    assert_eq!(alice.original().unwrap()["name"], json!("Alice"));
    assert_eq!(alice.output().unwrap()["name"], json!("Alicia"));
}

#[test]
fn save_with_upsert_inserts_unmatched_documents() {
    let store = MemoryStore::new();
    let model = person_model();
    seed(&store, &model, &person("alice", "Alice"));

    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        clerk(),
        [person("alice", "Alicia"), person("zed", "Zed")],
    );

    let result = save(&store, &model, &mut op, true).unwrap();

    assert_eq!(result, outcome(2, 2, 1, 0));
    assert_eq!(op.documents()[1].performed(), Some(CrudOperation::Insert));
    assert_eq!(store.count(PEOPLE), 2);
    assert_eq!(store.stats().finds, 1);
    assert_eq!(store.stats().bulk_writes, 2);
}

#[test]
fn save_merges_with_the_stored_document() {
    let store = MemoryStore::new();
    let model = person_model();
    let id = seed(
        &store,
        &model,
        &json!({ "login": "alice", "name": "A", "created_by": "system", "tags": ["a"] }),
    );

    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        hr(),
        [json!({ "login": "alice", "name": "B", "created_by": "mallory", "tags": ["b"] })],
    );

    let result = save(&store, &model, &mut op, false).unwrap();
    assert_eq!(result, outcome(1, 1, 0, 0));

    let stored = store.find_by_id(PEOPLE, &id).unwrap();
    assert_eq!(stored.get("name"), Some(&Value::from("B")));
    assert_eq!(stored.get("created_by"), Some(&Value::from("system")));
    assert_eq!(
        stored.get("tags"),
        Some(&Value::List(vec!["a".into(), "b".into()]))
    );
    assert_eq!(stored.get("tags#"), Some(&Value::Int(2)));
    assert_eq!(store.count(PEOPLE), 1);
}

#[test]
fn unchanged_restricted_field_does_not_block_update() {
    let store = MemoryStore::new();
    let model = person_model();
    seed(&store, &model, &json!({ "login": "alice", "name": "A", "ssn": "111" }));
    seed(&store, &model, &json!({ "login": "carl", "name": "C", "ssn": "222" }));

    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        clerk(),
        [
            json!({ "login": "alice", "name": "A2", "ssn": "111" }),
            json!({ "login": "carl", "name": "C", "ssn": "999" }),
        ],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(2, 1, 0, 1));
    assert!(codes(&op, 0).is_empty());
    let error = &op.documents()[1].errors()[0];
    assert_eq!(error.code, ErrorCode::NoFieldUpdateAccess);
    assert_eq!(error.path, Some(FieldPath::parse("ssn")));
    assert_eq!(stored_person(&store, "carl").unwrap()["ssn"], json!("222"));
    assert_eq!(stored_person(&store, "alice").unwrap()["name"], json!("A2"));
}

#[test]
fn merge_conflict_fails_only_its_document() {
    let store = MemoryStore::new();
    let model = addressed_person_model();
    seed(
        &store,
        &model,
        &json!({ "login": "alice", "address": { "city": "Oslo", "geo": "59.9,10.7" } }),
    );
    seed(&store, &model, &person("bob", "B"));

    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        hr(),
        [
            json!({ "login": "alice", "address": "nowhere" }),
            person("bob", "B2"),
        ],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(2, 1, 0, 1));
    assert_eq!(codes(&op, 0), [ErrorCode::MergeConflict]);
    assert_eq!(
        op.documents()[0].errors()[0].path,
        Some(FieldPath::parse("address"))
    );
    assert_eq!(op.documents()[0].performed(), None);
    assert_eq!(
        stored_person(&store, "alice").unwrap()["address"],
        json!({ "city": "Oslo", "geo": "59.9,10.7" })
    );
    assert_eq!(stored_person(&store, "bob").unwrap()["name"], json!("B2"));
    assert_eq!(store.stats().bulk_writes, 1);
}

#[test]
fn save_over_a_duplicated_identity_replaces_the_first_stored_document() {
    let store = MemoryStore::new();
    let model = person_model();
    let first = seed(&store, &model, &person("alice", "one"));
    let second = seed(&store, &model, &person("alice", "two"));

    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        hr(),
        [person("alice", "three")],
    );

    let result = save(&store, &model, &mut op, false).unwrap();

    assert_eq!(result, outcome(1, 1, 0, 0));
    assert_eq!(store.count(PEOPLE), 2);
    assert_eq!(
        store.find_by_id(PEOPLE, &first).unwrap().get("name"),
        Some(&Value::from("three"))
    );
    assert_eq!(
        store.find_by_id(PEOPLE, &second).unwrap().get("name"),
        Some(&Value::from("two"))
    );
}

#[test]
fn shared_identity_in_one_batch_fails_both_documents() {
    let store = MemoryStore::new();
    let model = person_model();
    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        hr(),
        [
            person("alice", "one"),
            person("alice", "two"),
            person("bob", "Bob"),
        ],
    );

    let result = save(&store, &model, &mut op, true).unwrap();

    assert_eq!(result, outcome(3, 1, 1, 2));
    assert_eq!(codes(&op, 0), [ErrorCode::InvalidRequest]);
    assert_eq!(codes(&op, 1), [ErrorCode::InvalidRequest]);
    assert_eq!(store.count(PEOPLE), 1);
}

#[test]
fn empty_request_touches_nothing() {
    let store = MemoryStore::new();
    let model = person_model();
    let mut op = OpContext::new("person", CrudOperation::Save, hr(), []);

    let result = save(&store, &model, &mut op, true).unwrap();

    assert_eq!(result, WriteOutcome::default());
    assert_eq!(store.stats(), StoreStats::default());
}

// ============================================================================
// Batching
// ============================================================================

fn batched_save(batch_size: usize) -> (WriteOutcome, StoreStats, Vec<(String, String)>) {
    let store = MemoryStore::new();
    let model = person_model();
    for i in (0..130).step_by(2) {
        seed(&store, &model, &person(&format!("u{i:03}"), "old"));
    }

    let docs = (0..130).map(|i| person(&format!("u{i:03}"), &format!("new{i}")));
    let mut op = OpContext::new("person", CrudOperation::Save, hr(), docs);
    let result = run(
        &store,
        &model,
        &InterceptorRegistry::new(),
        &mut op,
        true,
        batch_size,
    )
    .unwrap();

    let text = |d: &Document, field: &str| {
        d.get(field)
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_string()
    };
    let mut rows: Vec<_> = store
        .documents(PEOPLE)
        .iter()
        .map(|d| (text(d, "login"), text(d, "name")))
        .collect();
    rows.sort();

    (result, store.stats(), rows)
}

#[test]
fn batches_bound_round_trips_without_changing_results() {
    let (small, small_stats, small_rows) = batched_save(64);
    let (whole, whole_stats, whole_rows) = batched_save(130);

    assert_eq!(small, outcome(130, 130, 65, 0));
    assert_eq!(small, whole);
    assert_eq!(small_rows, whole_rows);
    assert!(small_rows.iter().all(|(_, name)| name.starts_with("new")));

    assert_eq!(small_stats.finds, 3);
    assert_eq!(small_stats.bulk_writes, 6);
    assert_eq!(whole_stats.finds, 1);
    assert_eq!(whole_stats.bulk_writes, 2);
}

#[test]
fn transport_failure_fails_its_batch_and_the_rest_still_run() {
    let store = MemoryStore::new();
    let model = person_model();
    store.fail_next_bulk_write("connection reset");

    let mut op = OpContext::new(
        "person",
        CrudOperation::Insert,
        hr(),
        [person("a", "A"), person("b", "B"), person("c", "C")],
    );

    let failure = run(
        &store,
        &model,
        &InterceptorRegistry::new(),
        &mut op,
        false,
        2,
    )
    .unwrap_err();

    assert!(failure.error.is_transport());
    assert_eq!(failure.outcome, outcome(3, 1, 1, 2));
    assert_eq!(codes(&op, 0), [ErrorCode::GenericWriteError]);
    assert_eq!(codes(&op, 1), [ErrorCode::GenericWriteError]);
    assert_eq!(op.documents()[2].performed(), Some(CrudOperation::Insert));
    assert_eq!(store.count(PEOPLE), 1);
    assert_eq!(store.stats().bulk_writes, 2);
}

#[test]
fn lookup_failure_fails_the_batch_and_closes_the_cursor() {
    let store = MemoryStore::new();
    let model = person_model();
    store.fail_cursor_after(0);

    let mut op = OpContext::new("person", CrudOperation::Save, hr(), [person("a", "A")]);

    let failure = save(&store, &model, &mut op, true).unwrap_err();

    assert!(failure.error.is_transport());
    assert_eq!(failure.outcome, outcome(1, 0, 0, 1));
    assert_eq!(codes(&op, 0), [ErrorCode::GenericWriteError]);
    assert_eq!(store.stats().bulk_writes, 0);
    assert_eq!(store.stats().cursors_closed, 1);
}

// ============================================================================
// Interceptors & metrics
// ============================================================================

#[test]
fn interceptors_see_pre_for_attempts_and_post_for_writes() {
    let store = MemoryStore::new();
    let model = person_model();
    store
        .ensure_unique_index(PEOPLE, &[FieldPath::parse("login")])
        .unwrap();
    seed(&store, &model, &person("bob", "Bob"));

    let recorder = Arc::new(Recorder::default());
    let mut interceptors = InterceptorRegistry::new();
    interceptors.register(InterceptPoint::PreInsertDoc, recorder.clone());
    interceptors.register(InterceptPoint::PostInsertDoc, recorder.clone());

    let mut op = OpContext::new(
        "person",
        CrudOperation::Insert,
        hr(),
        [person("alice", "Alice"), person("bob", "dup")],
    );
    run(&store, &model, &interceptors, &mut op, false, 64).unwrap();

    assert_eq!(
        recorder.seen(),
        [
            (InterceptPoint::PreInsertDoc, Some("alice".to_string())),
            (InterceptPoint::PreInsertDoc, Some("bob".to_string())),
            (InterceptPoint::PostInsertDoc, Some("alice".to_string())),
        ]
    );
}

#[test]
fn rejected_documents_see_no_pre_interceptor() {
    let store = MemoryStore::new();
    let model = person_model();
    seed(&store, &model, &json!({ "login": "carl", "ssn": "222" }));

    let recorder = Arc::new(Recorder::default());
    let mut interceptors = InterceptorRegistry::new();
    interceptors.register(InterceptPoint::PreInsertDoc, recorder.clone());
    interceptors.register(InterceptPoint::PreUpdateDoc, recorder.clone());

    let mut insert = OpContext::new(
        "person",
        CrudOperation::Insert,
        clerk(),
        [json!({ "login": "eve", "ssn": "123" }), person("dan", "Dan")],
    );
    run(&store, &model, &interceptors, &mut insert, false, 64).unwrap();

    assert_eq!(codes(&insert, 0), [ErrorCode::NoFieldInsertAccess]);
    assert_eq!(
        recorder.seen(),
        [(InterceptPoint::PreInsertDoc, Some("dan".to_string()))]
    );

    let mut save = OpContext::new(
        "person",
        CrudOperation::Save,
        clerk(),
        [json!({ "login": "carl", "ssn": "999" })],
    );
    run(&store, &model, &interceptors, &mut save, false, 64).unwrap();

    assert_eq!(codes(&save, 0), [ErrorCode::NoFieldUpdateAccess]);
    assert_eq!(recorder.count(InterceptPoint::PreUpdateDoc), 0);
    assert_eq!(store.count(PEOPLE), 2);
}

#[derive(Default)]
struct LabelSink {
    labels: RefCell<Vec<String>>,
}

impl MetricsSink for LabelSink {
    fn record(&self, event: MetricsEvent<'_>) {
        let label = match event {
            MetricsEvent::ExecStart { .. } => "start".to_string(),
            MetricsEvent::ExecFinish {
                matched, written, ..
            } => format!("finish {matched}/{written}"),
            MetricsEvent::Lookup {
                requested, found, ..
            } => format!("lookup {requested}/{found}"),
            MetricsEvent::BulkWrite {
                kind, attempted, ..
            } => format!("bulk {kind:?} {attempted}"),
            MetricsEvent::DocumentWrite { .. } => "write".to_string(),
            MetricsEvent::CursorClosed { .. } => "closed".to_string(),
        };
        self.labels.borrow_mut().push(label);
    }
}

#[test]
fn save_reports_lookups_and_bulk_writes() {
    let store = MemoryStore::new();
    let model = person_model();
    seed(&store, &model, &person("alice", "Alice"));

    let sink = Rc::new(LabelSink::default());
    let mut op = OpContext::new(
        "person",
        CrudOperation::Save,
        hr(),
        [person("alice", "A2"), person("zed", "Zed")],
    );
    with_metrics_sink(sink.clone(), || save(&store, &model, &mut op, true)).unwrap();

    assert_eq!(
        *sink.labels.borrow(),
        [
            "start",
            "closed",
            "lookup 2/1",
            "bulk Insert 1",
            "bulk Replace 1",
            "finish 2/2",
        ]
    );
}
