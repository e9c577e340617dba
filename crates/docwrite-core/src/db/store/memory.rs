use crate::{
    config::WriteConcern,
    db::store::{
        BulkItemError, BulkOp, BulkWriteReport, DUPLICATE_KEY_CODES, DocumentCursor,
        DocumentStore, Query, WriteAck,
    },
    error::InternalError,
    model::ID_FIELD,
    path::FieldPath,
    value::{Document, Value},
};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
};
use ulid::Ulid;

/// Error code reported for injected item failures.
const INJECTED_ITEM_CODE: i32 = 121;

type DocPredicate = Box<dyn Fn(&Document) -> bool>;

///
/// StoreStats
/// Round-trip counters, used to observe batching.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StoreStats {
    pub finds: u64,
    pub bulk_writes: u64,
    pub bulk_items: u64,
    pub saves: u64,
    pub cursors_opened: u64,
    pub cursors_closed: u64,
}

///
/// Collection
///

#[derive(Default)]
struct Collection {
    docs: Vec<Document>,
    unique: Vec<Vec<FieldPath>>,
}

impl Collection {
    fn position_of(&self, id: &Value) -> Option<usize> {
        self.docs.iter().position(|d| d.get(ID_FIELD) == Some(id))
    }

    // First unique key of `doc` already held by another document.
    fn duplicate_of(&self, doc: &Document, skip: Option<usize>) -> Option<String> {
        let id_key = vec![FieldPath::parse(ID_FIELD)];

        std::iter::once(&id_key)
            .chain(&self.unique)
            .find(|fields| {
                let key = unique_key(doc, fields);
                key.iter().any(|v| !v.is_null())
                    && self
                        .docs
                        .iter()
                        .enumerate()
                        .any(|(i, other)| Some(i) != skip && unique_key(other, fields) == key)
            })
            .map(|fields| index_name(fields))
    }
}

///
/// Faults
///

#[derive(Default)]
struct Faults {
    next_bulk_write: Option<String>,
    cursor_after: Option<usize>,
    save_when: Option<DocPredicate>,
    bulk_item_when: Option<DocPredicate>,
}

///
/// MemoryStore
///
/// In-process document store. Enforces a unique `_id` and any declared
/// unique indexes, counts round trips, and can inject faults.
///

#[derive(Default)]
pub struct MemoryStore {
    collections: RefCell<BTreeMap<String, Collection>>,
    stats: Cell<StoreStats>,
    faults: RefCell<Faults>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ======================================================================
    // Inspection
    // ======================================================================

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.get()
    }

    pub fn reset_stats(&self) {
        self.stats.set(StoreStats::default());
    }

    /// Snapshot of a collection in insertion order.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .borrow()
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    #[must_use]
    pub fn find_by_id(&self, collection: &str, id: &Value) -> Option<Document> {
        let collections = self.collections.borrow();
        let c = collections.get(collection)?;

        c.position_of(id).map(|pos| c.docs[pos].clone())
    }

    #[must_use]
    pub fn unique_indexes(&self, collection: &str) -> Vec<Vec<FieldPath>> {
        self.collections
            .borrow()
            .get(collection)
            .map(|c| c.unique.clone())
            .unwrap_or_default()
    }

    /// Seed a document directly, bypassing round-trip accounting.
    pub fn seed(&self, collection: &str, mut doc: Document) -> Result<Value, InternalError> {
        let id = ensure_id(&mut doc);
        let mut collections = self.collections.borrow_mut();
        let c = collections.entry(collection.to_string()).or_default();
        if let Some(index) = c.duplicate_of(&doc, None) {
            return Err(InternalError::store_internal(duplicate_message(collection, &index)));
        }
        c.docs.push(doc);

        Ok(id)
    }

    // ======================================================================
    // Fault injection
    // ======================================================================

    /// Fail the next bulk write as a whole (transport failure).
    pub fn fail_next_bulk_write(&self, message: impl Into<String>) {
        self.faults.borrow_mut().next_bulk_write = Some(message.into());
    }

    /// Make the next opened cursor fail after yielding `n` documents.
    pub fn fail_cursor_after(&self, n: usize) {
        self.faults.borrow_mut().cursor_after = Some(n);
    }

    /// Fail single-document saves of matching documents.
    pub fn fail_save_when(&self, predicate: impl Fn(&Document) -> bool + 'static) {
        self.faults.borrow_mut().save_when = Some(Box::new(predicate));
    }

    /// Fail bulk items whose document matches with a non-duplicate code.
    pub fn fail_bulk_items_when(&self, predicate: impl Fn(&Document) -> bool + 'static) {
        self.faults.borrow_mut().bulk_item_when = Some(Box::new(predicate));
    }

    fn bump(&self, f: impl FnOnce(&mut StoreStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn item_fault(&self, doc: &Document) -> bool {
        self.faults
            .borrow()
            .bulk_item_when
            .as_ref()
            .is_some_and(|p| p(doc))
    }
}

impl DocumentStore for MemoryStore {
    fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Box<dyn DocumentCursor + '_>, InternalError> {
        self.bump(|s| {
            s.finds += 1;
            s.cursors_opened += 1;
        });

        let docs = self
            .collections
            .borrow()
            .get(collection)
            .map(|c| {
                c.docs
                    .iter()
                    .filter(|d| query.matches(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let fail_after = self.faults.borrow_mut().cursor_after.take();

        Ok(Box::new(MemoryCursor {
            store: self,
            docs,
            fail_after,
            yielded: 0,
        }))
    }

    fn bulk_write(
        &self,
        collection: &str,
        ops: Vec<BulkOp>,
    ) -> Result<BulkWriteReport, InternalError> {
        self.bump(|s| {
            s.bulk_writes += 1;
            s.bulk_items += ops.len() as u64;
        });

        if let Some(message) = self.faults.borrow_mut().next_bulk_write.take() {
            return Err(InternalError::store_transport(message));
        }

        let mut report = BulkWriteReport {
            attempted: ops.len(),
            ..BulkWriteReport::default()
        };

        for (index, op) in ops.into_iter().enumerate() {
            let doc = match &op {
                BulkOp::Insert(doc) | BulkOp::Replace { document: doc, .. } => doc,
            };
            if self.item_fault(doc) {
                report.errors.push(BulkItemError {
                    index,
                    code: INJECTED_ITEM_CODE,
                    message: "document failed validation".to_string(),
                });
                continue;
            }

            let mut collections = self.collections.borrow_mut();
            let c = collections.entry(collection.to_string()).or_default();

            let result = match op {
                BulkOp::Insert(mut doc) => {
                    ensure_id(&mut doc);
                    match c.duplicate_of(&doc, None) {
                        Some(index_name) => Err(index_name),
                        None => {
                            c.docs.push(doc);
                            report.inserted += 1;
                            Ok(())
                        }
                    }
                }
                BulkOp::Replace { id, mut document } => match c.position_of(&id) {
                    // replace without upsert: an unmatched filter is not an error
                    None => Ok(()),
                    Some(pos) => {
                        document.insert(ID_FIELD, id);
                        match c.duplicate_of(&document, Some(pos)) {
                            Some(index_name) => Err(index_name),
                            None => {
                                c.docs[pos] = document;
                                report.matched += 1;
                                Ok(())
                            }
                        }
                    }
                },
            };

            if let Err(index_name) = result {
                report.errors.push(BulkItemError {
                    index,
                    code: DUPLICATE_KEY_CODES[0],
                    message: duplicate_message(collection, &index_name),
                });
            }
        }

        Ok(report)
    }

    fn save(
        &self,
        collection: &str,
        mut doc: Document,
        concern: Option<WriteConcern>,
    ) -> Result<WriteAck, InternalError> {
        self.bump(|s| s.saves += 1);

        let injected = self
            .faults
            .borrow()
            .save_when
            .as_ref()
            .is_some_and(|p| p(&doc));
        if injected {
            return Err(InternalError::store_internal("write rejected by store"));
        }

        let id = ensure_id(&mut doc);
        let mut collections = self.collections.borrow_mut();
        let c = collections.entry(collection.to_string()).or_default();
        let existing = c.position_of(&id);

        if let Some(index_name) = c.duplicate_of(&doc, existing) {
            return Err(InternalError::store_internal(duplicate_message(
                collection,
                &index_name,
            )));
        }
        match existing {
            Some(pos) => c.docs[pos] = doc,
            None => c.docs.push(doc),
        }

        Ok(WriteAck {
            upserted: existing.is_none(),
            concern,
        })
    }

    fn ensure_unique_index(
        &self,
        collection: &str,
        fields: &[FieldPath],
    ) -> Result<(), InternalError> {
        if fields.is_empty() {
            return Err(InternalError::store_internal("unique index needs at least one field"));
        }

        let mut collections = self.collections.borrow_mut();
        let c = collections.entry(collection.to_string()).or_default();
        if !c.unique.iter().any(|u| u == fields) {
            c.unique.push(fields.to_vec());
        }

        Ok(())
    }
}

///
/// MemoryCursor
///

struct MemoryCursor<'a> {
    store: &'a MemoryStore,
    docs: VecDeque<Document>,
    fail_after: Option<usize>,
    yielded: usize,
}

impl DocumentCursor for MemoryCursor<'_> {
    fn next_document(&mut self) -> Result<Option<Document>, InternalError> {
        if self.fail_after == Some(self.yielded) {
            return Err(InternalError::store_transport(format!(
                "cursor lost after {} documents",
                self.yielded
            )));
        }

        let next = self.docs.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }

        Ok(next)
    }

    fn close(&mut self) {
        self.store.bump(|s| s.cursors_closed += 1);
    }
}

fn ensure_id(doc: &mut Document) -> Value {
    match doc.get(ID_FIELD) {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            let id = Value::Id(Ulid::new());
            doc.insert(ID_FIELD, id.clone());
            id
        }
    }
}

fn unique_key(doc: &Document, fields: &[FieldPath]) -> Vec<Value> {
    fields
        .iter()
        .map(|f| doc.get_path(f).cloned().unwrap_or(Value::Null))
        .collect()
}

fn index_name(fields: &[FieldPath]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("_")
}

fn duplicate_message(collection: &str, index: &str) -> String {
    format!("E11000 duplicate key error collection: {collection} index: {index}")
}
