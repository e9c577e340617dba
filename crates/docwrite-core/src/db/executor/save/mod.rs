//! Batched insert / save.
//!
//! Documents are processed in fixed-size batches. Each batch costs at most
//! one identity lookup and at most two bulk writes (inserts, replacements),
//! and every failure below the transport level stays with its document.

mod batch;

#[cfg(test)]
mod tests;

pub use batch::{DocInfo, IdentityTuple};

use crate::{
    DEFAULT_BATCH_SIZE,
    access::AccessGate,
    db::{
        context::OpContext,
        doc::{CrudOperation, DocError, ErrorCode},
        executor::bulk::{AttemptList, correlate},
        response::{WriteFailure, WriteOutcome},
        store::{BulkOp, CursorGuard, DocumentStore},
    },
    error::InternalError,
    intercept::{InterceptPoint, InterceptorRegistry},
    merge::DocumentMerger,
    model::{EntityIdentity, EntityModel, ID_FIELD, derived},
    obs::sink::{self, BulkKind, ExecKind, MetricsEvent, Span},
    translate::Translator,
    value::{Document, Value},
};
use std::{collections::BTreeMap, ops::Range};
use tracing::{debug, error, info, warn};
use ulid::Ulid;

///
/// SaveExecutor
///
/// Executes insert and save requests for one entity. The request context
/// carries the documents in; per-document results, errors and outputs are
/// written back onto it.
///

pub struct SaveExecutor<'a> {
    store: &'a dyn DocumentStore,
    translator: &'a dyn Translator,
    gate: &'a dyn AccessGate,
    model: &'a EntityModel,
    interceptors: &'a InterceptorRegistry,
    batch_size: usize,
    debug: bool,
}

impl<'a> SaveExecutor<'a> {
    // ======================================================================
    // Construction & configuration
    // ======================================================================

    #[must_use]
    pub const fn new(
        store: &'a dyn DocumentStore,
        translator: &'a dyn Translator,
        gate: &'a dyn AccessGate,
        model: &'a EntityModel,
        interceptors: &'a InterceptorRegistry,
    ) -> Self {
        Self {
            store,
            translator,
            gate,
            model,
            interceptors,
            batch_size: DEFAULT_BATCH_SIZE,
            debug: false,
        }
    }

    /// Documents per lookup / bulk-write round. Zero is treated as one.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 { 1 } else { batch_size };
        self
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    // ======================================================================
    // Execution
    // ======================================================================

    /// Run the request held by `op`.
    ///
    /// `op.operation()` selects the mode: `Insert` writes every document as
    /// new, `Save` looks documents up by identity and replaces them, falling
    /// back to insert only when `upsert` is set.
    ///
    /// A transport failure fails the affected batch and is returned once
    /// every batch has been attempted; the outcome inside the error still
    /// counts everything that was processed.
    pub fn execute(&self, op: &mut OpContext, upsert: bool) -> Result<WriteOutcome, WriteFailure> {
        let kind = match op.operation() {
            CrudOperation::Insert => ExecKind::Insert,
            CrudOperation::Save | CrudOperation::Update => ExecKind::Save,
        };
        let mut span = Span::new(kind, &self.model.name);

        let identity = EntityIdentity::resolve(self.model);
        let total = op.documents().len();
        let mut outcome = WriteOutcome::default();
        let mut fatal: Option<InternalError> = None;

        let mut start = 0;
        while start < total {
            let range = start..(start + self.batch_size).min(total);
            start = range.end;

            if let Err(err) = self.save_batch(op, &identity, range.clone(), upsert) {
                fatal.get_or_insert(err);
            }
            outcome += tally(op, range);
        }

        span.set_counts(
            outcome.matched as u64,
            outcome.updated as u64,
            outcome.failed as u64,
        );
        if self.debug {
            info!(
                entity = %self.model.name,
                operation = %op.operation(),
                matched = outcome.matched,
                updated = outcome.updated,
                inserted = outcome.inserted,
                failed = outcome.failed,
                "save finished"
            );
        }

        match fatal {
            Some(err) => Err(WriteFailure::new(outcome, err)),
            None => Ok(outcome),
        }
    }

    // ======================================================================
    // Batch pipeline
    // ======================================================================

    fn save_batch(
        &self,
        op: &mut OpContext,
        identity: &EntityIdentity,
        range: Range<usize>,
        upsert: bool,
    ) -> Result<(), InternalError> {
        let mut infos = self.prepare(op, identity, range.clone());

        if op.operation() == CrudOperation::Save
            && let Err(err) = self.lookup(op, identity, &mut infos)
        {
            error!(entity = %self.model.name, error = %err, "identity lookup failed");
            for info in &infos {
                op.fail_document(
                    info.doc,
                    DocError::new(
                        ErrorCode::GenericWriteError,
                        format!("identity lookup failed: {err}"),
                    ),
                );
            }

            return Err(err);
        }

        let (inserts, updates) = self.classify(op, infos, upsert);
        debug!(
            entity = %self.model.name,
            batch_start = range.start,
            batch_len = range.len(),
            inserts = inserts.len(),
            updates = updates.len(),
            "save batch classified"
        );

        let inserted = self.insert_docs(op, inserts);
        let replaced = self.update_docs(op, updates);

        inserted.and(replaced)
    }

    // Recompute derived fields and translate each document of the batch.
    fn prepare(
        &self,
        op: &mut OpContext,
        identity: &EntityIdentity,
        range: Range<usize>,
    ) -> Vec<DocInfo> {
        let mut infos = Vec::with_capacity(range.len());

        for index in range {
            let Some(doc) = op.document_mut(index) else {
                continue;
            };
            derived::update_array_sizes(self.model, doc.document_mut());

            match self.translator.to_storage(self.model, doc.document()) {
                Ok(target) => {
                    let tuple = IdentityTuple::extract(self.translator, identity, &target);
                    infos.push(DocInfo::new(index, target, tuple));
                }
                Err(err) => doc.add_error(err.into()),
            }
        }

        infos
    }

    // Attach stored counterparts with a single disjunctive lookup.
    fn lookup(
        &self,
        op: &mut OpContext,
        identity: &EntityIdentity,
        infos: &mut Vec<DocInfo>,
    ) -> Result<(), InternalError> {
        let collisions: Vec<usize> = batch::colliding(infos)
            .into_iter()
            .map(|pos| infos[pos].doc)
            .collect();
        if !collisions.is_empty() {
            warn!(
                entity = %self.model.name,
                documents = ?collisions,
                "documents in one batch share an identity"
            );
            for &doc in &collisions {
                op.fail_document(
                    doc,
                    DocError::new(
                        ErrorCode::InvalidRequest,
                        "identity is shared with another document in the same batch",
                    ),
                );
            }
            infos.retain(|info| !collisions.contains(&info.doc));
        }

        let Some(query) = batch::lookup_query(identity, infos.iter().map(|i| &i.identity)) else {
            return Ok(());
        };
        let requested = query.predicate_count();

        let mut guard = CursorGuard::new(
            self.store.find(self.model.collection(), &query)?,
            &self.model.name,
        );
        let found = guard.collect_all()?;
        guard.close();

        sink::record(MetricsEvent::Lookup {
            entity: &self.model.name,
            requested: requested as u64,
            found: found.len() as u64,
        });

        let attached = batch::attach_stored(self.translator, identity, infos, found);
        if attached.unmatched > 0 {
            warn!(
                entity = %self.model.name,
                unmatched = attached.unmatched,
                "lookup returned documents matching no batch entry"
            );
        }
        if !attached.shadowed.is_empty() {
            warn!(
                entity = %self.model.name,
                documents = ?attached.shadowed,
                "several stored documents share one identity; saving over the first"
            );
        }

        Ok(())
    }

    // Split into (inserts, updates); documents with nowhere to go fail here.
    fn classify(
        &self,
        op: &mut OpContext,
        infos: Vec<DocInfo>,
        upsert: bool,
    ) -> (Vec<DocInfo>, Vec<DocInfo>) {
        let insert_allowed = op.operation() == CrudOperation::Insert || upsert;
        let mut inserts = Vec::new();
        let mut updates = Vec::new();

        for info in infos {
            if info.stored.is_some() {
                updates.push(info);
            } else if insert_allowed {
                inserts.push(info);
            } else {
                warn!(entity = %self.model.name, doc = info.doc, "no stored document to save over");
                op.fail_document(
                    info.doc,
                    DocError::new(
                        ErrorCode::InvalidRequest,
                        "no stored document matches the identity and upsert is not allowed",
                    ),
                );
            }
        }

        (inserts, updates)
    }

    // ======================================================================
    // Writes
    // ======================================================================

    fn insert_docs(&self, op: &mut OpContext, infos: Vec<DocInfo>) -> Result<(), InternalError> {
        if infos.is_empty() {
            return Ok(());
        }
        if !self.model.access.can_insert(op.caller()) {
            self.deny_all(op, &infos, CrudOperation::Insert);
            return Ok(());
        }

        let mut attempts = AttemptList::new();
        let mut written = BTreeMap::new();

        for mut info in infos {
            let Some(doc) = op.document(info.doc) else {
                continue;
            };
            let denied = self.gate.inaccessible_fields_for_insert(doc.document());
            if !denied.is_empty() {
                for path in denied {
                    op.fail_document(
                        info.doc,
                        DocError::at(ErrorCode::NoFieldInsertAccess, path, "no insert access"),
                    );
                }
                continue;
            }

            if let Err(err) = self
                .translator
                .populate_hidden_fields(self.model, &mut info.target)
            {
                op.fail_document(info.doc, err.into());
                continue;
            }
            if info.target.get(ID_FIELD).is_none_or(Value::is_null) {
                info.target.insert(ID_FIELD, Value::Id(Ulid::new()));
            }

            self.dispatch(InterceptPoint::PreInsertDoc, op, Some(info.doc));
            written.insert(info.doc, info.target.clone());
            attempts.push(info.doc, BulkOp::Insert(info.target));
        }

        self.submit(op, attempts, written, CrudOperation::Insert)
    }

    fn update_docs(&self, op: &mut OpContext, infos: Vec<DocInfo>) -> Result<(), InternalError> {
        if infos.is_empty() {
            return Ok(());
        }
        if !self.model.access.can_update(op.caller()) {
            self.deny_all(op, &infos, CrudOperation::Update);
            return Ok(());
        }

        let merger = DocumentMerger::new(self.model);
        let mut attempts = AttemptList::new();
        let mut written = BTreeMap::new();

        for mut info in infos {
            let Some(stored) = info.stored.take() else {
                continue;
            };

            let original = self.translator.to_json(&stored);
            let Some(doc) = op.document_mut(info.doc) else {
                continue;
            };
            doc.set_original(original.clone());

            let denied = self
                .gate
                .inaccessible_fields_for_update(doc.document(), &original);
            if !denied.is_empty() {
                for path in denied {
                    doc.add_error(DocError::at(
                        ErrorCode::NoFieldUpdateAccess,
                        path,
                        "no update access",
                    ));
                }
                continue;
            }

            self.dispatch(InterceptPoint::PreUpdateDoc, op, Some(info.doc));
            let Some(doc) = op.document_mut(info.doc) else {
                continue;
            };

            let mut merged = match merger.merge(&stored, &info.target) {
                Ok(merged) => merged,
                Err(conflict) => {
                    doc.add_error(conflict.into());
                    continue;
                }
            };
            derived::refresh_array_sizes(self.model, &mut merged);
            if let Err(err) = self
                .translator
                .populate_hidden_fields(self.model, &mut merged)
            {
                doc.add_error(err.into());
                continue;
            }

            let Some(id) = stored.get(ID_FIELD).filter(|v| !v.is_null()).cloned() else {
                doc.add_error(DocError::new(
                    ErrorCode::GenericWriteError,
                    "stored document has no _id",
                ));
                continue;
            };
            merged.insert(ID_FIELD, id.clone());

            written.insert(info.doc, merged.clone());
            attempts.push(
                info.doc,
                BulkOp::Replace {
                    id,
                    document: merged,
                },
            );
        }

        self.submit(op, attempts, written, CrudOperation::Update)
    }

    // One bulk round trip for an attempt list, then per-document results.
    fn submit(
        &self,
        op: &mut OpContext,
        attempts: AttemptList,
        mut written: BTreeMap<usize, Document>,
        performed: CrudOperation,
    ) -> Result<(), InternalError> {
        if attempts.is_empty() {
            return Ok(());
        }

        let (kind, post) = match performed {
            CrudOperation::Insert => (BulkKind::Insert, InterceptPoint::PostInsertDoc),
            CrudOperation::Save | CrudOperation::Update => {
                (BulkKind::Replace, InterceptPoint::PostUpdateDoc)
            }
        };
        let (submitted, ops) = attempts.into_parts();
        let attempted = submitted.docs().len() as u64;

        let report = match self.store.bulk_write(self.model.collection(), ops) {
            Ok(report) => report,
            Err(err) => {
                error!(
                    entity = %self.model.name,
                    attempted,
                    error = %err,
                    "bulk write failed"
                );
                sink::record(MetricsEvent::BulkWrite {
                    entity: &self.model.name,
                    kind,
                    attempted,
                    failed: attempted,
                });
                for &doc in submitted.docs() {
                    op.fail_document(
                        doc,
                        DocError::new(
                            ErrorCode::GenericWriteError,
                            format!("bulk write failed: {err}"),
                        ),
                    );
                }

                return Err(err);
            }
        };

        let mut failures = correlate(&submitted, &report.errors);
        sink::record(MetricsEvent::BulkWrite {
            entity: &self.model.name,
            kind,
            attempted,
            failed: failures.len() as u64,
        });

        for &index in submitted.docs() {
            if let Some(failure) = failures.remove(&index) {
                warn!(
                    entity = %self.model.name,
                    doc = index,
                    code = %failure.code,
                    "bulk item failed"
                );
                op.fail_document(index, failure);
                continue;
            }

            let json = written.remove(&index).map(|d| self.translator.to_json(&d));
            let Some(doc) = op.document_mut(index) else {
                continue;
            };
            doc.set_performed(performed);
            if let Some(json) = json {
                doc.set_document(json.clone());
                doc.set_output(json);
            }
            self.dispatch(post, op, Some(index));
        }

        Ok(())
    }

    // ======================================================================
    // Helpers
    // ======================================================================

    fn deny_all(&self, op: &mut OpContext, infos: &[DocInfo], operation: CrudOperation) {
        warn!(
            entity = %self.model.name,
            %operation,
            documents = infos.len(),
            "entity access denied"
        );
        for info in infos {
            op.fail_document(
                info.doc,
                DocError::new(
                    ErrorCode::AccessDenied,
                    format!("{operation} not permitted on {}", self.model.name),
                ),
            );
        }
    }

    fn dispatch(&self, point: InterceptPoint, op: &OpContext, doc: Option<usize>) {
        self.interceptors
            .dispatch(point, op, doc.and_then(|i| op.document(i)));
    }
}

// Outcome contribution of the documents in `range`.
fn tally(op: &OpContext, range: Range<usize>) -> WriteOutcome {
    let docs = op.documents().get(range).unwrap_or_default();

    WriteOutcome {
        matched: docs.len(),
        updated: docs.iter().filter(|d| d.performed().is_some()).count(),
        inserted: docs
            .iter()
            .filter(|d| d.performed() == Some(CrudOperation::Insert))
            .count(),
        failed: docs.iter().filter(|d| d.has_errors()).count(),
    }
}
