//! Query-driven update.
//!
//! Streams the documents matching a query, applies a transform to each and
//! writes changed documents back one at a time. Per-document failures never
//! stop the cursor loop; the cursor is closed on every exit path.

mod transform;


pub use transform::{SetFields, UpdateTransform};

use crate::{
    access::AccessGate,
    config::{DEFAULT_MAX_RESULT_SET_SIZE, WriteConcern},
    db::{
        context::OpContext,
        doc::{CrudOperation, DocCtx, DocError, ErrorCode},
        projection::{ErrorProjector, Projector},
        response::{WriteFailure, WriteOutcome},
        store::{CursorGuard, DocumentStore, Query},
    },
    error::InternalError,
    intercept::{InterceptPoint, InterceptorRegistry},
    merge::DocumentMerger,
    model::{EntityIdentity, EntityModel, ID_FIELD, derived},
    obs::sink::{self, ExecKind, MetricsEvent, Span},
    translate::Translator,
    validate::ConstraintValidator,
    value::Document,
};
use tracing::{debug, error, info, warn};

///
/// UpdateExecutor
///
/// Per document: Fetched, then either Unmodified, or Modified and checked
/// (validation, field access), then Rejected, Written or WriteFailed.
///

pub struct UpdateExecutor<'a> {
    store: &'a dyn DocumentStore,
    translator: &'a dyn Translator,
    gate: &'a dyn AccessGate,
    validator: &'a dyn ConstraintValidator,
    model: &'a EntityModel,
    interceptors: &'a InterceptorRegistry,
    write_concern: Option<WriteConcern>,
    max_result_set_size: usize,
    debug: bool,
}

impl<'a> UpdateExecutor<'a> {
    // ======================================================================
    // Construction & configuration
    // ======================================================================

    #[must_use]
    pub const fn new(
        store: &'a dyn DocumentStore,
        translator: &'a dyn Translator,
        gate: &'a dyn AccessGate,
        validator: &'a dyn ConstraintValidator,
        model: &'a EntityModel,
        interceptors: &'a InterceptorRegistry,
    ) -> Self {
        Self {
            store,
            translator,
            gate,
            validator,
            model,
            interceptors,
            write_concern: None,
            max_result_set_size: DEFAULT_MAX_RESULT_SET_SIZE,
            debug: false,
        }
    }

    /// Write concern for every save; `None` defers to the store default.
    #[must_use]
    pub const fn with_write_concern(mut self, concern: Option<WriteConcern>) -> Self {
        self.write_concern = concern;
        self
    }

    #[must_use]
    pub const fn with_max_result_set_size(mut self, max: usize) -> Self {
        self.max_result_set_size = max;
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

    /// Update every document matching `query`.
    ///
    /// Each yielded document is appended to `op`; failed documents get the
    /// identity-only error projection as output, all others `projector`'s.
    /// The result-set interceptors bracket the query itself and fire before
    /// any document is processed.
    ///
    /// When the cursor yields more than `max_result_set_size` documents the
    /// call fails and the document over the limit is appended unprocessed,
    /// so `op` always holds `matched` documents.
    pub fn execute(
        &self,
        op: &mut OpContext,
        query: &Query,
        transform: &dyn UpdateTransform,
        projector: &dyn Projector,
    ) -> Result<WriteOutcome, WriteFailure> {
        let mut span = Span::new(ExecKind::UpdateByQuery, &self.model.name);
        let mut outcome = WriteOutcome::default();

        if !self.model.access.can_update(op.caller()) {
            warn!(entity = %self.model.name, "update access denied");
            op.add_error(DocError::new(
                ErrorCode::AccessDenied,
                format!("update not permitted on {}", self.model.name),
            ));
            return Ok(outcome);
        }

        self.interceptors
            .dispatch(InterceptPoint::PreUpdateResultSet, op, None);
        let result = self.iterate(op, query, transform, projector, &mut outcome);

        span.set_counts(
            outcome.matched as u64,
            outcome.updated as u64,
            outcome.failed as u64,
        );
        if self.debug {
            info!(
                entity = %self.model.name,
                matched = outcome.matched,
                updated = outcome.updated,
                failed = outcome.failed,
                "update by query finished"
            );
        }

        match result {
            Ok(()) => Ok(outcome),
            Err(err) => Err(WriteFailure::new(outcome, err)),
        }
    }

    fn iterate(
        &self,
        op: &mut OpContext,
        query: &Query,
        transform: &dyn UpdateTransform,
        projector: &dyn Projector,
        outcome: &mut WriteOutcome,
    ) -> Result<(), InternalError> {
        let error_projector = ErrorProjector::new(&EntityIdentity::resolve(self.model));
        let mut guard = CursorGuard::new(
            self.store.find(self.model.collection(), query)?,
            &self.model.name,
        );
        self.interceptors
            .dispatch(InterceptPoint::PostUpdateResultSet, op, None);

        loop {
            let stored = match guard.next_document() {
                Ok(Some(stored)) => stored,
                Ok(None) => break,
                Err(err) => {
                    guard.close();
                    outcome.matched = guard.yielded();
                    error!(
                        entity = %self.model.name,
                        yielded = guard.yielded(),
                        error = %err,
                        "cursor failed"
                    );
                    return Err(err);
                }
            };
            outcome.matched = guard.yielded();

            if outcome.matched > self.max_result_set_size {
                guard.close();
                op.push_document(DocCtx::new(self.translator.to_json(&stored)));
                return Err(InternalError::executor_unsupported(format!(
                    "result set exceeds {} documents",
                    self.max_result_set_size
                )));
            }

            let index = self.update_one(op, &stored, transform);
            let Some(doc) = op.document_mut(index) else {
                continue;
            };

            if doc.has_errors() {
                outcome.failed += 1;
                let output = error_projector.project(doc);
                doc.set_output(output);
            } else {
                if doc.performed().is_some() {
                    outcome.updated += 1;
                }
                let output = projector.project(doc);
                doc.set_output(output);
            }
        }

        guard.close();

        Ok(())
    }

    // Run one yielded document through the pipeline; returns its index in `op`.
    fn update_one(
        &self,
        op: &mut OpContext,
        stored: &Document,
        transform: &dyn UpdateTransform,
    ) -> usize {
        let original = self.translator.to_json(stored);
        let mut ctx = DocCtx::new(original.clone());
        ctx.set_original(original);
        let index = op.push_document(ctx);

        let Some(doc) = op.document_mut(index) else {
            return index;
        };
        if !transform.apply(doc.document_mut()) {
            debug!(entity = %self.model.name, doc = index, "document unchanged");
            return index;
        }
        derived::update_array_sizes(self.model, doc.document_mut());

        self.dispatch(InterceptPoint::PreUpdateDocValidation, op, index);
        let Some(doc) = op.document_mut(index) else {
            return index;
        };

        let report = self.validator.validate(doc.document());
        for issue in report.issues() {
            doc.add_error(issue.into());
        }

        let denied = doc
            .original()
            .map(|original| {
                self.gate
                    .inaccessible_fields_for_update(doc.document(), original)
            })
            .unwrap_or_default();
        for path in denied {
            doc.add_error(DocError::at(
                ErrorCode::NoFieldUpdateAccess,
                path,
                "no update access",
            ));
        }

        if doc.has_errors() {
            debug!(
                entity = %self.model.name,
                doc = index,
                errors = doc.errors().len(),
                "document rejected"
            );
            return index;
        }

        self.dispatch(InterceptPoint::PreUpdateDoc, op, index);
        let Some(doc) = op.document_mut(index) else {
            return index;
        };

        match self.write(doc, stored) {
            Ok(()) => {
                doc.set_performed(CrudOperation::Update);
                sink::record(MetricsEvent::DocumentWrite {
                    entity: &self.model.name,
                    ok: true,
                });
                self.dispatch(InterceptPoint::PostUpdateDoc, op, index);
            }
            Err(err) => {
                warn!(entity = %self.model.name, doc = index, error = %err, "update failed");
                doc.add_error(err);
                sink::record(MetricsEvent::DocumentWrite {
                    entity: &self.model.name,
                    ok: false,
                });
            }
        }

        index
    }

    // Translate, merge over the stored document and save.
    fn write(&self, doc: &mut DocCtx, stored: &Document) -> Result<(), DocError> {
        let modified = self.translator.to_storage(self.model, doc.document())?;
        let mut merged = DocumentMerger::new(self.model).merge(stored, &modified)?;
        derived::refresh_array_sizes(self.model, &mut merged);
        self.translator
            .populate_hidden_fields(self.model, &mut merged)?;
        if let Some(id) = stored.get(ID_FIELD) {
            merged.insert(ID_FIELD, id.clone());
        }

        let written = self.translator.to_json(&merged);
        self.store
            .save(self.model.collection(), merged, self.write_concern)
            .map_err(|err| {
                DocError::new(ErrorCode::GenericWriteError, format!("update failed: {err}"))
            })?;
        doc.set_document(written);

        Ok(())
    }

    fn dispatch(&self, point: InterceptPoint, op: &OpContext, index: usize) {
        self.interceptors.dispatch(point, op, op.document(index));
    }
}
