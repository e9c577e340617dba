//! Metrics sink boundary.
//!
//! Executors never touch `obs::metrics` directly; all instrumentation flows
//! through [`MetricsEvent`] and [`MetricsSink`].

use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Save,
    Insert,
    UpdateByQuery,
}

///
/// BulkKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BulkKind {
    Insert,
    Replace,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    ExecStart {
        kind: ExecKind,
        entity: &'a str,
    },
    ExecFinish {
        kind: ExecKind,
        entity: &'a str,
        matched: u64,
        written: u64,
        failed: u64,
    },
    Lookup {
        entity: &'a str,
        requested: u64,
        found: u64,
    },
    BulkWrite {
        entity: &'a str,
        kind: BulkKind,
        attempted: u64,
        failed: u64,
    },
    DocumentWrite {
        entity: &'a str,
        ok: bool,
    },
    CursorClosed {
        entity: &'a str,
        yielded: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink writing into the thread-local metrics state.
/// Used whenever no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::ExecStart { kind, entity } => {
                metrics::with_state_mut(|m| {
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    match kind {
                        ExecKind::Save => {
                            m.ops.save_calls = m.ops.save_calls.saturating_add(1);
                            entry.save_calls = entry.save_calls.saturating_add(1);
                        }
                        ExecKind::Insert => {
                            m.ops.insert_calls = m.ops.insert_calls.saturating_add(1);
                            entry.insert_calls = entry.insert_calls.saturating_add(1);
                        }
                        ExecKind::UpdateByQuery => {
                            m.ops.update_calls = m.ops.update_calls.saturating_add(1);
                            entry.update_calls = entry.update_calls.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::ExecFinish {
                entity,
                matched,
                written,
                failed,
                ..
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.docs_matched = m.ops.docs_matched.saturating_add(matched);
                    m.ops.docs_written = m.ops.docs_written.saturating_add(written);
                    m.ops.docs_failed = m.ops.docs_failed.saturating_add(failed);

                    let entry = m.entities.entry(entity.to_string()).or_default();
                    entry.docs_matched = entry.docs_matched.saturating_add(matched);
                    entry.docs_written = entry.docs_written.saturating_add(written);
                    entry.docs_failed = entry.docs_failed.saturating_add(failed);
                });
            }

            MetricsEvent::Lookup { entity, found, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.lookups = m.ops.lookups.saturating_add(1);
                    m.ops.lookup_docs_found = m.ops.lookup_docs_found.saturating_add(found);
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    entry.lookups = entry.lookups.saturating_add(1);
                });
            }

            MetricsEvent::BulkWrite {
                entity,
                attempted,
                failed,
                ..
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.bulk_writes = m.ops.bulk_writes.saturating_add(1);
                    m.ops.bulk_items = m.ops.bulk_items.saturating_add(attempted);
                    m.ops.bulk_item_failures = m.ops.bulk_item_failures.saturating_add(failed);
                    let entry = m.entities.entry(entity.to_string()).or_default();
                    entry.bulk_writes = entry.bulk_writes.saturating_add(1);
                });
            }

            MetricsEvent::DocumentWrite { ok, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.document_writes = m.ops.document_writes.saturating_add(1);
                    if !ok {
                        m.ops.document_write_failures =
                            m.ops.document_write_failures.saturating_add(1);
                    }
                });
            }

            MetricsEvent::CursorClosed { yielded, .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.cursors_closed = m.ops.cursors_closed.saturating_add(1);
                    m.ops.docs_yielded = m.ops.docs_yielded.saturating_add(yielded);
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
///
/// The previous sink is restored on every exit, including unwind.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// Span
/// RAII guard emitting start/finish events for one executor call.
/// Finish accounting happens even on early return or unwind.
///

pub(crate) struct Span {
    kind: ExecKind,
    entity: String,
    matched: u64,
    written: u64,
    failed: u64,
}

impl Span {
    #[must_use]
    pub(crate) fn new(kind: ExecKind, entity: &str) -> Self {
        record(MetricsEvent::ExecStart { kind, entity });

        Self {
            kind,
            entity: entity.to_string(),
            matched: 0,
            written: 0,
            failed: 0,
        }
    }

    pub(crate) const fn set_counts(&mut self, matched: u64, written: u64, failed: u64) {
        self.matched = matched;
        self.written = written;
        self.failed = failed;
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        record(MetricsEvent::ExecFinish {
            kind: self.kind,
            entity: &self.entity,
            matched: self.matched,
            written: self.written,
            failed: self.failed,
        });
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::Cell,
        panic::{AssertUnwindSafe, catch_unwind},
    };

    #[derive(Default)]
    struct CountingSink {
        calls: Cell<usize>,
    }

    impl MetricsSink for CountingSink {
        fn record(&self, _: MetricsEvent<'_>) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    fn lookup() -> MetricsEvent<'static> {
        MetricsEvent::Lookup {
            entity: "obs::tests",
            requested: 1,
            found: 1,
        }
    }

    #[test]
    fn with_metrics_sink_routes_and_restores_nested_overrides() {
        let outer = Rc::new(CountingSink::default());
        let inner = Rc::new(CountingSink::default());

        with_metrics_sink(outer.clone(), || {
            record(lookup());
            assert_eq!(outer.calls.get(), 1);

            with_metrics_sink(inner.clone(), || record(lookup()));

            // inner override restored to outer
            record(lookup());
        });

        assert_eq!(outer.calls.get(), 2);
        assert_eq!(inner.calls.get(), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none()));
    }

    #[test]
    fn with_metrics_sink_restores_override_on_panic() {
        let sink = Rc::new(CountingSink::default());

        let panicked = catch_unwind(AssertUnwindSafe(|| {
            with_metrics_sink(sink.clone(), || {
                record(lookup());
                panic!("intentional panic for guard test");
            });
        }))
        .is_err();

        assert!(panicked);
        assert_eq!(sink.calls.get(), 1);
        SINK_OVERRIDE.with(|cell| assert!(cell.borrow().is_none()));
    }

    #[test]
    fn span_emits_start_and_finish() {
        metrics_reset_all();
        {
            let mut span = Span::new(ExecKind::Save, "obs::tests");
            span.set_counts(3, 2, 1);
        }

        let counters = metrics_report().counters.unwrap();
        assert_eq!(counters.ops.save_calls, 1);
        assert_eq!(counters.ops.docs_matched, 3);
        assert_eq!(counters.ops.docs_written, 2);
        assert_eq!(counters.ops.docs_failed, 1);
        assert_eq!(counters.entities["obs::tests"].save_calls, 1);
    }

    #[test]
    fn bulk_and_cursor_events_accumulate() {
        metrics_reset_all();

        record(MetricsEvent::BulkWrite {
            entity: "obs::tests",
            kind: BulkKind::Insert,
            attempted: 5,
            failed: 2,
        });
        record(MetricsEvent::CursorClosed {
            entity: "obs::tests",
            yielded: 4,
        });

        let counters = metrics_report().counters.unwrap();
        assert_eq!(counters.ops.bulk_writes, 1);
        assert_eq!(counters.ops.bulk_items, 5);
        assert_eq!(counters.ops.bulk_item_failures, 2);
        assert_eq!(counters.ops.cursors_closed, 1);
        assert_eq!(counters.ops.docs_yielded, 4);
    }
}
