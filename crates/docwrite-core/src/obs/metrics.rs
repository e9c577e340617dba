use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for write operations.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
    pub since_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            entities: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Executor entrypoints
    pub save_calls: u64,
    pub insert_calls: u64,
    pub update_calls: u64,

    // Store round trips
    pub lookups: u64,
    pub lookup_docs_found: u64,
    pub bulk_writes: u64,
    pub bulk_items: u64,
    pub bulk_item_failures: u64,
    pub document_writes: u64,
    pub document_write_failures: u64,
    pub cursors_closed: u64,
    pub docs_yielded: u64,

    // Outcomes
    pub docs_matched: u64,
    pub docs_written: u64,
    pub docs_failed: u64,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntityCounters {
    pub save_calls: u64,
    pub insert_calls: u64,
    pub update_calls: u64,
    pub lookups: u64,
    pub bulk_writes: u64,
    pub docs_matched: u64,
    pub docs_written: u64,
    pub docs_failed: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all counters.
pub fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `since_ms`.
    pub counters: Option<EventState>,
    /// Per-entity counters with failure ratios.
    pub entity_counters: Vec<EntitySummary>,
}

///
/// EntitySummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub calls: u64,
    pub docs_matched: u64,
    pub docs_written: u64,
    pub docs_failed: u64,
    pub failure_ratio: f64,
}

/// Build a metrics report from the in-memory counters.
///
/// Entities are ordered by failure ratio (highest first), then by name.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let mut entity_counters: Vec<EntitySummary> = snap
        .entities
        .iter()
        .map(|(name, c)| {
            let attempted = c.docs_written + c.docs_failed;
            let failure_ratio = if attempted > 0 {
                c.docs_failed as f64 / attempted as f64
            } else {
                0.0
            };

            EntitySummary {
                name: name.clone(),
                calls: c.save_calls + c.insert_calls + c.update_calls,
                docs_matched: c.docs_matched,
                docs_written: c.docs_written,
                docs_failed: c.docs_failed,
                failure_ratio,
            }
        })
        .collect();

    entity_counters.sort_by(|a, b| {
        b.failure_ratio
            .total_cmp(&a.failure_ratio)
            .then_with(|| a.name.cmp(&b.name))
    });

    EventReport {
        counters: Some(snap),
        entity_counters,
    }
}

///
/// TESTS
///

#[cfg(test)]
#[expect(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.ops.save_calls = 3;
            m.ops.bulk_writes = 2;
            m.entities.insert(
                "alpha".to_string(),
                EntityCounters {
                    save_calls: 1,
                    ..Default::default()
                },
            );
        });

        reset_all();

        with_state(|m| {
            assert_eq!(m.ops.save_calls, 0);
            assert_eq!(m.ops.bulk_writes, 0);
            assert!(m.entities.is_empty());
        });
    }

    #[test]
    fn report_sorts_entities_by_failure_ratio() {
        reset_all();
        with_state_mut(|m| {
            m.entities.insert(
                "alpha".to_string(),
                EntityCounters {
                    docs_written: 3,
                    docs_failed: 1,
                    ..Default::default()
                },
            );
            m.entities.insert(
                "beta".to_string(),
                EntityCounters {
                    docs_written: 1,
                    docs_failed: 1,
                    ..Default::default()
                },
            );
            m.entities.insert(
                "gamma".to_string(),
                EntityCounters {
                    docs_written: 6,
                    docs_failed: 2,
                    ..Default::default()
                },
            );
        });

        let report = report();
        let names: Vec<_> = report
            .entity_counters
            .iter()
            .map(|e| e.name.as_str())
            .collect();

        assert_eq!(names, ["beta", "alpha", "gamma"]);
        assert_eq!(report.entity_counters[0].failure_ratio, 0.5);
        assert_eq!(report.entity_counters[1].failure_ratio, 0.25);
    }
}
