use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::codec::encode_nodes;
use crate::storage::StorageAdapter;
use crate::store::SaveUrgency;
use crate::task::{NodeId, TaskNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The snapshot matched what was last written.
    Unchanged,
    Failed,
    NotDue,
}

/// Trailing-edge debounce for persistence. The host calls [`AutoSaver::schedule`]
/// after mutations and [`AutoSaver::flush_if_due`] whenever a timer fires.
#[derive(Debug, Clone)]
pub struct AutoSaver {
    delay: Duration,
    enabled: bool,
    deadline: Option<DateTime<Utc>>,
    last_written: Option<String>,
}

impl AutoSaver {
    pub fn new(delay: Duration, enabled: bool) -> Self {
        Self {
            delay,
            enabled,
            deadline: None,
            last_written: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Records what storage already holds so an identical snapshot is not
    /// rewritten.
    pub fn mark_written(&mut self, nodes: &BTreeMap<NodeId, TaskNode>) {
        self.last_written = encode_nodes(nodes).ok();
    }

    /// Deferred saves are due immediately and are not pushed back by later
    /// debounced mutations. Debounced saves restart the quiet period.
    pub fn schedule(&mut self, urgency: SaveUrgency, now: DateTime<Utc>) {
        if !self.enabled {
            return;
        }
        let next = match urgency {
            SaveUrgency::Deferred => now,
            SaveUrgency::Debounced => match self.deadline {
                Some(existing) if existing <= now => existing,
                _ => now + self.delay,
            },
        };
        trace!(?urgency, deadline = %next, "auto-save scheduled");
        self.deadline = Some(next);
    }

    /// Milliseconds until the pending save is due, for hosts that arm a
    /// timer.
    pub fn millis_until_due(&self, now: DateTime<Utc>) -> Option<u64> {
        self.deadline
            .map(|deadline| (deadline - now).num_milliseconds().max(0) as u64)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    pub fn flush_if_due(
        &mut self,
        adapter: &StorageAdapter,
        nodes: &BTreeMap<NodeId, TaskNode>,
        now: DateTime<Utc>,
    ) -> SaveOutcome {
        if !self.is_due(now) {
            return SaveOutcome::NotDue;
        }
        self.flush(adapter, nodes, now)
    }

    /// Saves right away regardless of the timer; used on unload.
    pub fn flush(
        &mut self,
        adapter: &StorageAdapter,
        nodes: &BTreeMap<NodeId, TaskNode>,
        now: DateTime<Utc>,
    ) -> SaveOutcome {
        self.deadline = None;
        let snapshot = match encode_nodes(nodes) {
            Ok(snapshot) => snapshot,
            Err(_) => return SaveOutcome::Failed,
        };
        if self.last_written.as_deref() == Some(snapshot.as_str()) {
            debug!("auto-save skipped; nothing changed");
            return SaveOutcome::Unchanged;
        }
        if adapter.save(nodes, now) {
            self.last_written = Some(snapshot);
            SaveOutcome::Saved
        } else {
            SaveOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::storage::{MemoryBackend, StorageKeys};
    use crate::store::{NodeDefaults, NodeStore};
    use crate::task::NewNode;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap()
    }

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    #[test]
    fn debounce_restarts_on_each_mutation() {
        let mut saver = AutoSaver::new(ms(3000), true);
        saver.schedule(SaveUrgency::Debounced, t0());
        saver.schedule(SaveUrgency::Debounced, t0() + ms(2000));
        assert!(!saver.is_due(t0() + ms(3500)));
        assert!(saver.is_due(t0() + ms(5000)));
        assert_eq!(saver.millis_until_due(t0() + ms(4000)), Some(1000));
    }

    #[test]
    fn deferred_save_is_not_pushed_back() {
        let mut saver = AutoSaver::new(ms(3000), true);
        saver.schedule(SaveUrgency::Deferred, t0());
        saver.schedule(SaveUrgency::Debounced, t0());
        assert!(saver.is_due(t0()));
    }

    #[test]
    fn disabled_saver_never_schedules() {
        let mut saver = AutoSaver::new(ms(3000), false);
        saver.schedule(SaveUrgency::Deferred, t0());
        assert!(!saver.is_pending());
    }

    #[test]
    fn flush_skips_unchanged_snapshots() {
        let backend = MemoryBackend::new("memory");
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(backend);
        let mut store = NodeStore::new(NodeDefaults::default());
        store.create(NewNode::titled("a"));

        let mut saver = AutoSaver::new(ms(3000), true);
        assert_eq!(saver.flush_if_due(&adapter, store.nodes(), t0()), SaveOutcome::NotDue);

        saver.schedule(SaveUrgency::Deferred, t0());
        assert_eq!(saver.flush_if_due(&adapter, store.nodes(), t0()), SaveOutcome::Saved);
        assert!(!saver.is_pending());

        saver.schedule(SaveUrgency::Deferred, t0());
        assert_eq!(saver.flush_if_due(&adapter, store.nodes(), t0()), SaveOutcome::Unchanged);
    }

    #[test]
    fn failed_save_reports_failure() {
        let backend = MemoryBackend::new("memory");
        backend.set_blocked(true);
        let adapter = StorageAdapter::new(StorageKeys::default()).with_backend(backend);
        let mut saver = AutoSaver::new(ms(3000), true);
        assert_eq!(saver.flush(&adapter, &BTreeMap::new(), t0()), SaveOutcome::Failed);
    }
}
