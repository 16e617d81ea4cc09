//! Process-local registry of claimed operations

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

use kiln_core::{ExecutionStage, QueueEntry};
use kiln_interfaces::Backplane;

/// Operations claimed by this process, keyed by operation name
///
/// A name present here is never claimed a second time by the same
/// process. Duplicates across processes are the backplane's concern.
#[derive(Debug, Default)]
pub struct ActiveOperations {
    entries: Mutex<HashMap<String, QueueEntry>>,
}

impl ActiveOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry` unless its operation name is already active.
    ///
    /// Returns `true` when the entry was inserted.
    pub fn insert_if_absent(&self, entry: QueueEntry) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(entry.operation_name()) {
            return false;
        }
        entries.insert(entry.operation_name().to_string(), entry);
        true
    }

    pub fn remove(&self, operation_name: &str) -> Option<QueueEntry> {
        self.entries.lock().remove(operation_name)
    }

    pub fn get(&self, operation_name: &str) -> Option<QueueEntry> {
        self.entries.lock().get(operation_name).cloned()
    }

    pub fn contains(&self, operation_name: &str) -> bool {
        self.entries.lock().contains_key(operation_name)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Release an operation and hand it back to the queue early.
    ///
    /// The backplane is told the unit is QUEUED again so another worker can
    /// claim it before the lease runs out. A failed notification is logged
    /// and swallowed; lease expiry still returns the unit eventually.
    pub async fn requeue(&self, backplane: &dyn Backplane, operation_name: &str) {
        let Some(entry) = self.remove(operation_name) else {
            debug!(operation = %operation_name, "requeue of inactive operation ignored");
            return;
        };

        match backplane
            .poll_lease(&entry, ExecutionStage::Queued, Duration::ZERO)
            .await
        {
            Ok(_) => debug!(operation = %operation_name, "requeued"),
            Err(e) => error!(
                operation = %operation_name,
                error = %e,
                "Failure while trying to fast requeue"
            ),
        }
    }

    /// Release an operation without notifying the backplane
    pub fn deactivate(&self, operation_name: &str) -> Option<QueueEntry> {
        self.remove(operation_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockBackplane;
    use kiln_core::{Digest, Platform};
    use kiln_interfaces::BackplaneError;
    use mockall::predicate::*;

    fn entry(name: &str) -> QueueEntry {
        QueueEntry::new(name, Digest::new("aa", 1), Digest::new("bb", 2), Platform::new())
    }

    #[test]
    fn test_insert_if_absent_keeps_first_entry() {
        let active = ActiveOperations::new();
        assert!(active.insert_if_absent(entry("op-1")));

        let mut duplicate = entry("op-1");
        duplicate.requeue_attempts = 3;
        assert!(!active.insert_if_absent(duplicate));

        assert_eq!(active.len(), 1);
        assert_eq!(active.get("op-1").unwrap().requeue_attempts, 0);
    }

    #[test]
    fn test_concurrent_inserts_admit_one() {
        let active = std::sync::Arc::new(ActiveOperations::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let active = active.clone();
                std::thread::spawn(move || active.insert_if_absent(entry("shared")))
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_requeue_polls_queued_and_removes() {
        let active = ActiveOperations::new();
        active.insert_if_absent(entry("op-1"));

        let mut backplane = MockBackplane::new();
        backplane
            .expect_poll_lease()
            .with(always(), eq(ExecutionStage::Queued), eq(Duration::ZERO))
            .times(1)
            .returning(|_, _, _| Ok(true));

        active.requeue(&backplane, "op-1").await;
        assert!(!active.contains("op-1"));
    }

    #[tokio::test]
    async fn test_requeue_swallows_backplane_failure() {
        let active = ActiveOperations::new();
        active.insert_if_absent(entry("op-1"));

        let mut backplane = MockBackplane::new();
        backplane
            .expect_poll_lease()
            .times(1)
            .returning(|_, _, _| Err(BackplaneError::unavailable("down")));

        active.requeue(&backplane, "op-1").await;
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_requeue_of_unknown_operation_is_a_no_op() {
        let active = ActiveOperations::new();
        let mut backplane = MockBackplane::new();
        backplane.expect_poll_lease().never();

        active.requeue(&backplane, "missing").await;
    }

    #[test]
    fn test_deactivate() {
        let active = ActiveOperations::new();
        active.insert_if_absent(entry("op-1"));
        assert!(active.deactivate("op-1").is_some());
        assert!(active.deactivate("op-1").is_none());
    }
}
