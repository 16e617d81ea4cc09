//! Scripted in-memory backplane

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use kiln_core::{ActionKey, ActionResult, ExecutionStage, Operation, QueueEntry};
use kiln_interfaces::{Backplane, BackplaneError, BackplaneResult};

/// One recorded lease poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasePoll {
    pub operation_name: String,
    pub stage: ExecutionStage,
    pub extend_by: Duration,
}

/// Backplane fake that serves a local queue and records every call.
///
/// Failures can be scripted per call family; scripted errors are consumed
/// in order before normal behavior resumes. Rejected entries are recorded
/// but not re-queued so a matcher under test does not see them again.
#[derive(Debug, Default)]
pub struct InMemoryBackplane {
    queue: Mutex<VecDeque<QueueEntry>>,
    dispatch_failures: Mutex<VecDeque<BackplaneError>>,
    poll_script: Mutex<VecDeque<BackplaneResult<bool>>>,
    mutation_failures: Mutex<VecDeque<BackplaneError>>,
    rejected: Mutex<Vec<QueueEntry>>,
    polls: Mutex<Vec<LeasePoll>>,
    operations: Mutex<HashMap<String, Operation>>,
    action_results: Mutex<HashMap<ActionKey, ActionResult>>,
    blacklisted: Mutex<Vec<String>>,
    mutation_calls: Mutex<u32>,
}

impl InMemoryBackplane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, entry: QueueEntry) {
        self.queue.lock().push_back(entry);
    }

    pub fn fail_next_dispatch(&self, error: BackplaneError) {
        self.dispatch_failures.lock().push_back(error);
    }

    /// Queue a result for an upcoming lease poll; unscripted polls succeed
    pub fn script_poll(&self, result: BackplaneResult<bool>) {
        self.poll_script.lock().push_back(result);
    }

    /// Fail the next put/blacklist call
    pub fn fail_next_mutation(&self, error: BackplaneError) {
        self.mutation_failures.lock().push_back(error);
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn rejected(&self) -> Vec<QueueEntry> {
        self.rejected.lock().clone()
    }

    pub fn polls(&self) -> Vec<LeasePoll> {
        self.polls.lock().clone()
    }

    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.operations.lock().get(name).cloned()
    }

    pub fn action_result(&self, key: &ActionKey) -> Option<ActionResult> {
        self.action_results.lock().get(key).cloned()
    }

    pub fn blacklisted(&self) -> Vec<String> {
        self.blacklisted.lock().clone()
    }

    /// Total put/blacklist attempts, including failed ones
    pub fn mutation_calls(&self) -> u32 {
        *self.mutation_calls.lock()
    }

    fn next_mutation(&self) -> BackplaneResult<()> {
        *self.mutation_calls.lock() += 1;
        match self.mutation_failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backplane for InMemoryBackplane {
    async fn dispatch_operation(&self) -> BackplaneResult<Option<QueueEntry>> {
        if let Some(error) = self.dispatch_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.queue.lock().pop_front())
    }

    async fn reject_operation(&self, entry: &QueueEntry) -> BackplaneResult<()> {
        self.rejected.lock().push(entry.clone());
        Ok(())
    }

    async fn poll_lease(
        &self,
        entry: &QueueEntry,
        stage: ExecutionStage,
        extend_by: Duration,
    ) -> BackplaneResult<bool> {
        self.polls.lock().push(LeasePoll {
            operation_name: entry.operation_name().to_string(),
            stage,
            extend_by,
        });
        self.poll_script.lock().pop_front().unwrap_or(Ok(true))
    }

    async fn blacklist_action(&self, action_id: &str) -> BackplaneResult<()> {
        self.next_mutation()?;
        self.blacklisted.lock().push(action_id.to_string());
        Ok(())
    }

    async fn put_operation(&self, operation: &Operation) -> BackplaneResult<bool> {
        self.next_mutation()?;
        self.operations
            .lock()
            .insert(operation.name.clone(), operation.clone());
        Ok(true)
    }

    async fn put_action_result(&self, key: &ActionKey, result: &ActionResult) -> BackplaneResult<()> {
        self.next_mutation()?;
        self.action_results.lock().insert(key.clone(), result.clone());
        Ok(())
    }
}
