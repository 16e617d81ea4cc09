//! Worker context
//!
//! [`WorkerContext`] is the surface the pipeline stages run against: claim
//! work, keep its lease alive, hand it back, capture outputs and report
//! results. [`ShardWorkerContext`] implements it over a [`Backplane`] and a
//! [`ContentAddressableStorage`].

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kiln_config::{KilnConfig, WorkerConfig};
use kiln_core::{
    ActionKey, ActionResult, Digest, DigestUtil, ExecutionPolicy, ExecutionStage, Operation, Platform,
    QueueEntry, QueuedOperation,
};
use kiln_interfaces::{Backplane, ContentAddressableStorage};
use kiln_resilience::{RetryExecutor, RetryPolicy};

use crate::active::ActiveOperations;
use crate::error::Result;
use crate::matcher::{DispatchMatcher, MatchListener};
use crate::outputs::OutputUploader;
use crate::poller::{LeaseStatus, Poller};

/// Deadline given to a freshly created poller before it is resumed
const INITIAL_POLLER_DEADLINE: Duration = Duration::from_secs(10 * 24 * 60 * 60);

/// When content produced by an action is written to the CAS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasInsertionPolicy {
    AlwaysInsert,
    /// Kept inline on the result at or below the inline limit
    InsertAboveLimit,
}

/// Operations and settings available to the worker's pipeline stages
#[async_trait]
pub trait WorkerContext: Send + Sync {
    fn name(&self) -> &str;

    /// Platform advertised for matching, including execution policies
    fn platform(&self) -> &Platform;

    fn get_execution_policy(&self, name: &str) -> Option<&ExecutionPolicy>;

    fn digest_util(&self) -> DigestUtil;

    fn operation_poll_period(&self) -> Duration;

    fn input_fetch_stage_width(&self) -> usize;

    fn execute_stage_width(&self) -> usize;

    fn inline_content_limit(&self) -> usize;

    fn has_default_action_timeout(&self) -> bool;

    fn has_maximum_action_timeout(&self) -> bool;

    fn default_action_timeout(&self) -> Duration;

    fn maximum_action_timeout(&self) -> Duration;

    fn file_cas_policy(&self) -> CasInsertionPolicy;

    fn stdout_cas_policy(&self) -> CasInsertionPolicy;

    fn stderr_cas_policy(&self) -> CasInsertionPolicy;

    fn stream_stdout(&self) -> bool;

    fn stream_stderr(&self) -> bool;

    /// Wait for a unit of work and deliver it to `listener`
    async fn match_operation(&self, listener: &mut dyn MatchListener) -> Result<()>;

    /// A poller renewing `entry`'s lease at `stage`, already running
    fn create_poller(&self, name: &str, entry: &QueueEntry, stage: ExecutionStage) -> Poller;

    /// Re-arm `poller` with a failure callback and absolute deadline
    fn resume_poller(
        &self,
        poller: &Poller,
        name: &str,
        entry: &QueueEntry,
        stage: ExecutionStage,
        on_failure: Box<dyn FnOnce() + Send>,
        deadline: Instant,
    );

    /// Release a claimed operation and tell the backplane it is queued again
    async fn requeue(&self, operation_name: &str);

    /// Release a claimed operation after normal completion
    fn deactivate(&self, operation_name: &str);

    /// Fetch and decode the queued operation an entry refers to
    async fn get_queued_operation(&self, entry: &QueueEntry) -> Result<Option<QueuedOperation>>;

    async fn upload_outputs(
        &self,
        action_digest: &Digest,
        result: &mut ActionResult,
        execution_root: &Path,
        output_files: &[String],
        output_dirs: &[String],
    ) -> Result<()>;

    async fn put_operation(&self, operation: &Operation) -> Result<bool>;

    async fn put_action_result(&self, key: &ActionKey, result: &ActionResult) -> Result<()>;

    async fn blacklist_action(&self, action_id: &str) -> Result<()>;
}

/// Worker context backed by a shared backplane and CAS
pub struct ShardWorkerContext {
    config: WorkerConfig,
    platform: Platform,
    retry_policy: RetryPolicy,
    backplane: Arc<dyn Backplane>,
    cas: Arc<dyn ContentAddressableStorage>,
    active: Arc<ActiveOperations>,
    matcher: DispatchMatcher,
    uploader: OutputUploader,
    digest_util: DigestUtil,
    interrupt: CancellationToken,
}

impl ShardWorkerContext {
    pub fn new(
        config: WorkerConfig,
        retry_policy: RetryPolicy,
        backplane: Arc<dyn Backplane>,
        cas: Arc<dyn ContentAddressableStorage>,
    ) -> Self {
        let digest_util = DigestUtil::new();
        let interrupt = CancellationToken::new();
        let active = Arc::new(ActiveOperations::new());
        let platform = config.platform.with_execution_policies(&config.execution_policies);
        let matcher = DispatchMatcher::new(backplane.clone(), active.clone(), platform.clone());
        let uploader = OutputUploader::new(cas.clone(), digest_util, interrupt.clone())
            .with_write_deadline(config.write_deadline)
            .with_inline_std_output_limit(config.inline_std_output_limit as u64);

        info!(worker = %config.name, platform = %platform, "worker context created");

        Self {
            config,
            platform,
            retry_policy,
            backplane,
            cas,
            active,
            matcher,
            uploader,
            digest_util,
            interrupt,
        }
    }

    pub fn from_config(
        config: &KilnConfig,
        backplane: Arc<dyn Backplane>,
        cas: Arc<dyn ContentAddressableStorage>,
    ) -> Self {
        Self::new(
            config.worker.clone(),
            config.backplane.retry.to_policy(),
            backplane,
            cas,
        )
    }

    pub fn active_operations(&self) -> &Arc<ActiveOperations> {
        &self.active
    }

    /// Token cancelled by [`interrupt`](Self::interrupt)
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    /// Abort matching, fail armed leases and stop output capture
    pub fn interrupt(&self) {
        info!(worker = %self.config.name, "interrupt requested");
        self.interrupt.cancel();
    }

    fn std_output_policy(&self) -> CasInsertionPolicy {
        if self.config.inline_std_output_limit > 0 {
            CasInsertionPolicy::InsertAboveLimit
        } else {
            CasInsertionPolicy::AlwaysInsert
        }
    }

    fn retry_executor(&self) -> RetryExecutor {
        RetryExecutor::new(self.retry_policy.clone())
    }
}

#[async_trait]
impl WorkerContext for ShardWorkerContext {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    fn get_execution_policy(&self, name: &str) -> Option<&ExecutionPolicy> {
        self.config.execution_policies.iter().find(|p| p.name == name)
    }

    fn digest_util(&self) -> DigestUtil {
        self.digest_util
    }

    fn operation_poll_period(&self) -> Duration {
        self.config.operation_poll_period
    }

    fn input_fetch_stage_width(&self) -> usize {
        self.config.input_fetch_stage_width
    }

    fn execute_stage_width(&self) -> usize {
        self.config.execute_stage_width
    }

    fn inline_content_limit(&self) -> usize {
        self.config.inline_content_limit
    }

    fn has_default_action_timeout(&self) -> bool {
        !self.config.default_action_timeout.is_zero()
    }

    fn has_maximum_action_timeout(&self) -> bool {
        !self.config.maximum_action_timeout.is_zero()
    }

    fn default_action_timeout(&self) -> Duration {
        self.config.default_action_timeout
    }

    fn maximum_action_timeout(&self) -> Duration {
        self.config.maximum_action_timeout
    }

    fn file_cas_policy(&self) -> CasInsertionPolicy {
        CasInsertionPolicy::AlwaysInsert
    }

    fn stdout_cas_policy(&self) -> CasInsertionPolicy {
        self.std_output_policy()
    }

    fn stderr_cas_policy(&self) -> CasInsertionPolicy {
        self.std_output_policy()
    }

    fn stream_stdout(&self) -> bool {
        true
    }

    fn stream_stderr(&self) -> bool {
        true
    }

    async fn match_operation(&self, listener: &mut dyn MatchListener) -> Result<()> {
        self.matcher.run(listener, &self.interrupt).await
    }

    fn create_poller(&self, name: &str, entry: &QueueEntry, stage: ExecutionStage) -> Poller {
        let poller = Poller::new(self.config.operation_poll_period, self.interrupt.clone());
        self.resume_poller(
            &poller,
            name,
            entry,
            stage,
            Box::new(|| {}),
            Instant::now() + INITIAL_POLLER_DEADLINE,
        );
        poller
    }

    fn resume_poller(
        &self,
        poller: &Poller,
        name: &str,
        entry: &QueueEntry,
        stage: ExecutionStage,
        on_failure: Box<dyn FnOnce() + Send>,
        deadline: Instant,
    ) {
        let backplane = self.backplane.clone();
        let entry = entry.clone();
        let poll_timeout = self.config.poll_timeout;

        let poll = move || {
            let backplane = backplane.clone();
            let entry = entry.clone();
            async move {
                let renewal = backplane.poll_lease(&entry, stage, poll_timeout);
                match tokio::time::timeout(poll_timeout, renewal).await {
                    Ok(Ok(true)) => LeaseStatus::Renewed,
                    Ok(Ok(false)) => {
                        warn!(
                            operation = %entry.operation_name(),
                            stage = %stage,
                            "lease renewal rejected"
                        );
                        LeaseStatus::Lost
                    }
                    Ok(Err(e)) => {
                        error!(
                            operation = %entry.operation_name(),
                            stage = %stage,
                            error = %e,
                            "lease poll failed"
                        );
                        LeaseStatus::Unreachable
                    }
                    Err(_) => {
                        warn!(
                            operation = %entry.operation_name(),
                            stage = %stage,
                            timeout = ?poll_timeout,
                            "lease poll timed out"
                        );
                        LeaseStatus::Unreachable
                    }
                }
            }
        };

        poller.resume(name, poll, on_failure, deadline);
    }

    async fn requeue(&self, operation_name: &str) {
        self.active.requeue(self.backplane.as_ref(), operation_name).await;
    }

    fn deactivate(&self, operation_name: &str) {
        if self.active.deactivate(operation_name).is_none() {
            debug!(operation = %operation_name, "deactivated operation was not active");
        }
    }

    async fn get_queued_operation(&self, entry: &QueueEntry) -> Result<Option<QueuedOperation>> {
        let digest = &entry.queued_operation_digest;
        let Some(blob) = self.cas.get(digest).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(blob.data()) {
            Ok(queued_operation) => Ok(Some(queued_operation)),
            Err(e) => {
                warn!(
                    operation = %entry.operation_name(),
                    digest = %digest,
                    error = %e,
                    "invalid queued operation"
                );
                Ok(None)
            }
        }
    }

    async fn upload_outputs(
        &self,
        action_digest: &Digest,
        result: &mut ActionResult,
        execution_root: &Path,
        output_files: &[String],
        output_dirs: &[String],
    ) -> Result<()> {
        self.uploader
            .upload_outputs(action_digest, result, execution_root, output_files, output_dirs)
            .await
    }

    async fn put_operation(&self, operation: &Operation) -> Result<bool> {
        let changed = self
            .retry_executor()
            .execute(|| self.backplane.put_operation(operation))
            .await?;

        if operation.done {
            info!(operation = %operation.name, "completed operation");
        }
        Ok(changed)
    }

    async fn put_action_result(&self, key: &ActionKey, result: &ActionResult) -> Result<()> {
        self.retry_executor()
            .execute(|| self.backplane.put_action_result(key, result))
            .await?;
        Ok(())
    }

    async fn blacklist_action(&self, action_id: &str) -> Result<()> {
        self.retry_executor()
            .execute(|| self.backplane.blacklist_action(action_id))
            .await?;
        Ok(())
    }
}
