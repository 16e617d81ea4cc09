//! End-to-end worker cycle tests
//!
//! Drives one unit of work through claim, lease renewal, output capture
//! and completion reporting against the in-memory backplane and CAS.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use kiln_cas::MemoryCas;
use kiln_config::WorkerConfig;
use kiln_core::{
    Action, ActionKey, ActionResult, Blob, Command, DigestUtil, ExecutionStage, Operation, Platform,
    QueueEntry, QueuedOperation, Tree, ViolationType,
};
use kiln_execution::testing::InMemoryBackplane;
use kiln_execution::{ExecutionError, MatchEvent, MatchListener, ShardWorkerContext, WorkerContext};
use kiln_interfaces::ContentAddressableStorage;
use kiln_resilience::RetryPolicy;

/// Listener that takes the first unit offered and accepts idle ticks
#[derive(Default)]
struct TakeFirst {
    events: Vec<MatchEvent>,
    claimed: Option<QueueEntry>,
}

#[async_trait]
impl MatchListener for TakeFirst {
    fn on_event(&mut self, event: MatchEvent) {
        self.events.push(event);
    }

    async fn on_entry(&mut self, entry: Option<QueueEntry>) -> bool {
        self.claimed = entry;
        true
    }
}

struct Worker {
    backplane: Arc<InMemoryBackplane>,
    cas: Arc<MemoryCas>,
    context: ShardWorkerContext,
}

fn worker(cas: MemoryCas) -> Worker {
    let _ = kiln_logging::init_simple_tracing("debug");

    let backplane = Arc::new(InMemoryBackplane::new());
    let cas = Arc::new(cas);
    let config = WorkerConfig {
        name: "cycle-worker".to_string(),
        platform: Platform::new().with_property("os", "linux"),
        ..Default::default()
    };
    let retries = RetryPolicy::exponential(Duration::from_millis(1), Duration::from_millis(10), 2.0, 0.0, 3);
    let context = ShardWorkerContext::new(config, retries, backplane.clone(), cas.clone());
    Worker {
        backplane,
        cas,
        context,
    }
}

/// Store a queued operation in the CAS and enqueue an entry for it
async fn submit(worker: &Worker, name: &str, command: Command) -> Result<QueuedOperation> {
    let util = DigestUtil::new();
    let (command_digest, _) = util.compute_message(&command)?;
    let queued = QueuedOperation {
        action: Action {
            command_digest,
            input_root_digest: util.empty(),
            timeout: None,
            do_not_cache: false,
        },
        command,
        tree: Tree::default(),
    };
    let (action_digest, _) = util.compute_message(&queued.action)?;
    let (queued_digest, encoded) = util.compute_message(&queued)?;
    worker.cas.put(Blob::with_digest(encoded, queued_digest.clone())).await?;

    worker.backplane.enqueue(QueueEntry::new(
        name,
        action_digest,
        queued_digest,
        Platform::new().with_property("os", "linux"),
    ));
    Ok(queued)
}

/// Stand-in for the execute stage: produce one declared output
fn produce_output(root: &Path, relative: &str, content: &[u8]) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[tokio::test]
async fn test_complete_worker_cycle() -> Result<()> {
    let worker = worker(MemoryCas::new());
    submit(
        &worker,
        "operations/compile",
        Command {
            arguments: vec!["cc".into(), "-o".into(), "a.txt".into()],
            output_files: vec!["a.txt".into()],
            output_directories: vec!["out".into()],
            ..Default::default()
        },
    )
    .await?;

    // Claim
    let mut listener = TakeFirst::default();
    worker.context.match_operation(&mut listener).await?;
    let entry = listener.claimed.expect("unit claimed");
    assert_eq!(listener.events, vec![MatchEvent::WaitStart, MatchEvent::WaitEnd]);
    assert!(worker.context.active_operations().contains("operations/compile"));

    // Resolve and lease
    let queued = worker
        .context
        .get_queued_operation(&entry)
        .await?
        .expect("queued operation stored");
    let poller = worker
        .context
        .create_poller("operations/compile", &entry, ExecutionStage::Executing);

    // Execute and capture
    let root = TempDir::new()?;
    produce_output(root.path(), "a.txt", b"0123456789")?;
    produce_output(root.path(), "out/b.txt", b"hello")?;

    let mut result = ActionResult::new(0).with_stdout("compiled 1 file");
    worker
        .context
        .upload_outputs(
            entry.action_digest(),
            &mut result,
            root.path(),
            &queued.command.output_files,
            &queued.command.output_directories,
        )
        .await?;
    poller.pause();

    // Report
    let key = ActionKey::from(entry.action_digest().clone());
    worker.context.put_action_result(&key, &result).await?;
    let operation = Operation::new(entry.operation_name(), ExecutionStage::Executing)
        .with_action_digest(entry.action_digest().clone())
        .complete(result.clone());
    assert!(worker.context.put_operation(&operation).await?);
    worker.context.deactivate(entry.operation_name());

    // Verify what the backplane and CAS now hold
    let util = DigestUtil::new();
    let stored = worker.backplane.action_result(&key).expect("action result stored");
    let a = stored.output_file("a.txt").expect("a.txt captured");
    assert_eq!(a.digest, util.compute(b"0123456789"));
    let a_blob = worker.cas.get(&a.digest).await?.expect("a.txt uploaded");
    assert_eq!(a_blob.data().as_ref(), b"0123456789");

    let out = stored.output_directory("out").expect("out captured");
    let tree_blob = worker.cas.get(&out.tree_digest).await?.expect("tree uploaded");
    let tree: Tree = serde_json::from_slice(tree_blob.data())?;
    assert_eq!(tree.root.files.len(), 1);
    assert_eq!(tree.root.file("b.txt").unwrap().digest, util.compute(b"hello"));

    let stdout_digest = stored.stdout_digest.clone().expect("stdout relocated");
    assert!(stored.stdout_raw.is_empty());
    let stdout = worker.cas.get(&stdout_digest).await?.expect("stdout uploaded");
    assert_eq!(stdout.data().as_ref(), b"compiled 1 file");

    let published = worker.backplane.operation("operations/compile").expect("operation published");
    assert!(published.done);
    assert_eq!(published.result, Some(result));
    assert!(worker.context.active_operations().is_empty());
    assert!(worker.backplane.rejected().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_oversized_output_still_reports_partial_result() -> Result<()> {
    let worker = worker(MemoryCas::with_max_entry_size(2048));
    submit(
        &worker,
        "operations/link",
        Command {
            arguments: vec!["ld".into()],
            output_files: vec!["small.txt".into(), "huge.bin".into()],
            ..Default::default()
        },
    )
    .await?;

    let mut listener = TakeFirst::default();
    worker.context.match_operation(&mut listener).await?;
    let entry = listener.claimed.expect("unit claimed");

    let root = TempDir::new()?;
    let huge = vec![1u8; 8192];
    produce_output(root.path(), "small.txt", b"small")?;
    produce_output(root.path(), "huge.bin", &huge)?;

    let mut result = ActionResult::new(0);
    let outputs = ["small.txt".to_string(), "huge.bin".to_string()];
    let err = worker
        .context
        .upload_outputs(entry.action_digest(), &mut result, root.path(), &outputs, &[])
        .await
        .unwrap_err();

    let (action_digest, failure) = match err {
        ExecutionError::PreconditionFailure { action_digest, failure } => (action_digest, failure),
        other => panic!("expected a precondition failure, got {other}"),
    };
    assert_eq!(&action_digest, entry.action_digest());
    assert_eq!(failure.len(), 1);
    let huge_digest = DigestUtil::new().compute(&huge);
    assert_eq!(failure.violations[0].violation_type, ViolationType::Missing);
    assert_eq!(failure.violations[0].subject, format!("blobs/{}", huge_digest));

    // The small file was captured before the failure surfaced
    let small = result.output_file("small.txt").expect("small.txt captured");
    assert!(worker.cas.contains(&small.digest).await?);
    assert!(!worker.cas.contains(&huge_digest).await?);

    let operation = Operation::new(entry.operation_name(), ExecutionStage::Executing)
        .fail(failure.to_string());
    worker.context.put_operation(&operation).await?;
    worker.context.deactivate(entry.operation_name());

    let published = worker.backplane.operation("operations/link").unwrap();
    assert!(published.done);
    assert!(published.error.unwrap().contains("blobs/"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_lease_survives_transient_failures_until_deadline() -> Result<()> {
    use kiln_interfaces::BackplaneError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    let worker = worker(MemoryCas::new());
    worker.backplane.script_poll(Err(BackplaneError::unavailable("flap")));
    worker.backplane.script_poll(Err(BackplaneError::unavailable("flap")));

    let entry = QueueEntry::new(
        "operations/long",
        DigestUtil::new().compute(b"action"),
        DigestUtil::new().compute(b"queued"),
        Platform::new(),
    );
    let poller = worker
        .context
        .create_poller("operations/long", &entry, ExecutionStage::Executing);

    let failures = Arc::new(AtomicU32::new(0));
    let counter = failures.clone();
    worker.context.resume_poller(
        &poller,
        "operations/long",
        &entry,
        ExecutionStage::Executing,
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
        Instant::now() + Duration::from_millis(2500),
    );

    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert_eq!(worker.backplane.polls().len(), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!poller.is_active());
    Ok(())
}
