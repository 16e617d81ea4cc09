//! Building a worker context from loaded configuration

use anyhow::Result;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

use kiln_cas::MemoryCas;
use kiln_config::{ConfigLoader, KilnConfig};
use kiln_execution::testing::InMemoryBackplane;
use kiln_execution::{ShardWorkerContext, WorkerContext};
use kiln_interfaces::BackplaneError;

const WORKER_YAML: &str = r#"
worker:
  name: gpu-worker-7
  platform:
    properties:
      - name: os
        value: linux
      - name: pool
        value: gpu
  execution_policies:
    - name: sandbox
      wrapper:
        path: /usr/bin/sandbox
        arguments: ["--net=none"]
  operation_poll_period: 250
  poll_timeout: 10
  default_action_timeout: 600
  maximum_action_timeout: 3600
backplane:
  retry:
    initial_delay_ms: 1
    max_delay_ms: 2
    max_attempts: 4
logging:
  level: debug
  format: json
"#;

fn write_config(content: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

fn context(config: &KilnConfig, backplane: Arc<InMemoryBackplane>) -> ShardWorkerContext {
    ShardWorkerContext::from_config(
        config,
        backplane,
        Arc::new(MemoryCas::with_max_entry_size(config.cas.max_entry_size_bytes)),
    )
}

#[test]
fn test_yaml_configures_worker_context() -> Result<()> {
    let file = write_config(WORKER_YAML)?;
    let config = temp_env::with_vars_unset(
        ["KILN_WORKER_NAME", "KILN_POLL_PERIOD_MS", "KILN_RETRY_MAX_ATTEMPTS"],
        || ConfigLoader::new().from_file(file.path()),
    )?;
    kiln_logging::init_logging_from_config(&config.logging)?;

    let context = context(&config, Arc::new(InMemoryBackplane::new()));
    assert_eq!(context.name(), "gpu-worker-7");
    assert!(context.platform().contains("pool", "gpu"));
    assert!(context.platform().contains("execution-policy", "sandbox"));
    assert!(context.get_execution_policy("sandbox").is_some());
    assert_eq!(context.operation_poll_period(), Duration::from_millis(250));
    assert!(context.has_default_action_timeout());
    assert_eq!(context.maximum_action_timeout(), Duration::from_secs(3600));
    Ok(())
}

#[test]
fn test_environment_overrides_file() -> Result<()> {
    let file = write_config(WORKER_YAML)?;
    let config = temp_env::with_vars(
        [
            ("KILN_WORKER_NAME", Some("override-worker")),
            ("KILN_POLL_PERIOD_MS", Some("50")),
        ],
        || ConfigLoader::new().from_file(file.path()),
    )?;

    assert_eq!(config.worker.name, "override-worker");
    assert_eq!(config.worker.operation_poll_period, Duration::from_millis(50));
    Ok(())
}

#[test]
fn test_invalid_retry_settings_rejected() -> Result<()> {
    let file = write_config("backplane:\n  retry:\n    jitter: 1.5\n")?;
    let result = temp_env::with_vars_unset(["KILN_RETRY_MAX_ATTEMPTS"], || {
        ConfigLoader::new().from_file(file.path())
    });
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_configured_retry_budget_applies_to_mutations() -> Result<()> {
    let file = write_config(WORKER_YAML)?;
    let config = temp_env::with_vars_unset(["KILN_RETRY_MAX_ATTEMPTS"], || {
        ConfigLoader::new().from_file(file.path())
    })?;

    let backplane = Arc::new(InMemoryBackplane::new());
    for _ in 0..4 {
        backplane.fail_next_mutation(BackplaneError::unavailable("down"));
    }
    let context = context(&config, backplane.clone());

    assert!(context.blacklist_action("action-1").await.is_err());
    assert_eq!(backplane.mutation_calls(), 4);

    context.blacklist_action("action-1").await?;
    assert_eq!(backplane.blacklisted(), vec!["action-1".to_string()]);
    Ok(())
}
