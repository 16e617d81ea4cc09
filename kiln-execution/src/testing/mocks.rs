//! Mock implementations of the worker's collaborators using mockall

use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use kiln_core::{ActionKey, ActionResult, Blob, Digest, ExecutionStage, Operation, QueueEntry};
use kiln_interfaces::{
    Backplane, BackplaneResult, CasResult, ContentAddressableStorage, Write, WriteOutput,
};

mock! {
    pub Backplane {}

    #[async_trait]
    impl Backplane for Backplane {
        async fn dispatch_operation(&self) -> BackplaneResult<Option<QueueEntry>>;
        async fn reject_operation(&self, entry: &QueueEntry) -> BackplaneResult<()>;
        async fn poll_lease(
            &self,
            entry: &QueueEntry,
            stage: ExecutionStage,
            extend_by: Duration,
        ) -> BackplaneResult<bool>;
        async fn blacklist_action(&self, action_id: &str) -> BackplaneResult<()>;
        async fn put_operation(&self, operation: &Operation) -> BackplaneResult<bool>;
        async fn put_action_result(&self, key: &ActionKey, result: &ActionResult) -> BackplaneResult<()>;
    }
}

mock! {
    pub Cas {}

    #[async_trait]
    impl ContentAddressableStorage for Cas {
        async fn contains(&self, digest: &Digest) -> CasResult<bool>;
        async fn find_missing_blobs(&self, digests: &[Digest]) -> CasResult<Vec<Digest>>;
        async fn get(&self, digest: &Digest) -> CasResult<Option<Blob>>;
        async fn put(&self, blob: Blob) -> CasResult<()>;
        async fn get_write(&self, digest: &Digest, session_id: Uuid) -> CasResult<Arc<dyn Write>>;
    }
}

mock! {
    pub Write {}

    #[async_trait]
    impl Write for Write {
        fn digest(&self) -> &Digest;
        fn committed_size(&self) -> u64;
        fn is_complete(&self) -> bool;
        fn completion(&self) -> watch::Receiver<bool>;
        async fn get_output(&self, deadline: Duration) -> CasResult<WriteOutput>;
        fn reset(&self);
    }
}
