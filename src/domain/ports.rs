use crate::domain::model::StoredObject;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Incremental byte-count callback threaded through transfer operations.
/// Transport workers may invoke it concurrently, so implementations must be
/// thread safe.
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

/// Capability surface every storage provider implements. The pipeline only
/// talks to this trait; provider selection happens once, at construction.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stable identifier used in logs and for backend-scoped cache paths.
    fn id(&self) -> &str;

    /// Create-if-absent. Must succeed when the container already exists and
    /// fail with `BackendUnavailable` on auth or connectivity errors.
    async fn ensure_container(&self, container: &str) -> Result<()>;

    /// The object with the maximum last-modified timestamp in `container`,
    /// or `None` when the container is empty.
    async fn latest_object(&self, container: &str) -> Result<Option<StoredObject>>;

    /// Streams an object to `destination`, creating intermediate directories
    /// and moving the file into place atomically.
    async fn download(&self, container: &str, key: &str, destination: &Path) -> Result<()>;

    /// Streams a local file to `container` under `key`, reporting byte
    /// deltas to `progress` as chunks complete.
    async fn upload(
        &self,
        local: &Path,
        container: &str,
        key: &str,
        progress: Option<ProgressSink>,
    ) -> Result<()>;
}
