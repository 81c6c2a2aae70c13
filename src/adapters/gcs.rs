use crate::config::GcsConfig;
use crate::core::fetch::{discard_partial, partial_path};
use crate::domain::model::StoredObject;
use crate::domain::ports::{ProgressSink, StorageBackend};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, MultipartUpload, ObjectStore, PutPayload, RetryConfig};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const BACKEND_ID: &str = "gcs";

const MULTIPART_THRESHOLD: u64 = 25 * 1024 * 1024;
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct GcsBackend {
    service_account_path: String,
}

impl GcsBackend {
    /// The service-account file is handed over explicitly instead of being
    /// injected through `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn new(config: &GcsConfig) -> Self {
        Self {
            service_account_path: config.service_account_path.clone(),
        }
    }

    fn store(&self, container: &str) -> Result<GoogleCloudStorage> {
        GoogleCloudStorageBuilder::new()
            .with_bucket_name(container)
            .with_service_account_path(&self.service_account_path)
            .with_retry(RetryConfig {
                max_retries: 5,
                ..RetryConfig::default()
            })
            .with_client_options(
                ClientOptions::new()
                    .with_connect_timeout(Duration::from_secs(10))
                    .with_timeout(Duration::from_secs(300)),
            )
            .build()
            .map_err(|err| self.unavailable(err))
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> SyncError {
        SyncError::BackendUnavailable {
            backend: BACKEND_ID.to_string(),
            message: err.to_string(),
        }
    }

    fn transfer_failed(&self, key: &str, message: impl std::fmt::Display) -> SyncError {
        SyncError::TransferFailed {
            backend: BACKEND_ID.to_string(),
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Drives a multipart session to completion; on any failure the session
    /// is aborted so the provider does not accumulate orphaned uploads.
    async fn upload_chunks(
        &self,
        mut upload: Box<dyn MultipartUpload>,
        local: &Path,
        key: &str,
        progress: Option<&ProgressSink>,
    ) -> Result<()> {
        match self.send_parts(upload.as_mut(), local, key, progress).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Err(abort_err) = upload.abort().await {
                    tracing::warn!(key, error = %abort_err, "failed to abort multipart upload");
                }
                Err(err)
            }
        }
    }

    async fn send_parts(
        &self,
        upload: &mut dyn MultipartUpload,
        local: &Path,
        key: &str,
        progress: Option<&ProgressSink>,
    ) -> Result<()> {
        let mut file = tokio::fs::File::open(local).await?;
        loop {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            let mut filled = 0usize;
            while filled < CHUNK_SIZE {
                let read = file.read(&mut buffer[filled..]).await?;
                if read == 0 {
                    break;
                }
                filled += read;
            }
            buffer.truncate(filled);
            if filled == 0 {
                break;
            }
            upload
                .put_part(PutPayload::from(buffer))
                .await
                .map_err(|err| self.transfer_failed(key, err))?;
            if let Some(progress) = progress {
                progress(filled as u64);
            }
        }
        upload
            .complete()
            .await
            .map_err(|err| self.transfer_failed(key, err))?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    /// `object_store` exposes no bucket-admin API, so this verifies the
    /// bucket is reachable with the given credentials rather than creating
    /// it. Provisioning the bucket itself is an operator step.
    async fn ensure_container(&self, container: &str) -> Result<()> {
        let store = self.store(container)?;
        store
            .list_with_delimiter(None)
            .await
            .map_err(|err| self.unavailable(format!("bucket {container} not reachable: {err}")))?;
        Ok(())
    }

    async fn latest_object(&self, container: &str) -> Result<Option<StoredObject>> {
        let store = self.store(container)?;
        let metas: Vec<object_store::ObjectMeta> = store
            .list(None)
            .try_collect()
            .await
            .map_err(|err| self.unavailable(err))?;

        Ok(StoredObject::latest(metas.into_iter().map(|meta| {
            StoredObject {
                backend_id: BACKEND_ID.to_string(),
                container: container.to_string(),
                key: meta.location.to_string(),
                last_modified: meta.last_modified,
                size: meta.size as u64,
            }
        })))
    }

    async fn download(&self, container: &str, key: &str, destination: &Path) -> Result<()> {
        let store = self.store(container)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = store
            .get(&ObjectPath::from(key))
            .await
            .map_err(|err| self.transfer_failed(key, err))?;

        let partial = partial_path(destination);
        let write = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let mut stream = result.into_stream();
            while let Some(chunk) = stream
                .try_next()
                .await
                .map_err(|err| self.transfer_failed(key, err))?
            {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, SyncError>(())
        };
        if let Err(err) = write.await {
            discard_partial(&partial).await;
            return Err(err);
        }
        tokio::fs::rename(&partial, destination).await?;
        Ok(())
    }

    async fn upload(
        &self,
        local: &Path,
        container: &str,
        key: &str,
        progress: Option<ProgressSink>,
    ) -> Result<()> {
        let store = self.store(container)?;
        let location = ObjectPath::from(key);
        let size = tokio::fs::metadata(local).await?.len();

        if size <= MULTIPART_THRESHOLD {
            let bytes = tokio::fs::read(local).await?;
            store
                .put(&location, PutPayload::from(bytes))
                .await
                .map_err(|err| self.transfer_failed(key, err))?;
            if let Some(progress) = &progress {
                progress(size);
            }
            return Ok(());
        }

        let upload = store
            .put_multipart(&location)
            .await
            .map_err(|err| self.transfer_failed(key, err))?;
        self.upload_chunks(upload, local, key, progress.as_ref())
            .await?;
        tracing::debug!(key, size, "multipart upload complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::{PutResult, UploadPart};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn backend() -> GcsBackend {
        GcsBackend::new(&GcsConfig {
            service_account_path: "/secrets/service-account.json".to_string(),
            raw_bucket: "raw".to_string(),
            processed_bucket: "processed".to_string(),
        })
    }

    fn rejected() -> object_store::Error {
        object_store::Error::Generic {
            store: "gcs",
            source: "rejected".into(),
        }
    }

    #[derive(Debug)]
    struct RejectingUpload {
        aborted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MultipartUpload for RejectingUpload {
        fn put_part(&mut self, _data: PutPayload) -> UploadPart {
            Box::pin(async { Err(rejected()) })
        }

        async fn complete(&mut self) -> object_store::Result<PutResult> {
            Err(rejected())
        }

        async fn abort(&mut self) -> object_store::Result<()> {
            self.aborted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct UncompletableUpload {
        aborted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MultipartUpload for UncompletableUpload {
        fn put_part(&mut self, _data: PutPayload) -> UploadPart {
            Box::pin(async { Ok(()) })
        }

        async fn complete(&mut self) -> object_store::Result<PutResult> {
            Err(rejected())
        }

        async fn abort(&mut self) -> object_store::Result<()> {
            self.aborted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_part_upload_aborts_the_session() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("03-15-2020.csv");
        std::fs::write(&local, b"a,b\n1,2\n").unwrap();
        let aborted = Arc::new(AtomicBool::new(false));
        let upload = Box::new(RejectingUpload {
            aborted: Arc::clone(&aborted),
        });

        let err = backend()
            .upload_chunks(upload, &local, "03-15-2020.csv", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::TransferFailed { .. }), "got {err:?}");
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_completion_aborts_the_session() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("03-15-2020.csv");
        std::fs::write(&local, b"a,b\n1,2\n").unwrap();
        let aborted = Arc::new(AtomicBool::new(false));
        let upload = Box::new(UncompletableUpload {
            aborted: Arc::clone(&aborted),
        });

        let err = backend()
            .upload_chunks(upload, &local, "03-15-2020.csv", None)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::TransferFailed { .. }), "got {err:?}");
        assert!(aborted.load(Ordering::SeqCst));
    }
}
