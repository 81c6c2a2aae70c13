use crate::config::S3Config;
use crate::core::fetch::{discard_partial, partial_path};
use crate::domain::model::StoredObject;
use crate::domain::ports::{ProgressSink, StorageBackend};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const BACKEND_ID: &str = "s3";

/// Files above this size go through multipart upload so memory stays
/// bounded and individual parts can be retried.
const MULTIPART_THRESHOLD: u64 = 25 * 1024 * 1024;
const PART_SIZE: usize = 8 * 1024 * 1024;
const PART_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    region: String,
}

impl S3Backend {
    /// Credentials come in explicitly; the backend never reads or mutates
    /// process environment.
    pub fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "report-sync",
        );
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::standard().with_max_attempts(5))
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(Duration::from_secs(10))
                    .operation_attempt_timeout(Duration::from_secs(120))
                    .build(),
            )
            .build();
        Self {
            client: Client::from_conf(sdk_config),
            region: config.region.clone(),
        }
    }

    fn transfer_failed(&self, key: &str, message: impl std::fmt::Display) -> SyncError {
        SyncError::TransferFailed {
            backend: BACKEND_ID.to_string(),
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    async fn upload_whole(
        &self,
        local: &Path,
        container: &str,
        key: &str,
        size: u64,
        progress: Option<&ProgressSink>,
    ) -> Result<()> {
        let body = ByteStream::from_path(local)
            .await
            .map_err(|err| self.transfer_failed(key, err))?;
        self.client
            .put_object()
            .bucket(container)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| self.transfer_failed(key, err))?;
        // reported once, after the object landed, so SDK-internal retries
        // can never double-count
        if let Some(progress) = progress {
            progress(size);
        }
        Ok(())
    }

    async fn upload_multipart(
        &self,
        local: &Path,
        container: &str,
        key: &str,
        size: u64,
        progress: Option<&ProgressSink>,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|err| self.transfer_failed(key, err))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| self.transfer_failed(key, "missing multipart upload id"))?
            .to_string();

        let mut file = tokio::fs::File::open(local).await?;
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;
        loop {
            let mut buffer = vec![0u8; PART_SIZE];
            let mut filled = 0usize;
            while filled < PART_SIZE {
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

            match self
                .upload_part(container, key, &upload_id, part_number, buffer)
                .await
            {
                Ok(e_tag) => {
                    if let Some(progress) = progress {
                        progress(filled as u64);
                    }
                    parts.push(
                        CompletedPart::builder()
                            .set_e_tag(e_tag)
                            .part_number(part_number)
                            .build(),
                    );
                    part_number += 1;
                }
                Err(err) => {
                    self.abort_multipart(container, key, &upload_id).await;
                    return Err(err);
                }
            }
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(container)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| self.transfer_failed(key, err))?;
        tracing::debug!(key, size, "multipart upload complete");
        Ok(())
    }

    /// One part, retried up to a bounded attempt count. The caller reports
    /// progress only after success, so retries never double-count bytes.
    async fn upload_part(
        &self,
        container: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<Option<String>> {
        let mut last_error = None;
        for attempt in 1..=PART_ATTEMPTS {
            let request = self
                .client
                .upload_part()
                .bucket(container)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data.clone()));
            match request.send().await {
                Ok(response) => return Ok(response.e_tag),
                Err(err) => {
                    tracing::warn!(part_number, attempt, error = %err, "part upload failed");
                    last_error = Some(err.to_string());
                }
            }
        }
        Err(self.transfer_failed(
            key,
            last_error.unwrap_or_else(|| "part upload failed".to_string()),
        ))
    }

    async fn abort_multipart(&self, container: &str, key: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(container)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(key, error = %err, "failed to abort multipart upload");
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    async fn ensure_container(&self, container: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(container);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_bucket_already_owned_by_you() || service.is_bucket_already_exists() {
                    Ok(())
                } else {
                    Err(SyncError::BackendUnavailable {
                        backend: BACKEND_ID.to_string(),
                        message: service.to_string(),
                    })
                }
            }
        }
    }

    async fn latest_object(&self, container: &str) -> Result<Option<StoredObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(container)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| SyncError::BackendUnavailable {
                backend: BACKEND_ID.to_string(),
                message: err.to_string(),
            })?;
            for object in page.contents() {
                let (Some(key), Some(modified)) = (object.key(), object.last_modified()) else {
                    continue;
                };
                let Some(last_modified) =
                    chrono::DateTime::from_timestamp(modified.secs(), modified.subsec_nanos())
                else {
                    continue;
                };
                objects.push(StoredObject {
                    backend_id: BACKEND_ID.to_string(),
                    container: container.to_string(),
                    key: key.to_string(),
                    last_modified,
                    size: object.size().unwrap_or(0) as u64,
                });
            }
        }
        Ok(StoredObject::latest(objects))
    }

    async fn download(&self, container: &str, key: &str, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let response = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|err| self.transfer_failed(key, err))?;

        let partial = partial_path(destination);
        let write = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let mut body = response.body;
            while let Some(chunk) = body
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
        let size = tokio::fs::metadata(local).await?.len();
        if size > MULTIPART_THRESHOLD {
            self.upload_multipart(local, container, key, size, progress.as_ref())
                .await
        } else {
            self.upload_whole(local, container, key, size, progress.as_ref())
                .await
        }
    }
}
