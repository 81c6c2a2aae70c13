use crate::config::AppConfig;
use crate::core::fetch;
use crate::core::resolver::DateResolver;
use crate::core::transfer::TransferTracker;
use crate::core::transform::ReportRenderer;
use crate::domain::ports::StorageBackend;
use crate::utils::error::{Result, SyncError};
use chrono::Utc;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Name under which the latest processed report is always published.
/// Consumers never need to know the source date.
pub const CANONICAL_REPORT_KEY: &str = "index.html";

/// One storage backend plus the containers the pipeline uses on it.
#[derive(Clone)]
pub struct SyncTarget {
    pub backend: Arc<dyn StorageBackend>,
    pub raw_container: String,
    pub processed_container: String,
}

/// Orchestrates the three pipeline stages across every configured backend.
/// Stages run sequentially per target; a failure on one target is logged
/// and the loop moves on. Only two situations fail a whole run: the initial
/// source download (nothing to distribute) and every target failing.
pub struct SyncPipeline {
    config: AppConfig,
    targets: Vec<SyncTarget>,
    client: Client,
    resolver: DateResolver,
    renderer: ReportRenderer,
}

impl SyncPipeline {
    pub fn new(config: AppConfig, targets: Vec<SyncTarget>) -> Result<Self> {
        // hung transfers are bounded by the transport, not by the pipeline
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let renderer = ReportRenderer::from_config(&config)?;
        Ok(Self {
            resolver: DateResolver::new(client.clone()),
            config,
            targets,
            client,
            renderer,
        })
    }

    /// Resolve the newest dated source file, download it, then fan the raw
    /// artifact out to every configured backend.
    pub async fn ingest(&self) -> Result<PathBuf> {
        let today = Utc::now().date_naive();
        let source = self.resolver.resolve(&self.config.base_url, today).await?;
        tracing::info!(url = %source.url(), date = %source.date(), "resolved source file");

        let local = fetch::download_to(
            &self.client,
            source.url(),
            &self.config.download_dir,
            self.config.output_file.as_deref(),
        )
        .await?;
        let key = local
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| SyncError::Config {
                message: format!("download path {} has no file name", local.display()),
            })?;

        let mut succeeded = 0usize;
        let mut last_error = None;
        for target in &self.targets {
            match self.upload_raw(target, &local, &key).await {
                Ok(()) => succeeded += 1,
                Err(err) => {
                    tracing::error!(
                        backend = target.backend.id(),
                        error = %err,
                        "raw upload failed, continuing with remaining backends"
                    );
                    last_error = Some(err);
                }
            }
        }
        if succeeded == 0 {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(local)
    }

    async fn upload_raw(&self, target: &SyncTarget, local: &Path, key: &str) -> Result<()> {
        target.backend.ensure_container(&target.raw_container).await?;
        let size = tokio::fs::metadata(local).await?.len();
        let tracker = TransferTracker::new(
            format!("{} -> {}/{key}", local.display(), target.raw_container),
            size,
        );
        target
            .backend
            .upload(local, &target.raw_container, key, Some(tracker.sink()))
            .await?;
        tracing::info!(
            backend = target.backend.id(),
            container = %target.raw_container,
            key,
            bytes = tracker.transferred(),
            "raw artifact uploaded"
        );
        Ok(())
    }

    /// Per backend: latest raw object, backend-scoped download, report
    /// rendering, upload under the canonical key.
    pub async fn process(&self) -> Result<()> {
        let mut succeeded = 0usize;
        let mut last_error = None;
        for target in &self.targets {
            match self.process_target(target).await {
                Ok(true) => succeeded += 1,
                Ok(false) => tracing::warn!(
                    backend = target.backend.id(),
                    container = %target.raw_container,
                    "no raw artifact found, skipping backend"
                ),
                Err(err) => {
                    tracing::error!(
                        backend = target.backend.id(),
                        error = %err,
                        "processing failed, continuing with remaining backends"
                    );
                    last_error = Some(err);
                }
            }
        }
        if succeeded == 0 {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(())
    }

    async fn process_target(&self, target: &SyncTarget) -> Result<bool> {
        let backend_id = target.backend.id();
        let Some(latest) = target.backend.latest_object(&target.raw_container).await? else {
            return Ok(false);
        };
        tracing::info!(
            backend = backend_id,
            key = %latest.key,
            modified = %latest.last_modified,
            "found latest raw artifact"
        );

        // cache paths are scoped per backend so concurrent targets never
        // read each other's half-written files
        let raw_path = self.config.download_dir.join(backend_id).join(&latest.key);
        target
            .backend
            .download(&target.raw_container, &latest.key, &raw_path)
            .await?;

        let processed_path = self
            .config
            .processed_dir
            .join(backend_id)
            .join(CANONICAL_REPORT_KEY);
        self.renderer.render_file(&raw_path, &processed_path)?;

        target
            .backend
            .ensure_container(&target.processed_container)
            .await?;
        let size = tokio::fs::metadata(&processed_path).await?.len();
        let tracker = TransferTracker::new(
            format!(
                "{} -> {}/{CANONICAL_REPORT_KEY}",
                processed_path.display(),
                target.processed_container
            ),
            size,
        );
        target
            .backend
            .upload(
                &processed_path,
                &target.processed_container,
                CANONICAL_REPORT_KEY,
                Some(tracker.sink()),
            )
            .await?;
        tracing::info!(
            backend = backend_id,
            container = %target.processed_container,
            bytes = tracker.transferred(),
            "processed report uploaded"
        );
        Ok(true)
    }

    /// Pulls the canonical report from each backend into the serving cache
    /// slot. With several backends the last one wins; at most one scheduled
    /// run is active at a time, so the race is accepted.
    pub async fn publish(&self) -> Result<PathBuf> {
        let slot = self.cache_slot();
        let mut succeeded = 0usize;
        let mut last_error = None;
        for target in &self.targets {
            match target
                .backend
                .download(&target.processed_container, CANONICAL_REPORT_KEY, &slot)
                .await
            {
                Ok(()) => {
                    succeeded += 1;
                    tracing::info!(
                        backend = target.backend.id(),
                        slot = %slot.display(),
                        "published report into cache slot"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        backend = target.backend.id(),
                        error = %err,
                        "publish failed, continuing with remaining backends"
                    );
                    last_error = Some(err);
                }
            }
        }
        if succeeded == 0 {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        Ok(slot)
    }

    /// Local file the presentation layer serves from.
    pub fn cache_slot(&self) -> PathBuf {
        self.config.static_dir.join(CANONICAL_REPORT_KEY)
    }
}
