// Adapters layer: one concrete StorageBackend per provider kind.

pub mod gcs;
pub mod s3;

use crate::config::{AppConfig, ProviderKind};
use crate::core::pipeline::SyncTarget;
use crate::utils::error::{Result, SyncError};
use std::sync::Arc;

/// Builds one sync target per configured provider, in configuration order.
/// Runs before any network I/O; an incomplete provider section is fatal.
pub fn build_targets(config: &AppConfig) -> Result<Vec<SyncTarget>> {
    let mut targets = Vec::with_capacity(config.providers.len());
    for kind in &config.providers {
        let target = match kind {
            ProviderKind::S3 => {
                let s3 = config.s3.as_ref().ok_or_else(|| missing(kind))?;
                SyncTarget {
                    backend: Arc::new(s3::S3Backend::new(s3)),
                    raw_container: s3.raw_bucket.clone(),
                    processed_container: s3.processed_bucket.clone(),
                }
            }
            ProviderKind::Gcs => {
                let gcs = config.gcs.as_ref().ok_or_else(|| missing(kind))?;
                SyncTarget {
                    backend: Arc::new(gcs::GcsBackend::new(gcs)),
                    raw_container: gcs.raw_bucket.clone(),
                    processed_container: gcs.processed_bucket.clone(),
                }
            }
        };
        targets.push(target);
    }
    Ok(targets)
}

fn missing(kind: &ProviderKind) -> SyncError {
    SyncError::Config {
        message: format!("provider {} selected but its settings are missing", kind.as_str()),
    }
}
