pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;
pub mod web;

pub use config::{AppConfig, ProviderKind};
pub use core::pipeline::{SyncPipeline, SyncTarget, CANONICAL_REPORT_KEY};
pub use core::resolver::DateResolver;
pub use core::transfer::TransferTracker;
pub use core::transform::ReportRenderer;
pub use domain::model::{SourceReference, StoredObject};
pub use domain::ports::{ProgressSink, StorageBackend};
pub use utils::error::{Result, SyncError};
