use crate::utils::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Storage provider kinds the pipeline knows how to construct. Selection is
/// a tagged enum so orchestration code never matches on provider strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    S3,
    Gcs,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "s3" => Ok(ProviderKind::S3),
            "gcp" | "gcs" => Ok(ProviderKind::Gcs),
            other => Err(SyncError::Config {
                message: format!("unknown storage provider {other:?} (expected s3 or gcp)"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::S3 => "s3",
            ProviderKind::Gcs => "gcs",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub raw_bucket: String,
    pub processed_bucket: String,
}

#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Service-account JSON file, passed explicitly to the backend
    /// constructor rather than injected through process environment.
    pub service_account_path: String,
    pub raw_bucket: String,
    pub processed_bucket: String,
}

/// Process-wide configuration, read once from the environment at startup
/// and immutable afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub providers: Vec<ProviderKind>,
    pub s3: Option<S3Config>,
    pub gcs: Option<GcsConfig>,
    pub base_url: String,
    pub download_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub static_dir: PathBuf,
    pub output_file: Option<String>,
    pub report_column: String,
    pub report_category: String,
    pub template_path: Option<PathBuf>,
    pub port: u16,
    pub sync_interval_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an injectable lookup so tests never have
    /// to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let providers = required(&lookup, "STORAGE_PROVIDER")?
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ProviderKind::parse)
            .collect::<Result<Vec<_>>>()?;
        if providers.is_empty() {
            return Err(SyncError::Config {
                message: "STORAGE_PROVIDER must name at least one provider".to_string(),
            });
        }

        let base_url = required(&lookup, "BASE_URL")?;
        validate_http_url("BASE_URL", &base_url)?;

        let s3 = if providers.contains(&ProviderKind::S3) {
            let config = S3Config {
                access_key: required(&lookup, "S3_ACCESS_KEY")?,
                secret_key: required(&lookup, "S3_SECRET_KEY")?,
                region: lookup("S3_REGION").unwrap_or_else(|| "eu-west-1".to_string()),
                raw_bucket: required(&lookup, "S3_DOWNLOAD_BUCKET")?,
                processed_bucket: required(&lookup, "S3_UPLOAD_BUCKET")?,
            };
            validate_bucket_name("S3_DOWNLOAD_BUCKET", &config.raw_bucket)?;
            validate_bucket_name("S3_UPLOAD_BUCKET", &config.processed_bucket)?;
            Some(config)
        } else {
            None
        };

        let gcs = if providers.contains(&ProviderKind::Gcs) {
            let config = GcsConfig {
                service_account_path: required(&lookup, "GOOGLE_API_FILE")?,
                raw_bucket: required(&lookup, "GCS_DOWNLOAD_BUCKET")?,
                processed_bucket: required(&lookup, "GCS_UPLOAD_BUCKET")?,
            };
            validate_bucket_name("GCS_DOWNLOAD_BUCKET", &config.raw_bucket)?;
            validate_bucket_name("GCS_UPLOAD_BUCKET", &config.processed_bucket)?;
            Some(config)
        } else {
            None
        };

        Ok(Self {
            providers,
            s3,
            gcs,
            base_url,
            download_dir: dir_or(&lookup, "DOWNLOAD_PATH", "downloads"),
            processed_dir: dir_or(&lookup, "PROCESSED_FOLDER", "processed"),
            static_dir: dir_or(&lookup, "STATIC_DIR", "static"),
            output_file: lookup("OUTPUT_FILE"),
            report_column: lookup("REPORT_COLUMN").unwrap_or_else(|| "Country_Region".to_string()),
            report_category: lookup("REPORT_CATEGORY").unwrap_or_else(|| "Czechia".to_string()),
            template_path: lookup("REPORT_TEMPLATE").map(PathBuf::from),
            port: parse_number(&lookup, "PORT", 5000)?,
            sync_interval_hours: nonzero(&lookup, "SYNC_INTERVAL_HOURS", 24)?,
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SyncError::Config {
            message: format!("{key} environment variable is required"),
        })
}

fn dir_or<F>(lookup: &F, key: &str, default: &str) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| SyncError::Config {
            message: format!("{key} must be a number, got {raw:?}"),
        }),
    }
}

// Zero would produce an empty tokio interval period, which panics at runtime.
fn nonzero<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_number(lookup, key, default)?;
    if value == 0 {
        return Err(SyncError::Config {
            message: format!("{key} must be greater than zero"),
        });
    }
    Ok(value)
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|err| SyncError::Config {
        message: format!("{field} is not a valid URL: {err}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(SyncError::Config {
            message: format!("{field} has unsupported URL scheme {scheme:?}"),
        }),
    }
}

fn validate_bucket_name(field: &str, name: &str) -> Result<()> {
    let invalid = |reason: &str| SyncError::Config {
        message: format!("{field} ({name:?}): {reason}"),
    };

    if name.len() < 3 || name.len() > 63 {
        return Err(invalid("bucket name must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.' || c == '_')
    {
        return Err(invalid(
            "bucket name may only contain lowercase letters, numbers, hyphens, dots and underscores",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("bucket name cannot start or end with a hyphen"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("STORAGE_PROVIDER", "s3,gcp"),
            ("BASE_URL", "https://example.com/daily"),
            ("S3_ACCESS_KEY", "AKIA"),
            ("S3_SECRET_KEY", "secret"),
            ("S3_REGION", "eu-central-1"),
            ("S3_DOWNLOAD_BUCKET", "raw-data"),
            ("S3_UPLOAD_BUCKET", "processed-data"),
            ("GOOGLE_API_FILE", "/secrets/service-account.json"),
            ("GCS_DOWNLOAD_BUCKET", "raw-data-gcs"),
            ("GCS_UPLOAD_BUCKET", "processed-data-gcs"),
        ]
    }

    #[test]
    fn parses_both_providers() {
        let config = AppConfig::from_lookup(lookup(&full_env())).unwrap();
        assert_eq!(config.providers, vec![ProviderKind::S3, ProviderKind::Gcs]);
        assert_eq!(config.s3.as_ref().unwrap().region, "eu-central-1");
        assert_eq!(config.gcs.as_ref().unwrap().raw_bucket, "raw-data-gcs");
        assert_eq!(config.report_category, "Czechia");
        assert_eq!(config.port, 5000);
        assert_eq!(config.sync_interval_hours, 24);
    }

    #[test]
    fn unknown_provider_is_a_fatal_config_error() {
        let mut env = full_env();
        env[0] = ("STORAGE_PROVIDER", "s3,dropbox");
        let err = AppConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }), "got {err:?}");
        assert!(err.to_string().contains("dropbox"));
    }

    #[test]
    fn missing_provider_settings_are_fatal() {
        let env: Vec<_> = full_env()
            .into_iter()
            .filter(|(key, _)| *key != "S3_SECRET_KEY")
            .collect();
        let err = AppConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("S3_SECRET_KEY"));
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        let mut env = full_env();
        env[0] = ("STORAGE_PROVIDER", " , ");
        assert!(AppConfig::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn selecting_one_provider_only_requires_its_settings() {
        let env = vec![
            ("STORAGE_PROVIDER", "gcp"),
            ("BASE_URL", "https://example.com/daily"),
            ("GOOGLE_API_FILE", "/secrets/service-account.json"),
            ("GCS_DOWNLOAD_BUCKET", "raw-data"),
            ("GCS_UPLOAD_BUCKET", "processed-data"),
            ("REPORT_CATEGORY", "Germany"),
        ];
        let config = AppConfig::from_lookup(lookup(&env)).unwrap();
        assert!(config.s3.is_none());
        assert_eq!(config.report_category, "Germany");
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut env = full_env();
        env[1] = ("BASE_URL", "ftp://example.com/daily");
        assert!(AppConfig::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn rejects_zero_sync_interval() {
        let mut env = full_env();
        env.push(("SYNC_INTERVAL_HOURS", "0"));
        let err = AppConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }), "got {err:?}");
        assert!(err.to_string().contains("SYNC_INTERVAL_HOURS"));
    }

    #[test]
    fn rejects_invalid_bucket_name() {
        let mut env = full_env();
        env[5] = ("S3_DOWNLOAD_BUCKET", "-bad-");
        assert!(AppConfig::from_lookup(lookup(&env)).is_err());
    }
}
