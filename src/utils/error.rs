use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("no dated source file found at {url} (today or yesterday)")]
    SourceNotFound { url: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend {backend} unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("transfer of {key} via {backend} failed: {message}")]
    TransferFailed {
        backend: String,
        key: String,
        message: String,
    },

    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    #[error("missing field: {field}")]
    MissingField { field: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
