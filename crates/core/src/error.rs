use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("source is not valid utf-8: {0}")]
    InvalidEncoding(String),

    #[error("no configured source location could be resolved")]
    NoResolvableSources,

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("index request failed: {0}")]
    Request(String),

    #[error("index query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
