// Error types for the ingestion pipeline
//
// One enum per layer:
// - DescriptorError: a single RDF descriptor could not be turned into a record
// - StoreError: the catalog store rejected an operation
// - IngestError: everything the run itself can fail with
//
// Only connection loss against the store is fatal to a run; the rest is
// counted per unit and the run carries on.

use reqwest::StatusCode;
use std::path::PathBuf;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type for catalog store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Malformed descriptor: {0}")]
    Malformed(String),

    #[error("Descriptor is missing required field '{0}'")]
    Incomplete(&'static str),

    #[error("Failed to read descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<quick_xml::Error> for DescriptorError {
    fn from(err: quick_xml::Error) -> Self {
        DescriptorError::Malformed(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection to catalog lost: {0}")]
    ConnectionLost(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction already committed or rolled back")]
    TransactionClosed,
}

impl StoreError {
    /// Whether the catalog session is unusable and the run must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::ConnectionLost(_) => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::Constraint(_) | StoreError::TransactionClosed => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Archive(err.to_string())
    }
}

impl IngestError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Http(err) => {
                if let Some(status) = err.status() {
                    return status.is_server_error();
                }
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            IngestError::Status { status, .. } => status.is_server_error(),
            IngestError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Whether the run must stop instead of counting a failure
    pub fn is_fatal(&self) -> bool {
        match self {
            IngestError::Store(err) => err.is_fatal(),
            IngestError::Cancelled => true,
            _ => false,
        }
    }
}
