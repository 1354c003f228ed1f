//! Custom error types for the NAS backup tool.

use thiserror::Error;

/// Failures talking to the remote file service.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request for {path} failed with status {status}")]
    Status { path: String, status: u16 },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{op} returned status {status}")]
    Api { op: &'static str, status: i64 },

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures deriving, parsing or listing backup names.
#[derive(Error, Debug)]
pub enum NamingError {
    #[error("Could not read backup directory {dir}: {source}")]
    InvalidListing {
        dir: String,
        #[source]
        source: RemoteError,
    },

    #[error("Found {count} entries, more than the limit of {cap} possible backups")]
    TooManyEntries { count: usize, cap: usize },

    #[error("Filename {0} doesn't end in a date stamp")]
    MalformedName(String),
}

/// Failures of the chunked upload protocol.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Remote destination {0} must be absolute and begin with /")]
    InvalidPath(String),

    #[error("Failed to start chunked upload with error code {status}")]
    SessionStartFailed { status: i64 },

    #[error("Destination {0} already exists")]
    DestinationExists(String),

    #[error("Upload of {path} was not confirmed: {detail}")]
    UploadIncomplete { path: String, detail: String },

    #[error("Cannot read local file {path}: {source}")]
    SourceUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Fatal rotation failures. Cleanup problems are reported through
/// `RotationReport` instead.
#[derive(Error, Debug)]
pub enum RotationError {
    #[error("Must keep at least one backup (got {0})")]
    InvalidRetention(i64),

    #[error("Remote backup path {0} must name a file inside a directory")]
    InvalidBackupPath(String),

    #[error("Failed to load existing backup names: {0}")]
    ListingFailed(#[source] NamingError),

    #[error("Failed to upload backup: {0}")]
    UploadFailed(#[source] UploadError),
}

/// Top-level error type surfaced to the CLI.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Rotation(#[from] RotationError),
}

pub type Result<T> = std::result::Result<T, AppError>;
