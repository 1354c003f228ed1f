//! Utility modules for the backup tool.

pub mod errors;
pub mod logger;

pub use errors::{AppError, NamingError, RemoteError, Result, RotationError, UploadError};
