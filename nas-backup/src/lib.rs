//! NAS Backup Library
//!
//! Rotating date-stamped backups to a NAS file service: upload a local file
//! under a dated name through the chunked upload protocol, then prune the
//! oldest backups beyond a retention count.

pub mod config;
pub mod remote;
pub mod rotation;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::{Credentials, Settings};
pub use remote::{FileStation, QnapSession, RemoteFileService};
pub use rotation::{BackupRotator, CleanupReport, RetentionPolicy, RotationReport};
pub use utils::errors::{AppError, Result};
