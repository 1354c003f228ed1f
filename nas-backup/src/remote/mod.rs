//! Remote file service access.
//!
//! `RemoteFileService` is the seam the rotation and upload code talk to.
//! `FileStation` implements it against a QNAP NAS through an authenticated
//! `QnapSession`.

pub mod file_station;
pub mod session;

use crate::utils::errors::RemoteError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;
use std::pin::Pin;

pub use file_station::FileStation;
pub use session::QnapSession;

/// Byte stream fed to a chunked upload.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntry {
    pub filename: String,

    /// 1 for directories, 0 for files
    #[serde(rename = "isfolder", default)]
    pub is_folder: i64,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            filename: name.into(),
            is_folder: 0,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            filename: name.into(),
            is_folder: 1,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_folder != 0
    }
}

/// A directory listing as reported by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Listing {
    /// Total entry count in the directory, which may exceed `datas.len()`
    /// when the listing was truncated by the request limit.
    #[serde(default)]
    pub total: Option<u64>,

    #[serde(rename = "datas", default)]
    pub entries: Vec<RemoteEntry>,
}

impl Listing {
    /// Largest entry count the listing admits to.
    pub fn entry_count(&self) -> usize {
        let reported = self.total.map(|t| t as usize).unwrap_or(0);
        reported.max(self.entries.len())
    }
}

/// State of one chunked upload, from handshake to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Shared root the service keeps temporary chunks under
    pub root_dir: String,
    /// Directory receiving the file
    pub dest_dir: String,
    /// File name inside `dest_dir`
    pub dest_name: String,
    /// Identifier issued by `start_chunked_upload`
    pub upload_id: String,
    pub offset: u64,
    pub total_size: u64,
    pub overwrite: bool,
}

impl UploadSession {
    pub fn dest_path(&self) -> String {
        join_path(&self.dest_dir, &self.dest_name)
    }
}

/// How the service answered the final request of a chunked upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The file is stored; carries the service's reply.
    Completed(serde_json::Value),
    /// The destination already exists and overwrite was off.
    DestinationExists,
    /// Any other answer; carries the reply for diagnostics.
    Rejected(serde_json::Value),
}

/// Operations the backup core needs from the remote file service.
///
/// Every call is a single attempt. Failures are returned, never retried.
#[async_trait]
pub trait RemoteFileService: Send + Sync {
    /// List up to `limit` entries of `dir`.
    async fn list(&self, dir: &str, limit: usize) -> Result<Listing, RemoteError>;

    /// Delete a single file, bypassing the recycle bin.
    async fn delete(&self, path: &str) -> Result<(), RemoteError>;

    /// Open a chunked upload under `root_dir` and return its upload id.
    async fn start_chunked_upload(&self, root_dir: &str) -> Result<String, RemoteError>;

    /// Stream the whole payload against an open session. Transport and
    /// decoding failures are errors; the service's verdict is the outcome.
    async fn chunked_upload(
        &self,
        session: &UploadSession,
        body: ByteStream,
    ) -> Result<UploadOutcome, RemoteError>;
}

/// Split an absolute remote path into (directory, file name), like POSIX
/// `dirname`/`basename`.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Share root used for temporary upload storage: the first component of
/// `dir`. The service purges abandoned uploads under a share root after
/// seven days.
pub fn upload_root_dir(dir: &str) -> String {
    match dir.trim_start_matches('/').split('/').next() {
        Some(first) if !first.is_empty() => format!("/{}", first),
        _ => "/".to_string(),
    }
}
