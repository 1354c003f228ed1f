//! Chunked upload protocol.
//!
//! One upload is one session: open it with `start_chunked_upload`, stream
//! the whole file against it, and check the final response. There is no
//! chunk-level retry; any failure aborts the transfer.

use super::progress::{LogProgress, ProgressObserver};
use super::progress_stream::ProgressStream;
use crate::remote::{split_path, upload_root_dir, RemoteFileService, UploadOutcome, UploadSession};
use crate::utils::errors::{RemoteError, UploadError};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

pub struct ChunkedUploader<'a, R: RemoteFileService + ?Sized> {
    remote: &'a R,
    observer: Arc<dyn ProgressObserver>,
    progress_interval: Duration,
}

impl<'a, R: RemoteFileService + ?Sized> ChunkedUploader<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self {
            remote,
            observer: Arc::new(LogProgress),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Upload `local_path` to the absolute `remote_dest_path`, returning the
    /// service's success payload.
    pub async fn upload(
        &self,
        local_path: &Path,
        remote_dest_path: &str,
        overwrite: bool,
    ) -> Result<Value, UploadError> {
        if !remote_dest_path.starts_with('/') {
            return Err(UploadError::InvalidPath(remote_dest_path.to_string()));
        }
        let (dest_dir, dest_name) = split_path(remote_dest_path);
        if dest_name.is_empty() {
            return Err(UploadError::InvalidPath(remote_dest_path.to_string()));
        }

        let unreadable = |source| UploadError::SourceUnreadable {
            path: local_path.display().to_string(),
            source,
        };
        let total_size = tokio::fs::metadata(local_path)
            .await
            .map_err(unreadable)?
            .len();
        let file = tokio::fs::File::open(local_path).await.map_err(unreadable)?;

        let root_dir = upload_root_dir(dest_dir);
        let upload_id = match self.remote.start_chunked_upload(&root_dir).await {
            Ok(id) => id,
            Err(RemoteError::Api { status, .. }) => {
                return Err(UploadError::SessionStartFailed { status })
            }
            Err(e) => return Err(e.into()),
        };

        let session = UploadSession {
            root_dir,
            dest_dir: dest_dir.to_string(),
            dest_name: dest_name.to_string(),
            upload_id,
            offset: 0,
            total_size,
            overwrite,
        };
        debug!(upload_id = %session.upload_id, root = %session.root_dir, "Chunked upload session opened");

        let body = ProgressStream::new(
            ReaderStream::new(file),
            total_size,
            self.progress_interval,
            Arc::clone(&self.observer),
        );
        let response = self
            .remote
            .chunked_upload(&session, Box::pin(body))
            .await?;

        confirm_upload(&session, response)
    }
}

/// Accept the final upload response only when it reports success.
fn confirm_upload(session: &UploadSession, outcome: UploadOutcome) -> Result<Value, UploadError> {
    match outcome {
        UploadOutcome::Completed(response) => {
            info!(path = %session.dest_path(), bytes = session.total_size, "Upload confirmed");
            Ok(response)
        }
        UploadOutcome::DestinationExists => Err(UploadError::DestinationExists(session.dest_path())),
        UploadOutcome::Rejected(response) => Err(UploadError::UploadIncomplete {
            path: session.dest_path(),
            detail: response.to_string(),
        }),
    }
}
