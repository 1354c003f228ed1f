//! Backup rotation: upload a new date-stamped backup, then prune the oldest
//! ones beyond the retention count.
//!
//! Steps run strictly in order (list → upload → re-list → delete). Upload
//! comes before any deletion, so a failed rotation never leaves fewer
//! backups than it found. Callers must ensure at most one rotation runs per
//! remote backup path at a time.

pub mod clock;
pub mod naming;

use crate::remote::{join_path, split_path, RemoteFileService};
use crate::transfer::progress::{LogProgress, ProgressObserver};
use crate::transfer::upload::{ChunkedUploader, DEFAULT_PROGRESS_INTERVAL};
use crate::utils::errors::RotationError;
use clock::{Clock, SystemClock};
use naming::{derive_name, list_existing, BackupSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How many backups survive a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep_count: usize,
}

impl RetentionPolicy {
    pub fn new(keep_count: i64) -> Result<Self, RotationError> {
        if keep_count < 1 {
            return Err(RotationError::InvalidRetention(keep_count));
        }
        Ok(Self {
            keep_count: keep_count as usize,
        })
    }

    pub fn keep_count(&self) -> usize {
        self.keep_count
    }
}

/// Old backups that could not be deleted. The new backup is already stored;
/// re-running cleanup is enough to finish the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Remote paths still present that should have been deleted
    pub remaining: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Remote paths deleted, oldest first
    pub deleted: Vec<String>,
    pub failure: Option<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// Remote path of the backup uploaded by this rotation
    pub uploaded: String,
    pub cleanup: CleanupReport,
}

/// Runs rotations against one remote service. Holds no state between calls.
pub struct BackupRotator<'a, R: RemoteFileService + ?Sized> {
    remote: &'a R,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn ProgressObserver>,
    progress_interval: Duration,
}

impl<'a, R: RemoteFileService + ?Sized> BackupRotator<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self {
            remote,
            clock: Arc::new(SystemClock),
            observer: Arc::new(LogProgress),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Upload `local_source` as a new dated backup of `remote_backup_path`
    /// and keep only the newest `keep_count` backups.
    ///
    /// Cleanup problems do not fail the rotation; they are reported in
    /// `RotationReport::cleanup`.
    pub async fn rotate(
        &self,
        local_source: &Path,
        remote_backup_path: &str,
        keep_count: i64,
    ) -> Result<RotationReport, RotationError> {
        let policy = RetentionPolicy::new(keep_count)?;
        let (dir, base_name) = backup_location(remote_backup_path)?;

        let existing = list_existing(self.remote, dir, base_name)
            .await
            .map_err(RotationError::ListingFailed)?;
        info!(path = %remote_backup_path, existing = existing.len(), "Loaded existing backups");

        let candidate = derive_name(base_name, self.clock.today());
        let final_name = existing.resolve_conflict(&candidate, self.clock.epoch_seconds());
        let upload_path = join_path(dir, &final_name);

        info!("Uploading new backup to {}", upload_path);
        ChunkedUploader::new(self.remote)
            .with_observer(Arc::clone(&self.observer))
            .with_progress_interval(self.progress_interval)
            .upload(local_source, &upload_path, false)
            .await
            .map_err(RotationError::UploadFailed)?;

        let current = match list_existing(self.remote, dir, base_name).await {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "Could not reload backups after upload, pruning from the earlier listing");
                let mut set = existing;
                if let Err(e) = set.insert(&final_name) {
                    warn!(error = %e, "Uploaded name does not parse as a backup");
                }
                set
            }
        };

        let cleanup = self.delete_excess(dir, &current, policy, Some(&final_name)).await;
        Ok(RotationReport {
            uploaded: upload_path,
            cleanup,
        })
    }

    /// Run only the pruning step for `remote_backup_path`.
    pub async fn cleanup(
        &self,
        remote_backup_path: &str,
        keep_count: i64,
    ) -> Result<CleanupReport, RotationError> {
        let policy = RetentionPolicy::new(keep_count)?;
        let (dir, base_name) = backup_location(remote_backup_path)?;

        let current = list_existing(self.remote, dir, base_name)
            .await
            .map_err(RotationError::ListingFailed)?;
        Ok(self.delete_excess(dir, &current, policy, None).await)
    }

    /// Delete every entry older than the newest `keep_count`, one at a time,
    /// stopping at the first failure. `protect` is never deleted.
    async fn delete_excess(
        &self,
        dir: &str,
        set: &BackupSet,
        policy: RetentionPolicy,
        protect: Option<&str>,
    ) -> CleanupReport {
        let doomed: Vec<String> = set
            .excess(policy.keep_count())
            .iter()
            .filter(|e| Some(e.name.as_str()) != protect)
            .map(|e| join_path(dir, &e.name))
            .collect();

        let mut report = CleanupReport::default();
        for (idx, path) in doomed.iter().enumerate() {
            match self.remote.delete(path).await {
                Ok(()) => {
                    info!(path = %path, "Deleted old backup");
                    report.deleted.push(path.clone());
                }
                Err(e) => {
                    let remaining = doomed[idx..].to_vec();
                    error!(path = %path, error = %e, remaining = remaining.len(), "Failed to delete old backup");
                    report.failure = Some(CleanupFailure {
                        remaining,
                        reason: format!("Failed to delete old backup {}: {}", path, e),
                    });
                    break;
                }
            }
        }
        report
    }
}

fn backup_location(remote_backup_path: &str) -> Result<(&str, &str), RotationError> {
    let (dir, base_name) = split_path(remote_backup_path);
    if base_name.is_empty() || dir.is_empty() {
        return Err(RotationError::InvalidBackupPath(remote_backup_path.to_string()));
    }
    Ok((dir, base_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_policy() {
        assert_eq!(RetentionPolicy::new(3).unwrap().keep_count(), 3);
        assert!(matches!(
            RetentionPolicy::new(0),
            Err(RotationError::InvalidRetention(0))
        ));
        assert!(matches!(
            RetentionPolicy::new(-2),
            Err(RotationError::InvalidRetention(-2))
        ));
    }

    #[test]
    fn test_backup_location() {
        assert_eq!(
            backup_location("/backups/report.tgz").unwrap(),
            ("/backups", "report.tgz")
        );
        assert!(backup_location("/backups/").is_err());
        assert!(backup_location("report.tgz").is_err());
    }
}
