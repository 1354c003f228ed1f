//! Byte-level progress tracking for uploads.
//!
//! Progress is delivered to a `ProgressObserver`, keeping the transfer code
//! independent of how (or whether) progress is shown.

use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Snapshot of an upload in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Payload bytes handed to the transport so far
    pub transferred_bytes: u64,

    /// Declared size of the payload
    pub total_bytes: u64,

    /// Throughput since the previous event, in bytes/second
    pub bytes_per_second: u64,

    /// Throughput since the transfer started, in bytes/second
    pub average_bytes_per_second: u64,

    /// Time since the transfer started
    pub elapsed: Duration,
}

impl ProgressEvent {
    pub fn percent_complete(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.transferred_bytes as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Receives progress notifications. Implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_finish(&self, _event: &ProgressEvent) {}
}

/// Writes progress to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        info!(
            "Uploaded {} of {} at {}",
            format_bytes(event.transferred_bytes),
            format_bytes(event.total_bytes),
            format_speed(event.bytes_per_second)
        );
    }

    fn on_finish(&self, event: &ProgressEvent) {
        info!(
            "Finished uploading {} in {} at {}",
            format_bytes(event.total_bytes),
            format_duration(event.elapsed.as_secs()),
            format_speed(event.average_bytes_per_second)
        );
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// Message sent by `ChannelProgress`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    Progress(ProgressEvent),
    Finished(ProgressEvent),
}

/// Forwards progress over an unbounded channel. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressMessage>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressMessage>) -> Self {
        Self { tx }
    }
}

impl ProgressObserver for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.tx.send(ProgressMessage::Progress(event.clone()));
    }

    fn on_finish(&self, event: &ProgressEvent) {
        let _ = self.tx.send(ProgressMessage::Finished(event.clone()));
    }
}

/// Progress tracker with time-based speed calculation
pub struct ProgressTracker {
    total_bytes: u64,
    start_time: Instant,
    last_update_time: Instant,
    last_bytes: u64,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            total_bytes,
            start_time: now,
            last_update_time: now,
            last_bytes: 0,
        }
    }

    /// Record `transferred_bytes` and return the resulting snapshot.
    pub fn update(&mut self, transferred_bytes: u64) -> ProgressEvent {
        // Multipart framing can push the raw count past the payload size.
        let transferred_bytes = transferred_bytes.min(self.total_bytes);
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();

        let bytes_per_second = if elapsed > 0.0 {
            let bytes_diff = transferred_bytes.saturating_sub(self.last_bytes);
            (bytes_diff as f64 / elapsed) as u64
        } else {
            0
        };

        self.last_update_time = now;
        self.last_bytes = transferred_bytes;

        ProgressEvent {
            transferred_bytes,
            total_bytes: self.total_bytes,
            bytes_per_second,
            average_bytes_per_second: self.average_speed(),
            elapsed: self.elapsed(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.last_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
