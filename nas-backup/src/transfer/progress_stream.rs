//! Progress-tracking stream wrapper for upload bodies.

use super::progress::{ProgressObserver, ProgressTracker};
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::{Duration, Instant};

/// Stream wrapper that counts bytes and notifies an observer at most once
/// per `interval`, plus once when the stream ends.
pub struct ProgressStream<S> {
    inner: S,
    bytes_transferred: u64,
    last_update: Instant,
    interval: Duration,
    tracker: ProgressTracker,
    observer: Arc<dyn ProgressObserver>,
    finished: bool,
}

impl<S> ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>>,
{
    pub fn new(
        inner: S,
        total_bytes: u64,
        interval: Duration,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            inner,
            bytes_transferred: 0,
            last_update: Instant::now(),
            interval,
            tracker: ProgressTracker::new(total_bytes),
            observer,
            finished: false,
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = Pin::new(&mut self.inner);

        match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.bytes_transferred += bytes.len() as u64;

                let now = Instant::now();
                if now.duration_since(self.last_update) >= self.interval {
                    let transferred = self.bytes_transferred;
                    let event = self.tracker.update(transferred);
                    self.observer.on_progress(&event);
                    self.last_update = now;
                }

                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                if !self.finished {
                    self.finished = true;
                    let transferred = self.bytes_transferred;
                    let event = self.tracker.update(transferred);
                    self.observer.on_finish(&event);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
