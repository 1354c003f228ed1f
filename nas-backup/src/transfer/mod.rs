//! Upload transfer: the chunked upload protocol and its progress reporting.

pub mod progress;
pub mod progress_stream;
pub mod upload;

pub use progress::{ChannelProgress, LogProgress, NoProgress, ProgressEvent, ProgressObserver};
pub use upload::ChunkedUploader;
