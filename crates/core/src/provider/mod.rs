//! Provider adapters that perform the actual download.
//!
//! The engine only sees the [`Provider`] trait. Two implementations ship:
//! - [`YtDlpProvider`]: the primary, driving the yt-dlp executable
//! - [`RestApiProvider`]: the fallback, streaming from a REST endpoint

mod rest_api;
mod types;
mod ytdlp;

pub use rest_api::{content_disposition_filename, format_eta, format_speed, RestApiProvider};
pub use types::{
    safe_title, DownloadOutcome, ProgressSink, ProgressUpdate, Provider, ProviderError,
};
pub use ytdlp::{classify_stderr, parse_progress_line, YtDlpProvider};
