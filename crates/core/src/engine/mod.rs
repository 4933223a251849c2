//! Download engine: dispatching, per-job workers and progress fan-out.
//!
//! Each accepted job gets its own tokio task:
//! - **Primary**: attempted up to `max_retries` times with capped exponential backoff
//! - **Secondary**: tried once when the primary is exhausted or hits a non-retryable error
//! - **Events**: progress and status changes are broadcast to every subscriber

mod backoff;
mod config;
mod dispatcher;
mod reporter;
mod types;
mod worker;

pub use backoff::{BackoffPolicy, GiveUpReason, RetryDecision};
pub use config::DispatcherConfig;
pub use dispatcher::DownloadDispatcher;
pub use reporter::ProgressReporter;
pub use types::{DispatchError, EngineSummary, JobEvent, ProgressEvent};
