//! Job records and the registry that owns them.

mod registry;
mod types;

pub use registry::{JobRegistry, RegistryError};
pub use types::{
    Job, JobCounts, JobId, JobProgress, JobResult, JobSnapshot, JobStatus, ProviderSlot,
};
