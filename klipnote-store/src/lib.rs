//! Job Store (spec §4.1): the durable per-job record of status, progress,
//! and transcript result. Exclusively owns `Job` records; the Broker
//! (`klipnote-queue`) owns `QueueEntry`s separately, wired only by `JobId`.

pub mod backend;
pub mod types;

pub use backend::MemoryJobStore;
pub use types::{FailureKind, Job, JobError, JobState, Segment, StatusRecord, Transcript};
