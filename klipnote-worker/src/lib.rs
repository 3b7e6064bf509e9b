//! Dispatcher & Workers (spec §4.5): one worker pool per model queue, a
//! GPU-lease semaphore, the `TranscriptionService` capability interface,
//! phased progress emission, and segment normalization.

pub mod normalize;
pub mod pool;
pub mod service;

pub use normalize::normalize_segments;
pub use pool::{run_exhaustion_listener, WorkerPool, WorkerPoolConfig};
pub use service::{
    Belle2Service, RawTranscript, TranscribeError, TranscriptionService, WhisperXService,
};
