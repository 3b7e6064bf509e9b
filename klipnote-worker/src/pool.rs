//! Worker pools (spec §4.5): one pool per model queue, each holding a
//! shared GPu-lease semaphore and a handle to the one `TranscriptionService`
//! backend it dispatches to.
//!
//! Grounded on the teacher's `dog-queue::execution::executor::JobExecutor`
//! (dequeue loop, bounded concurrency via a permit), stripped of its
//! adaptive resource-tracking machinery — this spec pins concurrency to a
//! fixed `MaxConcurrentJobs` per spec §5, no auto-scaling.

use std::sync::Arc;
use std::time::Duration;

use klipnote_core::{JobId, Model};
use klipnote_media::LocalMediaStore;
use klipnote_queue::{Broker, LeasedEntry, QueueEvent};
use klipnote_store::{FailureKind, JobError, JobState, MemoryJobStore};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::normalize::normalize_segments;
use crate::service::{TranscribeError, TranscriptionService};

/// Tunables for a single model's worker pool (spec §5: `MaxConcurrentJobs`,
/// `InferenceTimeoutMultiplier`, `DequeuePollInterval`).
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub model: Model,
    pub concurrency: usize,
    pub dequeue_poll: Duration,
    /// Inference timeout is `duration_seconds * multiplier`, floored at
    /// `inference_timeout_floor` so short clips still get a sane minimum.
    pub inference_timeout_multiplier: f64,
    pub inference_timeout_floor: Duration,
}

impl WorkerPoolConfig {
    fn timeout_for(&self, duration_seconds: f64) -> Duration {
        let scaled = Duration::from_secs_f64((duration_seconds * self.inference_timeout_multiplier).max(0.0));
        scaled.max(self.inference_timeout_floor)
    }
}

/// The phased-progress message for a given progress value (spec §4.5 table).
/// Used so a redelivered job's announcement reflects the phase it actually
/// lands on after `progress.max(...)`, not the phase the announcement
/// nominally targets.
fn phase_message(progress: u8) -> &'static str {
    match progress {
        0..=19 => "Task queued…",
        20..=39 => "Loading AI model…",
        40..=79 => "Transcribing audio…",
        _ => "Aligning timestamps…",
    }
}

/// One model's worker pool: `concurrency` tasks draining the broker's
/// `config.model` queue, sharing one GPU-lease [`Semaphore`] (spec §4.5:
/// "acquire a GPU execution lease before touching the model").
pub struct WorkerPool {
    config: WorkerPoolConfig,
    store: MemoryJobStore,
    broker: Broker,
    media: LocalMediaStore,
    service: Arc<dyn TranscriptionService>,
    gpu_lease: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        store: MemoryJobStore,
        broker: Broker,
        media: LocalMediaStore,
        service: Arc<dyn TranscriptionService>,
        gpu_lease: Arc<Semaphore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            broker,
            media,
            service,
            gpu_lease,
        })
    }

    /// Spawn `config.concurrency` worker tasks, each looping forever on
    /// dequeue-process. Returns their handles so the caller can hold them
    /// for a graceful shutdown, or drop them to let the pool run for the
    /// life of the process.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.concurrency.max(1))
            .map(|worker_idx| {
                let pool = Arc::clone(&self);
                tokio::spawn(async move { pool.worker_loop(worker_idx).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_idx: usize) {
        info!(model = ?self.config.model, worker_idx, "worker loop started");
        loop {
            let leased = self
                .broker
                .dequeue(self.config.model, self.config.dequeue_poll)
                .await;
            let Some(leased) = leased else {
                continue;
            };
            self.process(leased).await;
        }
    }

    async fn process(&self, leased: LeasedEntry) {
        let job_id = leased.job_id.clone();

        let job = match self.store.get_job(&job_id) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "dequeued job missing from store, acking to drop it");
                self.broker.ack(&job_id);
                return;
            }
        };

        let _permit = match self.gpu_lease.acquire().await {
            Ok(permit) => permit,
            Err(_) => return, // semaphore closed: process is shutting down
        };

        // A redelivery after a transient failure or crash can arrive with
        // `job.progress` already at 40/80 (spec §4.5 "Failure & retry", §8
        // scenario 5); these phase announcements must only ever raise
        // progress, never lower it, or `update_status`'s monotonicity check
        // rejects the mutation and strands the job in `Processing` forever.
        if let Err(e) = self.store.update_status(&job_id, |j| {
            j.status = JobState::Processing;
            j.progress = j.progress.max(20);
            j.message = phase_message(j.progress).to_string();
        }) {
            warn!(job_id = %job_id, error = %e, "failed to mark job processing, acking to drop it");
            self.broker.ack(&job_id);
            return;
        }

        let _ = self.store.update_status(&job_id, |j| {
            j.progress = j.progress.max(40);
            j.message = phase_message(j.progress).to_string();
        });

        let timeout = self.config.timeout_for(job.duration_seconds);
        let outcome = tokio::time::timeout(
            timeout,
            self.service
                .transcribe(&job.media_path, job.language_hint.as_deref(), job.duration_seconds),
        )
        .await;

        match outcome {
            Err(_elapsed) => {
                self.fail_transient(&job_id, "inference exceeded its timeout budget");
            }
            Ok(Err(TranscribeError::Transient(msg))) => self.fail_transient(&job_id, &msg),
            Ok(Err(TranscribeError::Permanent(msg))) => {
                self.fail_terminal(&job_id, FailureKind::Permanent, &msg)
            }
            Ok(Err(TranscribeError::Cancelled)) => {
                self.fail_terminal(&job_id, FailureKind::Cancelled, "job was cancelled")
            }
            Ok(Ok(raw_segments)) => self.finish(&job_id, raw_segments, job.duration_seconds).await,
        }
    }

    async fn finish(&self, job_id: &JobId, raw_segments: crate::service::RawTranscript, duration_seconds: f64) {
        let _ = self.store.update_status(job_id, |j| {
            j.progress = j.progress.max(80);
            j.message = phase_message(j.progress).to_string();
        });

        let transcript = normalize_segments(raw_segments, duration_seconds);
        if transcript.segments.is_empty() {
            self.fail_terminal(
                job_id,
                FailureKind::Permanent,
                "no valid speech segments remained after normalization",
            );
            return;
        }

        let json = serde_json::json!({ "segments": transcript.segments });
        let result_pointer = match self.media.write_transcript_json(job_id, &json).await {
            Ok(path) => path,
            Err(e) => {
                self.fail_transient(job_id, &format!("failed writing transcript to disk: {e}"));
                return;
            }
        };

        match self.store.put_result(job_id, transcript, result_pointer) {
            Ok(_) => {
                info!(job_id = %job_id, "job completed");
                self.broker.ack(job_id);
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "put_result rejected, treating as transient");
                self.fail_transient(job_id, "job store rejected the completed transcript");
            }
        }
    }

    /// Transient failure (spec §4.5 "Failure & retry"): release the GPU
    /// lease (automatic on drop) and leave the broker lease to expire on
    /// its own, so redelivery and crash-recovery share one code path.
    fn fail_transient(&self, job_id: &JobId, reason: &str) {
        warn!(job_id = %job_id, reason, "transient failure, leaving unacked for redelivery");
        self.broker.leave_unacked(job_id);
    }

    fn fail_terminal(&self, job_id: &JobId, kind: FailureKind, message: &str) {
        warn!(job_id = %job_id, ?kind, message, "terminal failure");
        let result = self.store.update_status(job_id, |j| {
            j.status = JobState::Failed;
            j.message = message.to_string();
            j.error = Some(JobError {
                kind,
                message: message.to_string(),
            });
        });
        if let Err(e) = result {
            warn!(job_id = %job_id, error = %e, "failed to persist terminal failure");
        }
        self.broker.ack(job_id);
    }
}

/// Translates broker-level redelivery exhaustion into a Job Store
/// transition (spec §4.2 "Exhausted" + §4.5). The broker has no notion of
/// the Job Store — jobs and queue entries are wired only by `JobId` (spec
/// §3) — so this listener is the bridge, spawned once globally rather than
/// per pool since both model queues share it.
pub async fn run_exhaustion_listener(store: MemoryJobStore, mut events: broadcast::Receiver<QueueEvent>) {
    loop {
        match events.recv().await {
            Ok(QueueEvent::Exhausted { job_id }) => {
                let result = store.update_status(&job_id, |j| {
                    j.status = JobState::Failed;
                    j.message = "Exceeded maximum redelivery attempts".to_string();
                    j.error = Some(JobError {
                        kind: FailureKind::TransientExhausted,
                        message: "redelivery budget exhausted".to_string(),
                    });
                });
                if let Err(e) = result {
                    warn!(job_id = %job_id, error = %e, "failed to mark exhausted job as failed");
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "exhaustion listener lagged behind broker event stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klipnote_core::JobId;
    use std::path::PathBuf;

    struct AlwaysSucceeds;

    #[async_trait::async_trait]
    impl TranscriptionService for AlwaysSucceeds {
        async fn transcribe(
            &self,
            _media_path: &std::path::Path,
            _language_hint: Option<&str>,
            duration_seconds: f64,
        ) -> Result<crate::service::RawTranscript, TranscribeError> {
            Ok(vec![klipnote_store::Segment {
                start: 0.0,
                end: duration_seconds,
                text: "hello".to_string(),
                confidence: Some(0.99),
            }])
        }
    }

    struct AlwaysTransient;

    #[async_trait::async_trait]
    impl TranscriptionService for AlwaysTransient {
        async fn transcribe(
            &self,
            _media_path: &std::path::Path,
            _language_hint: Option<&str>,
            _duration_seconds: f64,
        ) -> Result<crate::service::RawTranscript, TranscribeError> {
            Err(TranscribeError::Transient("gpu oom".to_string()))
        }
    }

    fn test_config(model: Model) -> WorkerPoolConfig {
        WorkerPoolConfig {
            model,
            concurrency: 1,
            dequeue_poll: Duration::from_millis(30),
            inference_timeout_multiplier: 10.0,
            inference_timeout_floor: Duration::from_secs(1),
        }
    }

    async fn new_job(store: &MemoryJobStore, media: &LocalMediaStore, model: Model) -> JobId {
        let id = JobId::new();
        let dir = media.job_dir(&id);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = media.original_path(&id, "wav");
        tokio::fs::write(&path, b"fake audio").await.unwrap();
        let job = klipnote_store::Job::new_pending(id.clone(), model, None, path, 8.0);
        store.create(job).unwrap();
        id
    }

    #[tokio::test]
    async fn successful_job_reaches_completed_with_persisted_transcript() {
        let store = MemoryJobStore::new();
        let broker = Broker::new(Duration::from_secs(1800), 3);
        let tmp_root = std::env::temp_dir().join(format!("klipnote-pool-test-{}", uuid::Uuid::new_v4()));
        let media = LocalMediaStore::new(&tmp_root);

        let id = new_job(&store, &media, Model::WhisperX).await;
        broker.enqueue(id.clone(), Model::WhisperX);

        let pool = WorkerPool::new(
            test_config(Model::WhisperX),
            store.clone(),
            broker.clone(),
            media.clone(),
            Arc::new(AlwaysSucceeds),
            Arc::new(Semaphore::new(1)),
        );

        let leased = broker.dequeue(Model::WhisperX, Duration::from_millis(50)).await.unwrap();
        pool.process(leased).await;

        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_pointer, Some(media.transcript_path(&id)));
        assert!(store.get_result(&id).unwrap().segments.len() == 1);

        let _ = tokio::fs::remove_dir_all(&tmp_root).await;
    }

    #[tokio::test]
    async fn transient_failure_leaves_job_processing_and_does_not_ack() {
        let store = MemoryJobStore::new();
        let broker = Broker::new(Duration::from_secs(1800), 3);
        let tmp_root = std::env::temp_dir().join(format!("klipnote-pool-test-{}", uuid::Uuid::new_v4()));
        let media = LocalMediaStore::new(&tmp_root);

        let id = new_job(&store, &media, Model::Belle2).await;
        broker.enqueue(id.clone(), Model::Belle2);

        let pool = WorkerPool::new(
            test_config(Model::Belle2),
            store.clone(),
            broker.clone(),
            media.clone(),
            Arc::new(AlwaysTransient),
            Arc::new(Semaphore::new(1)),
        );

        let leased = broker.dequeue(Model::Belle2, Duration::from_millis(50)).await.unwrap();
        pool.process(leased).await;

        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobState::Processing);

        broker.force_lease_expiry(&id);
        assert_eq!(broker.reap_expired_leases(), 1);

        let _ = tokio::fs::remove_dir_all(&tmp_root).await;
    }

    /// Redelivery after a transient failure lands the job back in the queue
    /// with `progress` already at 40 (spec §4.5 "Failure & retry"); a second
    /// worker picking it up must still be able to drive it to `Completed`,
    /// not get rejected by the monotonicity check on its own re-announcement.
    #[tokio::test]
    async fn redelivered_job_after_transient_failure_still_reaches_completed() {
        let store = MemoryJobStore::new();
        let broker = Broker::new(Duration::from_secs(1800), 3);
        let tmp_root = std::env::temp_dir().join(format!("klipnote-pool-test-{}", uuid::Uuid::new_v4()));
        let media = LocalMediaStore::new(&tmp_root);

        let id = new_job(&store, &media, Model::Belle2).await;
        broker.enqueue(id.clone(), Model::Belle2);

        let failing_pool = WorkerPool::new(
            test_config(Model::Belle2),
            store.clone(),
            broker.clone(),
            media.clone(),
            Arc::new(AlwaysTransient),
            Arc::new(Semaphore::new(1)),
        );

        let leased = broker.dequeue(Model::Belle2, Duration::from_millis(50)).await.unwrap();
        failing_pool.process(leased).await;

        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobState::Processing);
        assert_eq!(job.progress, 40);

        broker.force_lease_expiry(&id);
        assert_eq!(broker.reap_expired_leases(), 1);

        let succeeding_pool = WorkerPool::new(
            test_config(Model::Belle2),
            store.clone(),
            broker.clone(),
            media.clone(),
            Arc::new(AlwaysSucceeds),
            Arc::new(Semaphore::new(1)),
        );

        let redelivered = broker.dequeue(Model::Belle2, Duration::from_millis(50)).await.unwrap();
        succeeding_pool.process(redelivered).await;

        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_pointer, Some(media.transcript_path(&id)));
        assert_eq!(store.get_result(&id).unwrap().segments.len(), 1);

        let _ = tokio::fs::remove_dir_all(&tmp_root).await;
    }

    #[tokio::test]
    async fn exhaustion_listener_marks_job_failed() {
        let store = MemoryJobStore::new();
        let broker = Broker::new(Duration::from_secs(1800), 1);
        let tmp_root = std::env::temp_dir().join(format!("klipnote-pool-test-{}", uuid::Uuid::new_v4()));
        let media = LocalMediaStore::new(&tmp_root);

        let id = new_job(&store, &media, Model::Belle2).await;
        store
            .update_status(&id, |j| {
                j.status = JobState::Processing;
                j.progress = 40;
            })
            .unwrap();
        broker.enqueue(id.clone(), Model::Belle2);

        let listener = tokio::spawn(run_exhaustion_listener(store.clone(), broker.events()));

        broker.dequeue(Model::Belle2, Duration::from_millis(50)).await.unwrap();
        broker.force_lease_expiry(&id);
        broker.reap_expired_leases();

        tokio::time::sleep(Duration::from_millis(50)).await;
        listener.abort();

        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobState::Failed);
        assert_eq!(job.error.unwrap().kind, FailureKind::TransientExhausted);

        let _ = tokio::fs::remove_dir_all(&tmp_root).await;
    }
}
