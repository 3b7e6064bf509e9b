//! In-memory Job Store (spec §4.1).
//!
//! Two logical keyspaces per job, exactly as spec §4.1 names them: `jobs`
//! holds the mutable status record, `results` holds the committed
//! transcript. A real deployment backs this with an AOF-durable store
//! (Redis-equivalent, per spec); this reference implementation is the
//! in-memory half of that design, grounded on the teacher's
//! `MemoryBackend` (`dog-queue::backend::memory::storage`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use klipnote_core::{JobId, KlipError, KlipResult};
use parking_lot::RwLock;
use tracing::warn;

use crate::types::{FailureKind, Job, JobError, JobState, StatusRecord, Transcript};

/// Durable per-job record store. Cloning is cheap (shares the underlying
/// `Arc<RwLock<...>>` maps).
#[derive(Clone)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    results: Arc<RwLock<HashMap<JobId, Transcript>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            results: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// `Create(job) -> ()`. Fails with a (practically unreachable, ids are
    /// UUIDv4) `AlreadyExists`-flavored `KlipError` if `job.id` collides.
    pub fn create(&self, job: Job) -> KlipResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(KlipError::bad_request(format!(
                "job {} already exists",
                job.id
            ))
            .into_anyhow());
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Atomic read-modify-write. `mutate` receives the current record and
    /// may change `status`/`progress`/`message`/`error` in place; if the
    /// resulting transition violates the monotonicity invariant (status
    /// regression, skipped state, or a progress decrease within
    /// `Processing`), the write is rolled back and `InvariantViolation` is
    /// returned — logged only, never surfaced to a client.
    pub fn update_status(
        &self,
        id: &JobId,
        mutate: impl FnOnce(&mut Job),
    ) -> KlipResult<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| KlipError::not_found(format!("job {id} not found")).into_anyhow())?;

        let before = job.clone();
        mutate(job);

        if let Err(violation) = validate_transition(&before, job) {
            warn!(job_id = %id, "rejected invariant-violating status mutation: {violation}");
            *job = before;
            return Err(KlipError::invariant_violation(violation).into_anyhow());
        }

        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// `PutResult(id, transcript) -> ()`. Only valid when the job is
    /// currently `Processing`; commits the transcript, the materialized
    /// `result_pointer`, and the `status=completed, progress=100` transition
    /// as a single operation — if any part fails, none is visible.
    pub fn put_result(
        &self,
        id: &JobId,
        transcript: Transcript,
        result_pointer: std::path::PathBuf,
    ) -> KlipResult<Job> {
        if transcript.segments.is_empty() {
            return Err(KlipError::invariant_violation(
                "cannot complete a job with zero segments",
            )
            .into_anyhow());
        }
        if !transcript.is_start_sorted() {
            return Err(
                KlipError::invariant_violation("transcript segments are not start-sorted")
                    .into_anyhow(),
            );
        }

        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| KlipError::not_found(format!("job {id} not found")).into_anyhow())?;

        if job.status != JobState::Processing {
            return Err(KlipError::invariant_violation(format!(
                "cannot complete job {id} from state {:?}",
                job.status
            ))
            .into_anyhow());
        }

        self.results.write().insert(id.clone(), transcript);
        job.status = JobState::Completed;
        job.progress = 100;
        job.message = "Processing complete".to_string();
        job.result_pointer = Some(result_pointer);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// `GetStatus(id) -> record | NotFound`.
    pub fn get_status(&self, id: &JobId) -> KlipResult<StatusRecord> {
        self.get_job(id).map(|job| StatusRecord::from(&job))
    }

    /// `GetResult(id) -> record | NotFound | NotReady`.
    pub fn get_result(&self, id: &JobId) -> KlipResult<Transcript> {
        let job = self.get_job(id)?;
        if job.status != JobState::Completed {
            return Err(KlipError::not_ready(format!("job {id} has not completed")).into_anyhow());
        }
        self.results
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| KlipError::not_found(format!("job {id} not found")).into_anyhow())
    }

    /// The full record, for internal callers (worker, media handler) that
    /// need more than the public status shape.
    pub fn get_job(&self, id: &JobId) -> KlipResult<Job> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| KlipError::not_found(format!("job {id} not found")).into_anyhow())
    }

    /// Administrative reset: a `Failed` job is requeued as a fresh
    /// `Pending(10, "Task re-queued…")`. See `SPEC_FULL.md` §12.
    pub fn reset_for_retry(&self, id: &JobId) -> KlipResult<Job> {
        self.update_status(id, |job| {
            if job.status == JobState::Failed {
                job.status = JobState::Pending;
                job.progress = 10;
                job.message = "Task re-queued…".to_string();
                job.error = None;
            }
        })
    }

    /// Restart recovery (spec §4.1): any job left `Processing` with no live
    /// worker lease is marked `failed(kind=worker_lost)`. Returns the number
    /// of jobs recovered. Call once at startup, before workers begin
    /// draining queues.
    pub fn recover_stale_processing_jobs(&self) -> usize {
        let mut jobs = self.jobs.write();
        let mut recovered = 0;
        for job in jobs.values_mut() {
            if job.status == JobState::Processing {
                job.status = JobState::Failed;
                job.error = Some(JobError {
                    kind: FailureKind::WorkerLost,
                    message: "worker process restarted while job was in flight".to_string(),
                });
                job.updated_at = Utc::now();
                recovered += 1;
            }
        }
        recovered
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_transition(before: &Job, after: &Job) -> Result<(), String> {
    if before.status != after.status && !before.status.can_transition_to(after.status) {
        return Err(format!(
            "illegal transition {:?} -> {:?}",
            before.status, after.status
        ));
    }
    if before.status == JobState::Processing
        && after.status == JobState::Processing
        && after.progress < before.progress
    {
        return Err(format!(
            "progress decreased {} -> {} while processing",
            before.progress, after.progress
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Segment;
    use klipnote_core::Model;
    use std::path::PathBuf;

    fn new_job() -> Job {
        Job::new_pending(
            JobId::new(),
            Model::WhisperX,
            None,
            PathBuf::from("/tmp/x"),
            30.0,
        )
    }

    #[test]
    fn create_then_get_status() {
        let store = MemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).unwrap();
        let status = store.get_status(&id).unwrap();
        assert_eq!(status.progress, 10);
        assert_eq!(status.status, JobState::Pending);
    }

    #[test]
    fn status_progression_enforces_monotonicity() {
        let store = MemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).unwrap();

        store
            .update_status(&id, |j| {
                j.status = JobState::Processing;
                j.progress = 20;
                j.message = "Loading AI model…".to_string();
            })
            .unwrap();

        // Regression is rejected and rolled back.
        let err = store
            .update_status(&id, |j| {
                j.progress = 10;
            })
            .unwrap_err();
        assert_eq!(
            KlipError::from_anyhow(&err).unwrap().kind,
            klipnote_core::ErrorKind::InvariantViolation
        );
        assert_eq!(store.get_status(&id).unwrap().progress, 20);

        // pending -> completed directly is illegal too.
        let store2 = MemoryJobStore::new();
        let job2 = new_job();
        let id2 = job2.id.clone();
        store2.create(job2).unwrap();
        let err2 = store2
            .update_status(&id2, |j| j.status = JobState::Completed)
            .unwrap_err();
        assert_eq!(
            KlipError::from_anyhow(&err2).unwrap().kind,
            klipnote_core::ErrorKind::InvariantViolation
        );
    }

    #[test]
    fn put_result_requires_processing_and_nonempty_sorted_transcript() {
        let store = MemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).unwrap();

        // Not processing yet -> rejected.
        let transcript = Transcript {
            segments: vec![Segment {
                start: 0.0,
                end: 1.0,
                text: "hi".to_string(),
                confidence: None,
            }],
        };
        let result_path = PathBuf::from("/tmp/x/transcription.json");
        assert!(store
            .put_result(&id, transcript.clone(), result_path.clone())
            .is_err());

        store
            .update_status(&id, |j| {
                j.status = JobState::Processing;
                j.progress = 80;
            })
            .unwrap();

        let job = store.put_result(&id, transcript, result_path.clone()).unwrap();
        assert_eq!(job.status, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_pointer, Some(result_path));
        assert_eq!(store.get_result(&id).unwrap().segments.len(), 1);
    }

    #[test]
    fn result_not_ready_before_completion() {
        let store = MemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).unwrap();
        store
            .update_status(&id, |j| {
                j.status = JobState::Processing;
                j.progress = 40;
            })
            .unwrap();
        let err = store.get_result(&id).unwrap_err();
        assert_eq!(
            KlipError::from_anyhow(&err).unwrap().kind,
            klipnote_core::ErrorKind::NotReady
        );
    }

    #[test]
    fn recover_marks_stale_processing_as_worker_lost() {
        let store = MemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).unwrap();
        store
            .update_status(&id, |j| {
                j.status = JobState::Processing;
                j.progress = 40;
            })
            .unwrap();

        let recovered = store.recover_stale_processing_jobs();
        assert_eq!(recovered, 1);
        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobState::Failed);
        assert_eq!(job.error.unwrap().kind, FailureKind::WorkerLost);
    }
}
