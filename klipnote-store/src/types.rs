//! Job Store data model (spec §3, §4.1).

use chrono::{DateTime, Utc};
use klipnote_core::{JobId, Model};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Discrete job lifecycle states. Progression is monotone:
/// `Pending -> Processing -> {Completed | Failed}`. Never backwards, never
/// `Pending -> Completed` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Whether `self -> next` is an allowed monotone transition.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Why a job landed in `Failed`. Only `TransientExhausted`, `Permanent`, and
/// `Cancelled` are produced by the worker (spec §4.5); `WorkerLost` is
/// produced by store restart recovery (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientExhausted,
    Permanent,
    Cancelled,
    WorkerLost,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientExhausted => "transient_exhausted",
            FailureKind::Permanent => "permanent",
            FailureKind::Cancelled => "cancelled",
            FailureKind::WorkerLost => "worker_lost",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

/// A single transcribed span of speech.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub confidence: Option<f64>,
}

impl Segment {
    pub fn is_valid(&self) -> bool {
        self.end > self.start && self.start >= 0.0 && !self.text.trim().is_empty()
    }
}

/// Ordered sequence of [`Segment`]s, start-sorted. The sole persisted output
/// of a job (spec §3, §4.5 step 4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// `segments[i].start <= segments[j].start` for all `i < j`.
    pub fn is_start_sorted(&self) -> bool {
        self.segments.windows(2).all(|w| w[0].start <= w[1].start)
    }
}

/// One transcription request, traversing `pending -> processing -> {completed | failed}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobState,
    /// `[0, 100]`, non-decreasing while `status == Processing`. Drawn from
    /// the discrete phase set `{10, 20, 40, 80}`; `100` on `Completed`.
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model: Model,
    pub language_hint: Option<String>,
    pub media_path: PathBuf,
    pub duration_seconds: f64,
    pub result_pointer: Option<PathBuf>,
    pub error: Option<JobError>,
}

impl Job {
    /// Admission-time constructor (spec §4.4 step 5): `status=pending, progress=10`.
    pub fn new_pending(
        id: JobId,
        model: Model,
        language_hint: Option<String>,
        media_path: PathBuf,
        duration_seconds: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobState::Pending,
            progress: 10,
            message: "Task queued…".to_string(),
            created_at: now,
            updated_at: now,
            model,
            language_hint,
            media_path,
            duration_seconds,
            result_pointer: None,
            error: None,
        }
    }
}

/// The public `GetStatus` response shape (everything but the transcript).
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub status: JobState,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for StatusRecord {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
