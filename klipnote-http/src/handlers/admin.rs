//! `POST /admin/retry/{job_id}` (spec §12 "Administrative reset / retry"):
//! only valid on a `failed` job. Resets it to `pending(10, "Task re-queued…")`
//! and enqueues a fresh `QueueEntry`.

use axum::extract::{Path, State};
use axum::Json;
use klipnote_core::{JobId, KlipError};
use klipnote_store::StatusRecord;
use tracing::info;

use crate::error::KlipAxumError;
use crate::state::AppState;

pub async fn retry(
    State(state): State<AppState>,
    Path(raw_job_id): Path<String>,
) -> Result<Json<StatusRecord>, KlipAxumError> {
    let job_id = JobId::parse(&raw_job_id)
        .ok_or_else(|| KlipError::not_found("unknown or malformed job id").into_anyhow())?;

    let before = state.store.get_job(&job_id)?;
    if before.status != klipnote_store::JobState::Failed {
        return Err(KlipError::bad_request(format!(
            "job {job_id} is not in a failed state and cannot be retried"
        ))
        .into_anyhow()
        .into());
    }

    let job = state.store.reset_for_retry(&job_id)?;
    state.broker.enqueue(job_id.clone(), job.model);
    info!(job_id = %job_id, "administrative retry re-queued job");

    Ok(Json(StatusRecord::from(&job)))
}
