//! `GET /status/{job_id}` (spec §4.6).

use axum::extract::{Path, State};
use axum::Json;
use klipnote_core::{JobId, KlipError};
use klipnote_store::StatusRecord;

use crate::error::KlipAxumError;
use crate::state::AppState;

pub async fn get_status(
    State(state): State<AppState>,
    Path(raw_job_id): Path<String>,
) -> Result<Json<StatusRecord>, KlipAxumError> {
    let job_id = JobId::parse(&raw_job_id)
        .ok_or_else(|| KlipError::not_found("unknown or malformed job id").into_anyhow())?;
    let record = state.store.get_status(&job_id)?;
    Ok(Json(record))
}
