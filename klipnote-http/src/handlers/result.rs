//! `GET /result/{job_id}` (spec §4.6): only valid once `status=completed`.

use axum::extract::{Path, State};
use axum::Json;
use klipnote_core::{JobId, KlipError};
use klipnote_store::Transcript;

use crate::error::KlipAxumError;
use crate::state::AppState;

pub async fn get_result(
    State(state): State<AppState>,
    Path(raw_job_id): Path<String>,
) -> Result<Json<Transcript>, KlipAxumError> {
    let job_id = JobId::parse(&raw_job_id)
        .ok_or_else(|| KlipError::not_found("unknown or malformed job id").into_anyhow())?;
    let transcript = state.store.get_result(&job_id)?;
    Ok(Json(transcript))
}
