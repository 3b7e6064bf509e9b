//! `POST /export/{job_id}` (spec §4.6): renders whichever segment list the
//! client posts. Never reads or writes the persisted transcript — the
//! client is authoritative for the edited content it submits.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use klipnote_core::{JobId, KlipError};
use klipnote_export::{render, ExportFormat, ExportSegment};
use serde::Deserialize;

use crate::error::KlipAxumError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub segments: Vec<ExportSegment>,
    pub format: ExportFormat,
}

pub async fn export(
    State(state): State<AppState>,
    Path(raw_job_id): Path<String>,
    axum::Json(body): axum::Json<ExportRequest>,
) -> Result<Response, KlipAxumError> {
    let job_id = JobId::parse(&raw_job_id)
        .ok_or_else(|| KlipError::not_found("unknown or malformed job id").into_anyhow())?;
    // Job must exist, even though its stored transcript is never read here.
    state.store.get_job(&job_id)?;

    let rendered = render(&body.segments, body.format)?;

    let filename = format!("transcript-{job_id}.{}", body.format.extension());
    let response = (
        [
            (axum::http::header::CONTENT_TYPE, body.format.content_type().to_string()),
            (
                axum::http::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        rendered,
    )
        .into_response();
    Ok(response)
}
