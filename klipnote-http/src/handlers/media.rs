//! `GET /media/{job_id}` (spec §4.6): range-capable byte serving so
//! video/audio elements can seek.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use klipnote_core::{JobId, KlipError};
use klipnote_media::ByteRange;

use crate::error::KlipAxumError;
use crate::state::AppState;

pub async fn get_media(
    State(state): State<AppState>,
    Path(raw_job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, KlipAxumError> {
    let job_id = JobId::parse(&raw_job_id)
        .ok_or_else(|| KlipError::not_found("unknown or malformed job id").into_anyhow())?;
    let job = state.store.get_job(&job_id)?;

    let range = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse);

    let requested_partial = range.is_some();
    let opened = state.media.open_range(&job.media_path, range).await?;
    let resolved = opened.resolved_range;
    let bytes = opened.read_to_vec().await?;

    let status = if requested_partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut response = (status, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert("accept-ranges", "bytes".parse().unwrap());
    if requested_partial {
        if let Ok(v) = resolved.content_range_header().parse() {
            headers.insert(axum::http::header::CONTENT_RANGE, v);
        }
    }
    if let Ok(v) = resolved.len().to_string().parse() {
        headers.insert(axum::http::header::CONTENT_LENGTH, v);
    }
    Ok(response)
}
