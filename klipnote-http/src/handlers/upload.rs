//! `POST /upload` (spec §4.4): streaming multipart receipt, content-type
//! gate, probe, route & admit. Bytes are deleted on every rejection path.

use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::Json;
use futures_util::StreamExt;
use klipnote_core::{JobId, KlipError};
use klipnote_media::{ByteStream as MediaByteStream, FfprobeProbe, MediaProbe};
use klipnote_queue::route;
use klipnote_store::Job;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::KlipAxumError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: String,
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, KlipAxumError> {
    let mut file_field = None;
    let mut language_hint: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| KlipError::bad_request(format!("malformed multipart body: {e}")).into_anyhow())?
    {
        match field.name() {
            Some("file") => file_field = Some(field),
            Some("language_hint") => {
                language_hint = field
                    .text()
                    .await
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let field = file_field
        .ok_or_else(|| KlipError::bad_request("multipart body is missing the required 'file' field").into_anyhow())?;

    let content_type = field.content_type().unwrap_or("").to_string();
    let filename = field.file_name().map(|s| s.to_string());
    let ext = extension_for(&content_type, filename.as_deref());

    let job_id = JobId::new();
    let stream: MediaByteStream = Box::pin(
        field.map(|r| r.map_err(|e| std::io::Error::other(e.to_string()))),
    );

    let received = state
        .media
        .receive_stream(&job_id, &ext, stream, state.config.max_file_size())
        .await?;

    let allowed = state.config.allowed_media_types();
    if !allowed.iter().any(|t| t == &content_type) {
        warn!(job_id = %job_id, content_type, "rejecting upload: unsupported format");
        state.media.delete_job_dir(&job_id).await;
        return Err(KlipError::unsupported_format(format!(
            "content type '{content_type}' is not one of the allowed media types"
        ))
        .into_anyhow()
        .into());
    }

    let probe = FfprobeProbe::new(state.config.probe_timeout());
    let probe_info = match probe.probe(&received.path).await {
        Ok(info) => info,
        Err(e) => {
            state.media.delete_job_dir(&job_id).await;
            return Err(e.into());
        }
    };

    let max_duration_seconds = state.config.max_duration_hours() * 3600.0;
    if probe_info.duration_seconds > max_duration_seconds {
        warn!(job_id = %job_id, duration = probe_info.duration_seconds, "rejecting upload: duration exceeded");
        state.media.delete_job_dir(&job_id).await;
        return Err(KlipError::duration_exceeded(format!(
            "media duration {:.1}s exceeds the {:.1}h limit",
            probe_info.duration_seconds,
            state.config.max_duration_hours()
        ))
        .into_anyhow()
        .into());
    }

    let model = route(language_hint.as_deref(), state.config.default_transcription_model());
    let job = Job::new_pending(
        job_id.clone(),
        model,
        language_hint,
        received.path,
        probe_info.duration_seconds,
    );

    state.store.create(job)?;
    state.broker.enqueue(job_id.clone(), model);

    info!(job_id = %job_id, ?model, duration = probe_info.duration_seconds, "admitted job");
    Ok(Json(UploadResponse {
        job_id: job_id.to_string(),
    }))
}

fn extension_for(content_type: &str, filename: Option<&str>) -> String {
    if let Some(name) = filename {
        if let Some(ext) = PathBuf::from(name).extension().and_then(|e| e.to_str()) {
            return ext.to_lowercase();
        }
    }
    match content_type {
        "audio/mpeg" => "mp3",
        "audio/wav" => "wav",
        "audio/mp4" | "video/mp4" => "mp4",
        "audio/x-m4a" => "m4a",
        _ => "bin",
    }
    .to_string()
}
