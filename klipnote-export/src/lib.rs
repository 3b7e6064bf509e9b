//! Read & Export surface's rendering half (spec §4.6): pure functions from a
//! client-submitted segment list to an SRT or TXT byte body. No caching, no
//! I/O — exports are never stored server-side; the client is authoritative
//! for the edited content it posts.

use klipnote_core::{KlipError, KlipResult};
use serde::{Deserialize, Serialize};

/// `format` field of the export request body (spec §4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Srt,
    Txt,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Srt => "srt",
            ExportFormat::Txt => "txt",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Srt => "application/x-subrip",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

/// One segment as submitted in an export request — the client's own
/// (possibly hand-edited) copy, not the persisted [`Transcript`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Validate the request body before rendering (spec §4.6 "Export"):
/// non-empty segment list, `end > start >= 0`, non-empty text for every
/// segment.
pub fn validate_segments(segments: &[ExportSegment]) -> KlipResult<()> {
    if segments.is_empty() {
        return Err(KlipError::invalid_format("export requires at least one segment").into_anyhow());
    }
    for (i, seg) in segments.iter().enumerate() {
        if seg.start < 0.0 {
            return Err(KlipError::invalid_format(format!(
                "segment {i} has a negative start"
            ))
            .into_anyhow());
        }
        if seg.end <= seg.start {
            return Err(
                KlipError::invalid_format(format!("segment {i} has end <= start")).into_anyhow(),
            );
        }
        if seg.text.trim().is_empty() {
            return Err(
                KlipError::invalid_format(format!("segment {i} has empty text")).into_anyhow(),
            );
        }
    }
    Ok(())
}

/// Render to the requested format, validating first.
pub fn render(segments: &[ExportSegment], format: ExportFormat) -> KlipResult<String> {
    validate_segments(segments)?;
    Ok(match format {
        ExportFormat::Srt => render_srt(segments),
        ExportFormat::Txt => render_txt(segments),
    })
}

/// `txt`: segment texts joined by single newlines, stripped of leading/trailing
/// whitespace, no timestamps (spec §4.6).
fn render_txt(segments: &[ExportSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `srt`: 1-based index, `HH:MM:SS,mmm --> HH:MM:SS,mmm` timecodes, blank-line
/// separated blocks (spec §4.6).
fn render_srt(segments: &[ExportSegment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&(i + 1).to_string());
        out.push('\n');
        out.push_str(&format_timecode(seg.start));
        out.push_str(" --> ");
        out.push_str(&format_timecode(seg.end));
        out.push('\n');
        out.push_str(seg.text.trim());
        out.push('\n');
    }
    out
}

/// Seconds since the start of the media to an SRT timecode with a
/// comma-separated millisecond field.
fn format_timecode(total_seconds: f64) -> String {
    let total_millis = (total_seconds * 1000.0).round().max(0.0) as u64;
    let millis = total_millis % 1000;
    let total_seconds_int = total_millis / 1000;
    let seconds = total_seconds_int % 60;
    let total_minutes = total_seconds_int / 60;
    let minutes = total_minutes % 60;
    let hours = total_minutes / 60;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}
