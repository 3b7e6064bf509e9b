//! `TranscriptionService` capability interface (spec §6, §9 "Multiple
//! inheritance across service base classes" redesign guidance): one trait,
//! two tagged backend variants selected by the Router rather than a class
//! hierarchy. The backends themselves are out of scope (spec §1) — these
//! are thin stand-ins that produce plausible segment lists so the
//! dispatcher's phased-progress and normalization logic has something real
//! to drive against.

use std::path::Path;
use std::time::Duration;

use klipnote_store::Segment;
use rand::Rng;

/// Segments as emitted by a backend, before worker-side normalization
/// (spec §4.5 step 4: clipping, clamping, sort, malformed-segment drop).
pub type RawTranscript = Vec<Segment>;

/// Failure classification a backend maps its exceptions onto (spec §4.5
/// "Failure & retry").
#[derive(Debug, Clone)]
pub enum TranscribeError {
    /// GPU OOM, I/O hiccup, model download interruption: worth redelivering.
    Transient(String),
    /// Unreadable media, unsupported codec, model-side validation failure.
    Permanent(String),
    /// Administrative cancellation.
    Cancelled,
}

impl std::fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscribeError::Transient(m) => write!(f, "transient: {m}"),
            TranscribeError::Permanent(m) => write!(f, "permanent: {m}"),
            TranscribeError::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The sole interface the Dispatcher depends on (spec §6). Concrete
/// backends are tagged variants selected by the Router (`klipnote_queue::route`),
/// not a class hierarchy.
#[async_trait::async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(
        &self,
        media_path: &Path,
        language_hint: Option<&str>,
        duration_seconds: f64,
    ) -> Result<RawTranscript, TranscribeError>;
}

/// BELLE-2 stand-in: the backend the Router selects for Chinese-language
/// audio. Segments phrases every ~4 seconds.
pub struct Belle2Service;

#[async_trait::async_trait]
impl TranscriptionService for Belle2Service {
    async fn transcribe(
        &self,
        media_path: &Path,
        _language_hint: Option<&str>,
        duration_seconds: f64,
    ) -> Result<RawTranscript, TranscribeError> {
        stub_transcribe(media_path, duration_seconds, "belle2").await
    }
}

/// WhisperX stand-in: the backend the Router selects by default.
pub struct WhisperXService;

#[async_trait::async_trait]
impl TranscriptionService for WhisperXService {
    async fn transcribe(
        &self,
        media_path: &Path,
        _language_hint: Option<&str>,
        duration_seconds: f64,
    ) -> Result<RawTranscript, TranscribeError> {
        stub_transcribe(media_path, duration_seconds, "whisperx").await
    }
}

async fn stub_transcribe(
    media_path: &Path,
    duration_seconds: f64,
    backend: &str,
) -> Result<RawTranscript, TranscribeError> {
    if !media_path.exists() {
        return Err(TranscribeError::Permanent(format!(
            "media file missing at transcribe time: {}",
            media_path.display()
        )));
    }
    if duration_seconds <= 0.0 {
        return Err(TranscribeError::Permanent(
            "media has zero or unknown duration".to_string(),
        ));
    }

    // Stand-in for a many-minute inference call; kept short so the
    // worker pool's phase timing is exercisable in tests.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let phrase_len = 4.0_f64;
    let mut segments = Vec::new();
    let mut t = 0.0_f64;
    let mut i = 0usize;
    while t < duration_seconds {
        let end = (t + phrase_len).min(duration_seconds);
        segments.push(Segment {
            start: t,
            end,
            text: format!("[{backend} segment {i}]"),
            confidence: Some(confidence_for(i)),
        });
        t = end;
        i += 1;
    }
    if segments.is_empty() {
        return Err(TranscribeError::Permanent(
            "no speech segments produced".to_string(),
        ));
    }
    Ok(segments)
}

fn confidence_for(i: usize) -> f64 {
    let mut rng = rand::thread_rng();
    let jitter: f64 = rng.gen_range(-0.02..0.02);
    (0.9 + (i as f64 * 0.0) + jitter).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_backend_produces_nonempty_start_sorted_segments() {
        let tmp = std::env::temp_dir().join(format!("klipnote-svc-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, b"fake media").await.unwrap();

        let svc = WhisperXService;
        let segments = svc.transcribe(&tmp, None, 10.0).await.unwrap();
        assert!(!segments.is_empty());
        assert!(segments.windows(2).all(|w| w[0].start <= w[1].start));
        assert!(segments.iter().all(|s| s.end > s.start));

        let _ = tokio::fs::remove_file(&tmp).await;
    }

    #[tokio::test]
    async fn missing_media_is_a_permanent_failure() {
        let svc = Belle2Service;
        let err = svc
            .transcribe(Path::new("/nonexistent/path.wav"), Some("zh"), 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscribeError::Permanent(_)));
    }
}
