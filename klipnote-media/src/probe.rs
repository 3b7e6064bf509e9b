//! External media probe (spec §4.4 step 3, §6 `TranscriptionService::ProbeDuration`).
//!
//! Grounded on the subprocess-invocation style used throughout the pack's
//! ffmpeg-adjacent tools (e.g. `muyuanjin-ffui`'s external tool wrappers),
//! adapted to `tokio::process::Command` since the rest of this workspace is
//! async end-to-end.

use std::path::Path;
use std::time::Duration;

use klipnote_core::{KlipError, KlipResult};
use tokio::process::Command;
use tracing::warn;

/// Result of a successful probe: just the duration, per spec §4.4 step 3
/// ("extract duration and container integrity").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
    pub duration_seconds: f64,
}

#[async_trait::async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> KlipResult<ProbeInfo>;
}

/// Invokes `ffprobe` out-of-process with a hard timeout (spec §5,
/// `ProbeTimeout`, default 60s). A non-zero exit, a timeout, or unparsable
/// output all map to `InvalidMedia` per spec §4.4 step 3.
pub struct FfprobeProbe {
    binary: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "ffprobe".to_string(),
            timeout,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait::async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> KlipResult<ProbeInfo> {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path);

        let output = tokio::time::timeout(self.timeout, cmd.output()).await;

        let output = match output {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to spawn ffprobe");
                return Err(KlipError::invalid_media("media could not be probed").into_anyhow());
            }
            Err(_) => {
                warn!(?path, "ffprobe timed out");
                return Err(KlipError::invalid_media("media probe timed out").into_anyhow());
            }
        };

        if !output.status.success() {
            warn!(?path, status = ?output.status, "ffprobe reported failure");
            return Err(KlipError::invalid_media("media is unreadable or corrupt").into_anyhow());
        }

        parse_ffprobe_json(&output.stdout)
            .ok_or_else(|| KlipError::invalid_media("media duration could not be determined").into_anyhow())
    }
}

fn parse_ffprobe_json(stdout: &[u8]) -> Option<ProbeInfo> {
    let value: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    let duration_str = value.get("format")?.get("duration")?.as_str()?;
    let duration_seconds: f64 = duration_str.parse().ok()?;
    if !duration_seconds.is_finite() || duration_seconds < 0.0 {
        return None;
    }
    Some(ProbeInfo { duration_seconds })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_ffprobe_output() {
        let json = br#"{"format": {"duration": "125.440000"}}"#;
        let info = parse_ffprobe_json(json).unwrap();
        assert!((info.duration_seconds - 125.44).abs() < 1e-6);
    }

    #[test]
    fn rejects_missing_duration_field() {
        let json = br#"{"format": {}}"#;
        assert!(parse_ffprobe_json(json).is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_ffprobe_json(b"not json").is_none());
    }
}
