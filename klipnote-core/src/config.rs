//! KlipNote configuration.
//!
//! A thin typed layer over the same string key/value model the rest of this
//! codebase's lineage uses for `app.set()` / `app.get()`: load from the
//! process environment, keep a cheap-to-clone immutable snapshot, and expose
//! one typed accessor per named option in spec §6 rather than a bag of
//! strings that every call site has to re-parse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::model::Model;

const ENV_PREFIX: &str = "KLIPNOTE_";

/// Mutable builder; call [`Config::from_env`] at startup, then
/// [`Config::snapshot`] to get the immutable, `Arc`-backed view handlers and
/// worker pools actually read.
#[derive(Debug, Default)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Load `KLIPNOTE_*` environment variables, lower-cased key with `_` as
    /// separator (e.g. `KLIPNOTE_MAX_FILE_SIZE` -> `max_file_size`).
    pub fn from_env() -> Self {
        let mut cfg = Self::new();
        for (key, value) in std::env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                cfg.set(stripped.to_lowercase(), value);
            }
        }
        cfg
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot(Arc::new(ConfigInner {
            values: self.values.clone(),
        }))
    }
}

#[derive(Debug)]
struct ConfigInner {
    values: HashMap<String, String>,
}

/// Cheap to clone (one `Arc` bump). This is what request handlers and worker
/// loops actually hold; config never mutates after startup.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot(Arc<ConfigInner>);

impl ConfigSnapshot {
    fn raw(&self, key: &str) -> Option<&str> {
        self.0.values.get(key).map(|s| s.as_str())
    }

    fn raw_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.raw(key).unwrap_or(default)
    }

    /// `DefaultTranscriptionModel`: `belle2`, `whisperx`, or `auto` (router decides).
    pub fn default_transcription_model(&self) -> Option<Model> {
        match self.raw_or("default_transcription_model", "auto") {
            "belle2" => Some(Model::Belle2),
            "whisperx" => Some(Model::WhisperX),
            _ => None,
        }
    }

    /// `MaxFileSize`: upload admission bound in bytes. Default 2 GiB.
    pub fn max_file_size(&self) -> u64 {
        self.raw("max_file_size")
            .and_then(|v| v.parse().ok())
            .unwrap_or(2 * 1024 * 1024 * 1024)
    }

    /// `MaxDurationHours`: probe admission bound. Default 2 hours.
    pub fn max_duration_hours(&self) -> f64 {
        self.raw("max_duration_hours")
            .and_then(|v| v.parse().ok())
            .unwrap_or(2.0)
    }

    /// `UploadDir`: media persistence root. Default `./uploads`.
    pub fn upload_dir(&self) -> String {
        self.raw_or("upload_dir", "./uploads").to_string()
    }

    /// `AllowedMediaTypes`: content-type gate.
    pub fn allowed_media_types(&self) -> Vec<String> {
        match self.raw("allowed_media_types") {
            Some(v) => v.split(',').map(|s| s.trim().to_string()).collect(),
            None => vec![
                "audio/mpeg".to_string(),
                "audio/wav".to_string(),
                "audio/mp4".to_string(),
                "audio/x-m4a".to_string(),
                "video/mp4".to_string(),
            ],
        }
    }

    /// `Belle2Concurrency`: GPU lease permits for the belle2 pool. Default 1.
    pub fn belle2_concurrency(&self) -> usize {
        self.raw("belle2_concurrency")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    /// `WhisperxConcurrency`: GPU lease permits for the whisperx pool. Default 1.
    pub fn whisperx_concurrency(&self) -> usize {
        self.raw("whisperx_concurrency")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    /// `WorkerVisibilityTimeout`: broker redelivery deadline. Default 30 min.
    pub fn worker_visibility_timeout(&self) -> Duration {
        self.raw("worker_visibility_timeout_secs")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30 * 60))
    }

    /// `MaxDeliveries`: transient-retry cap (2 redeliveries per spec §4.5 = 3 total attempts).
    pub fn max_deliveries(&self) -> u32 {
        self.raw("max_deliveries")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3)
    }

    /// `ProbeTimeout`: hard ceiling on the probe subprocess. Default 60s.
    pub fn probe_timeout(&self) -> Duration {
        self.raw("probe_timeout_secs")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60))
    }

    /// `InferenceMultiplier`: inference hard ceiling = multiplier × media duration. Default 6.0.
    pub fn inference_multiplier(&self) -> f64 {
        self.raw("inference_multiplier")
            .and_then(|v| v.parse().ok())
            .unwrap_or(6.0)
    }

    /// `CorsOrigins`: HTTP origin allow-list. Empty means "allow any" (dev default).
    pub fn cors_origins(&self) -> Vec<String> {
        match self.raw("cors_origins") {
            Some(v) if !v.is_empty() => v.split(',').map(|s| s.trim().to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Bind address for the HTTP surface. Default `0.0.0.0:8080`.
    pub fn bind_addr(&self) -> String {
        self.raw_or("bind_addr", "0.0.0.0:8080").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let snap = Config::new().snapshot();
        assert_eq!(snap.max_file_size(), 2 * 1024 * 1024 * 1024);
        assert_eq!(snap.max_duration_hours(), 2.0);
        assert_eq!(snap.max_deliveries(), 3);
        assert_eq!(snap.worker_visibility_timeout(), Duration::from_secs(1800));
        assert!(snap.default_transcription_model().is_none());
    }

    #[test]
    fn overrides_apply() {
        let mut cfg = Config::new();
        cfg.set("max_file_size", "100");
        cfg.set("default_transcription_model", "belle2");
        let snap = cfg.snapshot();
        assert_eq!(snap.max_file_size(), 100);
        assert_eq!(snap.default_transcription_model(), Some(Model::Belle2));
    }
}
