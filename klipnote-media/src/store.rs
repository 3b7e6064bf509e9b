//! Local-filesystem media store (spec §4.4 step 1/4, §4.6 media/export
//! persistence). One directory per job: `uploads/{job_id}/original.{ext}`
//! and `uploads/{job_id}/transcription.json`, matching the persisted layout
//! in spec §6.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use klipnote_core::{JobId, KlipError, KlipResult};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{info, warn};

use crate::range::{ByteRange, ResolvedRange};

/// Stream of raw body chunks, as handed in by the HTTP layer's multipart
/// field reader. Kept generic (not an axum type) so this crate has no
/// dependency on the transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Outcome of a completed streaming receipt (spec §4.4 step 1).
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// A media file opened for range-capable reading (spec §4.6).
pub struct OpenedMedia {
    pub file: File,
    pub resolved_range: ResolvedRange,
}

/// Local-filesystem backend rooted at `UploadDir` (spec §6). Cheap to clone.
#[derive(Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    pub fn original_path(&self, job_id: &JobId, ext: &str) -> PathBuf {
        self.job_dir(job_id).join(format!("original.{ext}"))
    }

    pub fn transcript_path(&self, job_id: &JobId) -> PathBuf {
        self.job_dir(job_id).join("transcription.json")
    }

    /// Receive a body stream in bounded chunks straight to a temp file under
    /// the job's target directory, never buffering the whole body in memory
    /// (spec §4.4 step 1). Aborts and deletes partial bytes if `max_bytes` is
    /// exceeded.
    pub async fn receive_stream(
        &self,
        job_id: &JobId,
        ext: &str,
        mut stream: ByteStream,
        max_bytes: u64,
    ) -> KlipResult<ReceivedUpload> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| KlipError::general_error("could not create upload directory").with_source(e.into()))?;
        let path = self.original_path(job_id, ext);

        let file = File::create(&path)
            .await
            .map_err(|e| KlipError::general_error("could not create upload file").with_source(e.into()))?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                KlipError::general_error("upload stream read failed").with_source(e.into())
            })?;
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(writer);
                let _ = tokio::fs::remove_file(&path).await;
                warn!(job_id = %job_id, written, max_bytes, "upload exceeded MaxFileSize");
                return Err(KlipError::payload_too_large(format!(
                    "upload exceeds maximum size of {max_bytes} bytes"
                ))
                .into_anyhow());
            }
            if let Err(e) = writer.write_all(&chunk).await {
                drop(writer);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(KlipError::general_error("failed writing upload to disk").with_source(e.into()).into_anyhow());
            }
        }

        if let Err(e) = writer.flush().await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(KlipError::general_error("failed flushing upload to disk").with_source(e.into()).into_anyhow());
        }

        info!(job_id = %job_id, bytes = written, "received upload");
        Ok(ReceivedUpload {
            path,
            bytes_written: written,
        })
    }

    /// Delete everything persisted for a job's upload (admission-failure
    /// rollback paths only — spec §4.4 steps 1/3 delete bytes on rejection).
    pub async fn delete_job_dir(&self, job_id: &JobId) {
        if let Err(e) = tokio::fs::remove_dir_all(self.job_dir(job_id)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(job_id = %job_id, error = %e, "failed to clean up rejected upload");
            }
        }
    }

    /// Materialize the transcript JSON to disk (spec §4.5 step 5: the file
    /// write precedes the Job Store commit).
    pub async fn write_transcript_json(&self, job_id: &JobId, json: &serde_json::Value) -> KlipResult<PathBuf> {
        let path = self.transcript_path(job_id);
        let bytes = serde_json::to_vec_pretty(json)
            .map_err(|e| KlipError::general_error("failed to serialize transcript").with_source(e.into()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| KlipError::general_error("failed to write transcript file").with_source(e.into()))?;
        Ok(path)
    }

    /// Open a media file for range-capable reading (spec §4.6). Returns
    /// `NotFound` if the file is missing; the caller seeks `file` to
    /// `resolved_range.start` before streaming `resolved_range.len()` bytes.
    pub async fn open_range(&self, path: &Path, range: Option<ByteRange>) -> KlipResult<OpenedMedia> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| KlipError::not_found("media file not found").into_anyhow())?;
        let total_size = metadata.len();

        let resolved = match range {
            Some(r) => r
                .resolve(total_size)
                .ok_or_else(|| KlipError::bad_request("unsatisfiable range").into_anyhow())?,
            None => ResolvedRange {
                start: 0,
                end: total_size.saturating_sub(1),
                total_size,
            },
        };

        let mut file = File::open(path)
            .await
            .map_err(|_| KlipError::not_found("media file not found").into_anyhow())?;
        file.seek(std::io::SeekFrom::Start(resolved.start))
            .await
            .map_err(|e| KlipError::general_error("failed to seek media file").with_source(e.into()))?;

        Ok(OpenedMedia {
            file,
            resolved_range: resolved,
        })
    }
}

impl OpenedMedia {
    /// Read exactly the resolved range into memory. Fine for the span of a
    /// single HTTP response chunk; large-range streaming is left to the
    /// caller wrapping `file` in its own chunked body if needed.
    pub async fn read_to_vec(mut self) -> KlipResult<Vec<u8>> {
        let len = self.resolved_range.len() as usize;
        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .await
            .map_err(|e| KlipError::general_error("failed reading media range").with_source(e.into()))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn stream_of(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn receives_stream_to_disk() {
        let dir = tempdir();
        let store = LocalMediaStore::new(dir.path());
        let job_id = JobId::new();
        let result = store
            .receive_stream(&job_id, "mp3", stream_of(vec![b"hello ", b"world"]), 1_000)
            .await
            .unwrap();
        assert_eq!(result.bytes_written, 11);
        let bytes = tokio::fs::read(&result.path).await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn rejects_oversized_upload_and_cleans_up() {
        let dir = tempdir();
        let store = LocalMediaStore::new(dir.path());
        let job_id = JobId::new();
        let err = store
            .receive_stream(&job_id, "mp3", stream_of(vec![b"0123456789", b"0123456789"]), 15)
            .await
            .unwrap_err();
        assert_eq!(
            KlipError::from_anyhow(&err).unwrap().kind,
            klipnote_core::ErrorKind::PayloadTooLarge
        );
        assert!(!store.original_path(&job_id, "mp3").exists());
    }

    #[tokio::test]
    async fn open_range_resolves_partial_content() {
        let dir = tempdir();
        let store = LocalMediaStore::new(dir.path());
        let job_id = JobId::new();
        store
            .receive_stream(&job_id, "wav", stream_of(vec![b"0123456789"]), 1_000)
            .await
            .unwrap();
        let path = store.original_path(&job_id, "wav");

        let opened = store
            .open_range(&path, Some(ByteRange::new(2, Some(5))))
            .await
            .unwrap();
        assert_eq!(opened.resolved_range.start, 2);
        assert_eq!(opened.resolved_range.end, 5);
        let bytes = opened.read_to_vec().await.unwrap();
        assert_eq!(bytes, b"2345");
    }

    #[tokio::test]
    async fn open_range_missing_file_is_not_found() {
        let dir = tempdir();
        let store = LocalMediaStore::new(dir.path());
        let err = store
            .open_range(&dir.path().join("nope.mp3"), None)
            .await
            .unwrap_err();
        assert_eq!(
            KlipError::from_anyhow(&err).unwrap().kind,
            klipnote_core::ErrorKind::NotFound
        );
    }

    struct TempDir(PathBuf);
    impl TempDir {
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
    fn tempdir() -> TempDir {
        let dir = std::env::temp_dir().join(format!("klipnote-media-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }
}
