//! HTTP byte-range resolution for media playback (spec §4.6), generalized
//! from the teacher's `dog_blob::types::ByteRange`.

/// A requested byte range; `end == None` means "to end of file", matching
/// the semantics of an HTTP `Range: bytes=start-` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Parse a single-range `Range: bytes=start-end` header value. Multi-range
    /// requests are not supported; callers fall back to serving the whole
    /// body (mirrors the teacher's single-range media handlers).
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.strip_prefix("bytes=")?;
        let (start_str, end_str) = spec.split_once('-')?;
        if start_str.is_empty() {
            // `bytes=-N`: last N bytes. Caller resolves against total size.
            let suffix_len: u64 = end_str.parse().ok()?;
            return Some(Self {
                start: u64::MAX - suffix_len + 1,
                end: None,
            });
        }
        let start: u64 = start_str.parse().ok()?;
        let end = if end_str.is_empty() {
            None
        } else {
            Some(end_str.parse().ok()?)
        };
        Some(Self { start, end })
    }
}

/// A range resolved against a known total file size: `start..=end` inclusive,
/// `end < total_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl ResolvedRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range_header(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

impl ByteRange {
    /// Resolve against a known total size, clamping and validating. `None`
    /// on an unsatisfiable range (spec: callers should respond 416, though
    /// this crate leaves status-code mapping to `klipnote-http`).
    pub fn resolve(&self, total_size: u64) -> Option<ResolvedRange> {
        if total_size == 0 {
            return None;
        }
        let start = if self.start == u64::MAX {
            // Degenerate suffix-length overflow guard; treat as "whole file".
            0
        } else if self.start >= total_size {
            return None;
        } else {
            self.start
        };
        let end = self
            .end
            .map(|e| e.min(total_size - 1))
            .unwrap_or(total_size - 1);
        if end < start {
            return None;
        }
        Some(ResolvedRange {
            start,
            end,
            total_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_range() {
        let r = ByteRange::parse("bytes=100-199").unwrap();
        assert_eq!(r.start, 100);
        assert_eq!(r.end, Some(199));
    }

    #[test]
    fn parses_open_ended_range() {
        let r = ByteRange::parse("bytes=500-").unwrap();
        assert_eq!(r.start, 500);
        assert_eq!(r.end, None);
    }

    #[test]
    fn resolves_clamping_end_to_total_size() {
        let r = ByteRange::new(0, Some(1_000_000)).resolve(1000).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 999);
        assert_eq!(r.len(), 1000);
    }

    #[test]
    fn rejects_start_past_end_of_file() {
        assert!(ByteRange::new(2000, None).resolve(1000).is_none());
    }

    #[test]
    fn content_range_header_format() {
        let r = ResolvedRange {
            start: 0,
            end: 99,
            total_size: 1000,
        };
        assert_eq!(r.content_range_header(), "bytes 0-99/1000");
    }
}
