//! Segment normalization (spec §4.5 step 4): the last pass between a raw
//! backend transcript and the committed [`Transcript`]. Pure, synchronous,
//! no I/O.

use klipnote_store::{Segment, Transcript};
use tracing::warn;

/// Turn a backend's raw segment list into the sorted, clipped, clamped
/// transcript the Job Store is allowed to persist:
///
/// 1. Drop segments whose text is empty after trimming.
/// 2. Clip negative `start` values to `0.0`.
/// 3. Clamp `end` values to `duration_seconds`.
/// 4. Stable-sort by `start`.
/// 5. Drop any segment left with `end <= start` after clipping/clamping.
pub fn normalize_segments(raw: Vec<Segment>, duration_seconds: f64) -> Transcript {
    let mut segments: Vec<Segment> = raw
        .into_iter()
        .filter_map(|mut seg| {
            if seg.text.trim().is_empty() {
                return None;
            }
            seg.text = seg.text.trim().to_string();
            if seg.start < 0.0 {
                seg.start = 0.0;
            }
            if seg.end > duration_seconds {
                seg.end = duration_seconds;
            }
            if seg.end <= seg.start {
                warn!(start = seg.start, end = seg.end, "dropping malformed segment");
                return None;
            }
            Some(seg)
        })
        .collect();

    segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

    Transcript { segments }
}
