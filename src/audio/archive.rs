//! Bounded, timestamped archive of recently captured segments.
//!
//! [`ArchiveBuffer`] is an ordered FIFO of [`Segment`]s with a hard capacity
//! of [`MAX_ARCHIVE_SEGMENTS`].  Appending past capacity evicts exactly one
//! segment from the front, so the archive always holds the most recent
//! `MAX_ARCHIVE_SEGMENTS` blocks in capture order.  Eviction happens only
//! inside [`append`](ArchiveBuffer::append) — there is no background sweep.
//!
//! The archive is shared between the capture feeder thread (appends) and the
//! scheduler tasks (reads for selection), so production code wraps it in
//! `Arc<Mutex<…>>` ([`SharedArchive`]).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::segment::Segment;

/// Maximum number of segments retained in the archive.
///
/// At 4096 samples per segment and 44.1 kHz this is roughly 28 seconds of
/// rolling history.
pub const MAX_ARCHIVE_SEGMENTS: usize = 300;

// ---------------------------------------------------------------------------
// ArchiveBuffer
// ---------------------------------------------------------------------------

/// Bounded FIFO of timestamped segments.
///
/// # Example
///
/// ```rust
/// use std::time::Instant;
/// use mishear::audio::{ArchiveBuffer, Segment, SEGMENT_SAMPLES};
///
/// let mut archive = ArchiveBuffer::new();
/// archive.append(Segment::new(vec![0.0; SEGMENT_SAMPLES], Instant::now()));
/// assert_eq!(archive.len(), 1);
/// assert!(archive.at(0).is_some());
/// assert!(archive.at(1).is_none());
/// ```
#[derive(Debug, Default)]
pub struct ArchiveBuffer {
    segments: VecDeque<Segment>,
}

impl ArchiveBuffer {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self {
            segments: VecDeque::with_capacity(MAX_ARCHIVE_SEGMENTS),
        }
    }

    /// Append a segment, evicting the oldest one when the archive is full.
    ///
    /// Always succeeds — capacity eviction is the normal overflow policy,
    /// not an error.
    pub fn append(&mut self, segment: Segment) {
        self.segments.push_back(segment);
        if self.segments.len() > MAX_ARCHIVE_SEGMENTS {
            self.segments.pop_front();
        }
    }

    /// Number of segments currently retained.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` when no segments are retained.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment at `index`, counted from the oldest retained segment.
    ///
    /// An out-of-range index is a caller bug: it trips a `debug_assert!` in
    /// debug builds and returns `None` in release builds.
    pub fn at(&self, index: usize) -> Option<&Segment> {
        debug_assert!(
            index < self.segments.len(),
            "archive index {index} out of range (len {})",
            self.segments.len()
        );
        self.segments.get(index)
    }

    /// Indices of every segment captured *before* `now - exclude_recent`.
    ///
    /// An empty result means the whole archive is younger than the exclusion
    /// window; callers fall back to the full index range (degraded mode, see
    /// the selector).  This is a documented policy, not a fault.
    pub fn candidate_indices(&self, now: Instant, exclude_recent: Duration) -> Vec<usize> {
        let cutoff = now.checked_sub(exclude_recent);
        match cutoff {
            // `now` is too close to process start to subtract the window:
            // everything is "recent", so no candidates.
            None => Vec::new(),
            Some(cutoff) => self
                .segments
                .iter()
                .enumerate()
                .filter(|(_, seg)| seg.captured_at() < cutoff)
                .map(|(i, _)| i)
                .collect(),
        }
    }

    /// Drop every retained segment.
    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

// ---------------------------------------------------------------------------
// SharedArchive
// ---------------------------------------------------------------------------

/// Thread-safe handle to an [`ArchiveBuffer`].
///
/// The capture feeder thread appends; scheduler tasks read for selection.
/// Lock for short critical sections only — never across an `.await`.
pub type SharedArchive = Arc<Mutex<ArchiveBuffer>>;

/// Construct a new empty [`SharedArchive`].
pub fn new_shared_archive() -> SharedArchive {
    Arc::new(Mutex::new(ArchiveBuffer::new()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::segment::SEGMENT_SAMPLES;

    fn tagged_segment(tag: f32, at: Instant) -> Segment {
        // First sample carries the tag so eviction order is observable.
        let mut samples = vec![0.0; SEGMENT_SAMPLES];
        samples[0] = tag;
        Segment::new(samples, at)
    }

    // ---- Capacity / eviction ----------------------------------------------

    #[test]
    fn never_exceeds_capacity() {
        let mut archive = ArchiveBuffer::new();
        let now = Instant::now();
        for i in 0..MAX_ARCHIVE_SEGMENTS + 50 {
            archive.append(tagged_segment(i as f32, now));
            assert!(archive.len() <= MAX_ARCHIVE_SEGMENTS);
        }
    }

    #[test]
    fn overflow_evicts_the_first_appended_segment() {
        let mut archive = ArchiveBuffer::new();
        let now = Instant::now();
        for i in 0..=MAX_ARCHIVE_SEGMENTS {
            archive.append(tagged_segment(i as f32, now));
        }

        assert_eq!(archive.len(), MAX_ARCHIVE_SEGMENTS);
        // Segment tagged 0.0 is gone; oldest retained is tag 1.0.
        assert_eq!(archive.at(0).unwrap().samples()[0], 1.0);
    }

    /// End-to-end retention scenario: 400 appends with strictly increasing
    /// timestamps 100 ms apart leave the 300 most recent segments, so the
    /// oldest retained segment was originally index 100.
    #[test]
    fn four_hundred_appends_retain_indices_100_to_399() {
        let mut archive = ArchiveBuffer::new();
        let base = Instant::now();

        for i in 0..400u32 {
            let at = base + Duration::from_millis(u64::from(i) * 100);
            archive.append(tagged_segment(i as f32, at));
        }

        assert_eq!(archive.len(), 300);
        assert_eq!(archive.at(0).unwrap().samples()[0], 100.0);
        assert_eq!(archive.at(299).unwrap().samples()[0], 399.0);

        // Insertion order equals capture order throughout.
        for i in 0..300 {
            assert_eq!(archive.at(i).unwrap().samples()[0], (100 + i) as f32);
        }
    }

    // ---- Indexed access ----------------------------------------------------

    #[test]
    fn at_returns_segments_oldest_first() {
        let mut archive = ArchiveBuffer::new();
        let now = Instant::now();
        archive.append(tagged_segment(1.0, now));
        archive.append(tagged_segment(2.0, now));

        assert_eq!(archive.at(0).unwrap().samples()[0], 1.0);
        assert_eq!(archive.at(1).unwrap().samples()[0], 2.0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn at_out_of_range_is_none_in_release() {
        let archive = ArchiveBuffer::new();
        assert!(archive.at(0).is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn at_out_of_range_asserts_in_debug() {
        let archive = ArchiveBuffer::new();
        let _ = archive.at(0);
    }

    // ---- Exclusion window --------------------------------------------------

    #[test]
    fn candidate_indices_excludes_recent_segments() {
        let mut archive = ArchiveBuffer::new();
        let now = Instant::now() + Duration::from_secs(60);

        // Timestamps spanning now-5000ms .. now in 1 s steps.
        for age_ms in [5000u64, 4500, 3999, 2000, 0] {
            let at = now - Duration::from_millis(age_ms);
            archive.append(tagged_segment(age_ms as f32, at));
        }

        let candidates = archive.candidate_indices(now, Duration::from_millis(4000));
        // Only the segments strictly older than 4000 ms qualify.
        assert_eq!(candidates, vec![0, 1]);
    }

    #[test]
    fn candidate_indices_empty_when_all_segments_are_recent() {
        let mut archive = ArchiveBuffer::new();
        let now = Instant::now() + Duration::from_secs(60);

        for age_ms in [3000u64, 2000, 1000] {
            archive.append(tagged_segment(0.0, now - Duration::from_millis(age_ms)));
        }

        let candidates = archive.candidate_indices(now, Duration::from_millis(4000));
        assert!(candidates.is_empty());
    }

    #[test]
    fn candidate_indices_on_empty_archive_is_empty() {
        let archive = ArchiveBuffer::new();
        let candidates =
            archive.candidate_indices(Instant::now() + Duration::from_secs(60), Duration::from_millis(4000));
        assert!(candidates.is_empty());
    }

    // ---- Clear -------------------------------------------------------------

    #[test]
    fn clear_empties_the_archive() {
        let mut archive = ArchiveBuffer::new();
        archive.append(tagged_segment(1.0, Instant::now()));
        archive.clear();

        assert!(archive.is_empty());
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn shared_archive_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedArchive>();
    }
}
