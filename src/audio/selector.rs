//! Random fragment selection from the archive.
//!
//! Given the archive and timing parameters, [`select_fragment`] picks a
//! pseudo-random window of past audio and materialises it as a flat, owned
//! sample vector.  Selection is purely random/time-based — it never looks
//! at the audio content.
//!
//! The exclusion window keeps the most recent few seconds out of the
//! candidate pool so a replay always sounds like a *memory*, never an echo
//! of what is being said right now.  When the whole archive is younger than
//! the window (session just started), selection falls back to the full
//! index range; this degraded mode is reported to the caller via
//! [`Fragment::degraded`], not treated as an error.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::ReplayConfig;

use super::archive::ArchiveBuffer;
use super::segment::SEGMENT_SAMPLES;

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// A concatenated, copied run of archived audio selected for replay.
///
/// Owns its sample data outright — later archive evictions cannot touch it.
/// Computed fresh per playback request and discarded after the render.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Flat mono samples, length a multiple of [`SEGMENT_SAMPLES`] unless
    /// the archive ran out before the requested length was reached.
    pub samples: Vec<f32>,
    /// Archive index the concatenation started at (selection diagnostic).
    pub start_index: usize,
    /// `true` when the exclusion window left no candidates and the start
    /// index was drawn from the full range instead.
    pub degraded: bool,
}

// ---------------------------------------------------------------------------
// select_fragment
// ---------------------------------------------------------------------------

/// Select a random fragment of past audio from `archive`.
///
/// Returns `None` only when the archive is empty; the scheduler checks its
/// minimum-fill threshold before calling, so `None` here means a caller
/// raced a `clear()` and should simply skip the replay.
///
/// The fragment duration is drawn uniformly from
/// `[replay.min_secs, replay.max_secs]` and quantized to whole segments via
/// [`quantized_len`].  Concatenation starts at the drawn index and wraps
/// circularly modulo the current archive length, visiting each segment at
/// most once, so a small archive yields a shorter-than-requested fragment
/// rather than repeating itself.
pub fn select_fragment<R: Rng>(
    archive: &ArchiveBuffer,
    now: Instant,
    sample_rate: u32,
    replay: &ReplayConfig,
    rng: &mut R,
) -> Option<Fragment> {
    let len = archive.len();
    if len == 0 {
        return None;
    }

    let exclude = Duration::from_millis(replay.exclude_recent_ms);
    let candidates = archive.candidate_indices(now, exclude);

    let (start_index, degraded) = if candidates.is_empty() {
        // Archive too young for the exclusion window: fall back to the full
        // index range.
        (rng.gen_range(0..len), true)
    } else {
        (candidates[rng.gen_range(0..candidates.len())], false)
    };

    let duration_secs = rng.gen_range(replay.min_secs..=replay.max_secs);
    let target = quantized_len(duration_secs, sample_rate);

    let mut samples = Vec::with_capacity(target.min(len * SEGMENT_SAMPLES));
    for offset in 0..len {
        let remaining = target - samples.len();
        if remaining == 0 {
            break;
        }
        let index = (start_index + offset) % len;
        let segment = archive.at(index)?;
        let take = remaining.min(segment.samples().len());
        samples.extend_from_slice(&segment.samples()[..take]);
    }

    Some(Fragment {
        samples,
        start_index,
        degraded,
    })
}

/// Requested sample count for a fragment of `duration_secs`, quantized to
/// whole-segment multiples (never below one segment).
pub fn quantized_len(duration_secs: f32, sample_rate: u32) -> usize {
    let blocks = (duration_secs * sample_rate as f32 / SEGMENT_SAMPLES as f32).round() as usize;
    blocks.max(1) * SEGMENT_SAMPLES
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
