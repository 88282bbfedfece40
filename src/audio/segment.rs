//! Fixed-length capture segments and the assembler that produces them.
//!
//! The capture layer delivers audio in whatever block sizes the hardware
//! feels like; the archive only ever stores [`Segment`]s of exactly
//! [`SEGMENT_SAMPLES`] mono samples.  [`SegmentAssembler`] sits between the
//! two, accumulating incoming samples and emitting a timestamped segment
//! each time a full block is available.

use std::time::Instant;

/// Number of mono samples in every archived segment.
pub const SEGMENT_SAMPLES: usize = 4096;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One fixed-length block of captured audio plus its capture timestamp.
///
/// Immutable once created.  The archive owns its segments exclusively;
/// anything handed to playback is a *copy* of the sample data, so a segment
/// being evicted can never corrupt an in-flight replay.
#[derive(Debug, Clone)]
pub struct Segment {
    samples: Vec<f32>,
    captured_at: Instant,
}

impl Segment {
    /// Create a segment from exactly [`SEGMENT_SAMPLES`] samples.
    ///
    /// # Panics
    ///
    /// Panics when `samples.len() != SEGMENT_SAMPLES` — the assembler is the
    /// only production caller and always delivers full blocks.
    pub fn new(samples: Vec<f32>, captured_at: Instant) -> Self {
        assert_eq!(
            samples.len(),
            SEGMENT_SAMPLES,
            "Segment requires exactly {SEGMENT_SAMPLES} samples"
        );
        Self {
            samples,
            captured_at,
        }
    }

    /// The segment's mono samples in `[-1.0, 1.0]`.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Monotonic timestamp taken when the segment was assembled.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

#[cfg(test)]
impl Segment {
    /// Test helper: a segment filled with a constant `value`, stamped `at`.
    pub fn constant(value: f32, at: Instant) -> Self {
        Self::new(vec![value; SEGMENT_SAMPLES], at)
    }
}

// ---------------------------------------------------------------------------
// SegmentAssembler
// ---------------------------------------------------------------------------

/// Accumulates arbitrarily-sized sample blocks into whole [`Segment`]s.
///
/// Feed it whatever the capture callback delivers; it returns zero or more
/// completed segments per call.  Samples left over after the last full block
/// stay buffered for the next call, so no audio is ever dropped between
/// segments.
///
/// # Example
///
/// ```rust
/// use std::time::Instant;
/// use mishear::audio::{Segment, SegmentAssembler, SEGMENT_SAMPLES};
///
/// let mut asm = SegmentAssembler::new();
/// let block = vec![0.0_f32; SEGMENT_SAMPLES + 100];
/// let segments = asm.push(&block, Instant::now());
/// assert_eq!(segments.len(), 1);
/// assert_eq!(asm.pending(), 100);
/// ```
#[derive(Debug, Default)]
pub struct SegmentAssembler {
    pending: Vec<f32>,
}

impl SegmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `samples` and return every segment completed by this push.
    ///
    /// `now` is stamped onto each completed segment.  Blocks smaller than a
    /// segment simply accumulate; a large block can complete several
    /// segments at once.
    pub fn push(&mut self, samples: &[f32], now: Instant) -> Vec<Segment> {
        self.pending.extend_from_slice(samples);

        let mut completed = Vec::new();
        while self.pending.len() >= SEGMENT_SAMPLES {
            let rest = self.pending.split_off(SEGMENT_SAMPLES);
            let block = std::mem::replace(&mut self.pending, rest);
            completed.push(Segment::new(block, now));
        }
        completed
    }

    /// Number of samples buffered but not yet part of a completed segment.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Discard any partially accumulated samples.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
