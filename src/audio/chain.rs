//! Replay processing chain — low-pass filter, stereo pan, replay gain.
//!
//! Each replay invocation draws a fresh [`ChainParams`] and renders the
//! selected mono fragment into interleaved stereo frames with
//! [`render_replay`]:
//!
//! ```text
//! fragment → one-pole low-pass → constant-power pan → replay gain → sink
//! ```
//!
//! The render is pure and offline; the ephemeral, self-cleaning resource is
//! the one-shot output stream owned by the sink (see `audio::output`).  The
//! muffled low-pass and the off-center pan are what make a replay sound
//! like a half-remembered voice rather than a literal echo.

use rand::Rng;

use crate::config::ReplayConfig;

// ---------------------------------------------------------------------------
// ChainParams
// ---------------------------------------------------------------------------

/// Randomized parameters of one replay chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainParams {
    /// Low-pass cutoff frequency in Hz.
    pub cutoff_hz: f32,
    /// Stereo position in `[-1.0, 1.0]`; negative is left.
    pub pan: f32,
    /// Linear output gain.
    pub gain: f32,
}

impl ChainParams {
    /// Draw cutoff and pan uniformly from the configured ranges.
    ///
    /// The pan magnitude comes from `[pan_min, pan_max]` and its sign is a
    /// 50/50 coin flip; the gain is the fixed configured attenuation.
    pub fn draw<R: Rng>(rng: &mut R, replay: &ReplayConfig) -> Self {
        let cutoff_hz = rng.gen_range(replay.cutoff_min_hz..=replay.cutoff_max_hz);
        let magnitude = rng.gen_range(replay.pan_min..=replay.pan_max);
        let pan = if rng.gen_bool(0.5) { magnitude } else { -magnitude };

        Self {
            cutoff_hz,
            pan,
            gain: replay.replay_gain,
        }
    }
}

// ---------------------------------------------------------------------------
// render_replay
// ---------------------------------------------------------------------------

/// Render a mono fragment into interleaved stereo frames.
///
/// Output length is exactly `2 * fragment.len()`.
pub fn render_replay(fragment: &[f32], sample_rate: u32, params: &ChainParams) -> Vec<f32> {
    let filtered = low_pass(fragment, sample_rate, params.cutoff_hz);
    let (left_gain, right_gain) = pan_gains(params.pan);

    let mut frames = Vec::with_capacity(filtered.len() * 2);
    for sample in filtered {
        frames.push(sample * left_gain * params.gain);
        frames.push(sample * right_gain * params.gain);
    }
    frames
}

/// One-pole IIR low-pass at `cutoff_hz`.
fn low_pass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 {
        return Vec::new();
    }

    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let alpha = dt / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0f32;
    for &x in samples {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Constant-power pan: `pan` -1 = full left, 0 = center, 1 = full right.
fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
