//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin streaming [`CaptureBlock`]s over an mpsc
//! channel.  The returned stream guard is RAII — dropping it stops the
//! underlying cpal stream.
//!
//! The session layer depends on the [`CaptureSource`] trait rather than the
//! concrete device wrapper, so capture acquisition failures can be exercised
//! in tests without audio hardware.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CaptureBlock
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.  Use
/// [`crate::audio::downmix_to_mono`] before feeding the archive — the
/// archive is mono only.
#[derive(Debug, Clone)]
pub struct CaptureBlock {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this block in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
///
/// Any of these at session start is session-fatal: the scheduler must never
/// have been started and partially-initialized state is torn down.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// CaptureSource / CaptureStream
// ---------------------------------------------------------------------------

/// A source of capture blocks the session can start and stop.
///
/// Production code uses [`AudioCapture`]; tests substitute a mock that
/// either feeds synthetic blocks or fails acquisition on demand.
pub trait CaptureSource {
    /// Native sample rate of the blocks this source will deliver, in Hz.
    fn sample_rate(&self) -> u32;

    /// Number of interleaved channels per block.
    fn channels(&self) -> u16;

    /// Begin delivering blocks to `tx`.
    ///
    /// The returned guard keeps the stream alive; dropping it stops capture
    /// and closes `tx`, which is how the session's feeder thread learns to
    /// exit.
    fn start(&self, tx: mpsc::Sender<CaptureBlock>)
        -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// RAII guard for a running capture stream.
///
/// Intentionally not `Send`: `cpal::Stream` is not `Send` on every platform,
/// so the guard stays on the thread that started the session.
pub trait CaptureStream {}

/// Guard wrapping a live `cpal::Stream`.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

impl CaptureStream for StreamHandle {}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::mpsc;
/// use mishear::audio::{AudioCapture, CaptureBlock, CaptureSource};
///
/// let (tx, rx) = mpsc::channel::<CaptureBlock>();
/// let capture = AudioCapture::new().unwrap();
/// let _guard = capture.start(tx).unwrap();
/// // `_guard` keeps the stream alive; drop it to stop capturing.
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
}

impl AudioCapture {
    /// Create a new [`AudioCapture`] using the system default input device.
    ///
    /// Queries the device's preferred stream configuration (sample rate,
    /// channels, buffer size) so no manual configuration is required.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default stream configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }
}

impl CaptureSource for AudioCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    /// Start recording and send [`CaptureBlock`]s to `tx`.
    ///
    /// The cpal callback runs on a dedicated audio thread; each time the
    /// hardware delivers a buffer the raw `f32` samples are wrapped in a
    /// [`CaptureBlock`] and forwarded over the channel.  Send errors
    /// (receiver dropped) are silently ignored so the audio thread never
    /// panics.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::BuildStream`] or [`CaptureError::PlayStream`]
    /// if the platform rejects the stream configuration.
    fn start(
        &self,
        tx: mpsc::Sender<CaptureBlock>,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let block = CaptureBlock {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                };
                // Ignore send errors; the receiver may have been dropped.
                let _ = tx.send(block);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None, // no timeout
        )?;

        stream.play()?;
        Ok(Box::new(StreamHandle { _stream: stream }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `CaptureBlock` must be `Send` so it can cross thread boundaries.
    #[test]
    fn capture_block_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureBlock>();
    }

    #[test]
    fn capture_block_fields() {
        let block = CaptureBlock {
            samples: vec![0.0_f32; 512],
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(block.samples.len(), 512);
        assert_eq!(block.sample_rate, 48_000);
        assert_eq!(block.channels, 2);
    }

    #[test]
    fn capture_source_is_object_safe() {
        // If this compiles, the trait is object-safe.
        fn _takes(_: &dyn CaptureSource) {}
    }
}
