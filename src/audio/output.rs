//! One-shot playback sinks.
//!
//! [`OutputSink`] is the seam between the replay engine and the platform
//! audio output.  [`CpalOutput`] is the production implementation: every
//! [`play`](OutputSink::play) call runs on its own dedicated thread that
//! owns the cpal output stream end-to-end, so the stream (and everything
//! hanging off it) is released the moment the fragment finishes — whether
//! playback completed naturally or the worker bailed out.
//!
//! Completion is reported through a `tokio::sync::oneshot` receiver that
//! resolves exactly once per invocation.  A dropped sender resolves the
//! receiver too, so a waiter can never be leaked by a failed stream.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors raised while constructing a one-shot playback.
///
/// A failed construction abandons the single invocation — it is reported
/// upward via notification and never retried, and scheduler state is
/// unaffected.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to build output stream: {0}")]
    BuildStream(String),

    #[error("failed to start output stream: {0}")]
    PlayStream(String),

    #[error("playback worker exited before reporting stream status")]
    WorkerExited,
}

// ---------------------------------------------------------------------------
// OutputSink
// ---------------------------------------------------------------------------

/// Destination for rendered replay frames.
///
/// `frames` are interleaved stereo at `sample_rate`.  On success the
/// returned receiver resolves exactly once, after the sink has torn down
/// whatever resources the invocation acquired.  Multiple concurrent plays
/// are independent; their completions do not interfere.
pub trait OutputSink: Send + Sync {
    fn play(
        &self,
        frames: Vec<f32>,
        sample_rate: u32,
    ) -> Result<oneshot::Receiver<()>, PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// Plays each invocation on a dedicated thread owning a fresh cpal stream.
///
/// The thread builds the stream, feeds the frames, waits for the output
/// callback to exhaust them, drops the stream, and only then signals
/// completion.  Stream construction happens on the worker because
/// `cpal::Stream` is not `Send`; `play` blocks briefly on the setup
/// handshake so construction failures surface to the caller.
pub struct CpalOutput;

/// Shared feed between the worker and the output callback.
struct FrameFeed {
    frames: Vec<f32>,
    pos: usize,
    /// Taken and fired once, on the callback that consumes the last frame.
    exhausted_tx: Option<mpsc::Sender<()>>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for CpalOutput {
    fn play(
        &self,
        frames: Vec<f32>,
        sample_rate: u32,
    ) -> Result<oneshot::Receiver<()>, PlaybackError> {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let (setup_tx, setup_rx) = mpsc::channel::<Result<(), PlaybackError>>();

        // Upper bound on how long the worker waits for natural completion:
        // the fragment duration plus a margin for device buffering.
        let frame_count = frames.len() / 2;
        let max_wait = Duration::from_secs_f64(frame_count as f64 / f64::from(sample_rate.max(1)))
            + Duration::from_secs(2);

        let spawned = std::thread::Builder::new()
            .name("replay-playback".into())
            .spawn(move || {
                playback_worker(frames, sample_rate, max_wait, setup_tx, done_tx);
            });

        if spawned.is_err() {
            return Err(PlaybackError::WorkerExited);
        }

        // Block until the worker reports whether stream construction
        // succeeded.  This is short (device open + play) and lets callers
        // treat construction failure as a synchronous error.
        match setup_rx.recv() {
            Ok(Ok(())) => Ok(done_rx),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError::WorkerExited),
        }
    }
}

/// Body of the per-invocation playback thread.
///
/// Owns the stream for its whole scope; every exit path drops it and lets
/// `done_tx` resolve the waiter (explicitly on success, by drop otherwise).
fn playback_worker(
    frames: Vec<f32>,
    sample_rate: u32,
    max_wait: Duration,
    setup_tx: mpsc::Sender<Result<(), PlaybackError>>,
    done_tx: oneshot::Sender<()>,
) {
    let (exhausted_tx, exhausted_rx) = mpsc::channel::<()>();

    let stream = match build_output_stream(frames, sample_rate, exhausted_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = setup_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = setup_tx.send(Err(PlaybackError::PlayStream(e.to_string())));
        return;
    }
    let _ = setup_tx.send(Ok(()));

    // Wait for the callback to consume the last frame.  The timeout only
    // trips when the device stalls; teardown then proceeds anyway.
    if exhausted_rx.recv_timeout(max_wait).is_err() {
        log::warn!("playback did not signal completion within {max_wait:?}; tearing down");
    }

    drop(stream);
    let _ = done_tx.send(());
}

fn build_output_stream(
    frames: Vec<f32>,
    sample_rate: u32,
    exhausted_tx: mpsc::Sender<()>,
) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoDevice)?;

    let config = cpal::StreamConfig {
        channels: 2,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let feed = Arc::new(Mutex::new(FrameFeed {
        frames,
        pos: 0,
        exhausted_tx: Some(exhausted_tx),
    }));

    let stream = device
        .build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut feed = match feed.lock() {
                    Ok(feed) => feed,
                    Err(_) => {
                        out.fill(0.0);
                        return;
                    }
                };

                let remaining = feed.frames.len() - feed.pos;
                let take = remaining.min(out.len());
                let pos = feed.pos;
                out[..take].copy_from_slice(&feed.frames[pos..pos + take]);
                out[take..].fill(0.0);
                feed.pos += take;

                if feed.pos >= feed.frames.len() {
                    if let Some(tx) = feed.exhausted_tx.take() {
                        let _ = tx.send(());
                    }
                }
            },
            |err: cpal::StreamError| {
                log::error!("cpal output stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::BuildStream(e.to_string()))?;

    Ok(stream)
}

// ---------------------------------------------------------------------------
// MockSink / FailingSink  (test doubles)
// ---------------------------------------------------------------------------

/// Test double that records every play and completes immediately.
#[cfg(test)]
#[derive(Default)]
pub struct MockSink {
    plays: Mutex<Vec<usize>>,
}

#[cfg(test)]
impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame counts of every `play` call so far, in order.
    pub fn plays(&self) -> Vec<usize> {
        self.plays.lock().unwrap().clone()
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }
}

#[cfg(test)]
impl OutputSink for MockSink {
    fn play(
        &self,
        frames: Vec<f32>,
        _sample_rate: u32,
    ) -> Result<oneshot::Receiver<()>, PlaybackError> {
        self.plays.lock().unwrap().push(frames.len());
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Ok(rx)
    }
}

/// Test double whose construction always fails.
#[cfg(test)]
pub struct FailingSink;

#[cfg(test)]
impl OutputSink for FailingSink {
    fn play(
        &self,
        _frames: Vec<f32>,
        _sample_rate: u32,
    ) -> Result<oneshot::Receiver<()>, PlaybackError> {
        Err(PlaybackError::NoDevice)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
