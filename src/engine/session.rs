//! Capture session lifecycle.
//!
//! [`Session`] is the engine's state machine: `Idle ⇄ Capturing`.  Starting
//! a session acquires the capture stream, spawns the feeder thread that
//! turns raw capture blocks into archived segments, and starts the replay
//! scheduler — in that order, so a capture failure leaves nothing running.
//! Stopping tears the same pieces down in reverse and clears the archive;
//! captured audio never outlives its session.
//!
//! The capture stream guard is not `Send`, so a `Session` stays on the
//! thread that started it (the main thread in the CLI binary).

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::audio::archive::{new_shared_archive, SharedArchive};
use crate::audio::capture::{CaptureBlock, CaptureError, CaptureSource, CaptureStream};
use crate::audio::mix::downmix_to_mono;
use crate::audio::output::OutputSink;
use crate::audio::segment::SegmentAssembler;
use crate::config::{AppConfig, ReplayConfig, TriggerConfig};

use super::events::{emit, EngineEvent, EventSender};
use super::scheduler::ReplayScheduler;

/// Emit an `ArchiveSize` notification once per this many appended segments.
const ARCHIVE_SIZE_EVERY: usize = 10;

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a capture session is already running")]
    AlreadyCapturing,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything live while capturing: the stream guard and the feeder thread.
struct ActiveCapture {
    /// Dropping this stops the capture stream and closes the block channel,
    /// which is how the feeder thread learns to exit.
    guard: Box<dyn CaptureStream>,
    feeder: std::thread::JoinHandle<()>,
}

/// Owns the archive, the scheduler and the capture plumbing.
///
/// Must be used from within a tokio runtime — starting a session starts the
/// scheduler's timer tasks.
pub struct Session {
    archive: SharedArchive,
    trigger: TriggerConfig,
    replay: ReplayConfig,
    sink: Arc<dyn OutputSink>,
    events: EventSender,
    /// Present exactly while capturing.
    scheduler: Option<ReplayScheduler>,
    active: Option<ActiveCapture>,
}

impl Session {
    pub fn new(config: &AppConfig, sink: Arc<dyn OutputSink>, events: EventSender) -> Self {
        Self {
            archive: new_shared_archive(),
            trigger: config.trigger.sanitized(),
            replay: config.replay.sanitized(),
            sink,
            events,
            scheduler: None,
            active: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Capturing
        } else {
            SessionState::Idle
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    /// Number of segments currently archived.
    pub fn archive_len(&self) -> usize {
        self.archive.lock().unwrap().len()
    }

    /// Begin capturing from `source` and start the replay scheduler.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyCapturing`] when a session is running, or the
    /// underlying [`CaptureError`] when the stream cannot be acquired — in
    /// which case the session stays `Idle` and the scheduler was never
    /// started.
    pub fn start(&mut self, source: &dyn CaptureSource) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyCapturing);
        }

        let (block_tx, block_rx) = mpsc::channel::<CaptureBlock>();
        let guard = source.start(block_tx)?;

        let feeder = spawn_feeder(block_rx, Arc::clone(&self.archive), self.events.clone());

        let mut scheduler = ReplayScheduler::new(
            Arc::clone(&self.archive),
            self.trigger,
            self.replay.clone(),
            source.sample_rate(),
            Arc::clone(&self.sink),
            self.events.clone(),
        );
        scheduler.start();

        self.scheduler = Some(scheduler);
        self.active = Some(ActiveCapture { guard, feeder });

        log::info!(
            "session: capturing at {} Hz, {} channel(s)",
            source.sample_rate(),
            source.channels()
        );
        Ok(())
    }

    /// Stop capturing, cancel the scheduler and clear the archive.
    ///
    /// Idempotent — stopping an idle session is a no-op.  A replay already
    /// dispatched keeps playing to completion; it owns a copy of its frames.
    pub fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }

        if let Some(ActiveCapture { guard, feeder }) = self.active.take() {
            // Dropping the guard closes the block channel; the feeder sees
            // the disconnect and drains out.
            drop(guard);
            if feeder.join().is_err() {
                log::warn!("session: feeder thread panicked during shutdown");
            }
        }

        self.archive.lock().unwrap().clear();
        log::info!("session: stopped, archive cleared");
    }

    /// Replace the trigger parameters (sanitized, last-write-wins).
    ///
    /// Applies immediately when capturing; otherwise takes effect on the
    /// next start.
    pub fn set_trigger(&mut self, trigger: TriggerConfig) {
        self.trigger = trigger.sanitized();
        match &mut self.scheduler {
            Some(scheduler) => scheduler.set_trigger(self.trigger),
            None => emit(
                &self.events,
                EngineEvent::ConfigUpdated {
                    trigger: self.trigger,
                },
            ),
        }
    }

    pub fn trigger(&self) -> TriggerConfig {
        self.trigger
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Feeder thread
// ---------------------------------------------------------------------------

/// Drain capture blocks into the archive until the channel disconnects.
///
/// Blocks are downmixed to mono and cut into fixed-size segments; each
/// segment is stamped with its arrival time.  The fill level is reported
/// every [`ARCHIVE_SIZE_EVERY`] appended segments so observers are not
/// flooded at segment rate.
fn spawn_feeder(
    block_rx: mpsc::Receiver<CaptureBlock>,
    archive: SharedArchive,
    events: EventSender,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("archive-feeder".into())
        .spawn(move || {
            let mut assembler = SegmentAssembler::new();
            let mut appended: usize = 0;

            while let Ok(block) = block_rx.recv() {
                let mono = downmix_to_mono(&block.samples, block.channels);
                for segment in assembler.push(&mono, Instant::now()) {
                    let filled = {
                        let mut guard = archive.lock().unwrap();
                        guard.append(segment);
                        guard.len()
                    };
                    appended += 1;
                    if appended % ARCHIVE_SIZE_EVERY == 0 {
                        emit(&events, EngineEvent::ArchiveSize { segments: filled });
                    }
                }
            }
            log::debug!("feeder: capture channel closed after {appended} segments");
        })
        .expect("failed to spawn feeder thread")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::MockSink;
    use crate::audio::segment::SEGMENT_SAMPLES;
    use std::time::Duration;
    use tokio::sync::mpsc as tokio_mpsc;

    /// Capture source that delivers a fixed set of blocks at start, then
    /// keeps the channel open until its guard is dropped.
    struct MockCapture {
        sample_rate: u32,
        channels: u16,
        blocks: Vec<Vec<f32>>,
        fail: bool,
    }

    struct MockGuard {
        /// Keeps the feeder's receive loop alive until the guard drops.
        _tx: mpsc::Sender<CaptureBlock>,
    }
    impl CaptureStream for MockGuard {}

    impl CaptureSource for MockCapture {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn channels(&self) -> u16 {
            self.channels
        }

        fn start(
            &self,
            tx: mpsc::Sender<CaptureBlock>,
        ) -> Result<Box<dyn CaptureStream>, CaptureError> {
            if self.fail {
                return Err(CaptureError::NoDevice);
            }
            for samples in &self.blocks {
                let _ = tx.send(CaptureBlock {
                    samples: samples.clone(),
                    sample_rate: self.sample_rate,
                    channels: self.channels,
                });
            }
            Ok(Box::new(MockGuard { _tx: tx }))
        }
    }

    fn mono_capture(segments: usize) -> MockCapture {
        MockCapture {
            sample_rate: 44_100,
            channels: 1,
            blocks: vec![vec![0.01; segments * SEGMENT_SAMPLES]],
            fail: false,
        }
    }

    fn quiet_session() -> (Session, tokio_mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = tokio_mpsc::channel(256);
        let mut config = AppConfig::default();
        // Keep the scheduler out of the way.
        config.trigger.trigger_probability = 0.0;
        let session = Session::new(&config, Arc::new(MockSink::new()), tx);
        (session, rx)
    }

    /// Wait (real time) for the feeder thread to archive `expected` segments.
    fn wait_for_archive(session: &Session, expected: usize) {
        for _ in 0..200 {
            if session.archive_len() >= expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!(
            "archive never reached {expected} segments (got {})",
            session.archive_len()
        );
    }

    #[tokio::test]
    async fn start_archives_captured_audio() {
        let (mut session, _rx) = quiet_session();
        assert_eq!(session.state(), SessionState::Idle);

        session.start(&mono_capture(6)).unwrap();
        assert_eq!(session.state(), SessionState::Capturing);

        wait_for_archive(&session, 6);
        session.stop();
    }

    #[tokio::test]
    async fn stereo_blocks_are_downmixed_before_segmentation() {
        let (mut session, _rx) = quiet_session();
        let source = MockCapture {
            sample_rate: 48_000,
            channels: 2,
            // 4 segments worth of mono after averaging pairs.
            blocks: vec![vec![0.25; 4 * SEGMENT_SAMPLES * 2]],
            fail: false,
        };

        session.start(&source).unwrap();
        wait_for_archive(&session, 4);
        session.stop();
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (mut session, _rx) = quiet_session();
        session.start(&mono_capture(1)).unwrap();

        let err = session.start(&mono_capture(1)).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyCapturing));
        // Still capturing — the failed start must not have torn anything down.
        assert!(session.is_capturing());

        session.stop();
    }

    #[tokio::test]
    async fn capture_failure_leaves_the_session_idle() {
        let (mut session, _rx) = quiet_session();
        let source = MockCapture {
            sample_rate: 44_100,
            channels: 1,
            blocks: Vec::new(),
            fail: true,
        };

        let err = session.start(&source).unwrap_err();
        assert!(matches!(err, SessionError::Capture(CaptureError::NoDevice)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.archive_len(), 0);
    }

    #[tokio::test]
    async fn stop_clears_the_archive_and_is_idempotent() {
        let (mut session, _rx) = quiet_session();
        session.start(&mono_capture(5)).unwrap();
        wait_for_archive(&session, 5);

        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.archive_len(), 0);

        // Second stop is a no-op.
        session.stop();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn session_restarts_after_stop() {
        let (mut session, _rx) = quiet_session();

        session.start(&mono_capture(3)).unwrap();
        wait_for_archive(&session, 3);
        session.stop();

        session.start(&mono_capture(2)).unwrap();
        assert!(session.is_capturing());
        wait_for_archive(&session, 2);
        session.stop();
    }

    #[tokio::test]
    async fn archive_size_events_are_throttled() {
        let (mut session, mut rx) = quiet_session();
        session.start(&mono_capture(25)).unwrap();
        wait_for_archive(&session, 25);
        session.stop();

        let mut sizes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::ArchiveSize { segments } = event {
                sizes.push(segments);
            }
        }
        // 25 appended segments → reports at the 10th and 20th only.
        assert_eq!(sizes, vec![10, 20]);
    }

    #[tokio::test]
    async fn set_trigger_while_idle_applies_on_next_start() {
        let (mut session, mut rx) = quiet_session();

        session.set_trigger(TriggerConfig {
            check_interval_ms: 0,
            trigger_probability: 2.0,
        });

        let trigger = session.trigger();
        assert_eq!(trigger.check_interval_ms, crate::config::MIN_CHECK_INTERVAL_MS);
        assert_eq!(trigger.trigger_probability, 1.0);

        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::ConfigUpdated { .. })
        ));
    }
}
