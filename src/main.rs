//! Application entry point — headless mishear CLI.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the tokio runtime.
//! 4. Open the default input device and build the playback sink.
//! 5. Start a capture [`Session`] (archive feeder + replay scheduler).
//! 6. Log engine notifications until Ctrl-C, then stop the session.
//!
//! The session owns a capture guard that is not `Send`, so it lives on the
//! main thread; only the event logger runs as a spawned task.

use std::sync::Arc;

use tokio::sync::mpsc;

use mishear::{
    audio::{AudioCapture, CpalOutput},
    config::AppConfig,
    engine::{EngineEvent, Session},
};

/// Depth of the notification channel; overflow drops events, never blocks.
const EVENT_CHANNEL_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Event logger
// ---------------------------------------------------------------------------

/// Render engine notifications to the log until the channel closes.
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::ArchiveSize { segments } => {
                log::debug!("archive: {segments} segments");
            }
            EngineEvent::ReplayBegan {
                fragment_samples,
                start_index,
                degraded,
                cutoff_hz,
                pan,
            } => {
                log::info!(
                    "replay: {fragment_samples} samples from index {start_index} \
                     (cutoff {cutoff_hz:.0} Hz, pan {pan:+.2}{})",
                    if degraded { ", degraded" } else { "" }
                );
            }
            EngineEvent::ReplayEnded => {
                log::debug!("replay: finished");
            }
            EngineEvent::ReplayFailed { message } => {
                log::warn!("replay failed: {message}");
            }
            EngineEvent::ConfigUpdated { trigger } => {
                log::info!(
                    "trigger: every {} ms at probability {}",
                    trigger.check_interval_ms,
                    trigger.trigger_probability
                );
            }
            EngineEvent::VisualCue => {
                // A UI would flash something here; the CLI stays quiet.
            }
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("mishear starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    rt.block_on(async {
        // 4. Audio endpoints
        let capture = AudioCapture::new()?;
        let sink = Arc::new(CpalOutput::new());

        // 5. Session
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(EVENT_CHANNEL_DEPTH);
        tokio::spawn(log_events(event_rx));

        let mut session = Session::new(&config, sink, event_tx);
        session.start(&capture)?;
        log::info!(
            "capturing; replays every ~{} ms at probability {} (Ctrl-C to stop)",
            session.trigger().check_interval_ms,
            session.trigger().trigger_probability
        );

        // 6. Run until interrupted
        tokio::signal::ctrl_c().await?;
        log::info!("shutting down");
        session.stop();

        Ok::<(), anyhow::Error>(())
    })
}
