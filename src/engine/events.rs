//! Structured notifications emitted by the engine.
//!
//! The core never formats or renders anything: it pushes [`EngineEvent`]s
//! over a `tokio::sync::mpsc` channel and whoever is listening (the CLI
//! logger, a future UI) decides how to present them.  Emission is
//! best-effort — a full or closed channel drops the event rather than
//! stalling capture or replay.

use crate::config::TriggerConfig;

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// Everything observers can learn about a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Archive fill level, emitted every few appended segments (throttled).
    ArchiveSize { segments: usize },

    /// A replay chain was built and started.
    ReplayBegan {
        /// Mono sample count of the selected fragment.
        fragment_samples: usize,
        /// Archive index the fragment started at.
        start_index: usize,
        /// Selection fell back to the full index range because the whole
        /// archive was inside the exclusion window.
        degraded: bool,
        /// Low-pass cutoff drawn for this replay, in Hz.
        cutoff_hz: f32,
        /// Stereo position drawn for this replay, `-1.0..=1.0`.
        pan: f32,
    },

    /// The replay chain finished and released its resources.
    ReplayEnded,

    /// Chain construction failed; the invocation was abandoned (no retry).
    ReplayFailed { message: String },

    /// Trigger parameters changed (values already sanitized).
    ConfigUpdated { trigger: TriggerConfig },

    /// Best-effort cue for a visual flourish while a replay plays.
    VisualCue,
}

/// Sending half of the notification channel.
pub type EventSender = mpsc::Sender<EngineEvent>;

/// Push `event` without blocking; dropped silently when nobody listens.
pub fn emit(events: &EventSender, event: EngineEvent) {
    if let Err(e) = events.try_send(event) {
        log::debug!("notification dropped: {e}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_delivers_to_listener() {
        let (tx, mut rx) = mpsc::channel(4);
        emit(&tx, EngineEvent::ArchiveSize { segments: 42 });

        assert_eq!(rx.recv().await, Some(EngineEvent::ArchiveSize { segments: 42 }));
    }

    #[tokio::test]
    async fn emit_on_full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        emit(&tx, EngineEvent::ReplayEnded);
        emit(&tx, EngineEvent::VisualCue); // channel full — dropped

        assert_eq!(rx.recv().await, Some(EngineEvent::ReplayEnded));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn emit_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        emit(&tx, EngineEvent::ReplayEnded);
    }
}
