//! mishear — ambient "did I just hear that?" replay engine.
//!
//! Continuously archives the last few minutes of microphone audio as small
//! timestamped segments, and at random moments replays a short fragment of
//! the recent past through a muffling low-pass, a random stereo position and
//! a fixed gain — just quiet and degraded enough to be mistaken for a real
//! sound in the room.
//!
//! # Layers
//!
//! * [`config`] — TOML settings, defaults, sanitization.
//! * [`audio`]  — capture, segmentation, the bounded archive, fragment
//!   selection, the replay processing chain, playback sinks.
//! * [`engine`] — the capture session state machine, the dual-trigger
//!   scheduler, and the notification stream observers consume.
//!
//! The binary in `main.rs` wires these together into a headless CLI.

pub mod audio;
pub mod config;
pub mod engine;
