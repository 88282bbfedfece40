//! Engine layer — session lifecycle, replay scheduling, notifications.
//!
//! ```text
//! Session::start ─┬─ capture stream (guard, not Send)
//!                 ├─ feeder thread  → ArchiveBuffer
//!                 └─ ReplayScheduler (probabilistic + guarantee loops)
//!                        └─ fire → select → render → OutputSink::play
//! ```
//!
//! Observers subscribe to [`EngineEvent`]s; the engine itself renders
//! nothing.

pub mod events;
pub mod scheduler;
pub mod session;

pub use events::{emit, EngineEvent, EventSender};
pub use scheduler::{ReplayScheduler, MIN_TRIGGER_SEGMENTS};
pub use session::{Session, SessionError, SessionState};
