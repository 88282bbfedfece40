//! Audio layer — capture, archive, selection, and one-shot replay output.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → CaptureBlock (mpsc) → downmix_to_mono
//!           → SegmentAssembler → ArchiveBuffer (bounded, timestamped)
//!
//! scheduler fire → select_fragment → render_replay → OutputSink::play
//! ```
//!
//! The archive side runs continuously while a session is capturing; the
//! replay side is invoked by the scheduler and owns nothing past the end of
//! each one-shot playback.

pub mod archive;
pub mod capture;
pub mod chain;
pub mod mix;
pub mod output;
pub mod segment;
pub mod selector;

pub use archive::{new_shared_archive, ArchiveBuffer, SharedArchive, MAX_ARCHIVE_SEGMENTS};
pub use capture::{AudioCapture, CaptureBlock, CaptureError, CaptureSource, CaptureStream};
pub use chain::{render_replay, ChainParams};
pub use mix::downmix_to_mono;
pub use output::{CpalOutput, OutputSink, PlaybackError};
pub use segment::{Segment, SegmentAssembler, SEGMENT_SAMPLES};
pub use selector::{quantized_len, select_fragment, Fragment};
