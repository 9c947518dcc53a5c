//! Playback scheduling
//!
//! Two independent consumers of the output device: the gapless scheduler for
//! streamed realtime audio, and the single-clip player for pre-rendered
//! speech. Both talk to the device through the [`OutputSink`] seam so they
//! can be exercised without hardware.

mod clip;
mod scheduler;

pub use clip::{ClipEvent, ClipPlayer};
pub use scheduler::{OutputSink, PlaybackScheduler, SinkId};
