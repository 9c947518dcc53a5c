//! Lumen Voice - real-time voice duplex engine for AI assistants
//!
//! The engine captures microphone audio, chunks and encodes it for a remote
//! conversational service, and schedules the streamed reply for gapless,
//! jitter-tolerant playback with instant barge-in.
//!
//! # Architecture
//!
//! ```text
//! microphone ──> Capture Pipeline ──> PCM Codec ──> Transport (external)
//!                                                        │
//! speakers  <── Playback Scheduler <── PCM Codec <───────┘
//!                       ▲
//!              Voice Session (state machine, barge-in, mute)
//! ```
//!
//! The independent [`ClipPlayer`] plays one pre-rendered clip with accurate
//! pause/resume and shares the output device through [`device::OutputArbiter`].

pub mod capture;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod playback;
pub mod session;

pub use capture::{BlockAssembler, CaptureEvent, CapturePipeline, DEFAULT_BLOCK_SAMPLES, TransportSender};
pub use codec::{AudioFrame, TransportPacket};
pub use config::Config;
pub use error::{Error, Result};
pub use playback::{ClipEvent, ClipPlayer, OutputSink, PlaybackScheduler, SinkId};
pub use session::{ServerEvent, SessionState, Transport, VoiceSession};
