//! Capture pipeline
//!
//! Frames microphone samples into fixed-size blocks and forwards them to the
//! remote service as transport packets. Muting is a transmit-side gate read
//! on every block; the device keeps running across mute toggles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::codec::{self, AudioFrame, TransportPacket};
use crate::{Error, Result};

/// Default capture block size in samples (~256 ms at 16 kHz).
///
/// A tunable, not a contract; override via `[audio] block_samples`.
pub const DEFAULT_BLOCK_SAMPLES: usize = 4096;

/// Events emitted by the input device callback stream
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// One fixed-size block of mono samples
    Block(Vec<f32>),
    /// The device went away mid-session (unplugged, permission revoked)
    DeviceLost(String),
}

/// Fire-and-forget delivery of capture packets to the remote service.
///
/// Implementations must preserve send order; the engine performs no
/// reordering of its own.
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one encoded capture block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a network failure, which is fatal to
    /// the owning session.
    async fn send_frame(&self, packet: TransportPacket) -> Result<()>;
}

/// Accumulates raw callback buffers and emits fixed-size blocks.
///
/// Device callbacks deliver whatever buffer size the backend prefers; the
/// transport wants a stable cadence. Leftover samples stay pending until the
/// next push.
#[derive(Debug)]
pub struct BlockAssembler {
    block_samples: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    /// Create an assembler producing blocks of `block_samples` samples.
    #[must_use]
    pub fn new(block_samples: usize) -> Self {
        Self {
            block_samples: block_samples.max(1),
            pending: Vec::new(),
        }
    }

    /// Feed raw samples, returning every complete block they yield.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_samples {
            let rest = self.pending.split_off(self.block_samples);
            blocks.push(std::mem::replace(&mut self.pending, rest));
        }
        blocks
    }

    /// Samples waiting for the next complete block
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drain whatever is pending as a final short block, if any.
    pub fn drain(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Encodes capture blocks and hands them to the transport sender.
pub struct CapturePipeline<T: TransportSender + ?Sized> {
    sender: Arc<T>,
    muted: Arc<AtomicBool>,
    sample_rate: u32,
}

impl<T: TransportSender + ?Sized> CapturePipeline<T> {
    /// Create a pipeline transmitting mono blocks at `sample_rate`.
    pub fn new(sender: Arc<T>, muted: Arc<AtomicBool>, sample_rate: u32) -> Self {
        Self {
            sender,
            muted,
            sample_rate,
        }
    }

    /// Process one capture block.
    ///
    /// Returns `Ok(true)` if the block was transmitted, `Ok(false)` if the
    /// mute gate discarded it before encoding.
    ///
    /// # Errors
    ///
    /// Propagates transport failures from the sender.
    pub async fn handle_block(&self, block: &[f32]) -> Result<bool> {
        if self.muted.load(Ordering::Relaxed) {
            tracing::trace!(samples = block.len(), "muted, block discarded");
            return Ok(false);
        }

        let frame = AudioFrame::new(block.to_vec(), self.sample_rate, 1)?;
        let packet = TransportPacket::from_pcm_bytes(&codec::frame_to_bytes(&frame), self.sample_rate);
        self.sender.send_frame(packet).await?;

        tracing::trace!(samples = block.len(), "capture block sent");
        Ok(true)
    }

    /// Shared mute flag, read synchronously on every block
    #[must_use]
    pub fn muted_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.muted)
    }

    /// Capture sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Map a device callback failure to the session-fatal error it represents.
#[must_use]
pub fn device_lost(detail: &str) -> Error {
    Error::DeviceUnavailable(detail.to_string())
}
