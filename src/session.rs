//! Voice session state machine
//!
//! Coordinates the capture pipeline and the playback scheduler for one live
//! duplex conversation: `idle → connecting → listening/speaking → closing →
//! idle`, with `error` reachable from any non-idle state.
//!
//! All mutation happens on whichever single task drives the session; cpal
//! callbacks and the transport only feed it through FIFO channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::capture::{CapturePipeline, TransportSender};
use crate::codec::{self, TransportPacket};
use crate::playback::{OutputSink, PlaybackScheduler, SinkId};
use crate::{Error, Result};

/// Observable session state, suitable for UI display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session; devices released
    Idle,
    /// Devices acquired, waiting for the remote session to signal readiness
    Connecting,
    /// Active; capture running, no inbound audio sounding
    Listening,
    /// Active; inbound audio is scheduled or sounding
    Speaking,
    /// Disconnect in progress
    Closing,
    /// Fatal failure; unusable until a fresh connect
    Error,
}

/// Inbound messages from the remote realtime service, in arrival order
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Barge-in: discard all pending playback immediately
    Interrupted,
    /// One chunk of encoded model speech
    Audio {
        packet: TransportPacket,
        sample_rate: u32,
        channels: u16,
    },
}

/// Connection seam to the remote realtime service.
///
/// Opening yields the send half and an event stream delivering
/// [`ServerEvent`]s in arrival order.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the remote session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionOpen`] if the session cannot be established.
    async fn open(
        &self,
    ) -> Result<(Arc<dyn TransportSender>, mpsc::UnboundedReceiver<ServerEvent>)>;
}

/// One live duplex voice session.
///
/// Owns the scheduler, the mute flag, and (while connected) the capture
/// pipeline over the transport's send half. Exactly one instance should hold
/// the physical devices at a time; see [`crate::device::OutputArbiter`] for
/// the ownership token.
pub struct VoiceSession<S: OutputSink> {
    id: Uuid,
    state: SessionState,
    last_error: Option<String>,
    muted: Arc<AtomicBool>,
    scheduler: PlaybackScheduler<S>,
    pipeline: Option<CapturePipeline<dyn TransportSender>>,
    capture_sample_rate: u32,
}

impl<S: OutputSink> VoiceSession<S> {
    /// Create an idle session over the given sink. The transport send half
    /// is acquired later by [`connect`](Self::connect).
    pub fn new(sink: S, capture_sample_rate: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            last_error: None,
            muted: Arc::new(AtomicBool::new(false)),
            scheduler: PlaybackScheduler::new(sink),
            pipeline: None,
            capture_sample_rate,
        }
    }

    /// Open the remote session over `transport` and begin connecting. Valid
    /// from `Idle` or `Error` (a fresh connect is the only way out of
    /// `Error`).
    ///
    /// On success the session is `Connecting`, the capture pipeline is
    /// armed with the transport's send half, and the returned receiver
    /// delivers inbound [`ServerEvent`]s; feed them to
    /// [`on_server_event`](Self::on_server_event).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionAlreadyActive`] if a connection is already
    /// in progress or established. An open failure (typically
    /// [`Error::SessionOpen`]) is fatal: the session lands in `Error` and
    /// the failure is returned.
    pub async fn connect(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<mpsc::UnboundedReceiver<ServerEvent>> {
        match self.state {
            SessionState::Idle | SessionState::Error => {}
            _ => return Err(Error::SessionAlreadyActive),
        }

        self.last_error = None;
        self.state = SessionState::Connecting;
        tracing::info!(session = %self.id, "connecting");

        match transport.open().await {
            Ok((sender, events)) => {
                self.pipeline = Some(CapturePipeline::new(
                    sender,
                    Arc::clone(&self.muted),
                    self.capture_sample_rate,
                ));
                Ok(events)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// The remote session signalled readiness; capture begins flowing.
    pub fn on_remote_ready(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Listening;
            tracing::info!(session = %self.id, "session active, listening");
        }
    }

    /// Process one capture block from the input device.
    ///
    /// Returns whether the block was transmitted (`false` while muted or
    /// outside the active states).
    ///
    /// # Errors
    ///
    /// A transport failure is fatal: the session transitions to `Error` and
    /// the error is returned.
    pub async fn on_capture_block(&mut self, block: &[f32]) -> Result<bool> {
        if !self.is_active() {
            return Ok(false);
        }
        let Some(pipeline) = &self.pipeline else {
            return Ok(false);
        };

        match pipeline.handle_block(block).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Route one inbound server event.
    ///
    /// Malformed audio is dropped with a warning, leaving the scheduling
    /// timeline untouched; interruption flushes synchronously.
    pub fn on_server_event(&mut self, event: ServerEvent) {
        if !self.is_active() {
            return;
        }

        match event {
            ServerEvent::Interrupted => {
                self.scheduler.flush();
                if self.state == SessionState::Speaking {
                    self.state = SessionState::Listening;
                }
                tracing::debug!(session = %self.id, "interrupted, playback flushed");
            }
            ServerEvent::Audio {
                packet,
                sample_rate,
                channels,
            } => {
                let frame = packet
                    .decode()
                    .and_then(|bytes| codec::bytes_to_frame(&bytes, sample_rate, channels));
                match frame {
                    Ok(frame) => match self.scheduler.enqueue(frame) {
                        Ok(Some(_)) => {
                            if self.state == SessionState::Listening {
                                self.state = SessionState::Speaking;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => self.fail(&e),
                    },
                    Err(e) => {
                        tracing::warn!(session = %self.id, error = %e, "dropping bad audio frame");
                    }
                }
            }
        }
    }

    /// Record the natural completion of a scheduled voice; reverts to
    /// `Listening` when the active set empties.
    pub fn on_playback_complete(&mut self, id: SinkId) {
        if self.scheduler.on_complete(id) && self.state == SessionState::Speaking {
            self.state = SessionState::Listening;
            tracing::debug!(session = %self.id, "playback drained, listening");
        }
    }

    /// A mid-session transport failure reported by the driver. Fatal; no
    /// automatic reconnect.
    pub fn on_transport_error(&mut self, detail: &str) {
        self.fail(&Error::Transport(detail.to_string()));
    }

    /// Tear the session down: flush playback, release the transport, and
    /// return to `Idle`.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Closing;
        self.scheduler.flush();
        self.pipeline = None;
        self.state = SessionState::Idle;
        tracing::info!(session = %self.id, "disconnected");
    }

    /// Transition to `Error`, releasing pending playback and the transport
    /// and retaining the reason for display.
    pub fn fail(&mut self, error: &Error) {
        if self.state == SessionState::Idle {
            return;
        }
        self.scheduler.flush();
        self.pipeline = None;
        self.last_error = Some(error.to_string());
        self.state = SessionState::Error;
        tracing::error!(session = %self.id, error = %error, "session failed");
    }

    /// Toggle the transmit-side mute gate. Not a state transition; the
    /// device keeps running.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        tracing::debug!(session = %self.id, muted, "mute flag updated");
    }

    /// Current mute flag
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Current observable state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Reason for the last `Error` transition, for UI display
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The playback scheduler (active set, timeline)
    pub const fn scheduler(&self) -> &PlaybackScheduler<S> {
        &self.scheduler
    }

    fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Listening | SessionState::Speaking)
    }
}
