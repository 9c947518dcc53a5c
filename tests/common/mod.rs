//! Shared test utilities: hardware-free sink and transport doubles
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use lumen_voice::playback::{OutputSink, SinkId};
use lumen_voice::session::{ServerEvent, Transport};
use lumen_voice::{AudioFrame, Error, Result, TransportPacket, TransportSender, codec};

/// One `schedule` call recorded by the mock sink
#[derive(Debug, Clone)]
pub struct SinkCall {
    pub id: SinkId,
    pub start: f64,
    pub duration: f64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Shared state behind a [`MockSink`], inspected and advanced by tests
#[derive(Debug, Default)]
pub struct MockSinkState {
    pub now: f64,
    pub next_id: SinkId,
    pub scheduled: Vec<SinkCall>,
    pub stopped: Vec<SinkId>,
    /// When set, the next `schedule` call fails once
    pub fail_next_schedule: bool,
}

impl MockSinkState {
    /// Advance the mock clock
    pub fn advance(&mut self, dt: f64) {
        self.now += dt;
    }
}

/// Recording [`OutputSink`] with a manually advanced clock
pub struct MockSink {
    state: Arc<Mutex<MockSinkState>>,
}

impl MockSink {
    /// Create a sink plus a handle to its shared state
    pub fn new() -> (Self, Arc<Mutex<MockSinkState>>) {
        let state = Arc::new(Mutex::new(MockSinkState {
            next_id: 1,
            ..MockSinkState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl OutputSink for MockSink {
    fn schedule(&mut self, frame: AudioFrame, start_secs: f64) -> Result<SinkId> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_schedule {
            state.fail_next_schedule = false;
            return Err(Error::Audio("output stream closed".to_string()));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.scheduled.push(SinkCall {
            id,
            start: start_secs,
            duration: frame.duration_secs(),
            sample_rate: frame.sample_rate(),
            samples: frame.into_samples(),
        });
        Ok(id)
    }

    fn stop(&mut self, id: SinkId) {
        self.state.lock().unwrap().stopped.push(id);
    }

    fn now(&self) -> f64 {
        self.state.lock().unwrap().now
    }
}

/// Transport sender that records every packet
#[derive(Default)]
pub struct CountingSender {
    pub packets: Mutex<Vec<TransportPacket>>,
}

#[async_trait]
impl TransportSender for CountingSender {
    async fn send_frame(&self, packet: TransportPacket) -> Result<()> {
        self.packets.lock().unwrap().push(packet);
        Ok(())
    }
}

impl CountingSender {
    pub fn sent_count(&self) -> usize {
        self.packets.lock().unwrap().len()
    }
}

/// Transport sender that fails every send
pub struct FailingSender;

#[async_trait]
impl TransportSender for FailingSender {
    async fn send_frame(&self, _packet: TransportPacket) -> Result<()> {
        Err(Error::Transport("connection reset".to_string()))
    }
}

/// Transport whose `open` hands out the wrapped sender. The event channel's
/// send half is dropped, so the returned receiver simply reads empty; tests
/// inject server events directly.
pub struct StubTransport {
    sender: Arc<dyn TransportSender>,
}

impl StubTransport {
    pub fn new(sender: Arc<dyn TransportSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn open(
        &self,
    ) -> Result<(Arc<dyn TransportSender>, mpsc::UnboundedReceiver<ServerEvent>)> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok((Arc::clone(&self.sender), rx))
    }
}

/// Transport whose `open` always refuses the handshake
pub struct RefusingTransport;

#[async_trait]
impl Transport for RefusingTransport {
    async fn open(
        &self,
    ) -> Result<(Arc<dyn TransportSender>, mpsc::UnboundedReceiver<ServerEvent>)> {
        Err(Error::SessionOpen("service refused the handshake".to_string()))
    }
}

/// Generate sine wave samples
pub fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Mono frame of the given duration filled with a 440 Hz tone
pub fn tone_frame(duration_secs: f64, sample_rate: u32) -> AudioFrame {
    AudioFrame::new(sine(440.0, duration_secs as f32, sample_rate), sample_rate, 1).unwrap()
}

/// Mono frame whose samples are an identifiable ramp, for splice checks
pub fn ramp_frame(frame_count: usize, sample_rate: u32) -> AudioFrame {
    let samples: Vec<f32> = (0..frame_count).map(|i| i as f32 / frame_count as f32).collect();
    AudioFrame::new(samples, sample_rate, 1).unwrap()
}

/// Encode a tone of the given duration as an inbound audio event payload
pub fn audio_packet(duration_secs: f64, sample_rate: u32) -> TransportPacket {
    let frame = tone_frame(duration_secs, sample_rate);
    TransportPacket::from_pcm_bytes(&codec::frame_to_bytes(&frame), sample_rate)
}
