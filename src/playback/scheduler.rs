//! Gapless playback scheduling for streamed audio
//!
//! Accepts a bursty stream of decoded frames and lines them up back-to-back
//! on the sink clock, clamping to "now" when the network falls behind.

use std::collections::HashMap;

use crate::Result;
use crate::codec::AudioFrame;

/// Opaque identifier for one scheduled voice on the output sink
pub type SinkId = u64;

/// Output device seam: renders buffers at scheduled positions on its own
/// monotonic timeline.
///
/// The sink owns the clock. Natural completions are delivered out-of-band
/// (the real mixer uses a channel); the owner feeds them back through
/// [`PlaybackScheduler::on_complete`].
pub trait OutputSink: Send {
    /// Schedule `frame` to begin at `start_secs` on the sink clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the buffer.
    fn schedule(&mut self, frame: AudioFrame, start_secs: f64) -> Result<SinkId>;

    /// Stop a scheduled or sounding voice immediately. No completion is
    /// reported for a stopped voice.
    fn stop(&mut self, id: SinkId);

    /// Current sink clock position in seconds.
    fn now(&self) -> f64;
}

/// Schedules decoded frames for gapless, jitter-tolerant playback.
///
/// Owns the single piece of shared scheduling state (`next_start`) and the
/// active set of in-flight voices. One instance per session; never a
/// process-wide singleton.
pub struct PlaybackScheduler<S: OutputSink> {
    sink: S,
    next_start: f64,
    active: HashMap<SinkId, f64>,
}

impl<S: OutputSink> PlaybackScheduler<S> {
    /// Create a scheduler over `sink` with an unset timeline.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_start: 0.0,
            active: HashMap::new(),
        }
    }

    /// Schedule one frame to play immediately after everything already
    /// queued, or right now if the queue has drained past real time.
    ///
    /// Returns the scheduled start time, or `None` for an empty frame,
    /// which is dropped without advancing the timeline.
    ///
    /// # Errors
    ///
    /// Propagates sink failures; scheduling state is left unmodified.
    pub fn enqueue(&mut self, frame: AudioFrame) -> Result<Option<f64>> {
        if frame.is_empty() {
            tracing::debug!("empty frame dropped, timeline unchanged");
            return Ok(None);
        }

        let now = self.sink.now();
        // Late arrival: never schedule in the past
        let start = if self.next_start > now {
            self.next_start
        } else {
            now
        };
        let duration = frame.duration_secs();

        let id = self.sink.schedule(frame, start)?;
        self.active.insert(id, start);
        self.next_start = start + duration;

        tracing::trace!(
            voice = id,
            start,
            duration,
            active = self.active.len(),
            "frame scheduled"
        );
        Ok(Some(start))
    }

    /// Barge-in: stop every in-flight voice and reset the timeline.
    ///
    /// Destructive and final for the current turn's audio; the next frame
    /// schedules from "now", not from a stale future timestamp.
    pub fn flush(&mut self) {
        let stopped = self.active.len();
        for (id, _) in self.active.drain() {
            self.sink.stop(id);
        }
        self.next_start = 0.0;

        if stopped > 0 {
            tracing::debug!(stopped, "playback flushed");
        }
    }

    /// Record the natural completion of a voice.
    ///
    /// Returns `true` if the active set just became empty. Stale ids (from a
    /// voice that was flushed) are ignored.
    pub fn on_complete(&mut self, id: SinkId) -> bool {
        self.active.remove(&id).is_some() && self.active.is_empty()
    }

    /// True if nothing is scheduled or sounding
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of in-flight voices
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Scheduled start time of an in-flight voice
    #[must_use]
    pub fn scheduled_start(&self, id: SinkId) -> Option<f64> {
        self.active.get(&id).copied()
    }

    /// Next free position on the timeline (0.0 = unset)
    #[must_use]
    pub const fn next_start(&self) -> f64 {
        self.next_start
    }

    /// The underlying sink
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}
