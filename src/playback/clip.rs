//! Single-clip transport controller
//!
//! Plays exactly one fully-decoded buffer with pause/resume, tracking the
//! elapsed offset itself rather than trusting the device's position query.
//! Resume re-schedules the buffer sliced at the exact sample offset, so the
//! splice point has no gap or repeat.

use crate::Result;
use crate::codec::AudioFrame;
use crate::playback::{OutputSink, SinkId};

/// Notification produced when a clip reaches its natural end, distinct from
/// a user-initiated stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipEvent {
    /// The device reported end-of-buffer while not paused
    Finished,
}

/// Cursor for the clip currently loaded in the player
struct ActiveClip {
    frame: AudioFrame,
    /// Sink voice currently sounding; `None` while paused
    voice: Option<SinkId>,
    /// Elapsed playback position, frozen while paused
    offset_secs: f64,
    /// Sink clock value when the current run started
    started_at: f64,
    paused: bool,
}

/// Plays one pre-rendered clip with accurate pause/resume.
pub struct ClipPlayer<S: OutputSink> {
    sink: S,
    clip: Option<ActiveClip>,
}

impl<S: OutputSink> ClipPlayer<S> {
    /// Create a player over `sink` with no clip loaded.
    pub const fn new(sink: S) -> Self {
        Self { sink, clip: None }
    }

    /// Start playing `frame` from the beginning, replacing any current clip.
    ///
    /// # Errors
    ///
    /// Propagates sink failures; no cursor is retained on error.
    pub fn play(&mut self, frame: AudioFrame) -> Result<()> {
        self.stop();

        let now = self.sink.now();
        let voice = self.sink.schedule(frame.clone(), now)?;
        self.clip = Some(ActiveClip {
            frame,
            voice: Some(voice),
            offset_secs: 0.0,
            started_at: now,
            paused: false,
        });

        tracing::debug!(voice, "clip playback started");
        Ok(())
    }

    /// Freeze the cursor and halt output. No-op unless currently playing.
    pub fn pause(&mut self) {
        let Some(clip) = self.clip.as_mut() else {
            return;
        };
        if clip.paused {
            return;
        }

        let elapsed = self.sink.now() - clip.started_at;
        // Clamp so the stored cursor can never run past the clip end
        clip.offset_secs = (clip.offset_secs + elapsed).min(clip.frame.duration_secs());
        clip.paused = true;
        if let Some(voice) = clip.voice.take() {
            self.sink.stop(voice);
        }

        tracing::debug!(offset_secs = clip.offset_secs, "clip paused");
    }

    /// Restart output from the frozen offset. No-op unless paused.
    ///
    /// Returns [`ClipEvent::Finished`] when the frozen offset is at or past
    /// the clip end, so a caller waiting on the completion notification
    /// still learns the clip ended.
    ///
    /// # Errors
    ///
    /// Propagates sink failures; the cursor stays paused on error.
    pub fn resume(&mut self) -> Result<Option<ClipEvent>> {
        let Some(clip) = self.clip.as_mut() else {
            return Ok(None);
        };
        if !clip.paused {
            return Ok(None);
        }

        // Slice at the exact sample so the splice has no gap or repeat
        let rate = f64::from(clip.frame.sample_rate());
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start_frame = (clip.offset_secs.max(0.0) * rate).round() as usize;
        let start_idx = start_frame * usize::from(clip.frame.channels());

        if start_idx >= clip.frame.samples().len() {
            self.clip = None;
            tracing::debug!("resume at end of clip, finishing");
            return Ok(Some(ClipEvent::Finished));
        }

        let tail = AudioFrame::new(
            clip.frame.samples()[start_idx..].to_vec(),
            clip.frame.sample_rate(),
            clip.frame.channels(),
        )?;
        let now = self.sink.now();
        let voice = self.sink.schedule(tail, now)?;
        clip.voice = Some(voice);
        clip.started_at = now;
        clip.paused = false;

        tracing::debug!(voice, "clip resumed");
        Ok(None)
    }

    /// Halt output and discard the cursor. No resume is possible after this.
    pub fn stop(&mut self) {
        if let Some(clip) = self.clip.take() {
            if let Some(voice) = clip.voice {
                self.sink.stop(voice);
            }
            tracing::debug!("clip playback stopped");
        }
    }

    /// Record a natural completion reported by the sink.
    ///
    /// Returns [`ClipEvent::Finished`] if `id` is the sounding voice of the
    /// current clip; stale completions from replaced voices are ignored.
    pub fn on_complete(&mut self, id: SinkId) -> Option<ClipEvent> {
        match &self.clip {
            Some(clip) if clip.voice == Some(id) && !clip.paused => {
                self.clip = None;
                tracing::debug!(voice = id, "clip finished");
                Some(ClipEvent::Finished)
            }
            _ => None,
        }
    }

    /// Elapsed playback position: live while playing, frozen while paused.
    /// `None` when no clip is loaded.
    #[must_use]
    pub fn offset_secs(&self) -> Option<f64> {
        self.clip.as_ref().map(|clip| {
            if clip.paused {
                clip.offset_secs
            } else {
                (clip.offset_secs + self.sink.now() - clip.started_at)
                    .min(clip.frame.duration_secs())
            }
        })
    }

    /// True if a clip is loaded and paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.clip.as_ref().is_some_and(|c| c.paused)
    }

    /// True if a clip is currently sounding
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.clip.as_ref().is_some_and(|c| !c.paused)
    }

    /// The underlying sink
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}
