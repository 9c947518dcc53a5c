//! Microphone input device

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::capture::{BlockAssembler, CaptureEvent};
use crate::{Error, Result};

/// Captures mono audio from an input device, emitting fixed-size blocks
/// over a channel.
///
/// `cpal::Stream` is not `Send`; keep the instance on the thread that
/// drives the session.
pub struct AudioInput {
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    stream: Option<Stream>,
}

impl AudioInput {
    /// Acquire an input device supporting mono capture at `sample_rate`.
    ///
    /// Picks the named device if given, otherwise the host default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no device or no suitable
    /// config exists.
    pub fn open(sample_rate: u32, device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| Error::DeviceUnavailable(format!("input device not found: {name}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?,
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!("no mono input config at {sample_rate} Hz"))
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            "audio input acquired"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            stream: None,
        })
    }

    /// Start capturing, sending [`CaptureEvent`]s on `events`.
    ///
    /// Complete blocks of `block_samples` samples arrive in capture order;
    /// a device failure arrives as [`CaptureEvent::DeviceLost`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the stream cannot be built.
    pub fn start(
        &mut self,
        block_samples: usize,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut assembler = BlockAssembler::new(block_samples);
        let block_tx = events.clone();
        let error_tx = events;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for block in assembler.push(data) {
                        let _ = block_tx.send(CaptureEvent::Block(block));
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "input stream error");
                    let _ = error_tx.send(CaptureEvent::DeviceLost(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(block_samples, "audio capture started");
        Ok(())
    }

    /// Stop capturing and release the stream.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Capture sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
