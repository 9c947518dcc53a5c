//! Output device mixer
//!
//! A persistent output stream with a software mixer implementing
//! [`OutputSink`]: voices carry an absolute start position on a
//! sample-counter clock, so the scheduler can line up future-dated buffers
//! back-to-back. The `cpal::Stream` is not `Send` and lives on a dedicated
//! thread; everything else talks to it through shared state and channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::codec::AudioFrame;
use crate::device::OutputLease;
use crate::playback::{OutputSink, SinkId};
use crate::{Error, Result};

/// One buffer scheduled on the mixer timeline
struct Voice {
    id: SinkId,
    samples: Vec<f32>,
    channels: u16,
    /// Absolute start position on the sample-counter clock
    start_frame: u64,
    /// Frames already rendered
    pos: usize,
}

impl Voice {
    fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    fn finished(&self) -> bool {
        self.pos >= self.frame_count()
    }

    /// Render one frame as mono (multi-channel sources are averaged).
    #[allow(clippy::cast_precision_loss)]
    fn next_sample(&mut self) -> f32 {
        let channels = usize::from(self.channels);
        let base = self.pos * channels;
        let value = if channels == 1 {
            self.samples[base]
        } else {
            self.samples[base..base + channels].iter().sum::<f32>() / channels as f32
        };
        self.pos += 1;
        value
    }
}

/// State shared between the scheduler side and the audio callback
struct MixerShared {
    voices: Vec<Voice>,
    clock_frames: u64,
    next_id: SinkId,
}

/// cpal-backed [`OutputSink`] mixing scheduled voices on its own thread.
///
/// Natural completions are reported on the channel passed to [`open`].
/// Requires an [`OutputLease`], serializing access to the physical output.
///
/// [`open`]: MixerSink::open
pub struct MixerSink {
    shared: Arc<Mutex<MixerShared>>,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    _lease: OutputLease,
}

impl MixerSink {
    /// Open the output device and start the mixer thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if no device or no suitable
    /// config exists.
    pub fn open(
        sample_rate: u32,
        device_name: Option<String>,
        completions: mpsc::UnboundedSender<SinkId>,
        lease: OutputLease,
    ) -> Result<Self> {
        let shared = Arc::new(Mutex::new(MixerShared {
            voices: Vec::new(),
            clock_frames: 0,
            next_id: 1,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let thread_shared = Arc::clone(&shared);
        let thread_shutdown = Arc::clone(&shutdown);

        let worker = std::thread::Builder::new()
            .name("lumen-mixer".to_string())
            .spawn(move || {
                run_mixer_thread(
                    sample_rate,
                    device_name,
                    &thread_shared,
                    &thread_shutdown,
                    &completions,
                    &ready_tx,
                );
            })
            .map_err(|e| Error::Audio(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| Error::DeviceUnavailable("mixer thread died during startup".to_string()))??;

        tracing::debug!(sample_rate, "output mixer started");

        Ok(Self {
            shared,
            sample_rate,
            shutdown,
            worker: Some(worker),
            _lease: lease,
        })
    }
}

impl OutputSink for MixerSink {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn schedule(&mut self, frame: AudioFrame, start_secs: f64) -> Result<SinkId> {
        if frame.sample_rate() != self.sample_rate {
            tracing::warn!(
                frame_rate = frame.sample_rate(),
                mixer_rate = self.sample_rate,
                "frame sample rate does not match mixer, playing unresampled"
            );
        }

        let start_frame = (start_secs.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let mut shared = self
            .shared
            .lock()
            .map_err(|_| Error::Audio("mixer state poisoned".to_string()))?;

        let id = shared.next_id;
        shared.next_id += 1;
        let channels = frame.channels();
        shared.voices.push(Voice {
            id,
            samples: frame.into_samples(),
            channels,
            start_frame,
            pos: 0,
        });

        Ok(id)
    }

    fn stop(&mut self, id: SinkId) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.voices.retain(|v| v.id != id);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        self.shared
            .lock()
            .map_or(0.0, |shared| shared.clock_frames as f64 / f64::from(self.sample_rate))
    }
}

impl Drop for MixerSink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Own the cpal stream for the lifetime of the mixer.
fn run_mixer_thread(
    sample_rate: u32,
    device_name: Option<String>,
    shared: &Arc<Mutex<MixerShared>>,
    shutdown: &Arc<AtomicBool>,
    completions: &mpsc::UnboundedSender<SinkId>,
    ready: &std::sync::mpsc::Sender<Result<()>>,
) {
    let stream = match build_stream(sample_rate, device_name, shared, completions) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
    tracing::debug!("output mixer stopped");
}

fn open_output_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::DeviceUnavailable(format!("output device not found: {name}"))),
        None => host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string())),
    }
}

fn build_stream(
    sample_rate: u32,
    device_name: Option<String>,
    shared: &Arc<Mutex<MixerShared>>,
    completions: &mpsc::UnboundedSender<SinkId>,
) -> Result<cpal::Stream> {
    let device = open_output_device(device_name.as_deref())?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            // Fallback: stereo, fanning the mono mix to both channels
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| {
            Error::DeviceUnavailable(format!("no output config at {sample_rate} Hz"))
        })?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "output device acquired"
    );

    let callback_shared = Arc::clone(shared);
    let callback_completions = completions.clone();

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut state) = callback_shared.lock() else {
                    data.fill(0.0);
                    return;
                };

                for frame_out in data.chunks_mut(channels) {
                    let tick = state.clock_frames;
                    let mut mix = 0.0f32;
                    for voice in &mut state.voices {
                        if tick >= voice.start_frame && !voice.finished() {
                            mix += voice.next_sample();
                        }
                    }
                    let sample = mix.clamp(-1.0, 1.0);
                    for out in frame_out.iter_mut() {
                        *out = sample;
                    }
                    state.clock_frames += 1;
                }

                let mut i = 0;
                while i < state.voices.len() {
                    if state.voices[i].finished() {
                        let voice = state.voices.swap_remove(i);
                        let _ = callback_completions.send(voice.id);
                    } else {
                        i += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "output stream error");
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    Ok(stream)
}
