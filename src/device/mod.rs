//! Audio device layer
//!
//! cpal-backed input and output, device enumeration, and the ownership
//! token that keeps a duplex session and the clip player from fighting over
//! the physical output.

mod input;
mod output;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

pub use input::AudioInput;
pub use output::MixerSink;

use crate::codec::{AudioFrame, PCM_SCALE};
use crate::{Error, Result};

/// Sample rate for capture (16 kHz mono, the service's expected input)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate for playback (24 kHz mono, the service's output format)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Names of the audio devices visible on this host
#[derive(Debug, Serialize)]
pub struct DeviceInventory {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Enumerate input and output devices on the default host.
///
/// # Errors
///
/// Returns [`Error::DeviceUnavailable`] if the host cannot be queried.
pub fn list_devices() -> Result<DeviceInventory> {
    let host = cpal::default_host();

    let inputs = host
        .input_devices()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();
    let outputs = host
        .output_devices()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(DeviceInventory { inputs, outputs })
}

/// Serializes ownership of the physical output device.
///
/// One arbiter guards one output; [`MixerSink::open`] requires a lease, so a
/// live duplex session and the clip player cannot run against the same
/// output concurrently. Instance-scoped, never a process-wide singleton, so
/// independent sessions (and tests) do not interfere.
#[derive(Debug, Clone, Default)]
pub struct OutputArbiter {
    busy: Arc<AtomicBool>,
}

impl OutputArbiter {
    /// Try to take exclusive ownership of the output.
    ///
    /// Returns `None` while another lease is alive.
    #[must_use]
    pub fn lease(&self) -> Option<OutputLease> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| OutputLease {
                busy: Arc::clone(&self.busy),
            })
    }
}

/// Exclusive ownership of the output device; released on drop.
#[derive(Debug)]
pub struct OutputLease {
    busy: Arc<AtomicBool>,
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Encode f32 samples as a 16-bit mono WAV byte buffer.
///
/// # Errors
///
/// Returns [`Error::Audio`] if WAV encoding fails.
#[allow(clippy::cast_possible_truncation)]
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            let quantized = (f64::from(sample) * f64::from(PCM_SCALE))
                .round()
                .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Read a 16-bit PCM WAV file into an [`AudioFrame`].
///
/// # Errors
///
/// Returns [`Error::Audio`] if the file cannot be read or is not 16-bit
/// integer PCM.
pub fn read_wav(path: &Path) -> Result<AudioFrame> {
    let mut reader = hound::WavReader::open(path).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Audio(format!(
            "unsupported WAV format: {:?} {} bit",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let samples: Vec<f32> = reader
        .samples::<i16>()
        .map(|s| s.map(|v| f32::from(v) / PCM_SCALE))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    AudioFrame::new(samples, spec.sample_rate, spec.channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbiter_grants_one_lease_at_a_time() {
        let arbiter = OutputArbiter::default();

        let lease = arbiter.lease().unwrap();
        assert!(arbiter.lease().is_none());

        drop(lease);
        assert!(arbiter.lease().is_some());
    }

    #[test]
    fn independent_arbiters_do_not_interfere() {
        let a = OutputArbiter::default();
        let b = OutputArbiter::default();

        let _lease_a = a.lease().unwrap();
        assert!(b.lease().is_some());
    }

    #[test]
    fn wav_round_trip_preserves_samples() {
        let samples = vec![0.0, 0.25, -0.25, 0.5, -0.5];
        let wav = samples_to_wav(&samples, CAPTURE_SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, CAPTURE_SAMPLE_RATE);
        let read: Vec<i16> = reader.samples::<i16>().map(std::result::Result::unwrap).collect();
        assert_eq!(read.len(), samples.len());
        assert_eq!(read[3], 16384);
    }
}
