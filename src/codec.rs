//! PCM transport codec
//!
//! Converts between normalized f32 sample buffers, raw signed 16-bit
//! little-endian PCM bytes, and the base64 transport encoding used by the
//! realtime service. Stateless; one bad packet never poisons the pipeline.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Quantization scale for 16-bit PCM.
///
/// The remote service divides by 32768 on both encode and decode (not 32767),
/// so this constant must match on both directions for bit-for-bit
/// interoperability.
pub const PCM_SCALE: f32 = 32768.0;

/// An immutable unit of PCM audio: interleaved normalized samples plus
/// format metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    /// Create a frame from interleaved samples.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelMismatch`] if the sample count does not divide
    /// evenly across `channels`, and [`Error::Audio`] for a zero sample rate
    /// or zero channel count.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Audio("zero sample rate".to_string()));
        }
        if channels == 0 {
            return Err(Error::Audio("zero channel count".to_string()));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(Error::ChannelMismatch(format!(
                "{} samples do not divide across {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Interleaved normalized samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of multi-channel frames (samples per channel)
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    /// True if the frame carries no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the frame, yielding its sample buffer.
    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Text-safe encoding of raw PCM bytes plus a MIME tag identifying the
/// sample rate, as exchanged with the realtime service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPacket {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

impl TransportPacket {
    /// Wrap raw base64 data and a MIME tag received from the service.
    #[must_use]
    pub const fn new(data: String, mime_type: String) -> Self {
        Self { data, mime_type }
    }

    /// Encode raw little-endian 16-bit PCM bytes for transport.
    ///
    /// Total function; never fails for any byte sequence.
    #[must_use]
    pub fn from_pcm_bytes(bytes: &[u8], sample_rate: u32) -> Self {
        Self {
            data: BASE64.encode(bytes),
            mime_type: format!("audio/pcm;rate={sample_rate}"),
        }
    }

    /// Decode the transport payload back to raw PCM bytes.
    ///
    /// Lossless: returns exactly the byte sequence that was encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] if the payload is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.data)
            .map_err(|e| Error::MalformedPacket(e.to_string()))
    }

    /// Base64 payload
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// MIME tag, e.g. `audio/pcm;rate=16000`
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Interpret raw bytes as signed 16-bit little-endian PCM and normalize to
/// f32 using the `1/32768` scale.
///
/// # Errors
///
/// Returns [`Error::MalformedPacket`] on an odd byte length and
/// [`Error::ChannelMismatch`] if the sample count does not divide across
/// `channels`.
pub fn bytes_to_frame(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioFrame> {
    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedPacket(format!(
            "odd PCM byte length {}",
            bytes.len()
        )));
    }
    let sample_count = bytes.len() / 2;
    if channels == 0 || sample_count % usize::from(channels) != 0 {
        return Err(Error::ChannelMismatch(format!(
            "{sample_count} samples do not divide across {channels} channels"
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM_SCALE)
        .collect();

    AudioFrame::new(samples, sample_rate, channels)
}

/// Quantize a frame back to signed 16-bit little-endian PCM bytes.
///
/// Out-of-range samples are clamped to the i16 range, not rejected:
/// out-of-range audio content is a caller bug, not a codec fault.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn frame_to_bytes(frame: &AudioFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.samples().len() * 2);
    for &sample in frame.samples() {
        let quantized = (f64::from(sample) * f64::from(PCM_SCALE))
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_bytes_round_trip_exactly() {
        // Every interesting i16 boundary value survives the float hop
        let values: Vec<i16> = vec![0, 1, -1, 16384, -16384, 32767, -32768];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let frame = bytes_to_frame(&bytes, 16000, 1).unwrap();
        assert_eq!(frame_to_bytes(&frame), bytes);
    }

    #[test]
    fn decode_uses_32768_scale() {
        let bytes = 16384i16.to_le_bytes();
        let frame = bytes_to_frame(&bytes, 16000, 1).unwrap();
        assert!((frame.samples()[0] - 0.5).abs() < f32::EPSILON);

        let min = i16::MIN.to_le_bytes();
        let frame = bytes_to_frame(&min, 16000, 1).unwrap();
        assert!((frame.samples()[0] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn encode_clamps_out_of_range_samples() {
        let frame = AudioFrame::new(vec![2.0, -2.0], 16000, 1).unwrap();
        let bytes = frame_to_bytes(&frame);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    }

    #[test]
    fn transport_encoding_is_lossless() {
        let bytes: Vec<u8> = (0..=255).collect();
        let packet = TransportPacket::from_pcm_bytes(&bytes, 16000);
        assert_eq!(packet.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(packet.decode().unwrap(), bytes);
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let packet = TransportPacket::new("not!valid@base64".to_string(), "audio/pcm".to_string());
        assert!(matches!(packet.decode(), Err(Error::MalformedPacket(_))));

        // Wrong padding
        let packet = TransportPacket::new("AAA".to_string(), "audio/pcm".to_string());
        assert!(matches!(packet.decode(), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn odd_byte_length_is_malformed() {
        assert!(matches!(
            bytes_to_frame(&[0u8, 1, 2], 16000, 1),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        // 3 samples across 2 channels
        let bytes = [0u8; 6];
        assert!(matches!(
            bytes_to_frame(&bytes, 24000, 2),
            Err(Error::ChannelMismatch(_))
        ));
        assert!(matches!(
            AudioFrame::new(vec![0.0; 5], 24000, 2),
            Err(Error::ChannelMismatch(_))
        ));
    }

    #[test]
    fn frame_duration_accounts_for_channels() {
        let frame = AudioFrame::new(vec![0.0; 48000], 24000, 2).unwrap();
        assert_eq!(frame.frame_count(), 24000);
        assert!((frame.duration_secs() - 1.0).abs() < 1e-9);
    }
}
