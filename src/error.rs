//! Error types for the Lumen voice engine

use thiserror::Error;

/// Result type alias for Lumen voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice engine
#[derive(Debug, Error)]
pub enum Error {
    /// Transport packet could not be decoded (bad alphabet, padding, or framing)
    #[error("malformed transport packet: {0}")]
    MalformedPacket(String),

    /// PCM byte count does not divide evenly across the declared channels
    #[error("channel mismatch: {0}")]
    ChannelMismatch(String),

    /// Capture or playback device is missing or was revoked mid-session
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Remote realtime session could not be opened
    #[error("session open failed: {0}")]
    SessionOpen(String),

    /// A voice session is already holding the audio devices
    #[error("a voice session is already active")]
    SessionAlreadyActive,

    /// Mid-session network failure; fatal, requires a fresh connect
    #[error("transport error: {0}")]
    Transport(String),

    /// Audio plumbing error (stream config, mixer state)
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
