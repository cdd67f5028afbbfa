mod artifact;
mod encoder;
mod session;

pub use artifact::Artifact;
pub use encoder::FfmpegEncoder;
pub use session::{EncoderBackend, EncoderSession, SessionState};

use thiserror::Error;

/// Errors from the encoder backend.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The encoder could not be launched at all (missing binary, or an
    /// unsupported platform for the audio pipe).
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The encoder started but failed while running or finalizing; this is
    /// also where an unsupported codec pairing surfaces. No fallback
    /// negotiation is attempted.
    #[error("encoder failed: {0}")]
    EncoderFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;
