//! Partner-speech capture.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → forwarding thread
//!            → Recorder::feed (only while recording) → Recorder::stop → WAV AudioClip
//! ```
//!
//! The composer only sees the [`CaptureDevice`] trait: `start`, then `stop`
//! to obtain a finished [`AudioClip`], or `cancel` to throw the take away.

pub mod microphone;
pub mod recorder;

pub use microphone::{AudioChunk, Microphone, StreamHandle};
pub use recorder::{encode_wav, Recorder};

use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioClip
// ---------------------------------------------------------------------------

/// A finished recording, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// WAV file bytes.
    pub bytes: Vec<u8>,
    /// Length of the recording in seconds.
    pub duration_secs: f32,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, duration_secs: f32) -> Self {
        Self {
            bytes,
            duration_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while recording the partner.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream (is microphone access allowed?): {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The recorder has no working microphone behind it.
    #[error("audio capture unavailable: {0}")]
    Unavailable(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("recording too short: {got_secs:.2}s (minimum {min_secs:.2}s)")]
    TooShort { min_secs: f32, got_secs: f32 },

    #[error("failed to encode recording: {0}")]
    Encode(String),
}

// ---------------------------------------------------------------------------
// CaptureDevice
// ---------------------------------------------------------------------------

/// Something that records a finite clip between `start` and `stop`.
pub trait CaptureDevice: Send + Sync {
    /// Begin a new recording.
    fn start(&self) -> Result<(), CaptureError>;

    /// Finish the recording and hand back the clip.
    fn stop(&self) -> Result<AudioClip, CaptureError>;

    /// Abandon the current recording, if any.
    fn cancel(&self);
}
