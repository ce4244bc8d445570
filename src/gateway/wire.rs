//! Request and response contracts of the suggestion service.
//!
//! Field names are part of the compatibility surface and must not change.
//! Requests travel as `multipart/form-data`; responses are JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// File name given to the uploaded recording.
pub const AUDIO_FILE_NAME: &str = "recording.wav";

/// MIME type of the uploaded recording.
pub const AUDIO_MIME: &str = "audio/wav";

/// The four remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Voice,
    Select,
    End,
}

impl Operation {
    /// Endpoint path relative to the service base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Voice => "voice",
            Operation::Select => "select",
            Operation::End => "end",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

// ---------------------------------------------------------------------------
// start
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartRequest {
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// voice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub transcribed_text: String,
    #[serde(default)]
    pub options: Vec<String>,
}

// ---------------------------------------------------------------------------
// select
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectRequest {
    pub choice: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectResponse {
    pub current_sentence: String,
    #[serde(default)]
    pub options: Vec<String>,
}

// ---------------------------------------------------------------------------
// end
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EndResponse {
    #[serde(default)]
    pub final_sentence: String,
}
