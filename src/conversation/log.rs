//! Append-only record of finished utterances.
//!
//! The log holds both sides of the conversation in the order they happened.
//! It is independent of the sentence currently being composed: only spoken
//! sentences and received partner transcripts end up here.

use std::fmt;

/// Who produced a [`DialogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The assisted user.
    Me,
    /// The conversation partner (transcribed speech).
    Partner,
}

impl Speaker {
    pub fn prefix(&self) -> &'static str {
        match self {
            Speaker::Me => "나",
            Speaker::Partner => "상대방",
        }
    }
}

/// One tagged line of dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl fmt::Display for DialogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker.prefix(), self.text)
    }
}

/// Chronological dialog history for the current conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<DialogEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.entries.push(DialogEntry {
            speaker,
            text: text.into(),
        });
    }

    /// Drop every entry.  Only called when a new context is selected.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[DialogEntry] {
        &self.entries
    }

    /// The last `n` entries (all of them when fewer exist).
    pub fn recent(&self, n: usize) -> &[DialogEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn last(&self) -> Option<&DialogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
