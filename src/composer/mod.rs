//! Incremental sentence composition.
//!
//! # Architecture
//!
//! ```text
//! ComposerCommand (mpsc)
//!        │
//!        ▼
//! Composer::run()  ← async tokio task
//!        │
//!        ├─ SelectContext → clear history, ContextSelected
//!        ├─ Begin         → gateway.start        → Active(AwaitingCapture)
//!        ├─ Start/Stop    → CaptureDevice → gateway.voice → Composing
//!        ├─ ChooseToken   → optimistic append, gateway.select (fallback on error)
//!        ├─ ChoosePreset  → replace sentence
//!        └─ Speak         → SpeechOutput, log, gateway.end
//!
//! SharedConversation (Arc<Mutex<Conversation>>) ←─── read by the front end
//! ```

pub mod runner;
pub mod state;

pub use runner::{Composer, ComposerCommand, ComposerEvent};
pub use state::{
    lock_conversation, new_shared_conversation, Activity, ComposeError, Conversation,
    PartialSentence, Phase, SharedConversation, Snapshot, Source, StaleReply, Ticket,
    LOCAL_VOICE_ERROR,
};
