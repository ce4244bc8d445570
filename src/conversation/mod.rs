//! Conversation vocabulary: scenarios, roles, preset sentences and the dialog
//! history.

pub mod context;
pub mod log;
pub mod presets;

pub use context::{label_for, Context, Role, UnknownTag, GENERIC_CONTEXT_LABEL};
pub use log::{ConversationLog, DialogEntry, Speaker};
pub use presets::{preset_sentences, COMMON_PHRASES, QUICK_PHRASES};
