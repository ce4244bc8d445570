//! Local fallback suggestions.
//!
//! When the suggestion service cannot be reached the composer still needs
//! something to offer.  [`FallbackEngine`] answers from a static table keyed
//! by context and last chosen token, optionally extended from a TOML file.

pub mod engine;
pub mod table;

pub use engine::{FallbackEngine, SuggestionTable, TokenTable};
pub use table::{DEFAULT_KEY, FLOOR};
