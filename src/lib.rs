//! AACommu: incremental sentence composition for augmentative communication.
//!
//! A partner's speech is captured and transcribed by a remote service; the
//! user answers by picking suggested tokens one at a time, and the finished
//! sentence is spoken aloud and logged.

pub mod audio;
pub mod composer;
pub mod config;
pub mod conversation;
pub mod fallback;
pub mod gateway;
pub mod repl;
pub mod speech;
