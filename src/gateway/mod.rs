//! Suggestion gateway: the boundary to the transcription/suggestion service.
//!
//! This module provides:
//! * [`SuggestionGateway`]: async trait with the four remote operations.
//! * [`HttpGateway`]: multipart/JSON client for the real service.
//! * [`OfflineGateway`]: in-process simulation backed by the fallback table.
//! * [`TransportError`]: every way a call can fail.
//!
//! Gateways translate requests and responses only; they never touch the
//! composer's state.  Deciding what to do on failure is the caller's job.

pub mod client;
pub mod error;
pub mod offline;
pub mod wire;

use async_trait::async_trait;

use crate::audio::AudioClip;

pub use client::HttpGateway;
pub use error::TransportError;
pub use offline::OfflineGateway;
pub use wire::{
    EndResponse, Operation, SelectRequest, SelectResponse, StartRequest, StartResponse,
    VoiceResponse,
};

/// The remote composition service.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn SuggestionGateway>`.
#[async_trait]
pub trait SuggestionGateway: Send + Sync {
    /// Open (or reset) the server-side session for a context and role.
    async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError>;

    /// Upload the partner's speech; returns its transcript and first candidates.
    async fn voice(&self, clip: &AudioClip) -> Result<VoiceResponse, TransportError>;

    /// Append a token to the server-side sentence.
    async fn select(&self, request: &SelectRequest) -> Result<SelectResponse, TransportError>;

    /// Finalize and clear the server-side sentence.
    async fn end(&self) -> Result<EndResponse, TransportError>;
}
