//! Composition state machine and shared conversation state.
//!
//! [`Conversation`] is the single owner of everything the composer tracks:
//! context, role, partial sentence, candidates, partner transcript, dialog
//! log and the turn counter.  Fields are private; every change goes through
//! one of the transition methods below, so invariants hold no matter who
//! drives the machine.
//!
//! Gateway calls are split in two.  A `stage_*` method validates the
//! transition, applies the optimistic part and hands back a [`Ticket`].  The
//! matching `finish_*` method reconciles the reply, but only if the ticket is
//! still current.  Anything that starts a new turn (clear, preset, speak,
//! capture, context change) invalidates outstanding tickets, and their
//! replies are rejected as [`StaleReply`].
//!
//! ```text
//! Idle ──select_context──▶ ContextSelected ──begin──▶ Active(AwaitingCapture)
//!
//! Active:
//!   AwaitingCapture ──start_capture──▶ Capturing ──stop──▶ Processing
//!   Processing ──voice reply──▶ Composing ──token──▶ Composing
//!   Composing ──speak──▶ Finalizing ──end reply──▶ Composing
//!
//! any state ──select_context──▶ ContextSelected
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::audio::CaptureError;
use crate::conversation::{Context, ConversationLog, Role, Speaker};
use crate::fallback::{FallbackEngine, DEFAULT_KEY};
use crate::gateway::{
    EndResponse, Operation, SelectRequest, SelectResponse, StartRequest, StartResponse,
    TransportError, VoiceResponse,
};

/// Transcript shown when the partner's speech could not be processed.
pub const LOCAL_VOICE_ERROR: &str = "음성 처리 중 오류가 발생했습니다.";

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Sub-state of an active conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Waiting for the partner to speak.
    AwaitingCapture,
    /// The microphone is recording the partner.
    Capturing,
    /// The recording is being transcribed.
    Processing,
    /// The user is choosing tokens.
    Composing,
    /// A spoken sentence is being closed on the server.
    Finalizing,
}

/// Top-level state of the composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ContextSelected,
    Active(Activity),
}

impl Phase {
    /// Short label for status lines and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ContextSelected => "context selected",
            Phase::Active(Activity::AwaitingCapture) => "waiting for partner",
            Phase::Active(Activity::Capturing) => "recording",
            Phase::Active(Activity::Processing) => "processing speech",
            Phase::Active(Activity::Composing) => "composing",
            Phase::Active(Activity::Finalizing) => "finishing sentence",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Active(_))
    }

    /// States where sentence editing (preset, clear, new capture) is allowed.
    fn is_editable(&self) -> bool {
        matches!(
            self,
            Phase::Active(Activity::AwaitingCapture | Activity::Composing | Activity::Finalizing)
        )
    }
}

// ---------------------------------------------------------------------------
// PartialSentence
// ---------------------------------------------------------------------------

/// The sentence being composed in the current turn.
///
/// Display text only: the server's `current_sentence` when it answered,
/// otherwise the chosen tokens joined with spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialSentence {
    text: String,
}

impl PartialSentence {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn push(&mut self, token: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(token);
    }

    fn overwrite(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    fn clear(&mut self) {
        self.text.clear();
    }
}

// ---------------------------------------------------------------------------
// Tickets and errors
// ---------------------------------------------------------------------------

/// Proof that a gateway request was issued in a given turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    turn: u64,
    operation: Operation,
}

impl Ticket {
    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

/// A gateway reply that arrived after its turn was over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("discarded stale {operation} reply from turn {issued} (current turn {current})")]
pub struct StaleReply {
    pub operation: Operation,
    pub issued: u64,
    pub current: u64,
}

/// Where the candidates (or sentence) of a transition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The suggestion service answered.
    Server,
    /// The service failed; the local fallback table was used.
    Fallback,
    /// No gateway call was involved.
    Local,
}

/// Why a composer operation was refused or failed.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("cannot {action} while {}", .phase.label())]
    InvalidTransition { action: &'static str, phase: Phase },

    #[error("role {role} is not available in {}", .context.label())]
    RoleNotAvailable { context: Context, role: Role },

    #[error("a {0} request is already in flight")]
    RequestInFlight(Operation),

    #[error("cannot choose an empty token")]
    EmptyToken,

    /// `start` failed; the conversation stays in `ContextSelected`.
    #[error("could not start the conversation: {0}")]
    Begin(#[source] TransportError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Stale(#[from] StaleReply),
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Everything the composer knows about the current conversation.
#[derive(Debug, Default)]
pub struct Conversation {
    phase: Phase,
    context: Option<Context>,
    role: Option<Role>,
    sentence: PartialSentence,
    candidates: Vec<String>,
    transcript: Option<String>,
    log: ConversationLog,
    turn: u64,
    in_flight: Option<Ticket>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> Option<Context> {
        self.context
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn sentence(&self) -> &PartialSentence {
        &self.sentence
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn in_flight(&self) -> Option<Ticket> {
        self.in_flight
    }

    /// Owned copy of the displayable state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            context: self.context,
            role: self.role,
            sentence: self.sentence.text.clone(),
            candidates: self.candidates.clone(),
            transcript: self.transcript.clone(),
            history_len: self.log.len(),
            turn: self.turn,
        }
    }

    // -----------------------------------------------------------------------
    // Context
    // -----------------------------------------------------------------------

    /// Choose the scenario for a new conversation.
    ///
    /// Allowed from every state.  Clears the dialog log along with the rest
    /// of the composition state; replies still in flight become stale.
    pub fn select_context(
        &mut self,
        context: Context,
        role: Option<Role>,
    ) -> Result<(), ComposeError> {
        if let Some(role) = role {
            if !context.allows_role(role) {
                return Err(ComposeError::RoleNotAvailable { context, role });
            }
        }

        self.context = Some(context);
        self.role = role;
        self.log.clear();
        self.transcript = None;
        self.reset_sentence();
        self.next_turn();
        self.phase = Phase::ContextSelected;
        log::debug!("composer: context {context} role {role:?}, turn {}", self.turn);
        Ok(())
    }

    /// Validate `begin` and build the `start` request.
    pub fn stage_begin(&mut self) -> Result<(Ticket, StartRequest), ComposeError> {
        let context = match (self.phase, self.context) {
            (Phase::ContextSelected, Some(context)) => context,
            _ => return Err(self.invalid("begin the conversation")),
        };
        if let Some(ticket) = self.in_flight {
            return Err(ComposeError::RequestInFlight(ticket.operation));
        }

        let request = StartRequest {
            context: context.id().to_string(),
            role: self.role.map(|r| r.id().to_string()),
        };
        Ok((self.issue(Operation::Start), request))
    }

    /// Apply the `start` reply.  Failure keeps the machine in
    /// `ContextSelected` and is returned to the caller.
    pub fn finish_begin(
        &mut self,
        ticket: Ticket,
        result: Result<StartResponse, TransportError>,
    ) -> Result<String, ComposeError> {
        self.accept(ticket)?;
        match result {
            Ok(response) => {
                self.phase = Phase::Active(Activity::AwaitingCapture);
                Ok(response.message)
            }
            Err(e) => Err(ComposeError::Begin(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    /// Enter `Capturing`.  Starts a new turn with an empty sentence.
    pub fn start_capture(&mut self) -> Result<(), ComposeError> {
        if !self.phase.is_editable() {
            return Err(self.invalid("start recording"));
        }
        self.reset_sentence();
        self.next_turn();
        self.phase = Phase::Active(Activity::Capturing);
        Ok(())
    }

    /// Check that a recording is running before asking the device for it.
    pub fn ensure_capturing(&self) -> Result<(), ComposeError> {
        match self.phase {
            Phase::Active(Activity::Capturing) => Ok(()),
            _ => Err(self.invalid("stop recording")),
        }
    }

    /// The capture device failed; wait for the partner again.
    pub fn capture_failed(&mut self) {
        if self.phase.is_active() {
            self.phase = Phase::Active(Activity::AwaitingCapture);
        }
    }

    /// Enter `Processing` for a finished clip.
    pub fn stage_voice(&mut self) -> Result<Ticket, ComposeError> {
        match self.phase {
            Phase::Active(Activity::AwaitingCapture | Activity::Capturing) => {}
            _ => return Err(self.invalid("process a recording")),
        }
        self.phase = Phase::Active(Activity::Processing);
        Ok(self.issue(Operation::Voice))
    }

    /// Apply the `voice` reply, degrading to the fallback table on failure.
    ///
    /// The shown transcript is always logged as a partner entry, including
    /// the local error text.
    pub fn finish_voice(
        &mut self,
        ticket: Ticket,
        result: Result<VoiceResponse, TransportError>,
        fallback: &FallbackEngine,
    ) -> Result<Source, ComposeError> {
        self.accept(ticket)?;
        self.phase = Phase::Active(Activity::Composing);

        match result {
            Ok(response) => {
                self.log.append(Speaker::Partner, response.transcribed_text.clone());
                self.transcript = Some(response.transcribed_text);
                self.candidates = response.options;
                Ok(Source::Server)
            }
            Err(e) => {
                log::warn!("composer: {e}; using local candidates");
                self.log.append(Speaker::Partner, LOCAL_VOICE_ERROR);
                self.transcript = Some(LOCAL_VOICE_ERROR.to_string());
                self.candidates = fallback.suggest(self.context_id(), None);
                Ok(Source::Fallback)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Composing
    // -----------------------------------------------------------------------

    /// Replace the sentence with a preset phrase.  No gateway call.
    pub fn choose_preset(&mut self, phrase: &str) -> Result<(), ComposeError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(ComposeError::EmptyToken);
        }
        if !self.phase.is_editable() {
            return Err(self.invalid("choose a preset"));
        }
        self.sentence.overwrite(phrase);
        self.candidates.clear();
        self.next_turn();
        self.phase = Phase::Active(Activity::Composing);
        Ok(())
    }

    /// Append `token` optimistically and build the `select` request.
    pub fn stage_token(&mut self, token: &str) -> Result<(Ticket, SelectRequest), ComposeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ComposeError::EmptyToken);
        }
        if self.phase != Phase::Active(Activity::Composing) {
            return Err(self.invalid("choose a token"));
        }
        if let Some(ticket) = self.in_flight {
            return Err(ComposeError::RequestInFlight(ticket.operation));
        }

        self.sentence.push(token);
        let request = SelectRequest {
            choice: token.to_string(),
        };
        Ok((self.issue(Operation::Select), request))
    }

    /// Reconcile the `select` reply for `token`.
    ///
    /// The server's sentence and candidates win when it answered, even with
    /// an empty candidate list.  On failure the optimistic sentence stays and
    /// the candidates come from the fallback table.
    pub fn finish_select(
        &mut self,
        ticket: Ticket,
        token: &str,
        result: Result<SelectResponse, TransportError>,
        fallback: &FallbackEngine,
    ) -> Result<Source, ComposeError> {
        self.accept(ticket)?;
        match result {
            Ok(response) => {
                self.sentence.overwrite(response.current_sentence);
                self.candidates = response.options;
                Ok(Source::Server)
            }
            Err(e) => {
                log::warn!("composer: {e}; using local candidates");
                self.candidates = fallback.suggest(self.context_id(), Some(token.trim()));
                Ok(Source::Fallback)
            }
        }
    }

    /// Reset sentence and candidates.  No gateway call.
    pub fn clear(&mut self) -> Result<(), ComposeError> {
        if !self.phase.is_editable() {
            return Err(self.invalid("clear the sentence"));
        }
        self.reset_sentence();
        self.next_turn();
        self.phase = Phase::Active(Activity::Composing);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalizing
    // -----------------------------------------------------------------------

    /// The text to speak, or `None` when there is nothing to say.
    pub fn utterance(&self) -> Option<String> {
        if self.sentence.is_empty() {
            None
        } else {
            Some(self.sentence.text.clone())
        }
    }

    /// Log the current sentence as spoken, clear it and issue the `end`
    /// ticket.  Returns `None` when the sentence is empty.
    pub fn commit_utterance(&mut self) -> Option<Ticket> {
        let text = self.utterance()?;
        self.log.append(Speaker::Me, text);
        self.reset_sentence();
        self.next_turn();
        self.phase = Phase::Active(Activity::Finalizing);
        Some(self.issue(Operation::End))
    }

    /// Apply the `end` reply.  A failed `end` is only logged.
    pub fn finish_end(
        &mut self,
        ticket: Ticket,
        result: Result<EndResponse, TransportError>,
    ) -> Result<Option<String>, ComposeError> {
        self.accept(ticket)?;
        self.phase = Phase::Active(Activity::Composing);
        match result {
            Ok(response) => Ok(Some(response.final_sentence)),
            Err(e) => {
                log::warn!("composer: {e}; sentence already finalized locally");
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn context_id(&self) -> &'static str {
        self.context.map(|c| c.id()).unwrap_or(DEFAULT_KEY)
    }

    fn reset_sentence(&mut self) {
        self.sentence.clear();
        self.candidates.clear();
    }

    fn next_turn(&mut self) {
        self.turn += 1;
        self.in_flight = None;
    }

    fn issue(&mut self, operation: Operation) -> Ticket {
        let ticket = Ticket {
            turn: self.turn,
            operation,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    fn accept(&mut self, ticket: Ticket) -> Result<(), StaleReply> {
        if ticket.turn == self.turn && self.in_flight == Some(ticket) {
            self.in_flight = None;
            Ok(())
        } else {
            Err(StaleReply {
                operation: ticket.operation,
                issued: ticket.turn,
                current: self.turn,
            })
        }
    }

    fn invalid(&self, action: &'static str) -> ComposeError {
        ComposeError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Displayable copy of a [`Conversation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub context: Option<Context>,
    pub role: Option<Role>,
    pub sentence: String,
    pub candidates: Vec<String>,
    pub transcript: Option<String>,
    pub history_len: usize,
    pub turn: u64,
}

// ---------------------------------------------------------------------------
// SharedConversation
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`Conversation`].
///
/// Lock for short critical sections only; never hold the guard across
/// `.await`.
pub type SharedConversation = Arc<Mutex<Conversation>>;

pub fn new_shared_conversation() -> SharedConversation {
    Arc::new(Mutex::new(Conversation::new()))
}

/// Lock the conversation, recovering the data if a holder panicked.
pub fn lock_conversation(shared: &SharedConversation) -> MutexGuard<'_, Conversation> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
