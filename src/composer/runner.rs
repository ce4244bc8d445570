//! Composer: drives the state machine against the gateway and devices.
//!
//! [`Composer`] owns the [`SharedConversation`] and offers one method per
//! user operation.  Each method stages a transition, performs at most one
//! gateway call without holding the lock, then reconciles the reply.
//!
//! [`Composer::run`] consumes [`ComposerCommand`]s from a `tokio::sync::mpsc`
//! channel:
//!
//! ```text
//! command ──▶ dispatch ──▶ gateway call pending ──▶ reply reconciled
//!                               │
//!                               ├─ SpeakQuick / History / Status → applied now
//!                               ├─ Clear / ChoosePreset / SelectContext
//!                               │    backlog empty → applied now
//!                               │    otherwise     → backlog
//!                               └─ anything else → backlog, run afterwards
//! ```
//!
//! Commands applied while a call is pending start a new turn, so the pending
//! reply is discarded as stale when it arrives.  State-changing commands never
//! overtake queued ones.  Progress is reported as
//! [`ComposerEvent`]s.

use std::collections::VecDeque;
use std::sync::{Arc, MutexGuard};

use tokio::sync::mpsc;

use crate::audio::{AudioClip, CaptureDevice};
use crate::conversation::{Context, DialogEntry, Role};
use crate::fallback::FallbackEngine;
use crate::gateway::SuggestionGateway;
use crate::speech::SpeechOutput;

use super::state::{
    lock_conversation, Activity, ComposeError, Conversation, Phase, SharedConversation, Snapshot,
    Source,
};

// ---------------------------------------------------------------------------
// Commands and events
// ---------------------------------------------------------------------------

/// A user action for [`Composer::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum ComposerCommand {
    SelectContext {
        context: Context,
        role: Option<Role>,
    },
    Begin,
    StartCapture,
    StopCapture,
    /// A clip recorded elsewhere, uploaded as partner speech.
    CaptureComplete(AudioClip),
    ChoosePreset(String),
    ChooseToken(String),
    Speak,
    Clear,
    SpeakQuick(String),
    History(Option<usize>),
    Status,
}

impl ComposerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ComposerCommand::SelectContext { .. } => "select context",
            ComposerCommand::Begin => "begin",
            ComposerCommand::StartCapture => "start capture",
            ComposerCommand::StopCapture => "stop capture",
            ComposerCommand::CaptureComplete(_) => "capture complete",
            ComposerCommand::ChoosePreset(_) => "choose preset",
            ComposerCommand::ChooseToken(_) => "choose token",
            ComposerCommand::Speak => "speak",
            ComposerCommand::Clear => "clear",
            ComposerCommand::SpeakQuick(_) => "speak quick",
            ComposerCommand::History(_) => "history",
            ComposerCommand::Status => "status",
        }
    }

    /// Commands that need no gateway call and run even while one is pending.
    pub fn interrupts(&self) -> bool {
        matches!(
            self,
            ComposerCommand::SelectContext { .. }
                | ComposerCommand::ChoosePreset(_)
                | ComposerCommand::Clear
                | ComposerCommand::SpeakQuick(_)
                | ComposerCommand::History(_)
                | ComposerCommand::Status
        )
    }

    /// Commands that leave composition state untouched and may skip the
    /// backlog.
    pub fn observes_only(&self) -> bool {
        matches!(
            self,
            ComposerCommand::SpeakQuick(_) | ComposerCommand::History(_) | ComposerCommand::Status
        )
    }
}

/// Progress reported by the composer.
#[derive(Debug, Clone, PartialEq)]
pub enum ComposerEvent {
    ContextSelected {
        context: Context,
        role: Option<Role>,
    },
    Started {
        message: String,
    },
    CaptureStarted,
    /// The partner's speech was processed (or replaced by the local error
    /// transcript when `source` is [`Source::Fallback`]).
    PartnerSpoke {
        transcript: String,
        candidates: Vec<String>,
        source: Source,
    },
    SentenceChanged {
        sentence: String,
        candidates: Vec<String>,
        source: Source,
    },
    Spoken {
        text: String,
    },
    /// The server closed the sentence; `None` when `end` failed.
    Finalized {
        final_sentence: Option<String>,
    },
    History(Vec<DialogEntry>),
    Status(Snapshot),
    Rejected {
        command: &'static str,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Drives one conversation.
pub struct Composer {
    state: SharedConversation,
    gateway: Arc<dyn SuggestionGateway>,
    fallback: Arc<FallbackEngine>,
    speech: Arc<dyn SpeechOutput>,
    capture: Arc<dyn CaptureDevice>,
    events: mpsc::UnboundedSender<ComposerEvent>,
}

impl Composer {
    pub fn new(
        state: SharedConversation,
        gateway: Arc<dyn SuggestionGateway>,
        fallback: Arc<FallbackEngine>,
        speech: Arc<dyn SpeechOutput>,
        capture: Arc<dyn CaptureDevice>,
        events: mpsc::UnboundedSender<ComposerEvent>,
    ) -> Self {
        Self {
            state,
            gateway,
            fallback,
            speech,
            capture,
            events,
        }
    }

    pub fn state(&self) -> &SharedConversation {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Process commands until the channel is closed and the backlog is empty.
    pub async fn run(self, mut commands: mpsc::Receiver<ComposerCommand>) {
        let mut backlog: VecDeque<ComposerCommand> = VecDeque::new();
        let mut open = true;

        loop {
            let command = match backlog.pop_front() {
                Some(command) => command,
                None if open => match commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
                None => break,
            };

            let pending = self.dispatch(command);
            tokio::pin!(pending);

            loop {
                tokio::select! {
                    biased;

                    () = &mut pending => break,

                    next = commands.recv(), if open => match next {
                        // state-changing commands keep their place behind queued ones
                        Some(next)
                            if next.interrupts()
                                && (backlog.is_empty() || next.observes_only()) =>
                        {
                            self.apply_now(next)
                        }
                        Some(next) => {
                            log::debug!("composer: queued {} behind pending call", next.name());
                            backlog.push_back(next);
                        }
                        None => open = false,
                    },
                }
            }
        }

        log::info!("composer: command channel closed, shutting down");
    }

    async fn dispatch(&self, command: ComposerCommand) {
        let name = command.name();
        let result = match command {
            ComposerCommand::Begin => self.begin().await.map(drop),
            ComposerCommand::StartCapture => self.start_capture(),
            ComposerCommand::StopCapture => self.stop_capture().await.map(drop),
            ComposerCommand::CaptureComplete(clip) => self.capture_complete(clip).await.map(drop),
            ComposerCommand::ChooseToken(token) => self.choose_token(&token).await.map(drop),
            ComposerCommand::Speak => self.speak().await.map(drop),
            other => {
                self.apply_now(other);
                return;
            }
        };
        self.report(name, result);
    }

    /// Run a command that makes no gateway call.
    fn apply_now(&self, command: ComposerCommand) {
        let name = command.name();
        let result = match command {
            ComposerCommand::SelectContext { context, role } => self.select_context(context, role),
            ComposerCommand::ChoosePreset(phrase) => self.choose_preset(&phrase),
            ComposerCommand::Clear => self.clear(),
            ComposerCommand::SpeakQuick(text) => {
                self.speak_quick(&text);
                Ok(())
            }
            ComposerCommand::History(limit) => {
                self.emit(ComposerEvent::History(self.history(limit)));
                Ok(())
            }
            ComposerCommand::Status => {
                self.emit(ComposerEvent::Status(self.snapshot()));
                Ok(())
            }
            other => {
                log::error!("composer: {} needs the gateway, not applied inline", other.name());
                Ok(())
            }
        };
        self.report(name, result);
    }

    fn report(&self, command: &'static str, result: Result<(), ComposeError>) {
        match result {
            Ok(()) => {}
            Err(ComposeError::Stale(stale)) => log::debug!("composer: {stale}"),
            Err(e) => {
                match &e {
                    ComposeError::Begin(_) | ComposeError::Capture(_) => {
                        log::error!("composer: {command} failed: {e}")
                    }
                    _ => log::info!("composer: {command} rejected: {e}"),
                }
                self.emit(ComposerEvent::Rejected {
                    command,
                    reason: e.to_string(),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Pick the scenario.  Clears history and abandons any recording.
    pub fn select_context(&self, context: Context, role: Option<Role>) -> Result<(), ComposeError> {
        let was_capturing = {
            let mut conv = self.lock();
            let was_capturing = conv.phase() == Phase::Active(Activity::Capturing);
            conv.select_context(context, role)?;
            was_capturing
        };
        if was_capturing {
            self.capture.cancel();
        }
        log::info!("composer: context {} selected", context.label());
        self.emit(ComposerEvent::ContextSelected { context, role });
        Ok(())
    }

    /// Open the server session.  The only failure that is surfaced as is.
    pub async fn begin(&self) -> Result<String, ComposeError> {
        let (ticket, request) = {
            let mut conv = self.lock();
            conv.stage_begin()?
        };
        let result = self.gateway.start(&request).await;
        let message = {
            let mut conv = self.lock();
            conv.finish_begin(ticket, result)?
        };
        log::info!("composer: conversation started: {message}");
        self.emit(ComposerEvent::Started {
            message: message.clone(),
        });
        Ok(message)
    }

    pub fn start_capture(&self) -> Result<(), ComposeError> {
        {
            let mut conv = self.lock();
            conv.start_capture()?;
        }
        if let Err(e) = self.capture.start() {
            self.lock().capture_failed();
            return Err(e.into());
        }
        self.emit(ComposerEvent::CaptureStarted);
        Ok(())
    }

    /// Finish the recording and process it as partner speech.
    pub async fn stop_capture(&self) -> Result<Source, ComposeError> {
        {
            let conv = self.lock();
            conv.ensure_capturing()?;
        }
        let clip = match self.capture.stop() {
            Ok(clip) => clip,
            Err(e) => {
                self.lock().capture_failed();
                return Err(e.into());
            }
        };
        log::debug!(
            "composer: captured {:.1}s ({} bytes)",
            clip.duration_secs,
            clip.len()
        );
        self.capture_complete(clip).await
    }

    /// Upload partner speech; degrades to the fallback table on failure.
    pub async fn capture_complete(&self, clip: AudioClip) -> Result<Source, ComposeError> {
        let ticket = {
            let mut conv = self.lock();
            conv.stage_voice()?
        };
        let result = self.gateway.voice(&clip).await;
        let (source, event) = {
            let mut conv = self.lock();
            let source = conv.finish_voice(ticket, result, &self.fallback)?;
            let event = ComposerEvent::PartnerSpoke {
                transcript: conv.transcript().unwrap_or_default().to_string(),
                candidates: conv.candidates().to_vec(),
                source,
            };
            (source, event)
        };
        self.emit(event);
        Ok(source)
    }

    pub fn choose_preset(&self, phrase: &str) -> Result<(), ComposeError> {
        let event = {
            let mut conv = self.lock();
            conv.choose_preset(phrase)?;
            sentence_event(&conv, Source::Local)
        };
        self.emit(event);
        Ok(())
    }

    /// Append a token; the server's sentence wins when it answers.
    pub async fn choose_token(&self, token: &str) -> Result<Source, ComposeError> {
        let (ticket, request) = {
            let mut conv = self.lock();
            conv.stage_token(token)?
        };
        let result = self.gateway.select(&request).await;
        let (source, event) = {
            let mut conv = self.lock();
            let source = conv.finish_select(ticket, &request.choice, result, &self.fallback)?;
            (source, sentence_event(&conv, source))
        };
        self.emit(event);
        Ok(source)
    }

    /// Speak and log the sentence, then close it on the server.
    ///
    /// Returns the spoken text, or `None` when the sentence was empty (in
    /// which case nothing happens at all).
    pub async fn speak(&self) -> Result<Option<String>, ComposeError> {
        let Some(text) = self.lock().utterance() else {
            log::debug!("composer: nothing to speak");
            return Ok(None);
        };

        self.speech.speak(&text);
        let ticket = {
            let mut conv = self.lock();
            conv.commit_utterance()
        };
        self.emit(ComposerEvent::Spoken { text: text.clone() });
        self.emit(ComposerEvent::SentenceChanged {
            sentence: String::new(),
            candidates: Vec::new(),
            source: Source::Local,
        });

        let Some(ticket) = ticket else {
            return Ok(Some(text));
        };
        let result = self.gateway.end().await;
        let finished = {
            let mut conv = self.lock();
            conv.finish_end(ticket, result)
        };
        match finished {
            Ok(final_sentence) => self.emit(ComposerEvent::Finalized { final_sentence }),
            Err(ComposeError::Stale(stale)) => log::debug!("composer: {stale}"),
            Err(e) => return Err(e),
        }
        Ok(Some(text))
    }

    pub fn clear(&self) -> Result<(), ComposeError> {
        let event = {
            let mut conv = self.lock();
            conv.clear()?;
            sentence_event(&conv, Source::Local)
        };
        self.emit(event);
        Ok(())
    }

    /// Say `text` without touching the conversation.  Allowed in every state.
    pub fn speak_quick(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.speech.speak(text);
        self.emit(ComposerEvent::Spoken {
            text: text.to_string(),
        });
    }

    /// The dialog log, optionally only its last `limit` entries.
    pub fn history(&self, limit: Option<usize>) -> Vec<DialogEntry> {
        let conv = self.lock();
        match limit {
            Some(n) => conv.log().recent(n).to_vec(),
            None => conv.log().entries().to_vec(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Conversation> {
        lock_conversation(&self.state)
    }

    fn emit(&self, event: ComposerEvent) {
        if self.events.send(event).is_err() {
            log::debug!("composer: event receiver dropped");
        }
    }
}

fn sentence_event(conv: &Conversation, source: Source) -> ComposerEvent {
    ComposerEvent::SentenceChanged {
        sentence: conv.sentence().text().to_string(),
        candidates: conv.candidates().to_vec(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use crate::audio::CaptureError;
    use crate::composer::state::new_shared_conversation;
    use crate::composer::LOCAL_VOICE_ERROR;
    use crate::conversation::Speaker;
    use crate::gateway::{
        EndResponse, Operation, SelectRequest, SelectResponse, StartRequest, StartResponse,
        TransportError, VoiceResponse,
    };

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Gateway that answers everything, or fails the listed operations.
    #[derive(Default)]
    struct ScriptedGateway {
        failing: Vec<Operation>,
        calls: Mutex<Vec<Operation>>,
    }

    impl ScriptedGateway {
        fn failing(ops: &[Operation]) -> Self {
            Self {
                failing: ops.to_vec(),
                ..Self::default()
            }
        }

        fn call(&self, operation: Operation) -> Result<(), TransportError> {
            self.calls.lock().unwrap().push(operation);
            if self.failing.contains(&operation) {
                Err(TransportError::Timeout { operation })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<Operation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SuggestionGateway for ScriptedGateway {
        async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError> {
            self.call(Operation::Start)?;
            Ok(StartResponse {
                message: format!("started {}", request.context),
            })
        }

        async fn voice(&self, _clip: &AudioClip) -> Result<VoiceResponse, TransportError> {
            self.call(Operation::Voice)?;
            Ok(VoiceResponse {
                transcribed_text: "주문하시겠어요?".into(),
                options: vec!["불고기".into(), "비빔밥".into()],
            })
        }

        async fn select(&self, request: &SelectRequest) -> Result<SelectResponse, TransportError> {
            self.call(Operation::Select)?;
            Ok(SelectResponse {
                current_sentence: format!("{}를", request.choice),
                options: vec!["주세요".into()],
            })
        }

        async fn end(&self) -> Result<EndResponse, TransportError> {
            self.call(Operation::End)?;
            Ok(EndResponse {
                final_sentence: "server final".into(),
            })
        }
    }

    /// Gateway whose `select` waits for the test to open a gate.
    struct GatedGateway {
        inner: ScriptedGateway,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl SuggestionGateway for GatedGateway {
        async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError> {
            self.inner.start(request).await
        }

        async fn voice(&self, clip: &AudioClip) -> Result<VoiceResponse, TransportError> {
            self.inner.voice(clip).await
        }

        async fn select(&self, request: &SelectRequest) -> Result<SelectResponse, TransportError> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.inner.select(request).await
        }

        async fn end(&self) -> Result<EndResponse, TransportError> {
            self.inner.end().await
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        spoken: Mutex<Vec<String>>,
    }

    impl RecordingSpeech {
        fn spoken(&self) -> Vec<String> {
            self.spoken.lock().unwrap().clone()
        }
    }

    impl SpeechOutput for RecordingSpeech {
        fn speak(&self, text: &str) {
            self.spoken.lock().unwrap().push(text.to_string());
        }
    }

    /// Capture device that hands out a fixed clip, or fails on start.
    #[derive(Default)]
    struct FakeCapture {
        broken: bool,
        cancelled: Mutex<usize>,
    }

    impl CaptureDevice for FakeCapture {
        fn start(&self) -> Result<(), CaptureError> {
            if self.broken {
                Err(CaptureError::NoDevice)
            } else {
                Ok(())
            }
        }

        fn stop(&self) -> Result<AudioClip, CaptureError> {
            Ok(clip())
        }

        fn cancel(&self) {
            *self.cancelled.lock().unwrap() += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn clip() -> AudioClip {
        AudioClip::new(vec![0; 64], 1.0)
    }

    struct Harness {
        composer: Composer,
        gateway: Arc<ScriptedGateway>,
        speech: Arc<RecordingSpeech>,
        capture: Arc<FakeCapture>,
        events: mpsc::UnboundedReceiver<ComposerEvent>,
    }

    fn harness_with(gateway: ScriptedGateway, capture: FakeCapture) -> Harness {
        let gateway = Arc::new(gateway);
        let speech = Arc::new(RecordingSpeech::default());
        let capture = Arc::new(capture);
        let (tx, rx) = mpsc::unbounded_channel();
        let composer = Composer::new(
            new_shared_conversation(),
            gateway.clone(),
            Arc::new(FallbackEngine::builtin()),
            speech.clone(),
            capture.clone(),
            tx,
        );
        Harness {
            composer,
            gateway,
            speech,
            capture,
            events: rx,
        }
    }

    fn harness(gateway: ScriptedGateway) -> Harness {
        harness_with(gateway, FakeCapture::default())
    }

    /// Restaurant conversation that has heard the partner.
    async fn composing(h: &Harness) {
        h.composer.select_context(Context::Restaurant, None).unwrap();
        h.composer.begin().await.unwrap();
        h.composer.capture_complete(clip()).await.unwrap();
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<ComposerEvent>) -> Vec<ComposerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    // -----------------------------------------------------------------------
    // Direct operations
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn begin_failure_is_surfaced() {
        let h = harness(ScriptedGateway::failing(&[Operation::Start]));
        h.composer.select_context(Context::Hospital, Some(Role::Patient)).unwrap();

        let err = h.composer.begin().await.unwrap_err();
        assert!(matches!(err, ComposeError::Begin(TransportError::Timeout { .. })));
        assert_eq!(h.composer.snapshot().phase, Phase::ContextSelected);
    }

    #[tokio::test]
    async fn capture_round_trip_logs_partner() {
        let h = harness(ScriptedGateway::default());
        h.composer.select_context(Context::Restaurant, None).unwrap();
        h.composer.begin().await.unwrap();
        h.composer.start_capture().unwrap();
        let source = h.composer.stop_capture().await.unwrap();

        assert_eq!(source, Source::Server);
        let snap = h.composer.snapshot();
        assert_eq!(snap.phase, Phase::Active(Activity::Composing));
        assert_eq!(snap.transcript.as_deref(), Some("주문하시겠어요?"));
        assert_eq!(snap.candidates, vec!["불고기", "비빔밥"]);
        assert_eq!(h.composer.history(None)[0].speaker, Speaker::Partner);
    }

    #[tokio::test]
    async fn broken_microphone_returns_to_waiting() {
        let h = harness_with(
            ScriptedGateway::default(),
            FakeCapture {
                broken: true,
                ..FakeCapture::default()
            },
        );
        h.composer.select_context(Context::Restaurant, None).unwrap();
        h.composer.begin().await.unwrap();

        let err = h.composer.start_capture().unwrap_err();
        assert!(matches!(err, ComposeError::Capture(CaptureError::NoDevice)));
        assert_eq!(
            h.composer.snapshot().phase,
            Phase::Active(Activity::AwaitingCapture)
        );
    }

    #[tokio::test]
    async fn voice_failure_degrades_to_context_default() {
        let h = harness(ScriptedGateway::failing(&[Operation::Voice]));
        composing(&h).await;

        let snap = h.composer.snapshot();
        assert_eq!(snap.transcript.as_deref(), Some(LOCAL_VOICE_ERROR));
        assert_eq!(snap.candidates, vec!["주세요", "랑", "을", "이", "감사합니다"]);

        let history = h.composer.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].speaker, Speaker::Partner);
        assert_eq!(history[0].text, LOCAL_VOICE_ERROR);
    }

    #[tokio::test]
    async fn chosen_token_takes_server_sentence() {
        let h = harness(ScriptedGateway::default());
        composing(&h).await;

        let source = h.composer.choose_token("불고기").await.unwrap();
        assert_eq!(source, Source::Server);
        let snap = h.composer.snapshot();
        assert_eq!(snap.sentence, "불고기를");
        assert_eq!(snap.candidates, vec!["주세요"]);
    }

    #[tokio::test]
    async fn select_timeout_in_restaurant_uses_fallback() {
        let h = harness(ScriptedGateway::failing(&[Operation::Select]));
        composing(&h).await;

        let source = h.composer.choose_token("불고기").await.unwrap();
        assert_eq!(source, Source::Fallback);
        let snap = h.composer.snapshot();
        assert_eq!(snap.sentence, "불고기");
        assert_eq!(snap.candidates, vec!["주세요", "랑", "정식을", "세트를"]);
    }

    #[tokio::test]
    async fn speak_says_logs_and_clears_even_if_end_fails() {
        let h = harness(ScriptedGateway::failing(&[Operation::End]));
        composing(&h).await;
        h.composer.choose_preset("감사합니다").unwrap();

        let spoken = h.composer.speak().await.unwrap();
        assert_eq!(spoken.as_deref(), Some("감사합니다"));
        assert_eq!(h.speech.spoken(), vec!["감사합니다"]);

        let mine: Vec<_> = h
            .composer
            .history(None)
            .into_iter()
            .filter(|e| e.speaker == Speaker::Me)
            .collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].text, "감사합니다");

        let snap = h.composer.snapshot();
        assert!(snap.sentence.is_empty());
        assert!(snap.candidates.is_empty());
        assert_eq!(snap.phase, Phase::Active(Activity::Composing));
    }

    #[tokio::test]
    async fn speak_with_empty_sentence_does_nothing() {
        let h = harness(ScriptedGateway::default());
        composing(&h).await;
        let before = h.composer.history(None).len();

        assert_eq!(h.composer.speak().await.unwrap(), None);
        assert!(h.speech.spoken().is_empty());
        assert_eq!(h.composer.history(None).len(), before);
        assert!(!h.gateway.calls().contains(&Operation::End));
    }

    #[tokio::test]
    async fn speak_quick_leaves_state_alone() {
        let h = harness(ScriptedGateway::default());
        h.composer.speak_quick("도와주세요");

        assert_eq!(h.speech.spoken(), vec!["도와주세요"]);
        assert_eq!(h.composer.snapshot().phase, Phase::Idle);
        assert!(h.composer.history(None).is_empty());
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn new_context_cancels_recording_and_history() {
        let h = harness(ScriptedGateway::default());
        composing(&h).await;
        h.composer.start_capture().unwrap();

        h.composer.select_context(Context::Classroom, None).unwrap();
        assert_eq!(*h.capture.cancelled.lock().unwrap(), 1);
        assert!(h.composer.history(None).is_empty());
    }

    #[tokio::test]
    async fn history_can_be_truncated() {
        let h = harness(ScriptedGateway::default());
        composing(&h).await;
        h.composer.choose_preset("물을 주세요").unwrap();
        h.composer.speak().await.unwrap();

        assert_eq!(h.composer.history(None).len(), 2);
        let last = h.composer.history(Some(1));
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].text, "물을 주세요");
    }

    // -----------------------------------------------------------------------
    // Command loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_processes_commands_in_order() {
        let mut h = harness(ScriptedGateway::default());
        let state = h.composer.state().clone();
        let (tx, rx) = mpsc::channel(16);

        for command in [
            ComposerCommand::SelectContext {
                context: Context::Restaurant,
                role: Some(Role::Customer),
            },
            ComposerCommand::Begin,
            ComposerCommand::StartCapture,
            ComposerCommand::StopCapture,
            ComposerCommand::ChooseToken("불고기".into()),
            ComposerCommand::Speak,
        ] {
            tx.send(command).await.unwrap();
        }
        drop(tx);
        h.composer.run(rx).await;

        let conv = lock_conversation(&state);
        assert_eq!(conv.log().len(), 2);
        assert_eq!(conv.log().last().unwrap().text, "불고기를");
        assert!(conv.sentence().is_empty());
        drop(conv);

        let events = drain(&mut h.events);
        assert!(events.contains(&ComposerEvent::Spoken {
            text: "불고기를".into()
        }));
        assert!(events.contains(&ComposerEvent::Finalized {
            final_sentence: Some("server final".into())
        }));
    }

    #[tokio::test]
    async fn run_reports_rejections() {
        let mut h = harness(ScriptedGateway::default());
        let (tx, rx) = mpsc::channel(4);
        tx.send(ComposerCommand::ChooseToken("네".into())).await.unwrap();
        drop(tx);
        h.composer.run(rx).await;

        let events = drain(&mut h.events);
        assert!(matches!(
            events.as_slice(),
            [ComposerEvent::Rejected {
                command: "choose token",
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn select_reply_after_clear_does_not_repopulate() {
        let (open_gate, gate) = oneshot::channel();
        let gateway = Arc::new(GatedGateway {
            inner: ScriptedGateway::default(),
            gate: Mutex::new(Some(gate)),
        });
        let state = new_shared_conversation();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let composer = Composer::new(
            state.clone(),
            gateway,
            Arc::new(FallbackEngine::builtin()),
            Arc::new(RecordingSpeech::default()),
            Arc::new(FakeCapture::default()),
            event_tx,
        );

        let (tx, rx) = mpsc::channel(16);
        let runner = tokio::spawn(composer.run(rx));

        tx.send(ComposerCommand::SelectContext {
            context: Context::Restaurant,
            role: None,
        })
        .await
        .unwrap();
        tx.send(ComposerCommand::Begin).await.unwrap();
        tx.send(ComposerCommand::CaptureComplete(clip())).await.unwrap();
        tx.send(ComposerCommand::ChooseToken("불고기".into()))
            .await
            .unwrap();
        tx.send(ComposerCommand::Clear).await.unwrap();

        // wait until the clear went through while select is still pending
        loop {
            match events.recv().await {
                Some(ComposerEvent::SentenceChanged {
                    source: Source::Local,
                    ..
                }) => break,
                Some(_) => continue,
                None => panic!("composer stopped early"),
            }
        }
        {
            let conv = lock_conversation(&state);
            assert!(conv.sentence().is_empty());
        }

        open_gate.send(()).unwrap();
        drop(tx);
        runner.await.unwrap();

        let conv = lock_conversation(&state);
        assert!(conv.sentence().is_empty());
        assert!(conv.candidates().is_empty());
        assert_eq!(conv.phase(), Phase::Active(Activity::Composing));
    }

    #[tokio::test]
    async fn commands_behind_pending_call_run_afterwards() {
        let (open_gate, gate) = oneshot::channel();
        let gateway = Arc::new(GatedGateway {
            inner: ScriptedGateway::default(),
            gate: Mutex::new(Some(gate)),
        });
        let state = new_shared_conversation();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let composer = Composer::new(
            state.clone(),
            gateway,
            Arc::new(FallbackEngine::builtin()),
            Arc::new(RecordingSpeech::default()),
            Arc::new(FakeCapture::default()),
            event_tx,
        );

        let (tx, rx) = mpsc::channel(16);
        let runner = tokio::spawn(composer.run(rx));

        tx.send(ComposerCommand::SelectContext {
            context: Context::Restaurant,
            role: None,
        })
        .await
        .unwrap();
        tx.send(ComposerCommand::Begin).await.unwrap();
        tx.send(ComposerCommand::CaptureComplete(clip())).await.unwrap();
        tx.send(ComposerCommand::ChooseToken("저는".into()))
            .await
            .unwrap();
        // queued: must not be rejected as "select in flight"
        tx.send(ComposerCommand::ChooseToken("불고기".into()))
            .await
            .unwrap();
        tx.send(ComposerCommand::Status).await.unwrap();

        loop {
            match events.recv().await {
                Some(ComposerEvent::Status(_)) => break,
                Some(_) => continue,
                None => panic!("composer stopped early"),
            }
        }
        open_gate.send(()).unwrap();
        drop(tx);
        runner.await.unwrap();

        let conv = lock_conversation(&state);
        assert_eq!(conv.sentence().text(), "불고기를");
        drop(conv);
        let rejected = std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e, ComposerEvent::Rejected { .. }));
        assert!(!rejected);
    }

    #[tokio::test]
    async fn preset_behind_queued_token_keeps_its_place() {
        let (open_gate, gate) = oneshot::channel();
        let gateway = Arc::new(GatedGateway {
            inner: ScriptedGateway::default(),
            gate: Mutex::new(Some(gate)),
        });
        let state = new_shared_conversation();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let composer = Composer::new(
            state.clone(),
            gateway,
            Arc::new(FallbackEngine::builtin()),
            Arc::new(RecordingSpeech::default()),
            Arc::new(FakeCapture::default()),
            event_tx,
        );

        let (tx, rx) = mpsc::channel(16);
        let runner = tokio::spawn(composer.run(rx));

        for command in [
            ComposerCommand::SelectContext {
                context: Context::Restaurant,
                role: None,
            },
            ComposerCommand::Begin,
            ComposerCommand::CaptureComplete(clip()),
            ComposerCommand::ChooseToken("저는".into()),
            ComposerCommand::ChooseToken("불고기".into()),
            ComposerCommand::ChoosePreset("계산서 주세요".into()),
            ComposerCommand::Status,
        ] {
            tx.send(command).await.unwrap();
        }

        // status skips the backlog; the preset must not
        loop {
            match events.recv().await {
                Some(ComposerEvent::Status(snapshot)) => {
                    assert_eq!(snapshot.sentence, "저는");
                    break;
                }
                Some(_) => continue,
                None => panic!("composer stopped early"),
            }
        }
        open_gate.send(()).unwrap();
        drop(tx);
        runner.await.unwrap();

        let conv = lock_conversation(&state);
        assert_eq!(conv.sentence().text(), "계산서 주세요");
        assert!(conv.candidates().is_empty());
        assert_eq!(conv.phase(), Phase::Active(Activity::Composing));
    }

    #[tokio::test]
    async fn clear_behind_queued_speak_runs_after_it() {
        let (open_gate, gate) = oneshot::channel();
        let gateway = Arc::new(GatedGateway {
            inner: ScriptedGateway::default(),
            gate: Mutex::new(Some(gate)),
        });
        let state = new_shared_conversation();
        let speech = Arc::new(RecordingSpeech::default());
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let composer = Composer::new(
            state.clone(),
            gateway,
            Arc::new(FallbackEngine::builtin()),
            speech.clone(),
            Arc::new(FakeCapture::default()),
            event_tx,
        );

        let (tx, rx) = mpsc::channel(16);
        let runner = tokio::spawn(composer.run(rx));

        for command in [
            ComposerCommand::SelectContext {
                context: Context::Restaurant,
                role: None,
            },
            ComposerCommand::Begin,
            ComposerCommand::CaptureComplete(clip()),
            ComposerCommand::ChooseToken("불고기".into()),
            ComposerCommand::Speak,
            ComposerCommand::Clear,
            ComposerCommand::Status,
        ] {
            tx.send(command).await.unwrap();
        }

        loop {
            match events.recv().await {
                Some(ComposerEvent::Status(_)) => break,
                Some(_) => continue,
                None => panic!("composer stopped early"),
            }
        }
        open_gate.send(()).unwrap();
        drop(tx);
        runner.await.unwrap();

        assert_eq!(speech.spoken(), vec!["불고기를".to_string()]);
        let conv = lock_conversation(&state);
        assert_eq!(conv.log().last().unwrap().text, "불고기를");
        assert!(conv.sentence().is_empty());
    }
}
