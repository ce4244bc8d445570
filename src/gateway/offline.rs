//! In-process stand-in for the suggestion service.
//!
//! [`OfflineGateway`] never touches the network.  It answers `voice` with a
//! canned partner prompt for the session's context and builds the sentence
//! itself on `select`, drawing next candidates from the [`FallbackEngine`].
//! Useful for demos and for exercising the composer without a server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::error::TransportError;
use super::wire::{
    EndResponse, SelectRequest, SelectResponse, StartRequest, StartResponse, VoiceResponse,
};
use super::SuggestionGateway;
use crate::audio::AudioClip;
use crate::fallback::FallbackEngine;

#[derive(Debug, Default)]
struct OfflineSession {
    context: Option<String>,
    tokens: Vec<String>,
}

/// Simulated suggestion service.
pub struct OfflineGateway {
    fallback: Arc<FallbackEngine>,
    session: Mutex<OfflineSession>,
}

impl OfflineGateway {
    pub fn new(fallback: Arc<FallbackEngine>) -> Self {
        Self {
            fallback,
            session: Mutex::new(OfflineSession::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OfflineSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Canned partner prompt and first candidates for a context.
fn opening(context: Option<&str>) -> (&'static str, &'static [&'static str]) {
    match context {
        Some("restaurant") => (
            "뭘 주문하시겠어요?",
            &["저는", "불고기", "비빔밥", "메뉴", "주문할게요"],
        ),
        Some("hospital") => (
            "어디가 불편하세요?",
            &["머리가", "배가", "다리가", "아파요", "불편해요"],
        ),
        Some("classroom") => (
            "질문 있으신가요?",
            &["이해가", "질문이", "예제를", "설명을", "있습니다"],
        ),
        _ => (
            "무엇을 도와드릴까요?",
            &["도움이", "안녕하세요", "감사합니다", "필요해요", "죄송합니다"],
        ),
    }
}

#[async_trait]
impl SuggestionGateway for OfflineGateway {
    async fn start(&self, request: &StartRequest) -> Result<StartResponse, TransportError> {
        let mut session = self.lock();
        session.context = Some(request.context.clone());
        session.tokens.clear();
        Ok(StartResponse {
            message: format!("offline session started ({})", request.context),
        })
    }

    async fn voice(&self, clip: &AudioClip) -> Result<VoiceResponse, TransportError> {
        let session = self.lock();
        log::debug!(
            "offline gateway: ignoring {} bytes of audio ({:.1}s)",
            clip.len(),
            clip.duration_secs
        );
        let (prompt, candidates) = opening(session.context.as_deref());
        Ok(VoiceResponse {
            transcribed_text: prompt.to_string(),
            options: candidates.iter().map(|s| s.to_string()).collect(),
        })
    }

    async fn select(&self, request: &SelectRequest) -> Result<SelectResponse, TransportError> {
        let mut session = self.lock();
        session.tokens.push(request.choice.clone());
        let context = session.context.clone().unwrap_or_default();
        Ok(SelectResponse {
            current_sentence: session.tokens.join(" "),
            options: self.fallback.suggest(&context, Some(&request.choice)),
        })
    }

    async fn end(&self) -> Result<EndResponse, TransportError> {
        let mut session = self.lock();
        let final_sentence = session.tokens.join(" ");
        session.tokens.clear();
        Ok(EndResponse { final_sentence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> OfflineGateway {
        OfflineGateway::new(Arc::new(FallbackEngine::builtin()))
    }

    fn start_request(context: &str) -> StartRequest {
        StartRequest {
            context: context.into(),
            role: None,
        }
    }

    fn select(choice: &str) -> SelectRequest {
        SelectRequest {
            choice: choice.into(),
        }
    }

    #[tokio::test]
    async fn voice_answers_with_context_prompt() {
        let gw = gateway();
        gw.start(&start_request("hospital")).await.unwrap();
        let voice = gw.voice(&AudioClip::new(vec![0; 8], 1.0)).await.unwrap();
        assert_eq!(voice.transcribed_text, "어디가 불편하세요?");
        assert_eq!(voice.options[0], "머리가");
    }

    #[tokio::test]
    async fn unknown_context_gets_generic_prompt() {
        let gw = gateway();
        gw.start(&start_request("bank")).await.unwrap();
        let voice = gw.voice(&AudioClip::new(vec![], 0.5)).await.unwrap();
        assert_eq!(voice.transcribed_text, "무엇을 도와드릴까요?");
    }

    #[tokio::test]
    async fn select_builds_sentence_and_end_resets_it() {
        let gw = gateway();
        gw.start(&start_request("restaurant")).await.unwrap();

        let first = gw.select(&select("불고기")).await.unwrap();
        assert_eq!(first.current_sentence, "불고기");
        assert_eq!(first.options, vec!["주세요", "랑", "정식을", "세트를"]);

        let second = gw.select(&select("주세요")).await.unwrap();
        assert_eq!(second.current_sentence, "불고기 주세요");

        let end = gw.end().await.unwrap();
        assert_eq!(end.final_sentence, "불고기 주세요");
        assert_eq!(gw.end().await.unwrap().final_sentence, "");
    }

    #[tokio::test]
    async fn start_resets_previous_sentence() {
        let gw = gateway();
        gw.start(&start_request("restaurant")).await.unwrap();
        gw.select(&select("메뉴")).await.unwrap();
        gw.start(&start_request("classroom")).await.unwrap();
        let next = gw.select(&select("질문이")).await.unwrap();
        assert_eq!(next.current_sentence, "질문이");
    }
}
