//! Ready-made sentences.
//!
//! Preset sentences are complete utterances offered next to the incremental
//! candidates; choosing one replaces the sentence being composed.  Quick
//! phrases are spoken immediately, even before a conversation starts.

use super::context::Context;

/// Phrases available in any context that has no dedicated list.
pub const COMMON_PHRASES: &[&str] = &["감사합니다", "네", "아니오", "죄송합니다"];

/// Phrases that can be spoken at any time without composing.
pub const QUICK_PHRASES: &[&str] = &[
    "안녕하세요",
    "도와주세요",
    "감사합니다",
    "네",
    "아니오",
    "죄송합니다",
];

/// Preset sentences for `context`, or [`COMMON_PHRASES`] when the context has
/// none (or no context is selected yet).
pub fn preset_sentences(context: Option<Context>) -> &'static [&'static str] {
    match context {
        Some(Context::Restaurant) => &[
            "물을 주세요",
            "메뉴를 볼 수 있을까요?",
            "계산서 주세요",
            "추천 메뉴가 있나요?",
            "이거 주문할게요",
        ],
        Some(Context::Hospital) => &[
            "예약이 있습니다",
            "통증이 있어요",
            "약을 받고 싶습니다",
            "진료가 필요합니다",
            "의사를 만나고 싶어요",
        ],
        Some(Context::Classroom) => &[
            "질문이 있습니다",
            "이해가 안 됩니다",
            "도움이 필요해요",
            "다시 설명해 주세요",
            "확인하고 싶습니다",
        ],
        _ => COMMON_PHRASES,
    }
}
