//! Translation gateway contract.
//!
//! The gateway is a black box: it may be slow, fail, or return garbage.
//! The application layer wraps it in an adapter that never lets those
//! failures reach the send/receive paths.

use crate::error::Result;
use crate::language::LanguageCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// How receiver-facing text is derived.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrichMode {
    /// Receiver always sees their mother tongue; English is a secondary hint.
    #[default]
    NativeFirst,
    /// The anchor is already English; only translate around it.
    EnglishAnchored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source: LanguageCode,
    pub target: LanguageCode,
    pub mode: EnrichMode,
}

/// What the gateway answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub text: String,
    pub confidence: f32,
    pub was_translated: bool,
}

impl Translation {
    /// The input returned as-is.
    pub fn unchanged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: 1.0,
            was_translated: false,
        }
    }

    /// A usable answer: non-blank text and a confidence within `[0, 1]`.
    pub fn is_usable(&self) -> bool {
        !self.text.trim().is_empty() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Every view of one message the pipeline can show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichResult {
    pub sender_view: String,
    pub receiver_view: String,
    pub english_core: Option<String>,
    pub confidence: f32,
    pub was_translated: bool,
}

impl EnrichResult {
    /// All views equal to the input; nothing was translated.
    pub fn passthrough(text: &str, english_core: Option<String>) -> Self {
        Self {
            sender_view: text.to_string(),
            receiver_view: text.to_string(),
            english_core,
            confidence: 1.0,
            was_translated: false,
        }
    }
}

/// The external translation/transliteration engine.
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    async fn translate(&self, request: TranslationRequest) -> Result<Translation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_translations_are_not_usable() {
        let blank = Translation {
            text: "   ".to_string(),
            confidence: 0.9,
            was_translated: true,
        };
        let nan = Translation {
            text: "hola".to_string(),
            confidence: f32::NAN,
            was_translated: true,
        };
        let over = Translation {
            text: "hola".to_string(),
            confidence: 1.5,
            was_translated: true,
        };
        assert!(!blank.is_usable());
        assert!(!nan.is_usable());
        assert!(!over.is_usable());
        assert!(Translation::unchanged("hola").is_usable());
    }

    #[test]
    fn test_mode_parses_from_config_string() {
        assert_eq!(
            "english_anchored".parse::<EnrichMode>().unwrap(),
            EnrichMode::EnglishAnchored
        );
        assert_eq!(EnrichMode::default().as_ref(), "native_first");
    }
}
