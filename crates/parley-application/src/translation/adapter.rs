//! Translation adapter.
//!
//! Wraps a [`TranslationGateway`] and turns a single outgoing or incoming
//! text into the three views the engine stores: the sender's view, the
//! receiver's view and the English anchor. The adapter never fails; every
//! gateway problem degrades to a previously known value or the raw text.

use super::script::typed_in_native_script;
use parley_core::language::LanguageCode;
use parley_core::translation::{
    EnrichMode, EnrichResult, Translation, TranslationGateway, TranslationRequest,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichRequest {
    pub text: String,
    pub sender_lang: LanguageCode,
    pub receiver_lang: LanguageCode,
    pub mode: EnrichMode,
    /// English rendering already known for this text (from a preview or
    /// attached server-side)
    pub known_anchor: Option<String>,
}

/// Ways of obtaining the English anchor, tried in [`AnchorStrategy::ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorStrategy {
    /// The caller already knows it
    Known,
    /// The text is English already
    SameLanguage,
    /// Ask the gateway
    Gateway,
    /// Give up and carry the raw text
    RawText,
}

impl AnchorStrategy {
    pub const ORDER: [AnchorStrategy; 4] = [
        AnchorStrategy::Known,
        AnchorStrategy::SameLanguage,
        AnchorStrategy::Gateway,
        AnchorStrategy::RawText,
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub text: String,
    pub strategy: AnchorStrategy,
    pub confidence: f32,
}

impl Anchor {
    fn raw(text: &str) -> Self {
        Self {
            text: text.to_string(),
            strategy: AnchorStrategy::RawText,
            confidence: 0.0,
        }
    }

    /// Whether the anchor is real English rather than the raw-text fallback.
    pub fn is_english(&self) -> bool {
        self.strategy != AnchorStrategy::RawText
    }
}

/// Everything resolved for an outgoing message before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingViews {
    /// Authoritative text, transliterated into the sender's script if needed
    pub stored_text: String,
    pub enrich: EnrichResult,
}

pub struct TranslationAdapter {
    gateway: Arc<dyn TranslationGateway>,
}

impl TranslationAdapter {
    pub fn new(gateway: Arc<dyn TranslationGateway>) -> Self {
        Self { gateway }
    }

    /// Produces all views of `request.text`.
    ///
    /// When both sides share a language no gateway call is made.
    pub async fn enrich(&self, request: EnrichRequest) -> EnrichResult {
        let text = request.text.trim();
        if request.sender_lang.matches(&request.receiver_lang) {
            let anchor = request
                .known_anchor
                .clone()
                .or_else(|| request.sender_lang.is_anchor().then(|| text.to_string()));
            return EnrichResult::passthrough(text, anchor);
        }

        let anchor = self.resolve_anchor(&request).await;
        let (receiver_view, confidence, was_translated) =
            self.receiver_view(&request, &anchor).await;

        EnrichResult {
            sender_view: text.to_string(),
            receiver_view,
            english_core: anchor.is_english().then(|| anchor.text.clone()),
            confidence,
            was_translated,
        }
    }

    /// Resolves the stored text and all views of an outgoing message.
    ///
    /// Input typed in Latin letters for a language with its own script is
    /// transliterated first; the transliteration becomes the stored text.
    pub async fn resolve_outgoing(&self, request: EnrichRequest) -> OutgoingViews {
        let typed = request.text.trim();
        let stored_text = if request.mode == EnrichMode::EnglishAnchored
            || typed_in_native_script(typed, &request.sender_lang)
        {
            typed.to_string()
        } else {
            self.transliterate(typed, &request.sender_lang, request.mode)
                .await
                .unwrap_or_else(|| typed.to_string())
        };

        let mut enrich = self
            .enrich(EnrichRequest {
                text: stored_text.clone(),
                ..request
            })
            .await;
        enrich.sender_view = stored_text.clone();
        OutgoingViews {
            stored_text,
            enrich,
        }
    }

    /// Runs the anchor strategies in order and returns the first that yields.
    pub async fn resolve_anchor(&self, request: &EnrichRequest) -> Anchor {
        for strategy in AnchorStrategy::ORDER {
            if let Some(anchor) = self.try_anchor(strategy, request).await {
                return anchor;
            }
        }
        Anchor::raw(request.text.trim())
    }

    async fn try_anchor(&self, strategy: AnchorStrategy, request: &EnrichRequest) -> Option<Anchor> {
        let text = request.text.trim();
        match strategy {
            AnchorStrategy::Known => request
                .known_anchor
                .as_deref()
                .map(str::trim)
                .filter(|anchor| !anchor.is_empty())
                .map(|anchor| Anchor {
                    text: anchor.to_string(),
                    strategy,
                    confidence: 1.0,
                }),
            AnchorStrategy::SameLanguage => (request.sender_lang.is_anchor()
                || request.mode == EnrichMode::EnglishAnchored)
                .then(|| Anchor {
                    text: text.to_string(),
                    strategy,
                    confidence: 1.0,
                }),
            AnchorStrategy::Gateway => self
                .call(text, &request.sender_lang, &LanguageCode::anchor(), request.mode)
                .await
                .map(|translation| Anchor {
                    text: translation.text.trim().to_string(),
                    strategy,
                    confidence: translation.confidence,
                }),
            AnchorStrategy::RawText => Some(Anchor::raw(text)),
        }
    }

    async fn receiver_view(&self, request: &EnrichRequest, anchor: &Anchor) -> (String, f32, bool) {
        if request.receiver_lang.is_anchor() && anchor.is_english() {
            let translated = anchor.strategy == AnchorStrategy::Gateway;
            return (anchor.text.clone(), anchor.confidence, translated);
        }

        let (source_text, source_lang, source_confidence) =
            if request.mode == EnrichMode::EnglishAnchored && anchor.is_english() {
                (anchor.text.as_str(), LanguageCode::anchor(), anchor.confidence)
            } else {
                (request.text.trim(), request.sender_lang.clone(), 1.0)
            };

        match self
            .call(source_text, &source_lang, &request.receiver_lang, request.mode)
            .await
        {
            Some(translation) => (
                translation.text.trim().to_string(),
                translation.confidence.min(source_confidence),
                translation.was_translated,
            ),
            None => {
                // Last known good: the English anchor reads better than a
                // language the receiver may not know.
                let fallback = if anchor.is_english() {
                    anchor.text.clone()
                } else {
                    request.text.trim().to_string()
                };
                (fallback, 0.0, false)
            }
        }
    }

    async fn transliterate(&self, text: &str, lang: &LanguageCode, mode: EnrichMode) -> Option<String> {
        self.call(text, lang, lang, mode)
            .await
            .map(|translation| translation.text.trim().to_string())
    }

    /// One gateway call. Errors and garbage both come back as `None`.
    async fn call(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
        mode: EnrichMode,
    ) -> Option<Translation> {
        let request = TranslationRequest {
            text: text.to_string(),
            source: source.clone(),
            target: target.clone(),
            mode,
        };
        match self.gateway.translate(request).await {
            Ok(translation) if translation.is_usable() => Some(translation),
            Ok(translation) => {
                tracing::warn!(
                    "[Translation] Discarding unusable result {} -> {} (confidence {})",
                    source,
                    target,
                    translation.confidence
                );
                None
            }
            Err(e) => {
                tracing::warn!("[Translation] Gateway call {} -> {} failed: {}", source, target, e);
                None
            }
        }
    }
}
