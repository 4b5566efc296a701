//! A translation gateway that does not translate.
//!
//! Marks text with the target language (`"[hi] hello"`) so views are
//! distinguishable in simulations. Anchor requests (target `en`) return the
//! text unchanged.

use async_trait::async_trait;
use parley_core::error::Result;
use parley_core::translation::{Translation, TranslationGateway, TranslationRequest};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct PassthroughGateway {
    calls: AtomicUsize,
}

impl PassthroughGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationGateway for PassthroughGateway {
    async fn translate(&self, request: TranslationRequest) -> Result<Translation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.target.is_anchor() || request.source.matches(&request.target) {
            return Ok(Translation::unchanged(request.text));
        }
        Ok(Translation {
            text: format!("[{}] {}", request.target, request.text.trim()),
            confidence: 0.5,
            was_translated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::translation::EnrichMode;

    #[tokio::test]
    async fn test_marks_target_language() {
        let gateway = PassthroughGateway::new();
        let out = gateway
            .translate(TranslationRequest {
                text: "hello ".to_string(),
                source: "en".into(),
                target: "hi-IN".into(),
                mode: EnrichMode::NativeFirst,
            })
            .await
            .unwrap();
        assert_eq!(out.text, "[hi] hello");
        assert!(out.was_translated);
        assert_eq!(gateway.calls(), 1);
    }
}
