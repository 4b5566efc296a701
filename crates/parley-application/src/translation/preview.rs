//! Debounced live preview of the composer text.
//!
//! Each keystroke calls [`LivePreview::update`]; only the input that stays
//! unchanged for the debounce interval is resolved. The latest result is
//! published on a watch channel and reused by `send` when the text matches.

use super::adapter::{EnrichRequest, OutgoingViews, TranslationAdapter};
use parley_core::language::LanguageCode;
use parley_core::translation::EnrichMode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEntry {
    /// Trimmed composer text this preview was computed for
    pub input: String,
    pub views: OutgoingViews,
}

#[derive(Clone)]
pub struct LivePreview {
    inner: Arc<PreviewInner>,
}

struct PreviewInner {
    adapter: Arc<TranslationAdapter>,
    debounce: Duration,
    sender_lang: LanguageCode,
    receiver_lang: LanguageCode,
    mode: EnrichMode,
    generation: AtomicU64,
    latest: watch::Sender<Option<PreviewEntry>>,
    cancel: CancellationToken,
}

impl LivePreview {
    pub fn new(
        adapter: Arc<TranslationAdapter>,
        debounce: Duration,
        sender_lang: LanguageCode,
        receiver_lang: LanguageCode,
        mode: EnrichMode,
        cancel: CancellationToken,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            inner: Arc::new(PreviewInner {
                adapter,
                debounce,
                sender_lang,
                receiver_lang,
                mode,
                generation: AtomicU64::new(0),
                latest,
                cancel,
            }),
        }
    }

    /// Schedules a preview for `input`, superseding any pending one.
    pub fn update(&self, input: &str) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let input = input.trim().to_string();
        if input.is_empty() || self.inner.cancel.is_cancelled() {
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = tokio::time::sleep(inner.debounce) => {}
            }
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            let request = EnrichRequest {
                text: input.clone(),
                sender_lang: inner.sender_lang.clone(),
                receiver_lang: inner.receiver_lang.clone(),
                mode: inner.mode,
                known_anchor: None,
            };
            let views = tokio::select! {
                _ = inner.cancel.cancelled() => return,
                views = inner.adapter.resolve_outgoing(request) => views,
            };

            // A newer keystroke arrived while the gateway was working.
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            tracing::trace!("[Translation] Preview ready for {} chars", input.chars().count());
            inner.latest.send_replace(Some(PreviewEntry { input, views }));
        });
    }

    /// The ready preview for `input`, if the latest one matches it.
    pub fn cached(&self, input: &str) -> Option<PreviewEntry> {
        let input = input.trim();
        self.inner
            .latest
            .borrow()
            .as_ref()
            .filter(|entry| entry.input == input)
            .cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PreviewEntry>> {
        self.inner.latest.subscribe()
    }

    /// Drops the current preview and any pending one.
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.latest.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::error::Result;
    use parley_core::translation::{Translation, TranslationGateway, TranslationRequest};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingGateway {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TranslationGateway for CountingGateway {
        async fn translate(&self, request: TranslationRequest) -> Result<Translation> {
            self.texts.lock().unwrap().push(request.text.clone());
            Ok(Translation {
                text: format!("{}:{}", request.target, request.text),
                confidence: 0.8,
                was_translated: true,
            })
        }
    }

    fn preview(gateway: Arc<CountingGateway>, cancel: CancellationToken) -> LivePreview {
        LivePreview::new(
            Arc::new(TranslationAdapter::new(gateway)),
            Duration::from_millis(250),
            "es".into(),
            "hi".into(),
            EnrichMode::NativeFirst,
            cancel,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_settled_input_is_translated() {
        let gateway = Arc::new(CountingGateway::default());
        let preview = preview(gateway.clone(), CancellationToken::new());

        preview.update("h");
        tokio::time::sleep(Duration::from_millis(100)).await;
        preview.update("ho");
        tokio::time::sleep(Duration::from_millis(100)).await;
        preview.update("hola");
        tokio::time::sleep(Duration::from_millis(400)).await;

        let texts = gateway.texts.lock().unwrap().clone();
        assert!(texts.iter().all(|t| t == "hola"), "got {:?}", texts);
        assert_eq!(texts.len(), 2);
        assert!(preview.cached("hola ").is_some());
        assert!(preview.cached("ho").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_preview_publishes_nothing() {
        let gateway = Arc::new(CountingGateway::default());
        let cancel = CancellationToken::new();
        let preview = preview(gateway.clone(), cancel.clone());

        preview.update("hola");
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(gateway.texts.lock().unwrap().is_empty());
        assert!(preview.cached("hola").is_none());
    }
}
