//! Per-conversation message pipeline.
//!
//! Owns the ordered message list of one conversation. Outgoing messages are
//! shown immediately as placeholders and reconciled with their persisted
//! echo; incoming messages are deduplicated and enriched in the background.
//! Every observed insert is reported to billing as activity.

use super::policy::ContentPolicy;
use crate::billing::ActivitySink;
use crate::context::ConversationContext;
use crate::translation::script::typed_in_native_script;
use crate::translation::{EnrichRequest, LivePreview, TranslationAdapter};
use chrono::Utc;
use parley_core::config::EngineConfig;
use parley_core::error::{ParleyError, Result};
use parley_core::feed::{FeedEvent, FeedOp, FeedRecord};
use parley_core::message::{Message, MessageId, MessageRecord, MessageStore, NewMessage};
use parley_core::translation::EnrichMode;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct PipelineState {
    messages: Vec<Message>,
    /// Placeholder id -> persistence progress
    pending: HashMap<String, PendingSend>,
    /// Server ids already applied
    seen: HashSet<String>,
}

/// Persistence progress of one placeholder.
#[derive(Debug, Clone, Default)]
struct PendingSend {
    /// Set once the store confirmed the insert; the reconcile window runs
    /// from here.
    persisted_at: Option<Instant>,
    server_id: Option<String>,
}

impl PendingSend {
    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        self.persisted_at
            .is_some_and(|at| now.saturating_duration_since(at) > window)
    }
}

/// Background translation of a partner message.
struct EnrichmentJob {
    id: String,
    text: String,
    known_anchor: Option<String>,
}

fn anchor_of(record: &MessageRecord) -> Option<&str> {
    record
        .english_core
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
}

impl PipelineState {
    fn placeholders(&self) -> impl Iterator<Item = (usize, &PendingSend)> {
        self.messages.iter().enumerate().filter_map(|(i, m)| {
            if !m.id.is_placeholder() {
                return None;
            }
            self.pending.get(m.id.as_str()).map(|p| (i, p))
        })
    }

    fn content_matches(&self, index: usize, record: &MessageRecord) -> bool {
        let message = &self.messages[index];
        match anchor_of(record) {
            Some(anchor) if message.english_core.as_deref().map(str::trim) == Some(anchor) => true,
            _ => message.primary_text() == record.raw_text.trim(),
        }
    }

    /// Placeholder for an own echo: the one persisted under the echo's id,
    /// else the oldest eligible one by anchor, then by trimmed text.
    /// Placeholders still being persisted are always eligible.
    fn find_placeholder(&self, record: &MessageRecord, now: Instant, window: Duration) -> Option<usize> {
        if let Some((index, _)) = self
            .placeholders()
            .find(|(_, p)| p.server_id.as_deref() == Some(record.id.as_str()))
        {
            return Some(index);
        }

        let candidates: Vec<usize> = self
            .placeholders()
            .filter(|(_, p)| !p.is_expired(now, window))
            .map(|(i, _)| i)
            .collect();

        let by_anchor = anchor_of(record).and_then(|anchor| {
            candidates.iter().copied().find(|&i| {
                self.messages[i].english_core.as_deref().map(str::trim) == Some(anchor)
            })
        });

        by_anchor.or_else(|| {
            let text = record.raw_text.trim();
            candidates
                .iter()
                .copied()
                .find(|&i| self.messages[i].primary_text() == text)
        })
    }

    fn reconcile_own(&mut self, record: MessageRecord, now: Instant, window: Duration) {
        let Some(index) = self.find_placeholder(&record, now, window) else {
            // Sent from another device, or the placeholder expired. An
            // expired placeholder with the same content must not linger
            // next to the server copy.
            let expired: Vec<MessageId> = self
                .placeholders()
                .filter(|(i, p)| p.is_expired(now, window) && self.content_matches(*i, &record))
                .map(|(i, _)| self.messages[i].id.clone())
                .collect();
            for id in &expired {
                tracing::debug!("[Pipeline] Dropping expired placeholder {}", id);
                self.pending.remove(id.as_str());
            }
            self.messages.retain(|m| !expired.contains(&m.id));
            self.messages.push(from_record(record, None, false));
            return;
        };

        let message = &mut self.messages[index];
        self.pending.remove(message.id.as_str());
        tracing::debug!("[Pipeline] Reconciled {} with {}", message.id, record.id);
        message.id = MessageId::Server(record.id);
        message.sender_view = record.raw_text.clone();
        message.raw_text = record.raw_text;
        message.english_core = record.english_core.or(message.english_core.take());
        message.receiver_view = record.receiver_view.or(message.receiver_view.take());
        message.is_enriching = false;
        message.created_at = record.created_at;
    }

    /// Records the store's confirmation for `placeholder`. Returns true if
    /// the echo already arrived without matching, in which case the
    /// placeholder is dropped.
    fn confirm(&mut self, placeholder: &MessageId, server_id: &str, now: Instant) -> bool {
        if self.seen.contains(server_id) {
            let present = self.pending.remove(placeholder.as_str()).is_some();
            self.messages.retain(|m| &m.id != placeholder);
            return present;
        }
        if let Some(pending) = self.pending.get_mut(placeholder.as_str()) {
            pending.persisted_at = Some(now);
            pending.server_id = Some(server_id.to_string());
        }
        false
    }

    fn append_partner(&mut self, record: MessageRecord, same_language: bool) -> Option<EnrichmentJob> {
        let needs_enrichment = record.receiver_view.is_none() && !same_language;
        let job = needs_enrichment.then(|| EnrichmentJob {
            id: record.id.clone(),
            text: record.raw_text.clone(),
            known_anchor: record.english_core.clone(),
        });
        let receiver_view = record
            .receiver_view
            .clone()
            .or_else(|| same_language.then(|| record.raw_text.clone()));
        self.messages
            .push(from_record(record, receiver_view, needs_enrichment));
        job
    }
}

fn from_record(record: MessageRecord, receiver_view: Option<String>, is_enriching: bool) -> Message {
    Message {
        id: MessageId::Server(record.id),
        sender_id: record.sender_id,
        sender_view: record.raw_text.clone(),
        raw_text: record.raw_text,
        english_core: record.english_core,
        receiver_view: receiver_view.or(record.receiver_view),
        is_enriching,
        created_at: record.created_at,
    }
}

struct PipelineInner {
    context: ConversationContext,
    mode: EnrichMode,
    reconcile_window: Duration,
    policy: ContentPolicy,
    adapter: Arc<TranslationAdapter>,
    store: Arc<dyn MessageStore>,
    activity: Arc<dyn ActivitySink>,
    preview: LivePreview,
    state: Mutex<PipelineState>,
    revision: watch::Sender<u64>,
    cancel: CancellationToken,
}

impl PipelineInner {
    fn state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Applies `apply` to the message with `id`. Returns false if the
    /// message is gone or the pipeline is closed.
    fn patch(&self, id: &MessageId, apply: impl FnOnce(&mut Message)) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        {
            let mut state = self.state();
            let Some(message) = state.messages.iter_mut().find(|m| &m.id == id) else {
                return false;
            };
            apply(message);
        }
        self.notify();
        true
    }

    fn remove_placeholder(&self, id: &MessageId) {
        {
            let mut state = self.state();
            state.messages.retain(|m| &m.id != id);
            state.pending.remove(id.as_str());
        }
        self.notify();
    }

    fn closed_error(&self) -> ParleyError {
        ParleyError::PartnerUnavailable {
            session_id: self.context.session_id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MessagePipeline {
    inner: Arc<PipelineInner>,
}

impl MessagePipeline {
    pub fn new(
        context: ConversationContext,
        config: &EngineConfig,
        adapter: Arc<TranslationAdapter>,
        store: Arc<dyn MessageStore>,
        activity: Arc<dyn ActivitySink>,
        cancel: CancellationToken,
    ) -> Self {
        let mode = config.translation.mode;
        let preview = LivePreview::new(
            adapter.clone(),
            config.translation.preview_debounce(),
            context.user_lang.clone(),
            context.partner_lang.clone(),
            mode,
            cancel.clone(),
        );
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(PipelineInner {
                context,
                mode,
                reconcile_window: config.messages.reconcile_window(),
                policy: ContentPolicy::new(config.messages.max_message_chars),
                adapter,
                store,
                activity,
                preview,
                state: Mutex::new(PipelineState::default()),
                revision,
                cancel,
            }),
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.inner.context
    }

    /// Snapshot of the ordered message list.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state().messages.clone()
    }

    /// Bumped on every change to the message list.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn preview(&self) -> &LivePreview {
        &self.inner.preview
    }

    /// Sends `input` to the partner.
    ///
    /// The message appears locally as a placeholder before anything is
    /// persisted. On a persistence failure the placeholder is removed and
    /// the returned error carries `input` so the composer can restore it.
    pub async fn send(&self, input: &str) -> Result<MessageId> {
        let inner = &self.inner;
        let ctx = &inner.context;
        if inner.cancel.is_cancelled() {
            return Err(inner.closed_error());
        }
        let text = inner.policy.validate(input)?.to_string();

        let preview = inner.preview.cached(&text).map(|entry| entry.views.enrich);
        let needs_resolution =
            !ctx.same_language() || !typed_in_native_script(&text, &ctx.user_lang);
        let placeholder = MessageId::placeholder();
        {
            let mut state = inner.state();
            state.messages.push(Message {
                id: placeholder.clone(),
                sender_id: ctx.user_id.clone(),
                raw_text: text.clone(),
                english_core: preview.as_ref().and_then(|p| p.english_core.clone()),
                sender_view: preview
                    .as_ref()
                    .map_or_else(|| text.clone(), |p| p.sender_view.clone()),
                receiver_view: None,
                is_enriching: needs_resolution,
                created_at: Utc::now(),
            });
            state
                .pending
                .insert(placeholder.as_str().to_string(), PendingSend::default());
        }
        inner.notify();
        inner.preview.clear();

        let views = inner
            .adapter
            .resolve_outgoing(EnrichRequest {
                text: text.clone(),
                sender_lang: ctx.user_lang.clone(),
                receiver_lang: ctx.partner_lang.clone(),
                mode: inner.mode,
                known_anchor: preview.and_then(|p| p.english_core),
            })
            .await;

        if inner.cancel.is_cancelled() {
            inner.remove_placeholder(&placeholder);
            return Err(inner.closed_error());
        }

        let receiver_view = (!ctx.same_language()).then(|| views.enrich.receiver_view.clone());
        inner.patch(&placeholder, |m| {
            m.raw_text = views.stored_text.clone();
            m.sender_view = views.enrich.sender_view.clone();
            m.english_core = views.enrich.english_core.clone().or(m.english_core.take());
            m.receiver_view = receiver_view.clone();
            m.is_enriching = false;
        });

        let new_message = NewMessage {
            conversation_id: ctx.conversation_id.clone(),
            sender_id: ctx.user_id.clone(),
            receiver_id: ctx.partner_id.clone(),
            raw_text: views.stored_text,
            receiver_view,
            english_core: views.enrich.english_core,
        };

        match inner.store.insert_message(new_message).await {
            Ok(persisted) => {
                tracing::debug!("[Pipeline] Persisted {} as {}", placeholder, persisted.id);
                let dropped = inner
                    .state()
                    .confirm(&placeholder, &persisted.id, Instant::now());
                if dropped {
                    inner.notify();
                }
                Ok(MessageId::Server(persisted.id))
            }
            Err(e) => {
                tracing::warn!(
                    "[Pipeline] Failed to persist message in {}: {}",
                    ctx.conversation_id,
                    e
                );
                inner.remove_placeholder(&placeholder);
                let err = if e.is_persistence() {
                    e
                } else {
                    ParleyError::persistence(e.to_string())
                };
                Err(err.with_restored_input(input))
            }
        }
    }

    /// Routes a conversation feed event. Non-message records are ignored.
    pub fn handle(&self, event: FeedEvent) {
        match (event.op, event.record) {
            (FeedOp::Insert, FeedRecord::Message(record)) => self.observe_insert(record),
            (FeedOp::Update, FeedRecord::Message(record)) => self.observe_update(record),
            _ => {}
        }
    }

    /// Applies a persisted message. Repeated deliveries are no-ops.
    pub fn observe_insert(&self, record: MessageRecord) {
        let inner = &self.inner;
        let ctx = &inner.context;
        if record.conversation_id != ctx.conversation_id || inner.cancel.is_cancelled() {
            return;
        }

        let own = record.sender_id == ctx.user_id;
        let at = Instant::now();
        let job = {
            let mut state = inner.state();
            if !state.seen.insert(record.id.clone()) {
                tracing::trace!("[Pipeline] Duplicate delivery of {}", record.id);
                return;
            }
            if own {
                state.reconcile_own(record, at, inner.reconcile_window);
                None
            } else {
                state.append_partner(record, ctx.same_language())
            }
        };
        inner.notify();

        let role = if own { ctx.role } else { ctx.role.counterpart() };
        inner.activity.message_observed(role, at);

        if let Some(job) = job {
            self.spawn_enrichment(job);
        }
    }

    /// Patches an already shown message in place. Unknown ids are ignored.
    pub fn observe_update(&self, record: MessageRecord) {
        let inner = &self.inner;
        if record.conversation_id != inner.context.conversation_id {
            return;
        }
        let own = record.sender_id == inner.context.user_id;
        let id = MessageId::Server(record.id.clone());
        let patched = inner.patch(&id, |m| {
            if own {
                m.sender_view = record.raw_text.clone();
            }
            m.raw_text = record.raw_text;
            if let Some(view) = record.receiver_view {
                m.receiver_view = Some(view);
                m.is_enriching = false;
            }
            if let Some(core) = record.english_core {
                m.english_core = Some(core);
            }
        });
        if !patched {
            tracing::trace!("[Pipeline] Ignoring update for unknown message {}", id);
        }
    }

    fn spawn_enrichment(&self, job: EnrichmentJob) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let request = EnrichRequest {
                text: job.text,
                sender_lang: inner.context.partner_lang.clone(),
                receiver_lang: inner.context.user_lang.clone(),
                mode: inner.mode,
                known_anchor: job.known_anchor,
            };
            let result = tokio::select! {
                _ = inner.cancel.cancelled() => {
                    tracing::trace!("[Pipeline] Abandoning enrichment of {}", job.id);
                    return;
                }
                result = inner.adapter.enrich(request) => result,
            };

            let id = MessageId::Server(job.id);
            inner.patch(&id, |m| {
                // A server-side update may have landed first.
                if m.is_enriching {
                    m.receiver_view = Some(result.receiver_view);
                    m.is_enriching = false;
                }
                m.english_core = m.english_core.take().or(result.english_core);
            });
        });
    }

    /// Stops all background work. Results still in flight are dropped.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}
