use super::runtime::SessionRuntime;
use super::throttle::RefreshThrottle;
use crate::context::{CloseRequest, Collaborators, ConversationContext};
use parley_core::config::EngineConfig;
use parley_core::error::{ParleyError, Result};
use parley_core::feed::{FeedEvent, FeedRecord, FeedSubscription, Topic};
use parley_core::language::LanguageCode;
use parley_core::session::{EndReason, PartnerProfile, Role, Session, SessionPatch};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Why the user should be told that a window went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    CapacityEvicted,
    PartnerUnavailable,
    SessionEnded,
    InactivityLogout,
    DuplicateRejected,
}

impl NoticeKind {
    /// User-initiated closes produce no notice.
    fn for_reason(reason: EndReason) -> Option<Self> {
        match reason {
            EndReason::CapacityEvicted => Some(Self::CapacityEvicted),
            EndReason::PartnerOffline => Some(Self::PartnerUnavailable),
            EndReason::SessionEnded => Some(Self::SessionEnded),
            EndReason::InactivityLogout => Some(Self::InactivityLogout),
            EndReason::DuplicatePartner => Some(Self::DuplicateRejected),
            EndReason::Closed | EndReason::Rejected | EndReason::Superseded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowNotice {
    pub session_id: String,
    pub partner_id: String,
    pub kind: NoticeKind,
}

/// One entry of the visible set, for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleWindow {
    pub session_id: String,
    pub partner_id: String,
    pub display_name: Option<String>,
    pub z_order: u64,
    pub online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub opened: Vec<String>,
    pub closed: Vec<(String, EndReason)>,
    /// Earner-side sessions waiting for an explicit accept
    pub awaiting_acceptance: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied(RefreshReport),
    /// Folded into the refresh that runs at the end of the throttle window
    Coalesced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOutcome {
    /// False if the session was already visible
    pub opened: bool,
    pub evicted: Option<String>,
}

/// What a call to [`SessionWindowManager::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Closed {
        session_id: String,
        reason: EndReason,
        /// False if the window was already gone
        was_open: bool,
    },
    Refreshed(RefreshReport),
    Coalesced,
    Presence {
        partner_id: String,
        online: bool,
    },
    Ignored,
    FeedClosed,
}

struct Window {
    runtime: SessionRuntime,
    profile: Option<PartnerProfile>,
    online: bool,
    z_order: u64,
    last_focused: u64,
}

enum Wake {
    Close(CloseRequest),
    Feed(Option<FeedEvent>),
    Refresh,
}

/// Maintains the bounded set of concurrently visible sessions of one user.
///
/// `SessionWindowManager` is responsible for:
/// - Deciding which active sessions are visible (acceptance, one per partner)
/// - Enforcing the visible-window cap by evicting the least recently focused
/// - Closing sessions with a persisted end reason
/// - Reacting to presence and session changes on the user feed
///
/// Each visible session owns a [`SessionRuntime`]; closing a window shuts
/// its runtime down.
pub struct SessionWindowManager {
    user_id: String,
    user_lang: LanguageCode,
    config: EngineConfig,
    collaborators: Collaborators,
    windows: HashMap<String, Window>,
    /// partner id -> visible session id
    partner_index: HashMap<String, String>,
    /// partner id -> stacking position, kept across superseding sessions
    stacking: HashMap<String, u64>,
    accepted: HashSet<String>,
    awaiting: HashMap<String, Session>,
    /// Closed or rejected here; never shown again
    ended: HashSet<String>,
    focus_counter: u64,
    throttle: RefreshThrottle,
    close_tx: mpsc::UnboundedSender<CloseRequest>,
    close_rx: mpsc::UnboundedReceiver<CloseRequest>,
    user_feed: Option<FeedSubscription>,
    notices: Vec<WindowNotice>,
}

impl SessionWindowManager {
    /// Creates a manager for `user_id`, whose mother tongue is `user_lang`.
    ///
    /// Nothing is loaded until [`start`](Self::start) is called.
    pub fn new(
        user_id: impl Into<String>,
        user_lang: LanguageCode,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Self {
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let throttle = RefreshThrottle::new(config.windows.refresh_interval());
        Self {
            user_id: user_id.into(),
            user_lang,
            config,
            collaborators,
            windows: HashMap::new(),
            partner_index: HashMap::new(),
            stacking: HashMap::new(),
            accepted: HashSet::new(),
            awaiting: HashMap::new(),
            ended: HashSet::new(),
            focus_counter: 0,
            throttle,
            close_tx,
            close_rx,
            user_feed: None,
            notices: Vec::new(),
        }
    }

    /// Subscribes to the user's feed and loads the initial visible set.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription or the session listing fails.
    pub async fn start(&mut self) -> Result<RefreshReport> {
        let subscription = self
            .collaborators
            .feed
            .subscribe(Topic::User(self.user_id.clone()))
            .await?;
        self.user_feed = Some(subscription);
        tracing::info!("[WindowManager] Started for {}", self.user_id);
        self.force_refresh().await
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Visible windows, back to front.
    pub fn visible(&self) -> Vec<VisibleWindow> {
        let mut visible: Vec<VisibleWindow> = self
            .windows
            .iter()
            .map(|(id, window)| VisibleWindow {
                session_id: id.clone(),
                partner_id: window.runtime.session().partner_id.clone(),
                display_name: window.profile.as_ref().map(|p| p.display_name.clone()),
                z_order: window.z_order,
                online: window.online,
            })
            .collect();
        visible.sort_by_key(|w| w.z_order);
        visible
    }

    pub fn visible_count(&self) -> usize {
        self.windows.len()
    }

    pub fn runtime(&self, session_id: &str) -> Option<&SessionRuntime> {
        self.windows.get(session_id).map(|w| &w.runtime)
    }

    /// The visible session with `partner_id`, if any.
    pub fn runtime_for_partner(&self, partner_id: &str) -> Option<&SessionRuntime> {
        self.partner_index
            .get(partner_id)
            .and_then(|id| self.runtime(id))
    }

    pub fn awaiting_acceptance(&self) -> Vec<&Session> {
        let mut awaiting: Vec<&Session> = self.awaiting.values().collect();
        awaiting.sort_by_key(|s| s.started_at);
        awaiting
    }

    pub fn drain_notices(&mut self) -> Vec<WindowNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Recomputes the visible set, at most once per refresh interval.
    ///
    /// Requests inside the interval are coalesced into one refresh that
    /// [`step`](Self::step) runs when the interval ends.
    ///
    /// # Errors
    ///
    /// Returns an error if listing sessions or starting a runtime fails.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        if !self.throttle.try_acquire(Instant::now()) {
            tracing::trace!("[WindowManager] Refresh coalesced");
            return Ok(RefreshOutcome::Coalesced);
        }
        self.force_refresh().await.map(RefreshOutcome::Applied)
    }

    /// Recomputes the visible set immediately.
    pub async fn force_refresh(&mut self) -> Result<RefreshReport> {
        self.throttle.mark_ran(Instant::now());
        let rows = self
            .collaborators
            .sessions
            .list_sessions(&self.user_id)
            .await?;

        let mut report = RefreshReport::default();
        let mut candidates = Vec::new();
        self.awaiting.clear();
        for row in rows {
            let session = row.session;
            if !session.is_active() || self.ended.contains(&session.session_id) {
                continue;
            }
            let Some(role) = session.role_of(&self.user_id) else {
                tracing::warn!(
                    "[WindowManager] {} is not a participant of {}",
                    self.user_id,
                    session.session_id
                );
                continue;
            };
            let accepted = role == Role::Payer
                || row.earner_has_messaged
                || self.accepted.contains(&session.session_id);
            if accepted {
                candidates.push(session);
            } else {
                report.awaiting_acceptance.push(session.session_id.clone());
                self.awaiting.insert(session.session_id.clone(), session);
            }
        }

        let latest = latest_per_partner(candidates);
        let partner_ids: Vec<String> = latest.keys().cloned().collect();
        let profiles = self.load_profiles(&partner_ids).await;
        let presence = self.load_presence(&partner_ids).await;
        let is_offline = |partner: &str| presence.get(partner) == Some(&false);

        let visible_ids: Vec<String> = self.windows.keys().cloned().collect();
        for id in visible_ids {
            let Some(partner) = self
                .windows
                .get(&id)
                .map(|w| w.runtime.session().partner_id.clone())
            else {
                continue;
            };
            let reason = match latest.get(&partner) {
                Some(session) if session.session_id == id => {
                    is_offline(&partner).then_some(EndReason::PartnerOffline)
                }
                Some(_) => Some(EndReason::Superseded),
                None => Some(EndReason::SessionEnded),
            };
            if let Some(reason) = reason {
                self.close(&id, reason).await;
                report.closed.push((id, reason));
            }
        }

        let mut fresh: Vec<Session> = latest
            .into_values()
            .filter(|s| !self.windows.contains_key(&s.session_id))
            .collect();
        fresh.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        for session in fresh {
            if is_offline(&session.partner_id) {
                tracing::debug!(
                    "[WindowManager] Not opening {}: {} is offline",
                    session.session_id,
                    session.partner_id
                );
                continue;
            }
            let profile = profiles.get(&session.partner_id).cloned();
            let id = session.session_id.clone();
            if let Some(evicted) = self.open(session, profile, true).await? {
                report.closed.push((evicted, EndReason::CapacityEvicted));
            }
            report.opened.push(id);
        }

        for window in self.windows.values_mut() {
            let partner = &window.runtime.session().partner_id;
            if let Some(profile) = profiles.get(partner) {
                window.profile = Some(profile.clone());
            }
            window.online = !is_offline(partner);
        }

        tracing::debug!(
            "[WindowManager] Refreshed: {} visible, {} opened, {} closed, {} awaiting",
            self.windows.len(),
            report.opened.len(),
            report.closed.len(),
            report.awaiting_acceptance.len()
        );
        Ok(report)
    }

    /// Accepts a session on the earner side and makes it visible.
    ///
    /// If another session with the same partner is already visible, the
    /// accepted one is ended with `duplicate_partner` instead.
    ///
    /// # Errors
    ///
    /// - `DuplicatePartnerSession` if the partner already has a visible session
    /// - `NotFound` if the session is unknown or already ended
    pub async fn accept(&mut self, session_id: &str) -> Result<AcceptOutcome> {
        if self.windows.contains_key(session_id) {
            self.accepted.insert(session_id.to_string());
            return Ok(AcceptOutcome {
                opened: false,
                evicted: None,
            });
        }
        if self.ended.contains(session_id) {
            return Err(ParleyError::not_found("session", session_id));
        }

        let session = match self.awaiting.remove(session_id) {
            Some(session) => session,
            None => self.find_session(session_id).await?,
        };

        if let Some(existing) = self.partner_index.get(&session.partner_id).cloned() {
            tracing::warn!(
                "[WindowManager] Rejecting {}: {} already has {}",
                session_id,
                session.partner_id,
                existing
            );
            self.ended.insert(session_id.to_string());
            self.persist_end(session_id, EndReason::DuplicatePartner)
                .await;
            self.notices.push(WindowNotice {
                session_id: session_id.to_string(),
                partner_id: session.partner_id.clone(),
                kind: NoticeKind::DuplicateRejected,
            });
            return Err(ParleyError::DuplicatePartnerSession {
                partner_id: session.partner_id,
                session_id: session_id.to_string(),
                existing_session_id: existing,
            });
        }

        self.accepted.insert(session_id.to_string());
        let partner = [session.partner_id.clone()];
        let profile = self.load_profiles(&partner).await.remove(&partner[0]);
        let online = self.load_presence(&partner).await.get(&partner[0]) != Some(&false);
        let evicted = self.open(session, profile, online).await?;
        Ok(AcceptOutcome {
            opened: true,
            evicted,
        })
    }

    /// Declines a session. A visible one is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the rejection fails; the session then
    /// stays eligible.
    pub async fn reject(&mut self, session_id: &str) -> Result<()> {
        if self.windows.contains_key(session_id) {
            self.close(session_id, EndReason::Rejected).await;
            return Ok(());
        }
        if !self.ended.insert(session_id.to_string()) {
            return Ok(());
        }
        let result = self
            .collaborators
            .sessions
            .update_session(session_id, SessionPatch::ended(EndReason::Rejected))
            .await;
        match result {
            Ok(()) => {
                self.awaiting.remove(session_id);
                tracing::info!("[WindowManager] Rejected {}", session_id);
                Ok(())
            }
            Err(e) => {
                self.ended.remove(session_id);
                Err(e)
            }
        }
    }

    /// Brings a window to the front.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session is not visible.
    pub fn focus(&mut self, session_id: &str) -> Result<u64> {
        let focus = self.focus_counter + 1;
        let window = self
            .windows
            .get_mut(session_id)
            .ok_or_else(|| ParleyError::not_found("window", session_id))?;
        self.focus_counter = focus;
        window.z_order = focus;
        window.last_focused = focus;
        self.stacking
            .insert(window.runtime.session().partner_id.clone(), focus);
        Ok(focus)
    }

    /// Closes a visible session. Unknown ids are a no-op.
    ///
    /// The runtime is shut down first; the end reason is then written back
    /// if it is one that gets persisted. A failed write is logged and the
    /// window stays closed.
    pub async fn close(&mut self, session_id: &str, reason: EndReason) -> bool {
        let Some(window) = self.windows.remove(session_id) else {
            return false;
        };
        let partner = window.runtime.session().partner_id.clone();
        if self.partner_index.get(&partner).map(String::as_str) == Some(session_id) {
            self.partner_index.remove(&partner);
        }
        if reason != EndReason::Superseded {
            self.stacking.remove(&partner);
        }
        self.ended.insert(session_id.to_string());
        window.runtime.shutdown(reason);
        tracing::info!(
            "[WindowManager] Closed {} with {} ({})",
            session_id,
            partner,
            reason
        );

        if reason.is_persisted() {
            self.persist_end(session_id, reason).await;
        }
        if let Some(kind) = NoticeKind::for_reason(reason) {
            self.notices.push(WindowNotice {
                session_id: session_id.to_string(),
                partner_id: partner,
                kind,
            });
        }
        true
    }

    /// Closes every visible window with `reason`.
    pub async fn close_all(&mut self, reason: EndReason) {
        let ids: Vec<String> = self.windows.keys().cloned().collect();
        for id in ids {
            self.close(&id, reason).await;
        }
    }

    /// Waits for the next thing to react to and handles it: a close request
    /// from a session runtime, an event on the user feed, or the end of a
    /// refresh throttle window with a refresh pending.
    ///
    /// Pending forever if none of these can happen; callers drive it inside
    /// their own `select!`.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        let deadline = self.throttle.pending_deadline();
        let wake = tokio::select! {
            Some(request) = self.close_rx.recv() => Wake::Close(request),
            event = next_event(self.user_feed.as_mut()) => Wake::Feed(event),
            _ = sleep_until(deadline) => Wake::Refresh,
        };

        match wake {
            Wake::Close(request) => {
                let was_open = self.close(&request.session_id, request.reason).await;
                Ok(StepOutcome::Closed {
                    session_id: request.session_id,
                    reason: request.reason,
                    was_open,
                })
            }
            Wake::Feed(Some(event)) => self.handle_user_event(event).await,
            Wake::Feed(None) => {
                tracing::warn!("[WindowManager] User feed for {} closed", self.user_id);
                self.user_feed = None;
                Ok(StepOutcome::FeedClosed)
            }
            Wake::Refresh => self.force_refresh().await.map(StepOutcome::Refreshed),
        }
    }

    async fn handle_user_event(&mut self, event: FeedEvent) -> Result<StepOutcome> {
        match event.record {
            FeedRecord::Presence(presence) => {
                let visible = self.partner_index.get(&presence.user_id).cloned();
                match visible {
                    Some(session_id) if !presence.online => {
                        let was_open = self.close(&session_id, EndReason::PartnerOffline).await;
                        Ok(StepOutcome::Closed {
                            session_id,
                            reason: EndReason::PartnerOffline,
                            was_open,
                        })
                    }
                    _ => {
                        if presence.online {
                            // A returning partner may have sessions to show.
                            self.refresh().await?;
                        }
                        Ok(StepOutcome::Presence {
                            partner_id: presence.user_id,
                            online: presence.online,
                        })
                    }
                }
            }
            FeedRecord::Session(session) => {
                if !session.is_active() && self.windows.contains_key(&session.session_id) {
                    let was_open = self
                        .close(&session.session_id, EndReason::SessionEnded)
                        .await;
                    return Ok(StepOutcome::Closed {
                        session_id: session.session_id,
                        reason: EndReason::SessionEnded,
                        was_open,
                    });
                }
                Ok(match self.refresh().await? {
                    RefreshOutcome::Applied(report) => StepOutcome::Refreshed(report),
                    RefreshOutcome::Coalesced => StepOutcome::Coalesced,
                })
            }
            FeedRecord::Message(_) => Ok(StepOutcome::Ignored),
        }
    }

    /// Starts a runtime for `session` and shows it, evicting the least
    /// recently focused window if the cap is reached.
    async fn open(
        &mut self,
        session: Session,
        profile: Option<PartnerProfile>,
        online: bool,
    ) -> Result<Option<String>> {
        let role = session.role_of(&self.user_id).ok_or_else(|| {
            ParleyError::internal(format!(
                "{} is not a participant of {}",
                self.user_id, session.session_id
            ))
        })?;
        let partner_lang = match &profile {
            Some(profile) => profile.mother_tongue.clone(),
            None => {
                tracing::warn!(
                    "[WindowManager] No profile for {}, assuming {}",
                    session.partner_id,
                    self.user_lang
                );
                self.user_lang.clone()
            }
        };
        let context = ConversationContext::for_session(
            &session,
            &self.user_id,
            role,
            self.user_lang.clone(),
            partner_lang,
        );
        let runtime = SessionRuntime::start(
            session.clone(),
            context,
            &self.config,
            &self.collaborators,
            self.close_tx.clone(),
        )
        .await?;

        let mut evicted = None;
        if self.windows.len() >= self.config.windows.max_visible {
            let victim = self.least_recently_focused().ok_or(ParleyError::CapacityExceeded {
                visible: self.windows.len(),
                max_visible: self.config.windows.max_visible,
            })?;
            self.close(&victim, EndReason::CapacityEvicted).await;
            evicted = Some(victim);
        }

        self.focus_counter += 1;
        let focus = self.focus_counter;
        let z_order = self
            .stacking
            .get(&session.partner_id)
            .copied()
            .unwrap_or(focus);
        self.stacking.insert(session.partner_id.clone(), z_order);
        self.partner_index
            .insert(session.partner_id.clone(), session.session_id.clone());
        tracing::info!(
            "[WindowManager] Opened {} with {}",
            session.session_id,
            session.partner_id
        );
        self.windows.insert(
            session.session_id,
            Window {
                runtime,
                profile,
                online,
                z_order,
                last_focused: focus,
            },
        );
        Ok(evicted)
    }

    fn least_recently_focused(&self) -> Option<String> {
        self.windows
            .iter()
            .min_by_key(|(_, w)| w.last_focused)
            .map(|(id, _)| id.clone())
    }

    async fn find_session(&self, session_id: &str) -> Result<Session> {
        self.collaborators
            .sessions
            .list_sessions(&self.user_id)
            .await?
            .into_iter()
            .map(|row| row.session)
            .find(|s| s.session_id == session_id && s.is_active())
            .ok_or_else(|| ParleyError::not_found("session", session_id))
    }

    async fn persist_end(&self, session_id: &str, reason: EndReason) {
        if let Err(e) = self
            .collaborators
            .sessions
            .update_session(session_id, SessionPatch::ended(reason))
            .await
        {
            tracing::warn!(
                "[WindowManager] Failed to persist end of {} ({}): {}",
                session_id,
                reason,
                e
            );
        }
    }

    async fn load_profiles(&self, partner_ids: &[String]) -> HashMap<String, PartnerProfile> {
        if partner_ids.is_empty() {
            return HashMap::new();
        }
        match self.collaborators.sessions.partner_profiles(partner_ids).await {
            Ok(profiles) => profiles
                .into_iter()
                .map(|p| (p.partner_id.clone(), p))
                .collect(),
            Err(e) => {
                tracing::warn!("[WindowManager] Failed to load partner profiles: {}", e);
                HashMap::new()
            }
        }
    }

    /// Missing entries mean online.
    async fn load_presence(&self, partner_ids: &[String]) -> HashMap<String, bool> {
        if partner_ids.is_empty() {
            return HashMap::new();
        }
        match self.collaborators.sessions.presence(partner_ids).await {
            Ok(presence) => presence,
            Err(e) => {
                tracing::warn!("[WindowManager] Failed to load presence: {}", e);
                HashMap::new()
            }
        }
    }
}

/// Newest session per partner; ties broken by the larger session id.
fn latest_per_partner(sessions: Vec<Session>) -> HashMap<String, Session> {
    let mut latest: HashMap<String, Session> = HashMap::new();
    for session in sessions {
        let newer = latest.get(&session.partner_id).is_none_or(|current| {
            (session.started_at, &session.session_id) > (current.started_at, &current.session_id)
        });
        if newer {
            latest.insert(session.partner_id.clone(), session);
        }
    }
    latest
}

async fn next_event(feed: Option<&mut FeedSubscription>) -> Option<FeedEvent> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "window_manager_test.rs"]
mod tests;
