//! Trade directory and handshake
//!
//! The manager is the single authority over who is trading with whom. It owns
//! every pending request (keyed by target) and every running session (indexed
//! by both participants), and routes host events to the owning session.

use crate::blacklist::ItemBlacklist;
use crate::config::TradeConfig;
use crate::error::{Result, TradeError};
use crate::messages::{Cue, MessageKey};
use crate::ports::{Host, TradeContext};
use crate::types::{ActorId, Location, ResponseId, SessionId, TimerHandle};
use crate::validators::{are_valid, distance, is_valid};
use std::collections::HashMap;

use super::request::TradeRequest;
use super::session::TradeSession;
use super::types::{CancelReason, Decision, EventOutcome, Resolution, TimerTask, TradeEvent};

/// Directory of pending requests and running sessions
pub struct TradeManager {
    config: TradeConfig,
    blacklist: ItemBlacklist,
    sessions: HashMap<SessionId, TradeSession>,
    active: HashMap<ActorId, SessionId>,
    /// Keyed by target
    pending: HashMap<ActorId, TradeRequest>,
    /// At most one close grace per actor
    close_timers: HashMap<ActorId, TimerHandle>,
}

impl TradeManager {
    /// Create a manager with the blacklist described by `config`
    pub fn new(config: TradeConfig) -> Result<Self> {
        let blacklist = ItemBlacklist::from_config(&config.blacklist);
        Self::with_blacklist(config, blacklist)
    }

    pub fn with_blacklist(config: TradeConfig, blacklist: ItemBlacklist) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            blacklist,
            sessions: HashMap::new(),
            active: HashMap::new(),
            pending: HashMap::new(),
            close_timers: HashMap::new(),
        })
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn blacklist(&self) -> &ItemBlacklist {
        &self.blacklist
    }

    pub fn blacklist_mut(&mut self) -> &mut ItemBlacklist {
        &mut self.blacklist
    }

    /// Invite `target` to trade.
    ///
    /// On refusal the sender is notified and nothing else changes.
    pub fn send_request<H: Host>(
        &mut self,
        host: &mut H,
        sender: &ActorId,
        target: &ActorId,
    ) -> Result<ResponseId> {
        if let Err(err) = self.check_request(host, sender, target) {
            tracing::debug!(sender = %sender, recipient = %target, "Trade request refused: {}", err);
            if let Some(key) = err.message_key() {
                let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
                ctx.notify_about(sender, key, target);
            }
            return Err(err);
        }

        let mut request = TradeRequest::new(sender.clone(), target.clone());
        let response = request.response();
        let expiry = host.schedule(
            self.config.request_timeout(),
            TimerTask::ExpireRequest {
                target: target.clone(),
                response,
            },
        );
        request.set_expiry(expiry);
        self.pending.insert(target.clone(), request);

        host.prompt(target, sender, response);
        let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
        ctx.notify_about(sender, MessageKey::RequestSent, target);
        ctx.notify_about(target, MessageKey::RequestReceived, sender);
        ctx.cue(target, Cue::Orb);

        tracing::info!(sender = %sender, recipient = %target, %response, "Trade request sent");
        Ok(response)
    }

    /// Preconditions of a request, first failure wins
    fn check_request<H: Host>(&self, host: &H, sender: &ActorId, target: &ActorId) -> Result<()> {
        if sender == target {
            return Err(TradeError::CannotTradeSelf);
        }

        let sender_status = host.status(sender);
        let target_status = host.status(target);
        if !is_valid(sender_status.as_ref()) {
            return Err(TradeError::ActorUnavailable(sender.to_string()));
        }
        if !is_valid(target_status.as_ref()) {
            return Err(TradeError::ActorUnavailable(target.to_string()));
        }
        if !host.has_permission(sender, &self.config.use_permission) {
            return Err(TradeError::PermissionDenied(sender.to_string()));
        }

        if self.is_in_trade(sender) {
            return Err(TradeError::AlreadyInTrade(sender.to_string()));
        }
        if self.is_in_trade(target) {
            return Err(TradeError::TargetInTrade(target.to_string()));
        }
        if self.pending.contains_key(target) {
            return Err(TradeError::RequestAlreadyPending(target.to_string()));
        }
        if self.has_pending_request(sender) {
            return Err(TradeError::PendingRequest(sender.to_string()));
        }
        if self.outgoing_request(target).is_some() {
            return Err(TradeError::TargetBusy(target.to_string()));
        }

        if self.config.check_distance {
            let distance = distance(sender_status.as_ref(), target_status.as_ref());
            if distance > self.config.max_distance {
                return Err(TradeError::OutOfRange {
                    distance,
                    max: self.config.max_distance,
                });
            }
        }

        Ok(())
    }

    /// Answer the request pending for `target`.
    ///
    /// Answers with an unknown or outdated `response` are ignored.
    pub fn respond<H: Host>(
        &mut self,
        host: &mut H,
        target: &ActorId,
        response: ResponseId,
        decision: Decision,
    ) -> Resolution {
        if !self
            .pending
            .get(target)
            .map_or(false, |request| request.matches(response))
        {
            tracing::debug!(recipient = %target, %response, "Ignoring stale response");
            return Resolution::Ignored;
        }
        let Some(mut request) = self.pending.remove(target) else {
            return Resolution::Ignored;
        };
        if let Some(handle) = request.take_expiry() {
            host.cancel(handle);
        }

        match decision {
            Decision::Accept => self.accept(host, request),
            Decision::Reject => {
                let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
                ctx.notify_about(request.sender(), MessageKey::RequestDeclined, target);
                ctx.cue(target, Cue::Break);
                tracing::info!(sender = %request.sender(), recipient = %target, "Trade request declined");
                Resolution::Rejected
            }
        }
    }

    fn accept<H: Host>(&mut self, host: &mut H, request: TradeRequest) -> Resolution {
        let sender = request.sender().clone();
        let target = request.target().clone();

        if let Err(err) = self.check_accept(host, &sender, &target) {
            tracing::warn!(sender = %sender, recipient = %target, "Accepted request could not start: {}", err);
            if let Some(key) = err.message_key() {
                let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
                ctx.notify_about(&target, key, &sender);
                ctx.notify_about(&sender, key, &target);
            }
            return Resolution::AcceptFailed;
        }

        let id = SessionId::generate(&sender, &target);
        let mut session = TradeSession::new(id.clone(), sender.clone(), target.clone());
        let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
        if let Err(err) = session.start(&mut ctx) {
            tracing::warn!(session = %id, "Trade session failed to start: {}", err);
            ctx.notify(&sender, MessageKey::TradeCancelled, &[]);
            ctx.notify(&target, MessageKey::TradeCancelled, &[]);
            return Resolution::AcceptFailed;
        }

        self.active.insert(sender, id.clone());
        self.active.insert(target, id.clone());
        self.sessions.insert(id.clone(), session);
        Resolution::Accepted(id)
    }

    /// State may have changed since the invitation
    fn check_accept<H: Host>(&self, host: &H, sender: &ActorId, target: &ActorId) -> Result<()> {
        let sender_status = host.status(sender);
        let target_status = host.status(target);
        if !are_valid(sender_status.as_ref(), target_status.as_ref()) {
            return Err(TradeError::ActorUnavailable(format!("{} or {}", sender, target)));
        }
        if self.is_in_trade(sender) || self.is_in_trade(target) {
            return Err(TradeError::AlreadyInTrade(format!("{} or {}", sender, target)));
        }
        if self.config.check_distance {
            let distance = distance(sender_status.as_ref(), target_status.as_ref());
            if distance > self.config.max_distance {
                return Err(TradeError::OutOfRange {
                    distance,
                    max: self.config.max_distance,
                });
            }
        }
        Ok(())
    }

    fn expire_request<H: Host>(
        &mut self,
        host: &mut H,
        target: &ActorId,
        response: ResponseId,
    ) -> EventOutcome {
        if !self
            .pending
            .get(target)
            .map_or(false, |request| request.matches(response))
        {
            tracing::debug!(recipient = %target, %response, "Ignoring stale expiry");
            return EventOutcome::Ignored;
        }
        let Some(request) = self.pending.remove(target) else {
            return EventOutcome::Ignored;
        };

        let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
        ctx.notify(request.sender(), MessageKey::RequestExpired, &[]);
        ctx.notify(target, MessageKey::RequestExpired, &[]);
        tracing::info!(sender = %request.sender(), recipient = %target, "Trade request expired");
        EventOutcome::Applied
    }

    /// Withdraw the request `actor` sent or received
    pub fn cancel_request<H: Host>(&mut self, host: &mut H, actor: &ActorId) -> bool {
        let key = if self.pending.contains_key(actor) {
            actor.clone()
        } else {
            match self.outgoing_request(actor) {
                Some(request) => request.target().clone(),
                None => return false,
            }
        };
        let Some(mut request) = self.pending.remove(&key) else {
            return false;
        };
        if let Some(handle) = request.take_expiry() {
            host.cancel(handle);
        }

        let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
        ctx.notify(request.sender(), MessageKey::RequestCancelled, &[]);
        ctx.notify(request.target(), MessageKey::RequestCancelled, &[]);
        tracing::info!(sender = %request.sender(), recipient = %request.target(), "Trade request cancelled");
        true
    }

    /// Cancel `actor`'s trade at its own request
    pub fn cancel_trade<H: Host>(&mut self, host: &mut H, actor: &ActorId) -> bool {
        self.cancel_session(host, actor, CancelReason::Requested(actor.clone()))
    }

    /// Flip `actor`'s ready flag
    pub fn toggle_ready<H: Host>(&mut self, host: &mut H, actor: &ActorId) -> bool {
        let Some(id) = self.active.get(actor).cloned() else {
            return false;
        };
        self.drive(host, &id, |session, ctx| session.toggle_ready(ctx, actor))
            .unwrap_or(false)
    }

    /// Run the exchange of `actor`'s trade now; at most once per session
    pub fn complete_trade<H: Host>(&mut self, host: &mut H, actor: &ActorId) -> bool {
        let Some(id) = self.active.get(actor).cloned() else {
            return false;
        };
        self.drive(host, &id, |session, ctx| session.complete(ctx))
            .unwrap_or(false)
    }

    /// Cancel every session and request, e.g. at shutdown
    pub fn cancel_all_trades<H: Host>(&mut self, host: &mut H) -> usize {
        let ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        let mut cancelled = 0;
        for id in ids {
            let done = self
                .drive(host, &id, |session, ctx| session.cancel(ctx, CancelReason::Shutdown))
                .unwrap_or(false);
            if done {
                cancelled += 1;
            }
        }

        let targets: Vec<ActorId> = self.pending.keys().cloned().collect();
        for target in targets {
            self.cancel_request(host, &target);
        }

        self.sessions.clear();
        self.active.clear();
        self.pending.clear();
        for (_, handle) in self.close_timers.drain() {
            host.cancel(handle);
        }
        tracing::info!(cancelled, "All trades cancelled");
        cancelled
    }

    /// Route a host event to the session or request it concerns
    pub fn handle<H: Host>(&mut self, host: &mut H, event: TradeEvent) -> EventOutcome {
        match event {
            TradeEvent::Interaction { actor, slot, item } => {
                let Some(id) = self.active.get(&actor).cloned() else {
                    return EventOutcome::Ignored;
                };
                self.drive(host, &id, |session, ctx| {
                    session.handle_interaction(ctx, &actor, slot, item)
                })
                .map_or(EventOutcome::Ignored, EventOutcome::Interaction)
            }
            TradeEvent::ContainerClosed { actor } => {
                let Some(id) = self.active.get(&actor).cloned() else {
                    return EventOutcome::Ignored;
                };
                tracing::debug!(session = %id, actor = %actor, "Container closed, grace period started");
                let handle = host.schedule(
                    self.config.close_grace(),
                    TimerTask::CloseGrace {
                        session: id,
                        actor: actor.clone(),
                    },
                );
                if let Some(previous) = self.close_timers.insert(actor, handle) {
                    host.cancel(previous);
                }
                EventOutcome::Applied
            }
            TradeEvent::Disconnected { actor } => {
                let cancelled =
                    self.cancel_session(host, &actor, CancelReason::Disconnected(actor.clone()));
                let withdrawn = self.cancel_request(host, &actor);
                applied(cancelled || withdrawn)
            }
            TradeEvent::Died { actor } => {
                applied(self.cancel_session(host, &actor, CancelReason::Died(actor.clone())))
            }
            TradeEvent::Teleported { actor, destination } => {
                self.on_teleport(host, &actor, &destination)
            }
            TradeEvent::Timer(task) => self.on_timer(host, task),
        }
    }

    fn on_teleport<H: Host>(
        &mut self,
        host: &mut H,
        actor: &ActorId,
        destination: &Location,
    ) -> EventOutcome {
        if !self.config.cancel_on_distance {
            return EventOutcome::Ignored;
        }
        let Some(session) = self.session(actor) else {
            return EventOutcome::Ignored;
        };
        let id = session.id().clone();
        let partner = session.other(actor).and_then(|partner| host.status(partner));

        let distance = partner.map_or(f64::INFINITY, |p| destination.distance(&p.location));
        if distance <= self.config.max_distance {
            return EventOutcome::Ignored;
        }

        tracing::debug!(session = %id, actor = %actor, distance, "Teleported out of range, grace period started");
        host.schedule(
            self.config.teleport_grace(),
            TimerTask::TeleportGrace {
                session: id,
                actor: actor.clone(),
            },
        );
        EventOutcome::Applied
    }

    fn on_timer<H: Host>(&mut self, host: &mut H, task: TimerTask) -> EventOutcome {
        match task {
            TimerTask::ExpireRequest { target, response } => {
                self.expire_request(host, &target, response)
            }
            TimerTask::CompleteTrade { session } => self
                .drive(host, &session, |session, ctx| session.complete(ctx))
                .map_or(EventOutcome::Ignored, |_| EventOutcome::Applied),
            TimerTask::CloseGrace { session, actor } => {
                self.close_timers.remove(&actor);
                if self.active.get(&actor) != Some(&session) || host.is_viewing(&session, &actor) {
                    tracing::debug!(session = %session, actor = %actor, "Close grace elapsed, nothing to do");
                    return EventOutcome::Ignored;
                }
                applied(self.cancel_session(host, &actor, CancelReason::ContainerClosed(actor.clone())))
            }
            TimerTask::TeleportGrace { session, actor } => {
                if self.active.get(&actor) != Some(&session) {
                    return EventOutcome::Ignored;
                }
                let partner = self
                    .sessions
                    .get(&session)
                    .and_then(|s| s.other(&actor))
                    .and_then(|partner| host.status(partner));
                let distance = distance(host.status(&actor).as_ref(), partner.as_ref());
                if distance <= self.config.max_distance {
                    tracing::debug!(session = %session, actor = %actor, "Back in range, trade kept");
                    return EventOutcome::Ignored;
                }
                applied(self.cancel_session(host, &actor, CancelReason::OutOfRange(actor.clone())))
            }
        }
    }

    fn cancel_session<H: Host>(&mut self, host: &mut H, actor: &ActorId, reason: CancelReason) -> bool {
        let Some(id) = self.active.get(actor).cloned() else {
            return false;
        };
        self.drive(host, &id, |session, ctx| session.cancel(ctx, reason))
            .unwrap_or(false)
    }

    /// Run `f` against a session and deregister it once it has resolved
    fn drive<H: Host, R>(
        &mut self,
        host: &mut H,
        id: &SessionId,
        f: impl FnOnce(&mut TradeSession, &mut TradeContext<'_, H>) -> R,
    ) -> Option<R> {
        let session = self.sessions.get_mut(id)?;
        let mut ctx = TradeContext::new(host, &self.config, &self.blacklist);
        let result = f(session, &mut ctx);

        if session.phase().is_terminal() {
            self.deregister(host, id);
        }
        Some(result)
    }

    fn deregister<H: Host>(&mut self, host: &mut H, id: &SessionId) {
        let Some(session) = self.sessions.remove(id) else {
            return;
        };
        for actor in [session.side_a(), session.side_b()] {
            if self.active.get(actor) == Some(id) {
                self.active.remove(actor);
            }
            if let Some(handle) = self.close_timers.remove(actor) {
                host.cancel(handle);
            }
        }
        tracing::debug!(session = %id, phase = ?session.phase(), "Session deregistered");
    }

    pub fn is_in_trade(&self, actor: &ActorId) -> bool {
        self.active.contains_key(actor)
    }

    /// Whether `actor` sent or received a request that is still open
    pub fn has_pending_request(&self, actor: &ActorId) -> bool {
        self.pending.contains_key(actor) || self.outgoing_request(actor).is_some()
    }

    pub fn has_incoming_request(&self, actor: &ActorId) -> bool {
        self.pending.contains_key(actor)
    }

    pub fn incoming_request(&self, target: &ActorId) -> Option<&TradeRequest> {
        self.pending.get(target)
    }

    pub fn outgoing_request(&self, sender: &ActorId) -> Option<&TradeRequest> {
        self.pending.values().find(|request| request.sender() == sender)
    }

    /// The session `actor` is part of
    pub fn session(&self, actor: &ActorId) -> Option<&TradeSession> {
        self.active.get(actor).and_then(|id| self.sessions.get(id))
    }

    pub fn session_by_id(&self, id: &SessionId) -> Option<&TradeSession> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &TradeSession> {
        self.sessions.values()
    }

    pub fn active_trades_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn pending_requests_count(&self) -> usize {
        self.pending.len()
    }
}

fn applied(changed: bool) -> EventOutcome {
    if changed {
        EventOutcome::Applied
    } else {
        EventOutcome::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::InMemoryHost;
    use crate::host::scheduler::ManualScheduler;
    use crate::ports::ContainerProvider;
    use crate::types::Item;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    type TestHost = InMemoryHost<ManualScheduler>;

    fn alex() -> ActorId {
        ActorId::new("alex")
    }

    fn steve() -> ActorId {
        ActorId::new("steve")
    }

    fn notch() -> ActorId {
        ActorId::new("notch")
    }

    fn setup() -> (TradeManager, TestHost) {
        let manager = TradeManager::new(TradeConfig::default()).unwrap();
        let mut host = InMemoryHost::new(ManualScheduler::new(), TradeConfig::default().messages);
        for (id, name, x) in [(alex(), "Alex", 0.0), (steve(), "Steve", 5.0), (notch(), "Notch", 3.0)] {
            host.add_actor(id.clone(), name, Location::new("world", x, 64.0, 0.0));
            host.grant_permission(&id, "trade.use");
        }
        (manager, host)
    }

    fn start_trade(manager: &mut TradeManager, host: &mut TestHost) -> SessionId {
        let response = manager.send_request(host, &alex(), &steve()).unwrap();
        match manager.respond(host, &steve(), response, Decision::Accept) {
            Resolution::Accepted(id) => id,
            other => panic!("trade did not start: {:?}", other),
        }
    }

    fn advance(manager: &mut TradeManager, host: &mut TestHost, by: Duration) {
        host.scheduler_mut().advance_clock(by);
        while let Some(task) = host.scheduler_mut().pop_due() {
            manager.handle(host, TradeEvent::Timer(task));
        }
    }

    #[test]
    fn test_send_request() {
        let (mut manager, mut host) = setup();
        let response = assert_ok!(manager.send_request(&mut host, &alex(), &steve()));

        assert!(manager.has_incoming_request(&steve()));
        assert!(manager.has_pending_request(&alex()));
        assert_eq!(host.prompt_for(&steve()), Some(response));
        assert_eq!(host.scheduler().pending_count(), 1);
        assert!(host.messages_for(&alex()).contains(&MessageKey::RequestSent));
        assert!(host.messages_for(&steve()).contains(&MessageKey::RequestReceived));
    }

    #[test]
    fn test_request_preconditions_in_order() {
        let (mut manager, mut host) = setup();

        let err = assert_err!(manager.send_request(&mut host, &alex(), &alex()));
        assert!(matches!(err, TradeError::CannotTradeSelf));

        let err = assert_err!(manager.send_request(&mut host, &alex(), &ActorId::new("ghost")));
        assert!(matches!(err, TradeError::ActorUnavailable(_)));

        host.actor_mut(&notch()).unwrap().permissions.clear();
        let err = assert_err!(manager.send_request(&mut host, &notch(), &alex()));
        assert!(matches!(err, TradeError::PermissionDenied(_)));

        assert!(host.messages_for(&alex()).contains(&MessageKey::CannotTradeYourself));
        assert!(host.messages_for(&notch()).contains(&MessageKey::NoPermission));
        assert_eq!(manager.pending_requests_count(), 0);
    }

    #[test]
    fn test_request_state_conflicts() {
        let (mut manager, mut host) = setup();
        manager.send_request(&mut host, &alex(), &steve()).unwrap();

        let err = assert_err!(manager.send_request(&mut host, &notch(), &steve()));
        assert!(matches!(err, TradeError::RequestAlreadyPending(_)));

        let err = assert_err!(manager.send_request(&mut host, &alex(), &notch()));
        assert!(matches!(err, TradeError::PendingRequest(_)));

        let err = assert_err!(manager.send_request(&mut host, &steve(), &notch()));
        assert!(matches!(err, TradeError::PendingRequest(_)));

        let err = assert_err!(manager.send_request(&mut host, &notch(), &alex()));
        assert!(matches!(err, TradeError::TargetBusy(_)));
    }

    #[test]
    fn test_request_rejected_when_in_trade() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);

        let err = assert_err!(manager.send_request(&mut host, &alex(), &notch()));
        assert!(matches!(err, TradeError::AlreadyInTrade(_)));

        let err = assert_err!(manager.send_request(&mut host, &notch(), &steve()));
        assert!(matches!(err, TradeError::TargetInTrade(_)));
    }

    #[test]
    fn test_request_out_of_range() {
        let (mut manager, mut host) = setup();
        host.move_to(&steve(), Location::new("world", 40.0, 64.0, 0.0));

        let err = assert_err!(manager.send_request(&mut host, &alex(), &steve()));
        assert!(matches!(err, TradeError::OutOfRange { .. }));

        host.move_to(&steve(), Location::new("nether", 1.0, 64.0, 0.0));
        let err = assert_err!(manager.send_request(&mut host, &alex(), &steve()));
        assert!(matches!(err, TradeError::OutOfRange { .. }));
    }

    #[test]
    fn test_distance_check_can_be_disabled() {
        let config = TradeConfig {
            check_distance: false,
            ..TradeConfig::default()
        };
        let (_, mut host) = setup();
        let mut manager = TradeManager::new(config).unwrap();
        host.move_to(&steve(), Location::new("world", 400.0, 64.0, 0.0));

        assert_ok!(manager.send_request(&mut host, &alex(), &steve()));
    }

    #[test]
    fn test_accept_starts_session() {
        let (mut manager, mut host) = setup();
        let id = start_trade(&mut manager, &mut host);

        assert!(manager.is_in_trade(&alex()));
        assert!(manager.is_in_trade(&steve()));
        assert!(!manager.has_pending_request(&alex()));
        assert_eq!(manager.session(&alex()).unwrap().id(), &id);
        assert_eq!(manager.active_trades_count(), 1);
        assert_eq!(manager.pending_requests_count(), 0);
        // Expiry timer was cancelled
        assert_eq!(host.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_reject_notifies_sender() {
        let (mut manager, mut host) = setup();
        let response = manager.send_request(&mut host, &alex(), &steve()).unwrap();

        let resolution = manager.respond(&mut host, &steve(), response, Decision::Reject);
        assert_eq!(resolution, Resolution::Rejected);
        assert!(host.messages_for(&alex()).contains(&MessageKey::RequestDeclined));
        assert!(!manager.has_pending_request(&alex()));
        assert_eq!(host.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_stale_response_ignored() {
        let (mut manager, mut host) = setup();
        let response = manager.send_request(&mut host, &alex(), &steve()).unwrap();
        let wrong = ResponseId(response.0.wrapping_add(1));

        assert_eq!(
            manager.respond(&mut host, &steve(), wrong, Decision::Accept),
            Resolution::Ignored
        );
        assert_eq!(
            manager.respond(&mut host, &notch(), response, Decision::Accept),
            Resolution::Ignored
        );
        assert!(manager.has_incoming_request(&steve()));

        manager.respond(&mut host, &steve(), response, Decision::Reject);
        assert_eq!(
            manager.respond(&mut host, &steve(), response, Decision::Accept),
            Resolution::Ignored
        );
    }

    #[test]
    fn test_accept_revalidates() {
        let (mut manager, mut host) = setup();
        let response = manager.send_request(&mut host, &alex(), &steve()).unwrap();
        host.move_to(&steve(), Location::new("world", 100.0, 64.0, 0.0));

        let resolution = manager.respond(&mut host, &steve(), response, Decision::Accept);
        assert_eq!(resolution, Resolution::AcceptFailed);
        assert!(!manager.is_in_trade(&alex()));
        assert!(!manager.has_pending_request(&steve()));
    }

    #[test]
    fn test_accept_with_allocation_failure_registers_nothing() {
        let (mut manager, mut host) = setup();
        let response = manager.send_request(&mut host, &alex(), &steve()).unwrap();
        host.fail_allocations(true);

        let resolution = manager.respond(&mut host, &steve(), response, Decision::Accept);
        assert_eq!(resolution, Resolution::AcceptFailed);
        assert!(!manager.is_in_trade(&alex()));
        assert!(!manager.is_in_trade(&steve()));
    }

    #[test]
    fn test_request_expires() {
        let (mut manager, mut host) = setup();
        let response = manager.send_request(&mut host, &alex(), &steve()).unwrap();

        advance(&mut manager, &mut host, Duration::from_secs(29));
        assert!(manager.has_incoming_request(&steve()));

        advance(&mut manager, &mut host, Duration::from_secs(1));
        assert!(!manager.has_incoming_request(&steve()));
        assert!(host.messages_for(&alex()).contains(&MessageKey::RequestExpired));
        assert!(host.messages_for(&steve()).contains(&MessageKey::RequestExpired));

        assert_eq!(
            manager.respond(&mut host, &steve(), response, Decision::Accept),
            Resolution::Ignored
        );
        assert_ok!(manager.send_request(&mut host, &alex(), &steve()));
    }

    #[test]
    fn test_stale_expiry_ignored() {
        let (mut manager, mut host) = setup();
        let first = manager.send_request(&mut host, &alex(), &steve()).unwrap();
        manager.cancel_request(&mut host, &alex());
        manager.send_request(&mut host, &alex(), &steve()).unwrap();

        let outcome = manager.handle(
            &mut host,
            TradeEvent::Timer(TimerTask::ExpireRequest {
                target: steve(),
                response: first,
            }),
        );
        assert_eq!(outcome, EventOutcome::Ignored);
        assert!(manager.has_incoming_request(&steve()));
    }

    #[test]
    fn test_cancel_request_by_either_side() {
        let (mut manager, mut host) = setup();
        manager.send_request(&mut host, &alex(), &steve()).unwrap();
        assert!(manager.cancel_request(&mut host, &alex()));
        assert_eq!(host.scheduler().pending_count(), 0);

        manager.send_request(&mut host, &alex(), &steve()).unwrap();
        assert!(manager.cancel_request(&mut host, &steve()));
        assert!(!manager.cancel_request(&mut host, &steve()));
        assert_eq!(manager.pending_requests_count(), 0);
    }

    #[test]
    fn test_disconnect_withdraws_request() {
        let (mut manager, mut host) = setup();
        manager.send_request(&mut host, &alex(), &steve()).unwrap();
        host.set_online(&alex(), false);

        let outcome = manager.handle(&mut host, TradeEvent::Disconnected { actor: alex() });
        assert_eq!(outcome, EventOutcome::Applied);
        assert!(!manager.has_incoming_request(&steve()));
        assert!(host.messages_for(&steve()).contains(&MessageKey::RequestCancelled));
    }

    #[test]
    fn test_completion_timer_exchanges() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);
        host.put(&alex(), 0, Item::new(264, 0, 3)).unwrap();
        host.stage(&mut manager, &alex(), 0, 0).unwrap();

        manager.toggle_ready(&mut host, &alex());
        manager.toggle_ready(&mut host, &steve());
        advance(&mut manager, &mut host, Duration::from_millis(1999));
        assert!(manager.is_in_trade(&alex()));

        advance(&mut manager, &mut host, Duration::from_millis(1));
        assert!(!manager.is_in_trade(&alex()));
        assert!(!manager.is_in_trade(&steve()));
        assert_eq!(host.count_items(&steve(), 264), 3);
        assert_eq!(host.count_items(&alex(), 264), 0);
    }

    #[test]
    fn test_manual_completion_races_timer() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);
        host.put(&alex(), 0, Item::new(264, 0, 3)).unwrap();
        host.stage(&mut manager, &alex(), 0, 0).unwrap();
        manager.toggle_ready(&mut host, &alex());
        manager.toggle_ready(&mut host, &steve());

        assert!(manager.complete_trade(&mut host, &alex()));
        advance(&mut manager, &mut host, Duration::from_secs(5));
        assert_eq!(host.count_items(&steve(), 264), 3);
    }

    #[test]
    fn test_container_close_cancels_after_grace() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);
        host.put(&steve(), 0, Item::new(1, 0, 16)).unwrap();
        host.stage(&mut manager, &steve(), 0, 5).unwrap();

        host.close_container(&mut manager, &steve());
        assert!(manager.is_in_trade(&steve()));

        advance(&mut manager, &mut host, Duration::from_millis(50));
        assert!(!manager.is_in_trade(&steve()));
        assert_eq!(host.count_items(&steve(), 1), 16);
        assert!(host.messages_for(&alex()).contains(&MessageKey::PartnerCancelled));
    }

    #[test]
    fn test_container_reopened_within_grace() {
        let (mut manager, mut host) = setup();
        let id = start_trade(&mut manager, &mut host);

        host.close_container(&mut manager, &steve());
        host.show(&id, &steve());
        advance(&mut manager, &mut host, Duration::from_millis(50));
        assert!(manager.is_in_trade(&steve()));
    }

    #[test]
    fn test_repeated_close_keeps_one_grace_timer() {
        let (mut manager, mut host) = setup();
        let id = start_trade(&mut manager, &mut host);

        for _ in 0..3 {
            host.close_container(&mut manager, &steve());
            host.show(&id, &steve());
        }
        assert_eq!(host.scheduler().pending_count(), 1);

        host.close_container(&mut manager, &steve());
        assert_eq!(host.scheduler().pending_count(), 1);
        advance(&mut manager, &mut host, Duration::from_millis(50));
        assert!(!manager.is_in_trade(&steve()));
        assert_eq!(host.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_resolved_session_drops_close_grace() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);

        host.close_container(&mut manager, &alex());
        assert_eq!(host.scheduler().pending_count(), 1);
        assert!(manager.cancel_trade(&mut host, &steve()));
        assert_eq!(host.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_teleport_out_of_range() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);

        host.teleport(&mut manager, &alex(), Location::new("world", 100.0, 64.0, 0.0));
        assert!(manager.is_in_trade(&alex()));

        advance(&mut manager, &mut host, Duration::from_millis(250));
        assert!(!manager.is_in_trade(&alex()));
        assert!(host.messages_for(&steve()).contains(&MessageKey::PartnerCancelled));
    }

    #[test]
    fn test_teleport_back_within_grace_keeps_trade() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);

        host.teleport(&mut manager, &alex(), Location::new("world", 100.0, 64.0, 0.0));
        host.move_to(&alex(), Location::new("world", 1.0, 64.0, 0.0));
        advance(&mut manager, &mut host, Duration::from_millis(250));
        assert!(manager.is_in_trade(&alex()));
    }

    #[test]
    fn test_teleport_within_range_ignored() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);

        host.teleport(&mut manager, &alex(), Location::new("world", 8.0, 64.0, 0.0));
        assert_eq!(host.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_death_cancels() {
        let (mut manager, mut host) = setup();
        start_trade(&mut manager, &mut host);

        host.kill(&mut manager, &steve());
        assert!(!manager.is_in_trade(&alex()));
        assert!(host.messages_for(&steve()).contains(&MessageKey::TradeCancelled));
    }

    #[test]
    fn test_cancel_all_trades() {
        let (mut manager, mut host) = setup();
        assert_eq!(manager.cancel_all_trades(&mut host), 0);

        start_trade(&mut manager, &mut host);
        host.add_actor(ActorId::new("jeb"), "Jeb", Location::new("world", 2.0, 64.0, 0.0));
        host.grant_permission(&ActorId::new("jeb"), "trade.use");
        manager.send_request(&mut host, &ActorId::new("jeb"), &notch()).unwrap();

        assert_eq!(manager.cancel_all_trades(&mut host), 1);
        assert_eq!(manager.active_trades_count(), 0);
        assert_eq!(manager.pending_requests_count(), 0);
        assert_eq!(host.scheduler().pending_count(), 0);
        assert_eq!(host.container_count(), 0);
    }
}
