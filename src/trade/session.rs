//! Trade session state machine
//!
//! A session owns the escrow of both participants. Items staged in the
//! shared container leave the owner's storage (the host commits that move)
//! and live in `staged_a` / `staged_b` until the session resolves: on
//! completion each escrow goes to the partner, on cancellation back to its
//! owner. Nothing is ever discarded.

use crate::error::{Result, TradeError};
use crate::messages::{Cue, MessageKey};
use crate::ports::{Delivery, Host, TradeContext};
use crate::types::{ActorId, Item, SessionId, TimerHandle};
use crate::validators::{are_valid, filter_empty, has_capacity_for};
use std::collections::BTreeMap;
use std::time::SystemTime;

use super::types::{
    CancelReason, InteractionVerdict, RejectReason, Side, TimerTask, TradePhase, Zone,
};

/// Item id of the glass panes used for decoration
const PANE_ID: u32 = 95;
const PANE_GRAY: u16 = 7;
const PANE_RED: u16 = 14;
const PANE_YELLOW: u16 = 4;
const PANE_LIME: u16 = 5;

/// A trade between two actors
#[derive(Clone, Debug)]
pub struct TradeSession {
    id: SessionId,
    side_a: ActorId,
    side_b: ActorId,
    phase: TradePhase,
    ready_a: bool,
    ready_b: bool,
    staged_a: BTreeMap<usize, Item>,
    staged_b: BTreeMap<usize, Item>,
    completion_timer: Option<TimerHandle>,
    container_open: bool,
    created_at: SystemTime,
}

impl TradeSession {
    /// Create a session; `side_a` is the requester
    pub fn new(id: SessionId, side_a: ActorId, side_b: ActorId) -> Self {
        Self {
            id,
            side_a,
            side_b,
            phase: TradePhase::Active,
            ready_a: false,
            ready_b: false,
            staged_a: BTreeMap::new(),
            staged_b: BTreeMap::new(),
            completion_timer: None,
            container_open: false,
            created_at: SystemTime::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn side_a(&self) -> &ActorId {
        &self.side_a
    }

    pub fn side_b(&self) -> &ActorId {
        &self.side_b
    }

    pub fn phase(&self) -> TradePhase {
        self.phase
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn actor(&self, side: Side) -> &ActorId {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    pub fn side_of(&self, actor: &ActorId) -> Option<Side> {
        if actor == &self.side_a {
            Some(Side::A)
        } else if actor == &self.side_b {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn involves(&self, actor: &ActorId) -> bool {
        self.side_of(actor).is_some()
    }

    /// The partner of `actor`
    pub fn other(&self, actor: &ActorId) -> Option<&ActorId> {
        self.side_of(actor).map(|side| self.actor(side.other()))
    }

    pub fn is_ready(&self, side: Side) -> bool {
        match side {
            Side::A => self.ready_a,
            Side::B => self.ready_b,
        }
    }

    pub fn both_ready(&self) -> bool {
        self.ready_a && self.ready_b
    }

    /// Escrow of one side, keyed by container slot
    pub fn staged(&self, side: Side) -> &BTreeMap<usize, Item> {
        match side {
            Side::A => &self.staged_a,
            Side::B => &self.staged_b,
        }
    }

    pub fn completion_timer(&self) -> Option<TimerHandle> {
        self.completion_timer
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TradePhase::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase == TradePhase::Cancelled
    }

    /// Validate both actors, allocate the shared container and show it.
    ///
    /// On error nothing is left allocated and the session must be dropped.
    pub fn start<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>) -> Result<()> {
        let a = ctx.status(&self.side_a);
        let b = ctx.status(&self.side_b);
        if !are_valid(a.as_ref(), b.as_ref()) {
            return Err(TradeError::ActorUnavailable(format!(
                "{} or {}",
                self.side_a, self.side_b
            )));
        }

        ctx.host
            .allocate(&self.id, &self.side_a, &self.side_b, &ctx.config.layout)?;
        self.container_open = true;

        let separator = Item::new(PANE_ID, PANE_GRAY, 1)
            .named(ctx.render(MessageKey::SeparatorName, &[]));
        for slot in &ctx.config.layout.separator_slots {
            ctx.host.set_slot(&self.id, *slot, Some(separator.clone()));
        }
        self.refresh_ready_display(ctx);

        for actor in [&self.side_a, &self.side_b] {
            ctx.host.show(&self.id, actor);
            ctx.cue(actor, Cue::Orb);
        }
        ctx.notify_about(&self.side_a, MessageKey::TradeStarted, &self.side_b);
        ctx.notify_about(&self.side_b, MessageKey::TradeStarted, &self.side_a);

        tracing::info!(session = %self.id, a = %self.side_a, b = %self.side_b, "Trade session started");
        Ok(())
    }

    /// Apply a slot change reported by the host.
    ///
    /// `item` is what the slot would hold after the change.
    pub fn handle_interaction<H: Host>(
        &mut self,
        ctx: &mut TradeContext<'_, H>,
        actor: &ActorId,
        slot: usize,
        item: Option<Item>,
    ) -> InteractionVerdict {
        let Some(side) = self.side_of(actor) else {
            return InteractionVerdict::Ignored;
        };
        if self.phase.is_terminal() {
            return InteractionVerdict::Rejected(RejectReason::Closed);
        }

        match ctx.config.layout.zone(slot) {
            Zone::Ready => {
                self.toggle_side(ctx, side);
                InteractionVerdict::Control
            }
            Zone::Separator | Zone::Outside => {
                InteractionVerdict::Rejected(RejectReason::ReadOnlySlot)
            }
            Zone::Side(owner) if owner != side => {
                tracing::warn!(session = %self.id, actor = %actor, slot, "Rejected change to partner's side");
                ctx.notify(actor, MessageKey::NotYourSide, &[]);
                InteractionVerdict::Rejected(RejectReason::ForeignZone)
            }
            Zone::Side(_) => self.stage(ctx, side, slot, item),
        }
    }

    fn stage<H: Host>(
        &mut self,
        ctx: &mut TradeContext<'_, H>,
        side: Side,
        slot: usize,
        item: Option<Item>,
    ) -> InteractionVerdict {
        let actor = self.actor(side).clone();
        let item = item.filter(|item| !item.is_empty());

        if let Some(candidate) = &item {
            if !ctx.can_trade(&actor, candidate) {
                tracing::warn!(session = %self.id, actor = %actor, item = %candidate, "Rejected blacklisted item");
                ctx.notify(&actor, MessageKey::BlacklistItem, &[]);
                ctx.cue(&actor, Cue::Bass);
                return InteractionVerdict::Rejected(RejectReason::Blacklisted);
            }
        }

        let changed = self.staged(side).get(&slot) != item.as_ref();
        if changed && self.is_ready(side) {
            self.set_ready(ctx, side, false);
        }

        let staged = match side {
            Side::A => &mut self.staged_a,
            Side::B => &mut self.staged_b,
        };
        match item {
            Some(item) => {
                tracing::debug!(session = %self.id, actor = %actor, slot, item = %item, "Staged item");
                staged.insert(slot, item);
            }
            None => {
                tracing::debug!(session = %self.id, actor = %actor, slot, "Unstaged slot");
                staged.remove(&slot);
            }
        }

        self.refresh_ready_display(ctx);
        InteractionVerdict::Accepted
    }

    /// Flip `actor`'s ready flag; returns false if `actor` is not a participant
    pub fn toggle_ready<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>, actor: &ActorId) -> bool {
        match self.side_of(actor) {
            Some(side) if self.phase.is_active() => {
                self.toggle_side(ctx, side);
                true
            }
            _ => false,
        }
    }

    fn toggle_side<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>, side: Side) {
        let ready = !self.is_ready(side);
        self.set_ready(ctx, side, ready);
        if ready {
            ctx.cue(&self.actor(side).clone(), Cue::LevelUp);
        }

        if self.both_ready() && self.phase == TradePhase::Active {
            self.begin_countdown(ctx);
        }
    }

    /// Set a flag, tell both sides, and drop out of the countdown if needed
    fn set_ready<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>, side: Side, ready: bool) {
        match side {
            Side::A => self.ready_a = ready,
            Side::B => self.ready_b = ready,
        }

        let actor = self.actor(side).clone();
        let partner = self.actor(side.other()).clone();
        if ready {
            ctx.notify(&actor, MessageKey::TradeReady, &[]);
            ctx.notify_about(&partner, MessageKey::PartnerReady, &actor);
        } else {
            ctx.notify(&actor, MessageKey::TradeNotReady, &[]);
            ctx.notify_about(&partner, MessageKey::PartnerNotReady, &actor);
        }
        tracing::debug!(session = %self.id, actor = %actor, ready, "Ready flag changed");

        if !ready && self.phase == TradePhase::Completing {
            self.abort_countdown(ctx);
        }
        self.refresh_ready_display(ctx);
    }

    fn begin_countdown<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>) {
        self.phase = TradePhase::Completing;

        for actor in [self.side_a.clone(), self.side_b.clone()] {
            ctx.notify(&actor, MessageKey::BothReady, &[]);
            ctx.cue(&actor, Cue::LevelUp);
        }

        let handle = ctx.host.schedule(
            ctx.config.completion_delay(),
            TimerTask::CompleteTrade {
                session: self.id.clone(),
            },
        );
        self.completion_timer = Some(handle);
        tracing::info!(session = %self.id, delay_ms = ctx.config.completion_delay_ms, "Both sides ready, completion scheduled");
    }

    fn abort_countdown<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>) {
        if let Some(handle) = self.completion_timer.take() {
            ctx.host.cancel(handle);
        }
        self.phase = TradePhase::Active;
        tracing::debug!(session = %self.id, "Completion countdown aborted");
    }

    /// Exchange both escrows.
    ///
    /// Runs at most once: returns false without side effects when the session
    /// is terminal or not both ready. Validation or capacity failures cancel
    /// the session with full rollback.
    pub fn complete<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>) -> bool {
        if self.phase.is_terminal() {
            tracing::debug!(session = %self.id, "Completion ignored, session already resolved");
            return false;
        }
        if self.phase != TradePhase::Completing || !self.both_ready() {
            tracing::debug!(session = %self.id, "Completion ignored, sides not ready");
            return false;
        }
        if let Some(handle) = self.completion_timer.take() {
            ctx.host.cancel(handle);
        }

        let a = ctx.status(&self.side_a);
        let b = ctx.status(&self.side_b);
        if !are_valid(a.as_ref(), b.as_ref()) {
            self.cancel(ctx, CancelReason::ActorUnavailable);
            return false;
        }

        let items_a = filter_empty(&self.staged_a.values().cloned().collect::<Vec<_>>());
        let items_b = filter_empty(&self.staged_b.values().cloned().collect::<Vec<_>>());

        for (receiver, incoming) in [(Side::A, &items_b), (Side::B, &items_a)] {
            let actor = self.actor(receiver).clone();
            if let Err(err) = ensure_capacity(&ctx.host.storage(&actor), incoming, &actor) {
                let partner = self.actor(receiver.other()).clone();
                tracing::warn!(session = %self.id, "Completion aborted: {}", err);
                ctx.notify(&actor, MessageKey::InventoryFull, &[]);
                ctx.notify_about(&partner, MessageKey::PartnerInventoryFull, &actor);
                self.cancel(ctx, CancelReason::InventoryFull(actor));
                return false;
            }
        }

        // Withdraw both escrows before granting anything
        let escrow_a = std::mem::take(&mut self.staged_a);
        let escrow_b = std::mem::take(&mut self.staged_b);
        for slot in escrow_a.keys().chain(escrow_b.keys()) {
            ctx.host.set_slot(&self.id, *slot, None);
        }

        let side_a = self.side_a.clone();
        let side_b = self.side_b.clone();
        self.deliver(ctx, &side_a, escrow_b.into_values());
        self.deliver(ctx, &side_b, escrow_a.into_values());

        self.phase = TradePhase::Completed;
        for actor in [&side_a, &side_b] {
            ctx.notify(actor, MessageKey::TradeCompleted, &[]);
            ctx.cue(actor, Cue::LevelUp);
        }
        self.teardown(ctx);

        tracing::info!(
            session = %self.id,
            a_gave = items_a.len(),
            b_gave = items_b.len(),
            "Trade completed"
        );
        true
    }

    /// Return every escrowed item to its owner and close the session.
    ///
    /// Idempotent: returns false if the session was already resolved.
    pub fn cancel<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>, reason: CancelReason) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = TradePhase::Cancelled;

        if let Some(handle) = self.completion_timer.take() {
            ctx.host.cancel(handle);
        }

        let escrow_a = std::mem::take(&mut self.staged_a);
        let escrow_b = std::mem::take(&mut self.staged_b);
        let side_a = self.side_a.clone();
        let side_b = self.side_b.clone();
        self.deliver(ctx, &side_a, escrow_a.into_values());
        self.deliver(ctx, &side_b, escrow_b.into_values());

        match reason.culprit().and_then(|c| self.other(c).map(|o| (c.clone(), o.clone()))) {
            Some((culprit, partner)) => {
                ctx.notify(&culprit, MessageKey::TradeCancelled, &[]);
                ctx.notify_about(&partner, MessageKey::PartnerCancelled, &culprit);
            }
            None => {
                ctx.notify(&side_a, MessageKey::TradeCancelled, &[]);
                ctx.notify(&side_b, MessageKey::TradeCancelled, &[]);
            }
        }
        self.teardown(ctx);

        tracing::info!(session = %self.id, ?reason, category = ?reason.category(), "Trade cancelled");
        true
    }

    /// Grant items to `actor`, dropping what does not fit
    fn deliver<H: Host>(
        &self,
        ctx: &mut TradeContext<'_, H>,
        actor: &ActorId,
        items: impl IntoIterator<Item = Item>,
    ) {
        let mut dropped = 0usize;
        for item in items.into_iter().filter(|item| !item.is_empty()) {
            if ctx.host.grant_or_drop(actor, item) == Delivery::Dropped {
                dropped += 1;
            }
        }

        if dropped > 0 {
            tracing::warn!(session = %self.id, actor = %actor, dropped, "Items dropped into the world");
            ctx.notify(actor, MessageKey::ItemsDropped, &[]);
        }
    }

    fn teardown<H: Host>(&mut self, ctx: &mut TradeContext<'_, H>) {
        if !self.container_open {
            return;
        }
        for actor in [&self.side_a, &self.side_b] {
            if ctx.host.is_online(actor) {
                ctx.host.hide(&self.id, actor);
            }
        }
        ctx.host.destroy(&self.id);
        self.container_open = false;
    }

    fn refresh_ready_display<H: Host>(&self, ctx: &mut TradeContext<'_, H>) {
        if !self.container_open {
            return;
        }

        let (meta, label) = match (self.ready_a, self.ready_b) {
            (false, false) => (PANE_RED, ctx.render(MessageKey::ReadyNone, &[])),
            (true, true) => (PANE_LIME, ctx.render(MessageKey::ReadyBoth, &[])),
            (true, false) | (false, true) => {
                let ready = if self.ready_a { &self.side_a } else { &self.side_b };
                let name = ctx.name(ready);
                (
                    PANE_YELLOW,
                    ctx.render(MessageKey::ReadyOne, &[("player", name)]),
                )
            }
        };

        let button = Item::new(PANE_ID, meta, 1).named(label);
        ctx.host
            .set_slot(&self.id, ctx.config.layout.ready_slot, Some(button));
    }
}

fn ensure_capacity(storage: &[Option<Item>], incoming: &[Item], actor: &ActorId) -> Result<()> {
    if has_capacity_for(storage, incoming) {
        Ok(())
    } else {
        Err(TradeError::InsufficientCapacity {
            actor: actor.to_string(),
            incoming: incoming.len(),
        })
    }
}
