//! Per-page bootstrap.
//!
//! A [`Session`] owns one cooldown engine, one gate and one overlay manager
//! together with the store, page, renderer and clock they operate on. The
//! host forwards raw clicks, DOM-change notifications and overlay decisions;
//! the session turns them into ritual transitions.
//!
//! Everything runs on one thread. The async [`Session::run`] loop only
//! multiplexes host events with the countdown ticker.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::clock::Clock;
use crate::cooldown::{CooldownEngine, RitualPhase};
use crate::gate::{AttemptDecision, ClickDisposition, Gate};
use crate::overlay::{OverlayOutcome, OverlayRenderer, Overlays, UserChoice};
use crate::page::{NodeId, Page};
use crate::stats::{Counter, StatsRecorder};
use crate::storage::{keys, Config, SafeStore, Store};

/// Something the host page reports to the session.
#[derive(Debug)]
pub enum HostEvent {
    /// A raw click on a bound element. If `reply` is set the disposition is
    /// sent back; otherwise a pass-through click is activated on the page.
    Click {
        node: NodeId,
        reply: Option<oneshot::Sender<ClickDisposition>>,
    },
    /// The document changed; new elements may need gating.
    Mutation,
    /// The user decided something on an overlay.
    Choice(UserChoice),
    Shutdown,
}

impl HostEvent {
    pub fn click(node: NodeId) -> Self {
        HostEvent::Click { node, reply: None }
    }
}

pub struct Session<S, P, R, C> {
    store: SafeStore<S>,
    page: P,
    renderer: R,
    clock: C,
    engine: CooldownEngine,
    gate: Gate,
    overlays: Overlays,
    min_reflection_chars: usize,
    tick_interval: Duration,
}

impl<S, P, R, C> Session<S, P, R, C>
where
    S: Store,
    P: Page,
    R: OverlayRenderer,
    C: Clock,
{
    pub fn new(store: S, page: P, renderer: R, clock: C, config: &Config) -> Self {
        Self {
            store: SafeStore::new(store),
            page,
            renderer,
            clock,
            engine: CooldownEngine::new(config.policy())
                .with_reflection_limit(config.ritual.reflection_limit),
            gate: Gate::new(config.gate.selectors.clone()),
            overlays: Overlays::new(),
            min_reflection_chars: config.ritual.min_reflection_chars,
            tick_interval: config.tick_interval(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn store(&self) -> &SafeStore<S> {
        &self.store
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn engine(&self) -> &CooldownEngine {
        &self.engine
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn overlays(&self) -> &Overlays {
        &self.overlays
    }

    pub fn phase(&self) -> RitualPhase {
        self.engine.phase()
    }

    pub fn into_parts(self) -> (S, P, R) {
        (self.store.into_inner(), self.page, self.renderer)
    }

    // ── Host entry points ────────────────────────────────────────────

    /// Gate what is on the page now and pick up a cooldown that outlived a
    /// reload.
    pub fn boot(&mut self) {
        self.apply_gates();
        self.resume_if_needed();
    }

    pub fn apply_gates(&mut self) -> usize {
        self.gate.apply_gates(&mut self.page)
    }

    /// DOM-change notification. Cheap and idempotent.
    pub fn on_mutation(&mut self) -> usize {
        self.apply_gates()
    }

    pub fn resume_if_needed(&mut self) {
        let now = self.clock.now_ms();
        let cooldown_until = self.store.get_u64(keys::COOLDOWN_UNTIL);
        if cooldown_until > now {
            debug!(cooldown_until, "resuming active cooldown");
            self.overlays
                .show_cooldown_overlay(&mut self.renderer, cooldown_until, now);
        }
    }

    /// The capture-phase listener of every bound element.
    pub fn handle_click(&mut self, node: NodeId) -> ClickDisposition {
        let disposition = self.gate.on_click(node);
        if disposition == ClickDisposition::Intercepted {
            self.on_engagement_attempt(node);
        }
        self.pump_synthetic_clicks();
        disposition
    }

    pub fn on_user_choice(&mut self, choice: UserChoice) {
        match self.overlays.choose(&mut self.renderer, choice) {
            Some(outcome) => self.handle_outcome(outcome),
            None => debug!("choice ignored, no matching overlay"),
        }
        self.pump_synthetic_clicks();
    }

    /// One countdown poll.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        self.engine.relock_due(&mut self.page, now);
        let pending_active = self.engine.is_pending_active();
        if let Some(outcome) = self.overlays.tick(&mut self.renderer, now, pending_active) {
            self.handle_outcome(outcome);
        }
        self.pump_synthetic_clicks();
    }

    /// Drive the session until `Shutdown` arrives or the channel closes.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HostEvent>) -> Self {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                event = events.recv() => match event {
                    Some(HostEvent::Click { node, reply }) => {
                        let disposition = self.handle_click(node);
                        match reply {
                            Some(tx) => {
                                let _ = tx.send(disposition);
                            }
                            None if disposition == ClickDisposition::PassThrough => {
                                self.page.activate(node);
                            }
                            None => {}
                        }
                    }
                    Some(HostEvent::Mutation) => {
                        self.on_mutation();
                    }
                    Some(HostEvent::Choice(choice)) => self.on_user_choice(choice),
                    Some(HostEvent::Shutdown) | None => break,
                },
            }
        }
        self
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn on_engagement_attempt(&mut self, node: NodeId) {
        let now = self.clock.now_ms();
        match self
            .gate
            .on_engagement_attempt(&mut self.store, &mut self.page, node, now)
        {
            AttemptDecision::Allowed => {}
            AttemptDecision::Blocked { cooldown_until } => {
                self.overlays
                    .show_cooldown_overlay(&mut self.renderer, cooldown_until, now);
            }
            AttemptDecision::Confirm { action } => {
                self.engine.begin_confirmation(action, node);
                self.overlays.show_confirm_overlay(
                    &mut self.renderer,
                    action.as_str(),
                    self.min_reflection_chars,
                );
            }
        }
    }

    fn handle_outcome(&mut self, outcome: OverlayOutcome) {
        let now = self.clock.now_ms();
        match outcome {
            OverlayOutcome::CooldownElapsed => {
                self.engine
                    .grant_unlock_window(&mut self.store, &mut self.page, now, self.gate.selectors());
            }
            OverlayOutcome::CooldownClosed => {}
            OverlayOutcome::PendingElapsed => {
                let committed = self.engine.commit_pending_cooldown(
                    &mut self.store,
                    &mut self.page,
                    now,
                    self.gate.selectors(),
                );
                if let Some(node) = committed.and_then(|c| c.replay) {
                    self.gate.trigger_native_click(&mut self.page, node);
                }
            }
            OverlayOutcome::PendingCanceled => {
                self.engine
                    .cancel_pending_cooldown(&mut self.store, &mut self.page, now);
            }
            OverlayOutcome::Confirmed { reflection } => {
                let Some(confirmation) = self.engine.take_confirmation() else {
                    debug!("confirmation without an attempt, ignored");
                    return;
                };
                let deadline = self
                    .engine
                    .start_cooldown(
                        &self.store,
                        now,
                        reflection,
                        confirmation.action,
                        Some(confirmation.element),
                    )
                    .cooldown_until;
                self.overlays
                    .show_pending_cooldown_overlay(&mut self.renderer, deadline, now);
            }
            OverlayOutcome::ConfirmCanceled => {
                self.engine.take_confirmation();
                StatsRecorder::new(&mut self.store).record(Counter::Canceled, now);
            }
        }
    }

    /// Deliver synthetic clicks the page queued instead of re-entering.
    fn pump_synthetic_clicks(&mut self) {
        loop {
            let queued = self.page.take_dispatched_clicks();
            if queued.is_empty() {
                break;
            }
            for node in queued {
                match self.gate.on_click(node) {
                    ClickDisposition::PassThrough => self.page.activate(node),
                    ClickDisposition::Intercepted => self.on_engagement_attempt(node),
                }
            }
        }
    }
}
