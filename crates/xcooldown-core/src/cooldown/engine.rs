//! Cooldown engine.
//!
//! Owns the one in-flight ritual of a page. Staging lives in memory only;
//! [`CooldownEngine::commit_pending_cooldown`] is the single place that
//! persists cooldown state.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> PendingConfirmation -> PendingCooldown -> (Committed | Canceled) -> Idle
//! ```
//!
//! Nothing staged here survives a page reload: an interrupted ritual does not
//! count.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::policy::{EscalationPolicy, EscalationPreview};
use crate::gate::{ActionType, UNLOCKED_CLASS};
use crate::page::{NodeId, Page};
use crate::stats::{Counter, Reflection, StatsRecorder, REFLECTION_LIMIT};
use crate::storage::{keys, SafeStore, StateMap, Store};

/// Extra delay before the visual relock, past the unlock window itself.
const RELOCK_GRACE_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RitualPhase {
    Idle,
    PendingConfirmation,
    PendingCooldown,
}

/// An attempt waiting for its reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub action: ActionType,
    pub element: NodeId,
}

/// A staged cooldown. Never written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCooldown {
    pub cooldown_until: u64,
    pub cooldown_ms: u64,
    pub reflection: String,
    pub action_type: ActionType,
    pub started_at: u64,
    pub next_escalation_count: u32,
}

impl PendingCooldown {
    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_ms.saturating_add(500) / 1000
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub escalation_count: u32,
    pub cooldown_seconds: u64,
    pub unlocked_until: u64,
    /// Original element to replay, present only if it is still attached.
    pub replay: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CooldownEngine {
    policy: EscalationPolicy,
    reflection_limit: usize,
    confirmation: Option<PendingConfirmation>,
    pending: Option<PendingCooldown>,
    /// Back-reference only; liveness is re-checked before replay.
    pending_action: Option<NodeId>,
    relock_at: Option<u64>,
}

impl Default for CooldownEngine {
    fn default() -> Self {
        Self::new(EscalationPolicy::default())
    }
}

impl CooldownEngine {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self {
            policy,
            reflection_limit: REFLECTION_LIMIT,
            confirmation: None,
            pending: None,
            pending_action: None,
            relock_at: None,
        }
    }

    pub fn with_reflection_limit(mut self, limit: usize) -> Self {
        self.reflection_limit = limit;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    pub fn phase(&self) -> RitualPhase {
        if self.pending.is_some() {
            RitualPhase::PendingCooldown
        } else if self.confirmation.is_some() {
            RitualPhase::PendingConfirmation
        } else {
            RitualPhase::Idle
        }
    }

    pub fn pending(&self) -> Option<&PendingCooldown> {
        self.pending.as_ref()
    }

    pub fn is_pending_active(&self) -> bool {
        self.pending.is_some()
    }

    pub fn confirmation(&self) -> Option<&PendingConfirmation> {
        self.confirmation.as_ref()
    }

    pub fn relock_at(&self) -> Option<u64> {
        self.relock_at
    }

    pub fn compute_next_escalation<S: Store>(
        &self,
        store: &SafeStore<S>,
        now: u64,
    ) -> EscalationPreview {
        let state = store.get(&[keys::ESCALATION_COUNT, keys::LAST_ATTEMPT_AT]);
        let read = |key: &str| {
            state
                .get(key)
                .and_then(crate::storage::value_as_u64)
                .unwrap_or(0)
        };
        let count = u32::try_from(read(keys::ESCALATION_COUNT)).unwrap_or(u32::MAX);
        self.policy.preview(count, read(keys::LAST_ATTEMPT_AT), now)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Remember which attempt the confirmation overlay is asking about.
    pub fn begin_confirmation(&mut self, action: ActionType, element: NodeId) {
        self.confirmation = Some(PendingConfirmation { action, element });
    }

    /// Drop the confirmation without starting anything.
    pub fn take_confirmation(&mut self) -> Option<PendingConfirmation> {
        self.confirmation.take()
    }

    /// Stage a cooldown in memory.
    ///
    /// Reads the store for the escalation preview but never writes to it,
    /// and leaves every lock-related class on the page untouched.
    pub fn start_cooldown<S: Store>(
        &mut self,
        store: &SafeStore<S>,
        now: u64,
        reflection: String,
        action_type: ActionType,
        action_element: Option<NodeId>,
    ) -> &PendingCooldown {
        let preview = self.compute_next_escalation(store, now);
        self.confirmation = None;
        self.pending_action = action_element;
        debug!(
            %action_type,
            duration_ms = preview.duration_ms,
            next_count = preview.next_count,
            "cooldown staged"
        );
        self.pending.insert(PendingCooldown {
            cooldown_until: preview.now.saturating_add(preview.duration_ms),
            cooldown_ms: preview.duration_ms,
            reflection,
            action_type,
            started_at: preview.now,
            next_escalation_count: preview.next_count,
        })
    }

    /// Persist the staged cooldown. No-op if nothing is staged.
    ///
    /// Writes the escalation state, bumps committed/confirmed counters,
    /// records the reflection, then grants an unlock window. The original
    /// element is handed back for replay only if it is still attached.
    pub fn commit_pending_cooldown<S: Store, P: Page>(
        &mut self,
        store: &mut SafeStore<S>,
        page: &mut P,
        now: u64,
        selectors: &[String],
    ) -> Option<CommitOutcome> {
        let pending = self.pending.take()?;
        let cooldown_seconds = pending.cooldown_seconds();

        let mut batch = StateMap::new();
        batch.insert(keys::COOLDOWN_UNTIL.into(), pending.cooldown_until.into());
        batch.insert(keys::UNLOCKED_UNTIL.into(), 0.into());
        batch.insert(
            keys::ESCALATION_COUNT.into(),
            pending.next_escalation_count.into(),
        );
        batch.insert(keys::LAST_ATTEMPT_AT.into(), pending.started_at.into());
        batch.insert(keys::LAST_COOLDOWN_SECONDS.into(), cooldown_seconds.into());
        store.set(batch);

        {
            let mut stats = StatsRecorder::new(store);
            stats.bump_total(Counter::CooldownsCommitted, 1);
            stats.bump_total(Counter::Confirmed, 1);
            stats.mark_last_cooldown(pending.started_at);
            stats.bump_daily(Counter::CooldownsCommitted, 1, now);
            stats.bump_daily(Counter::Confirmed, 1, now);
            stats.append_reflection(
                Reflection {
                    ts: pending.started_at,
                    action_type: pending.action_type,
                    reflection: pending.reflection,
                    cooldown_seconds,
                },
                self.reflection_limit,
            );
        }

        let unlocked_until = self.grant_unlock_window(store, page, now, selectors);

        let replay = self
            .pending_action
            .take()
            .filter(|node| page.is_attached(*node));
        if replay.is_none() {
            debug!("original element gone, skipping replay");
        }

        info!(
            action = %pending.action_type,
            escalation = pending.next_escalation_count,
            cooldown_seconds,
            "cooldown committed"
        );

        Some(CommitOutcome {
            escalation_count: pending.next_escalation_count,
            cooldown_seconds,
            unlocked_until,
            replay,
        })
    }

    /// Abandon the staged cooldown without escalating.
    pub fn cancel_pending_cooldown<S: Store, P: Page>(
        &mut self,
        store: &mut SafeStore<S>,
        page: &mut P,
        now: u64,
    ) {
        self.pending = None;
        self.pending_action = None;
        Self::relock_engagement(page);
        StatsRecorder::new(store).record(Counter::CooldownsCanceled, now);
        info!("pending cooldown canceled");
    }

    /// Open a short window in which exactly one engagement skips the ritual.
    ///
    /// Returns the window's end.
    pub fn grant_unlock_window<S: Store, P: Page>(
        &mut self,
        store: &mut SafeStore<S>,
        page: &mut P,
        now: u64,
        selectors: &[String],
    ) -> u64 {
        let window = self.policy.unlock_window_ms();
        let until = now.saturating_add(window);

        let mut batch = StateMap::new();
        batch.insert(keys::UNLOCKED_UNTIL.into(), until.into());
        batch.insert(keys::COOLDOWN_UNTIL.into(), 0.into());
        store.set(batch);

        for node in page.query_all(selectors) {
            page.add_class(node, UNLOCKED_CLASS);
        }
        self.relock_at = Some(until.saturating_add(RELOCK_GRACE_MS));
        debug!(until, "unlock window granted");
        until
    }

    /// Apply the scheduled visual relock once it is due.
    pub fn relock_due<P: Page>(&mut self, page: &mut P, now: u64) -> bool {
        match self.relock_at {
            Some(at) if now >= at => {
                self.relock_at = None;
                Self::relock_engagement(page);
                true
            }
            _ => false,
        }
    }

    /// Remove the unlocked styling. Never touches the store.
    pub fn relock_engagement<P: Page>(page: &mut P) {
        for node in page.nodes_with_class(UNLOCKED_CLASS) {
            page.remove_class(node, UNLOCKED_CLASS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::DEFAULT_SELECTORS;
    use crate::page::VirtualPage;
    use crate::storage::{MemoryStore, PersistedState};
    use serde_json::json;
    use std::time::Duration;

    const NOW: u64 = 1_760_000_000_000;
    const MIN: u64 = 60_000;

    fn selectors() -> Vec<String> {
        DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect()
    }

    fn stage(engine: &mut CooldownEngine, store: &SafeStore<MemoryStore>, now: u64, node: Option<NodeId>) {
        engine.start_cooldown(store, now, "I want to support this".into(), ActionType::Like, node);
    }

    #[test]
    fn staging_never_touches_the_store_or_page() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        page.add_class(like, UNLOCKED_CLASS);
        let store = SafeStore::new(MemoryStore::new());
        let mut engine = CooldownEngine::default();

        stage(&mut engine, &store, NOW, Some(like));

        for key in keys::ALL {
            assert!(!store.inner().contains(key), "{key} written during staging");
        }
        assert!(page.has_class(like, UNLOCKED_CLASS));
        assert_eq!(engine.phase(), RitualPhase::PendingCooldown);
        let pending = engine.pending().unwrap();
        assert_eq!(pending.cooldown_until, NOW + MIN);
        assert_eq!(pending.next_escalation_count, 1);
    }

    #[test]
    fn commit_persists_and_grants_unlock() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        let mut store = SafeStore::new(MemoryStore::new());
        let mut engine = CooldownEngine::default();

        stage(&mut engine, &store, NOW, Some(like));
        let done = NOW + MIN;
        let outcome = engine
            .commit_pending_cooldown(&mut store, &mut page, done, &selectors())
            .unwrap();

        assert_eq!(outcome.escalation_count, 1);
        assert_eq!(outcome.cooldown_seconds, 60);
        assert_eq!(outcome.replay, Some(like));
        assert_eq!(outcome.unlocked_until, done + 15_000);

        let state = PersistedState::load(&store);
        assert_eq!(state.cooldown_until, 0);
        assert_eq!(state.unlocked_until, done + 15_000);
        assert_eq!(state.escalation_count, 1);
        assert_eq!(state.last_attempt_at, NOW);
        assert_eq!(state.last_cooldown_seconds, 60);
        assert_eq!(state.totals["cooldownsCommitted"], 1);
        assert_eq!(state.totals["confirmed"], 1);
        assert_eq!(state.totals["lastCooldownAt"], NOW);
        assert_eq!(state.reflections.len(), 1);
        assert_eq!(state.reflections[0].cooldown_seconds, 60);
        assert!(page.has_class(like, UNLOCKED_CLASS));
        assert_eq!(engine.phase(), RitualPhase::Idle);
    }

    #[test]
    fn commit_without_pending_is_noop() {
        let mut page = VirtualPage::new();
        let mut store = SafeStore::new(MemoryStore::new());
        let mut engine = CooldownEngine::default();
        assert!(engine
            .commit_pending_cooldown(&mut store, &mut page, NOW, &selectors())
            .is_none());
        assert!(!store.inner().contains(keys::TOTALS));
    }

    #[test]
    fn commit_skips_replay_for_detached_element() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        let mut store = SafeStore::new(MemoryStore::new());
        let mut engine = CooldownEngine::default();

        stage(&mut engine, &store, NOW, Some(like));
        page.detach(like);
        let outcome = engine
            .commit_pending_cooldown(&mut store, &mut page, NOW + MIN, &selectors())
            .unwrap();
        assert_eq!(outcome.replay, None);
        assert_eq!(PersistedState::load(&store).escalation_count, 1);
    }

    #[test]
    fn cancel_never_escalates() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        let mut backend = MemoryStore::new();
        backend.seed(keys::ESCALATION_COUNT, json!(2));
        backend.seed(keys::LAST_ATTEMPT_AT, json!(NOW - 5 * MIN));
        let mut store = SafeStore::new(backend);
        let mut engine = CooldownEngine::default();

        stage(&mut engine, &store, NOW, Some(like));
        assert_eq!(engine.pending().unwrap().cooldown_ms, 15 * MIN);
        page.add_class(like, UNLOCKED_CLASS);
        engine.cancel_pending_cooldown(&mut store, &mut page, NOW + 1_000);

        let state = PersistedState::load(&store);
        assert_eq!(state.escalation_count, 2);
        assert_eq!(state.last_attempt_at, NOW - 5 * MIN);
        assert_eq!(state.cooldown_until, 0);
        assert_eq!(state.totals["cooldownsCanceled"], 1);
        assert!(!page.has_class(like, UNLOCKED_CLASS));
        assert!(!engine.is_pending_active());
    }

    #[test]
    fn relock_happens_after_window_plus_grace() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        let mut store = SafeStore::new(MemoryStore::new());
        let mut engine = CooldownEngine::default();

        let until = engine.grant_unlock_window(&mut store, &mut page, NOW, &selectors());
        assert!(page.has_class(like, UNLOCKED_CLASS));
        assert!(!engine.relock_due(&mut page, until));
        assert!(page.has_class(like, UNLOCKED_CLASS));
        assert!(engine.relock_due(&mut page, until + RELOCK_GRACE_MS));
        assert!(!page.has_class(like, UNLOCKED_CLASS));
        assert!(engine.relock_at().is_none());
    }

    #[test]
    fn huge_windows_saturate_instead_of_overflowing() {
        let mut page = VirtualPage::new();
        page.insert("like");
        let mut store = SafeStore::new(MemoryStore::new());
        let mut engine = CooldownEngine::new(EscalationPolicy {
            ladder_secs: vec![u64::MAX / 1000],
            reset_window: Duration::from_secs(60),
            unlock_window: Duration::from_secs(18_446_744_073_709_551),
        });

        stage(&mut engine, &store, NOW, None);
        assert_eq!(engine.pending().unwrap().cooldown_until, u64::MAX);

        let until = engine.grant_unlock_window(&mut store, &mut page, NOW, &selectors());
        assert_eq!(until, u64::MAX);
        assert_eq!(engine.relock_at(), Some(u64::MAX));
    }

    #[test]
    fn confirmation_phase_is_tracked() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        let mut engine = CooldownEngine::default();
        engine.begin_confirmation(ActionType::Like, like);
        assert_eq!(engine.phase(), RitualPhase::PendingConfirmation);
        let confirmation = engine.take_confirmation().unwrap();
        assert_eq!(confirmation.element, like);
        assert_eq!(engine.phase(), RitualPhase::Idle);
    }
}
