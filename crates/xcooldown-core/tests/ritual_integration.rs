//! End-to-end ritual scenarios against an in-memory page and store.

use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use xcooldown_core::gate::{GATED_CLASS, UNLOCKED_CLASS};
use xcooldown_core::overlay::{CONFIRM_OVERLAY_ID, COOLDOWN_OVERLAY_ID};
use xcooldown_core::storage::keys;
use xcooldown_core::{
    ClickDisposition, Config, HeadlessRenderer, HostEvent, ManualClock, MemoryStore, NodeId,
    OverlayView, PersistedState, RitualPhase, Session, UserChoice, VirtualPage,
};

const NOW: u64 = 1_760_000_000_000;
const MIN: u64 = 60_000;

type TestSession = Session<MemoryStore, VirtualPage, HeadlessRenderer, ManualClock>;

fn setup_with(store: MemoryStore) -> (TestSession, ManualClock, NodeId) {
    let clock = ManualClock::new(NOW);
    let mut page = VirtualPage::new();
    let like = page.insert("like");
    let mut session = Session::new(
        store,
        page,
        HeadlessRenderer::new(),
        clock.clone(),
        &Config::default(),
    );
    session.boot();
    (session, clock, like)
}

fn setup() -> (TestSession, ManualClock, NodeId) {
    setup_with(MemoryStore::new())
}

fn proceed() -> UserChoice {
    UserChoice::Proceed {
        reflection: "I actually want to support this".into(),
    }
}

fn mounted(session: &TestSession, id: &str) -> bool {
    session.renderer().view(id).is_some()
}

fn state(session: &TestSession) -> PersistedState {
    PersistedState::load(session.store())
}

/// Click, reflect and wait out the whole countdown.
fn full_ritual(session: &mut TestSession, clock: &ManualClock, node: NodeId) -> u64 {
    assert_eq!(session.handle_click(node), ClickDisposition::Intercepted);
    session.on_user_choice(proceed());
    let secs = session.engine().pending().map(|p| p.cooldown_seconds()).unwrap();
    clock.advance_secs(secs);
    session.tick();
    secs
}

#[test]
fn like_goes_through_confirm_countdown_commit_and_replay() {
    let (mut session, clock, like) = setup();
    assert!(session.page().has_class(like, GATED_CLASS));

    assert_eq!(session.handle_click(like), ClickDisposition::Intercepted);
    assert_eq!(session.phase(), RitualPhase::PendingConfirmation);
    assert_eq!(
        session.renderer().view(CONFIRM_OVERLAY_ID),
        Some(&OverlayView::Confirm {
            action_label: "like".into(),
            min_chars: 12
        })
    );

    session.on_user_choice(proceed());
    assert_eq!(session.phase(), RitualPhase::PendingCooldown);
    assert!(!mounted(&session, CONFIRM_OVERLAY_ID));
    assert_eq!(
        session.renderer().view(COOLDOWN_OVERLAY_ID),
        Some(&OverlayView::PendingCooldown { remaining_secs: 60 })
    );
    assert!(session.store().inner().peek(keys::COOLDOWN_UNTIL).is_none());

    clock.advance_secs(30);
    session.tick();
    assert_eq!(
        session.renderer().view(COOLDOWN_OVERLAY_ID),
        Some(&OverlayView::PendingCooldown { remaining_secs: 30 })
    );
    assert!(session.page().activations().is_empty());

    clock.advance_secs(30);
    session.tick();

    let persisted = state(&session);
    assert_eq!(persisted.escalation_count, 1);
    assert_eq!(persisted.cooldown_until, 0);
    assert_eq!(persisted.unlocked_until, NOW + MIN + 15_000);
    assert_eq!(persisted.last_cooldown_seconds, 60);
    assert_eq!(persisted.totals["attempts"], 1);
    assert_eq!(persisted.reflections[0].reflection, "I actually want to support this");
    assert_eq!(session.page().activations(), &[like]);
    assert!(session.page().has_class(like, UNLOCKED_CLASS));
    assert!(!session.gate().is_bypass_armed(like));
    assert_eq!(session.phase(), RitualPhase::Idle);
}

#[test]
fn never_mind_cancels_without_escalating() {
    let (mut session, clock, like) = setup();
    session.handle_click(like);
    session.on_user_choice(proceed());
    clock.advance_secs(20);
    session.tick();

    session.on_user_choice(UserChoice::NeverMind);
    clock.advance_secs(120);
    session.tick();

    let persisted = state(&session);
    assert_eq!(persisted.cooldown_until, 0);
    assert_eq!(persisted.escalation_count, 0);
    assert_eq!(persisted.last_attempt_at, 0);
    assert_eq!(persisted.totals["cooldownsCanceled"], 1);
    assert!(!persisted.totals.contains_key("cooldownsCommitted"));
    assert!(session.page().activations().is_empty());
    assert!(!mounted(&session, COOLDOWN_OVERLAY_ID));
}

#[test]
fn cancel_on_confirm_counts_canceled() {
    let (mut session, _clock, like) = setup();
    session.handle_click(like);
    session.on_user_choice(UserChoice::Cancel);
    assert_eq!(session.phase(), RitualPhase::Idle);
    assert_eq!(state(&session).totals["canceled"], 1);
}

#[test]
fn short_reflection_keeps_confirm_open() {
    let (mut session, _clock, like) = setup();
    session.handle_click(like);
    session.on_user_choice(UserChoice::Proceed {
        reflection: "meh".into(),
    });
    assert_eq!(session.phase(), RitualPhase::PendingConfirmation);
    assert!(mounted(&session, CONFIRM_OVERLAY_ID));
}

#[test]
fn commits_ten_minutes_apart_escalate() {
    let (mut session, clock, like) = setup();
    assert_eq!(full_ritual(&mut session, &clock, like), 60);
    clock.advance_secs(10 * 60);
    assert_eq!(full_ritual(&mut session, &clock, like), 300);
    assert_eq!(state(&session).escalation_count, 2);
}

#[test]
fn commits_forty_minutes_apart_reset() {
    let (mut session, clock, like) = setup();
    assert_eq!(full_ritual(&mut session, &clock, like), 60);
    clock.advance_secs(40 * 60);
    assert_eq!(full_ritual(&mut session, &clock, like), 60);
    assert_eq!(state(&session).escalation_count, 1);
}

#[test]
fn ladder_climbs_then_resets_after_longest_rung() {
    let (mut session, clock, like) = setup();
    let mut durations = Vec::new();
    for _ in 0..5 {
        durations.push(full_ritual(&mut session, &clock, like));
        clock.advance_secs(60);
    }
    // Sitting out 30m plus a minute already exceeds the reset window.
    assert_eq!(durations, vec![60, 300, 900, 1800, 60]);
}

#[test]
fn unlock_window_is_single_use() {
    let (mut session, clock, like) = setup();
    full_ritual(&mut session, &clock, like);
    assert_eq!(session.page().activations().len(), 1);

    clock.advance_secs(5);
    assert_eq!(session.handle_click(like), ClickDisposition::Intercepted);
    assert_eq!(session.page().activations().len(), 2);
    assert_eq!(session.phase(), RitualPhase::Idle);
    assert_eq!(state(&session).unlocked_until, 0);

    session.handle_click(like);
    assert_eq!(session.phase(), RitualPhase::PendingConfirmation);
    assert_eq!(session.page().activations().len(), 2);
    assert_eq!(state(&session).totals["engagementsAllowed"], 1);
}

#[test]
fn unlock_styling_relocks_after_window() {
    let (mut session, clock, like) = setup();
    full_ritual(&mut session, &clock, like);
    assert!(session.page().has_class(like, UNLOCKED_CLASS));
    clock.advance_ms(15_000);
    session.tick();
    assert!(session.page().has_class(like, UNLOCKED_CLASS));
    clock.advance_ms(100);
    session.tick();
    assert!(!session.page().has_class(like, UNLOCKED_CLASS));
}

#[test]
fn active_cooldown_blocks_without_confirmation() {
    let mut store = MemoryStore::new();
    store.seed(keys::COOLDOWN_UNTIL, json!(NOW + 5 * MIN));
    let (mut session, clock, like) = setup_with(store);

    // Resumed on boot.
    assert_eq!(
        session.renderer().view(COOLDOWN_OVERLAY_ID),
        Some(&OverlayView::Cooldown { remaining_secs: 300 })
    );

    session.on_user_choice(UserChoice::Close);
    assert!(!mounted(&session, COOLDOWN_OVERLAY_ID));

    clock.advance_secs(60);
    assert_eq!(session.handle_click(like), ClickDisposition::Intercepted);
    assert!(mounted(&session, COOLDOWN_OVERLAY_ID));
    assert!(!mounted(&session, CONFIRM_OVERLAY_ID));
    assert_eq!(session.phase(), RitualPhase::Idle);
    assert_eq!(state(&session).totals["blockedDuringCooldown"], 1);

    clock.advance_secs(4 * 60);
    session.tick();
    let persisted = state(&session);
    assert_eq!(persisted.cooldown_until, 0);
    assert_eq!(persisted.unlocked_until, NOW + 5 * MIN + 15_000);
    assert!(session.page().activations().is_empty());
}

#[test]
fn mutation_rebinding_is_idempotent() {
    let (mut session, _clock, like) = setup();
    assert_eq!(session.on_mutation(), 0);

    let post = session.page_mut().insert("tweetButtonInline");
    assert_eq!(session.on_mutation(), 1);
    assert_eq!(session.on_mutation(), 0);
    assert_eq!(session.page().listener_count(like), 1);
    assert_eq!(session.page().listener_count(post), 1);

    session.handle_click(post);
    assert_eq!(state(&session).totals["attempts"], 1);
    assert_eq!(
        session.renderer().view(CONFIRM_OVERLAY_ID),
        Some(&OverlayView::Confirm {
            action_label: "post".into(),
            min_chars: 12
        })
    );
}

#[test]
fn detached_element_is_not_replayed() {
    let (mut session, clock, like) = setup();
    session.handle_click(like);
    session.on_user_choice(proceed());
    session.page_mut().detach(like);
    clock.advance_secs(60);
    session.tick();

    assert_eq!(state(&session).escalation_count, 1);
    assert!(session.page().activations().is_empty());
}

#[test]
fn removed_overlay_abandons_countdown() {
    let (mut session, clock, like) = setup();
    session.handle_click(like);
    session.on_user_choice(proceed());
    session.renderer_mut().remove_externally(COOLDOWN_OVERLAY_ID);
    clock.advance_secs(60);
    session.tick();

    assert_eq!(state(&session).escalation_count, 0);
    assert!(session.page().activations().is_empty());
}

#[test]
fn dead_store_never_blocks_browsing() {
    let mut store = MemoryStore::new();
    store.invalidate();
    let (mut session, clock, like) = setup_with(store);

    full_ritual(&mut session, &clock, like);
    assert_eq!(session.page().activations(), &[like]);

    let (store, _, _) = session.into_parts();
    assert!(!store.contains(keys::ESCALATION_COUNT));
}

#[tokio::test(start_paused = true)]
async fn event_loop_drives_ritual_to_commit() {
    let (session, clock, like) = setup();
    let (tx, rx) = mpsc::unbounded_channel();

    let driver = async move {
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(HostEvent::Click {
            node: like,
            reply: Some(reply_tx),
        })
        .unwrap();
        assert_eq!(reply_rx.await.unwrap(), ClickDisposition::Intercepted);

        tx.send(HostEvent::Choice(proceed())).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        clock.advance_secs(60);
        tokio::time::sleep(Duration::from_millis(600)).await;
        tx.send(HostEvent::Shutdown).unwrap();
    };

    let (session, ()) = tokio::join!(session.run(rx), driver);
    assert_eq!(session.page().activations(), &[like]);
    assert_eq!(PersistedState::load(session.store()).escalation_count, 1);
}

#[tokio::test(start_paused = true)]
async fn event_loop_stops_when_host_goes_away() {
    let (session, _clock, _like) = setup();
    let (tx, rx) = mpsc::unbounded_channel::<HostEvent>();
    tx.send(HostEvent::Mutation).unwrap();
    drop(tx);
    let session = session.run(rx).await;
    assert_eq!(session.phase(), RitualPhase::Idle);
}
