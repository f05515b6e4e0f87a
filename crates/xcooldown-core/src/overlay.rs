//! Overlay presenter.
//!
//! Drawing is left to an [`OverlayRenderer`]; this module owns the overlay
//! lifecycle. There are two slots keyed by fixed DOM ids, and showing an
//! overlay replaces whatever occupies its slot. Countdowns are polled: every
//! tick recomputes the remaining seconds from the wall-clock deadline, so
//! missed or late ticks correct themselves. A countdown stops silently when
//! the host has removed its overlay or, for a pending cooldown, when the
//! staged cooldown is gone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Shared by the read-only and the pending countdown.
pub const COOLDOWN_OVERLAY_ID: &str = "xc-cooldown-overlay";
pub const CONFIRM_OVERLAY_ID: &str = "xc-confirm-overlay";

/// Default minimum reflection length, in characters after trimming.
pub const MIN_REFLECTION_CHARS: usize = 12;

/// What to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayView {
    /// "Cooldown active", with a Close button.
    Cooldown { remaining_secs: u64 },
    /// "Cooldown started", with a "Never mind" button.
    PendingCooldown { remaining_secs: u64 },
    /// "Are you sure?", with a reflection box, Cancel and Proceed.
    Confirm { action_label: String, min_chars: usize },
}

pub trait OverlayRenderer {
    /// Draw `view` under `id`, replacing any existing overlay with that id.
    fn mount(&mut self, id: &'static str, view: &OverlayView);
    fn update_remaining(&mut self, id: &'static str, remaining_secs: u64);
    fn unmount(&mut self, id: &'static str);
    /// Whether the overlay is still in the document.
    fn is_mounted(&self, id: &'static str) -> bool;
}

/// A decision the user made on a visible overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "choice", rename_all = "snake_case")]
pub enum UserChoice {
    /// Close on the read-only cooldown overlay.
    Close,
    /// "Never mind" on the pending countdown.
    NeverMind,
    /// Proceed on the confirmation overlay.
    Proceed { reflection: String },
    /// Cancel on the confirmation overlay.
    Cancel,
}

/// Terminal result of one overlay. Each overlay yields at most one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayOutcome {
    CooldownElapsed,
    CooldownClosed,
    PendingElapsed,
    PendingCanceled,
    Confirmed { reflection: String },
    ConfirmCanceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountdownKind {
    Cooldown,
    Pending,
}

#[derive(Debug, Clone, Copy)]
struct Countdown {
    kind: CountdownKind,
    deadline: u64,
}

#[derive(Debug, Clone)]
struct ConfirmPrompt {
    min_chars: usize,
}

/// Whole seconds left until `deadline`, rounded up.
pub fn remaining_secs(deadline: u64, now: u64) -> u64 {
    deadline.saturating_sub(now).div_ceil(1000)
}

#[derive(Debug, Default)]
pub struct Overlays {
    countdown: Option<Countdown>,
    confirm: Option<ConfirmPrompt>,
}

impl Overlays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn countdown_deadline(&self) -> Option<u64> {
        self.countdown.map(|c| c.deadline)
    }

    pub fn is_confirm_open(&self) -> bool {
        self.confirm.is_some()
    }

    pub fn show_cooldown_overlay<R: OverlayRenderer>(
        &mut self,
        renderer: &mut R,
        deadline: u64,
        now: u64,
    ) {
        self.countdown = Some(Countdown {
            kind: CountdownKind::Cooldown,
            deadline,
        });
        renderer.mount(
            COOLDOWN_OVERLAY_ID,
            &OverlayView::Cooldown {
                remaining_secs: remaining_secs(deadline, now),
            },
        );
    }

    pub fn show_pending_cooldown_overlay<R: OverlayRenderer>(
        &mut self,
        renderer: &mut R,
        deadline: u64,
        now: u64,
    ) {
        self.countdown = Some(Countdown {
            kind: CountdownKind::Pending,
            deadline,
        });
        renderer.mount(
            COOLDOWN_OVERLAY_ID,
            &OverlayView::PendingCooldown {
                remaining_secs: remaining_secs(deadline, now),
            },
        );
    }

    pub fn show_confirm_overlay<R: OverlayRenderer>(
        &mut self,
        renderer: &mut R,
        action_label: &str,
        min_chars: usize,
    ) {
        self.confirm = Some(ConfirmPrompt { min_chars });
        renderer.mount(
            CONFIRM_OVERLAY_ID,
            &OverlayView::Confirm {
                action_label: action_label.to_string(),
                min_chars,
            },
        );
    }

    /// Advance the countdown, if any.
    pub fn tick<R: OverlayRenderer>(
        &mut self,
        renderer: &mut R,
        now: u64,
        pending_active: bool,
    ) -> Option<OverlayOutcome> {
        let countdown = self.countdown?;

        if !renderer.is_mounted(COOLDOWN_OVERLAY_ID) {
            self.countdown = None;
            return None;
        }
        if countdown.kind == CountdownKind::Pending && !pending_active {
            self.countdown = None;
            return None;
        }

        let secs = remaining_secs(countdown.deadline, now);
        renderer.update_remaining(COOLDOWN_OVERLAY_ID, secs);
        if secs > 0 {
            return None;
        }

        self.countdown = None;
        renderer.unmount(COOLDOWN_OVERLAY_ID);
        Some(match countdown.kind {
            CountdownKind::Cooldown => OverlayOutcome::CooldownElapsed,
            CountdownKind::Pending => OverlayOutcome::PendingElapsed,
        })
    }

    /// Route a user decision to the overlay it belongs to.
    ///
    /// Returns `None` when no matching overlay is open, or when a reflection
    /// is too short to enable Proceed.
    pub fn choose<R: OverlayRenderer>(
        &mut self,
        renderer: &mut R,
        choice: UserChoice,
    ) -> Option<OverlayOutcome> {
        match choice {
            UserChoice::Close => {
                self.take_countdown(renderer, CountdownKind::Cooldown)?;
                Some(OverlayOutcome::CooldownClosed)
            }
            UserChoice::NeverMind => {
                self.take_countdown(renderer, CountdownKind::Pending)?;
                Some(OverlayOutcome::PendingCanceled)
            }
            UserChoice::Proceed { reflection } => {
                let prompt = self.confirm.as_ref()?;
                let trimmed = reflection.trim();
                if trimmed.chars().count() < prompt.min_chars {
                    return None;
                }
                let reflection = trimmed.to_string();
                self.confirm = None;
                renderer.unmount(CONFIRM_OVERLAY_ID);
                Some(OverlayOutcome::Confirmed { reflection })
            }
            UserChoice::Cancel => {
                self.confirm.take()?;
                renderer.unmount(CONFIRM_OVERLAY_ID);
                Some(OverlayOutcome::ConfirmCanceled)
            }
        }
    }

    fn take_countdown<R: OverlayRenderer>(
        &mut self,
        renderer: &mut R,
        kind: CountdownKind,
    ) -> Option<Countdown> {
        let countdown = self.countdown.filter(|c| c.kind == kind)?;
        self.countdown = None;
        renderer.unmount(COOLDOWN_OVERLAY_ID);
        Some(countdown)
    }
}

/// Renderer that keeps overlays in memory and logs what it was asked to do.
#[derive(Debug, Default, Clone)]
pub struct HeadlessRenderer {
    mounted: BTreeMap<&'static str, OverlayView>,
    history: Vec<String>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self, id: &str) -> Option<&OverlayView> {
        self.mounted.get(id)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Simulate the host page tearing an overlay out of the document.
    pub fn remove_externally(&mut self, id: &str) {
        self.mounted.remove(id);
    }
}

impl OverlayRenderer for HeadlessRenderer {
    fn mount(&mut self, id: &'static str, view: &OverlayView) {
        self.history.push(format!("mount {id} {view:?}"));
        self.mounted.insert(id, view.clone());
    }

    fn update_remaining(&mut self, id: &'static str, remaining: u64) {
        if let Some(
            OverlayView::Cooldown { remaining_secs } | OverlayView::PendingCooldown { remaining_secs },
        ) = self.mounted.get_mut(id)
        {
            *remaining_secs = remaining;
        }
    }

    fn unmount(&mut self, id: &'static str) {
        if self.mounted.remove(id).is_some() {
            self.history.push(format!("unmount {id}"));
        }
    }

    fn is_mounted(&self, id: &'static str) -> bool {
        self.mounted.contains_key(id)
    }
}
