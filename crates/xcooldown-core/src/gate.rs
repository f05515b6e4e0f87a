//! Engagement gate.
//!
//! Classifies gated elements, intercepts their clicks, and decides whether an
//! attempt is allowed outright, blocked by an active cooldown, or has to go
//! through the reflection ritual.
//!
//! ## Click flow
//!
//! ```text
//! raw click -> on_click -> (bypass? pass through : intercept)
//!           -> on_engagement_attempt -> Allowed | Blocked | Confirm
//! ```
//!
//! The raw click is always intercepted unless a one-shot bypass is armed for
//! the node, so a fault anywhere downstream abandons the ritual without ever
//! performing the engagement.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::{NodeId, Page};
use crate::stats::{Counter, StatsRecorder};
use crate::storage::{keys, value_as_u64, SafeStore, Store};

/// Role-marker selectors of every gated control.
pub const DEFAULT_SELECTORS: [&str; 9] = [
    r#"[data-testid="like"]"#,
    r#"[data-testid="unlike"]"#,
    r#"[data-testid="retweet"]"#,
    r#"[data-testid="unretweet"]"#,
    r#"[data-testid="bookmark"]"#,
    r#"[data-testid="removeBookmark"]"#,
    r#"[data-testid="SideNav_NewTweet_Button"]"#,
    r#"[data-testid="tweetButtonInline"]"#,
    r#"[data-testid="tweetButton"]"#,
];

/// Added to every bound element.
pub const GATED_CLASS: &str = "xc-gated";
/// Present only while an unlock window is open.
pub const UNLOCKED_CLASS: &str = "xc-unlocked";
/// Dataset flag that marks an element as already bound.
pub const BOUND_MARKER: &str = "xcBound";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Like,
    Repost,
    Reply,
    Bookmark,
    Post,
    #[serde(other)]
    Engage,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Like => "like",
            ActionType::Repost => "repost",
            ActionType::Reply => "reply",
            ActionType::Bookmark => "bookmark",
            ActionType::Post => "post",
            ActionType::Engage => "engage",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a role marker to an action. Case-sensitive substring match,
/// checked in a fixed order; anything unrecognized is `Engage`.
pub fn classify_action(marker: &str) -> ActionType {
    if marker.contains("like") {
        ActionType::Like
    } else if marker.contains("retweet") {
        ActionType::Repost
    } else if marker.contains("reply") {
        ActionType::Reply
    } else if marker.contains("bookmark") {
        ActionType::Bookmark
    } else if marker.contains("tweet") {
        ActionType::Post
    } else {
        ActionType::Engage
    }
}

/// Extract the marker from a `[data-testid="..."]` selector.
pub fn parse_role_selector(selector: &str) -> Option<&str> {
    let inner = selector
        .trim()
        .strip_prefix("[data-testid=")?
        .strip_suffix(']')?;
    Some(inner.trim_matches(|c| c == '"' || c == '\''))
}

/// What the capture listener does with a raw click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickDisposition {
    /// Let the click through untouched.
    PassThrough,
    /// Default prevented and propagation stopped; the gate takes over.
    Intercepted,
}

/// Outcome of one engagement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDecision {
    /// An unlock window was open and has been consumed; the click was replayed.
    Allowed,
    /// A persisted cooldown is still running.
    Blocked { cooldown_until: u64 },
    /// The ritual has to run before anything happens.
    Confirm { action: ActionType },
}

#[derive(Debug, Clone)]
pub struct Gate {
    selectors: Vec<String>,
    bypass: HashSet<NodeId>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new(DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect())
    }
}

impl Gate {
    pub fn new(selectors: Vec<String>) -> Self {
        Self {
            selectors,
            bypass: HashSet::new(),
        }
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn classify_node<P: Page>(&self, page: &P, node: NodeId) -> ActionType {
        page.role_marker(node)
            .map(|m| classify_action(&m))
            .unwrap_or(ActionType::Engage)
    }

    /// Bind one element. Returns `false` if it was already bound.
    pub fn bind_gate<P: Page>(&self, page: &mut P, node: NodeId) -> bool {
        if page.has_marker(node, BOUND_MARKER) {
            return false;
        }
        page.set_marker(node, BOUND_MARKER);
        page.add_class(node, GATED_CLASS);
        page.add_capture_listener(node);
        true
    }

    /// Bind every currently matching element. Returns how many were new.
    pub fn apply_gates<P: Page>(&self, page: &mut P) -> usize {
        let bound = page
            .query_all(&self.selectors)
            .into_iter()
            .filter(|node| self.bind_gate(page, *node))
            .count();
        if bound > 0 {
            debug!(bound, "gated new elements");
        }
        bound
    }

    /// The capture listener body.
    ///
    /// An armed bypass is consumed by the next observed click on that node,
    /// whether or not it is the synthetic one.
    pub fn on_click(&mut self, node: NodeId) -> ClickDisposition {
        if self.bypass.remove(&node) {
            ClickDisposition::PassThrough
        } else {
            ClickDisposition::Intercepted
        }
    }

    pub fn is_bypass_armed(&self, node: NodeId) -> bool {
        self.bypass.contains(&node)
    }

    /// Re-issue a click that the listener will let through once.
    pub fn trigger_native_click<P: Page>(&mut self, page: &mut P, node: NodeId) {
        self.bypass.insert(node);
        page.dispatch_click(node);
    }

    /// Decide what an intercepted click leads to.
    pub fn on_engagement_attempt<S: Store, P: Page>(
        &mut self,
        store: &mut SafeStore<S>,
        page: &mut P,
        node: NodeId,
        now: u64,
    ) -> AttemptDecision {
        let action = self.classify_node(page, node);
        StatsRecorder::new(store).record(Counter::Attempts, now);

        let state = store.get(&[keys::COOLDOWN_UNTIL, keys::UNLOCKED_UNTIL]);
        let read = |key: &str| {
            state
                .get(key)
                .and_then(value_as_u64)
                .unwrap_or(0)
        };
        let cooldown_until = read(keys::COOLDOWN_UNTIL);
        let unlocked_until = read(keys::UNLOCKED_UNTIL);

        if unlocked_until > now {
            store.set_one(keys::UNLOCKED_UNTIL, 0);
            StatsRecorder::new(store).record(Counter::EngagementsAllowed, now);
            debug!(%action, "unlock window consumed");
            self.trigger_native_click(page, node);
            return AttemptDecision::Allowed;
        }

        if cooldown_until > now {
            StatsRecorder::new(store).record(Counter::BlockedDuringCooldown, now);
            debug!(%action, cooldown_until, "blocked during cooldown");
            return AttemptDecision::Blocked { cooldown_until };
        }

        AttemptDecision::Confirm { action }
    }
}
