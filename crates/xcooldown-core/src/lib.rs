//! # xcooldown Core Library
//!
//! Business logic of the engagement gate: a browser content script that puts
//! a reflection prompt, a cancelable cooldown and an escalating lockout
//! ladder in front of like/repost/reply/bookmark/post clicks.
//!
//! The core is host-neutral. A content-script adapter (or the CLI simulator,
//! or a test) supplies the [`Page`], [`Store`], [`OverlayRenderer`] and
//! [`Clock`] and forwards events into a [`Session`].
//!
//! ## Architecture
//!
//! - **Cooldown Engine**: escalation ladder, in-memory staging, commit/cancel,
//!   unlock windows
//! - **Engagement Gate**: element classification, click interception and the
//!   allow/block/confirm decision
//! - **Overlays**: countdown and confirmation lifecycle over a renderer
//! - **Storage**: fail-open key-value store, stats recorder, TOML config
//! - **Dashboard**: read-only view and destructive reset

pub mod clock;
pub mod cooldown;
pub mod dashboard;
pub mod error;
pub mod gate;
pub mod overlay;
pub mod page;
pub mod session;
pub mod stats;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{CommitOutcome, CooldownEngine, EscalationPolicy, PendingCooldown, RitualPhase};
pub use dashboard::{DashboardView, GateStatus};
pub use error::{ConfigError, CoreError, StoreError};
pub use gate::{classify_action, ActionType, AttemptDecision, ClickDisposition, Gate};
pub use overlay::{HeadlessRenderer, OverlayRenderer, OverlayView, Overlays, UserChoice};
pub use page::{NodeId, Page, VirtualPage};
pub use session::{HostEvent, Session};
pub use stats::{Counter, Reflection, StatsRecorder};
pub use storage::{Config, MemoryStore, PersistedState, SafeStore, SqliteStore, Store};
