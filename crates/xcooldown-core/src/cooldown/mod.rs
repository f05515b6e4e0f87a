mod engine;
mod policy;

pub use engine::{CommitOutcome, CooldownEngine, PendingConfirmation, PendingCooldown, RitualPhase};
pub use policy::{EscalationPolicy, EscalationPreview};
