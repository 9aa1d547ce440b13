//! Speaking stick: turn-taking for a shared broadcast channel
//!
//! One agent at a time holds the stick. Everyone else waits in a FIFO queue
//! (urgent requests jump to the head). Broadcasting without the stick while
//! enforcement is active is a violation, and repeated violations escalate:
//!
//! ```text
//! mild (1-2) ──▶ moderate (3-5, chatterbox list) ──▶ shame (6+, hall of shame)
//! ```
//!
//! The coordinator owns the violation tracker so a reset clears both.

pub mod coordinator;
pub mod types;
pub mod violations;

pub use coordinator::{SharedTurnCoordinator, TurnCoordinator};
pub use types::{
    AgentId, BroadcastCheck, EnforcementLevel, Mode, ModeChange, ModeSwitchPolicy,
    ReleaseOutcome, RequestOutcome, StickStatus,
};
pub use violations::{SocialPressureLevel, ViolationKind, ViolationSummary, ViolationTracker};
