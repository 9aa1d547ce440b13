//! Turn Coordination Library
//!
//! Lets many agents share one broadcast channel fairly, and tells them about
//! state changes without polling a transcript.
//!
//! # Components
//!
//! - [`stick`]: the speaking stick. One holder, a FIFO queue with urgent
//!   override, chaos/speaking-stick modes, enforcement levels, and per-agent
//!   violation counters with escalating consequences.
//! - [`notify`]: topic-based publish/subscribe into per-agent mailboxes with
//!   `namespace/*` wildcards and at-most-once drain.
//! - [`gate`]: decides whether a broadcast may proceed and, under social
//!   pressure, who should hear about a violation.
//! - [`tools`]: the MCP tool surface served by the `turn-coordination` binary.
//!
//! # Usage
//!
//! ```bash
//! # Stdio MCP server, chaos mode
//! turn-coordination
//!
//! # Start gated, with violations announced to everyone
//! turn-coordination --initial-mode speaking-stick --enforcement social-pressure
//!
//! # Clear holder and queue whenever the mode changes
//! STICK_MODE_SWITCH_POLICY=reset turn-coordination
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod error;
pub mod gate;
pub mod notify;
pub mod roster;
pub mod stick;
pub mod tools;

pub use config::CoordinationConfig;
pub use error::{CoordinationError, CoordinationResult, StructuredError};

// Re-export key stick types
pub use stick::{
    AgentId, EnforcementLevel, Mode, ModeSwitchPolicy, SharedTurnCoordinator, SocialPressureLevel,
    StickStatus, TurnCoordinator, ViolationKind, ViolationTracker,
};

// Re-export key notification types
pub use notify::{
    NotificationHub, NotificationRecord, SharedNotificationHub, Topic, TopicNamespace,
    TopicPattern,
};

// Re-export gate types
pub use gate::{announce_violation, BroadcastAuthority, BroadcastGate, Decision, Denial};

pub use roster::{AgentDirectory, AgentRoster};
pub use tools::{create_shared_state, CoordinationState, SharedCoordinationState};
