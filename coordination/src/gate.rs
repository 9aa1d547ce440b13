//! Broadcast gate: decides whether a broadcast may go out
//!
//! ```text
//! mode = chaos ─────────────────────────────────────────▶ allow
//! mode = speaking-stick
//!   ├─ enforcement = suggestion ────────────────────────▶ allow (+ warning if not holder)
//!   └─ enforcement = strict | social-pressure
//!        ├─ sender holds stick ─────────────────────────▶ allow
//!        └─ otherwise ─▶ track violation ─▶ deny (+ notify list under social-pressure)
//! ```
//!
//! A denial is a successful return carrying diagnostics. The stick snapshot
//! and the violation count come from one coordinator critical section
//! ([`TurnCoordinator::check_and_track`](crate::stick::TurnCoordinator::check_and_track)).
//! The gate performs no I/O: fanning the violation out is
//! [`announce_violation`], called by the sender after `decide` returns, so the
//! counter update has already committed.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{CoordinationError, CoordinationResult};
use crate::notify::{NotificationHub, Topic};
use crate::roster::AgentDirectory;
use crate::stick::{
    AgentId, BroadcastCheck, Mode, SharedTurnCoordinator, SocialPressureLevel, StickStatus,
};

/// Narrow capability handed to the message-sending collaborator
pub trait BroadcastAuthority: Send + Sync {
    /// Decide whether `sender_id` may broadcast now
    fn decide(&self, sender_id: &str) -> CoordinationResult<Decision>;
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the broadcast may proceed
    pub success: bool,

    /// Set when allowed under `suggestion` without holding the stick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    #[serde(flatten)]
    pub denial: Option<Denial>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            success: true,
            warning: None,
            denial: None,
        }
    }

    fn allow_with_warning(warning: String) -> Self {
        Self {
            success: true,
            warning: Some(warning),
            denial: None,
        }
    }

    pub fn is_denied(&self) -> bool {
        !self.success
    }
}

/// Diagnostics attached to a denied broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Denial {
    pub error: String,
    pub suggestion: String,
    pub current_holder: Option<AgentId>,
    pub current_holder_name: Option<String>,
    pub queue_length: usize,
    /// 1-based, 0 when not queued
    pub queue_position: usize,
    pub violation_tracked: bool,
    pub total_violations: u32,
    pub social_pressure_level: SocialPressureLevel,
    pub consequence: String,
    /// True only under `social-pressure`
    pub violation_broadcast: bool,
    /// Agents to tell about the violation (everyone but the sender)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notify_agents: Vec<AgentId>,
}

/// Gate over a shared coordinator and an agent directory
pub struct BroadcastGate<D: AgentDirectory> {
    coordinator: SharedTurnCoordinator,
    directory: D,
}

impl<D: AgentDirectory> BroadcastGate<D> {
    pub fn new(coordinator: SharedTurnCoordinator, directory: D) -> Self {
        Self {
            coordinator,
            directory,
        }
    }

    pub fn coordinator(&self) -> &SharedTurnCoordinator {
        &self.coordinator
    }

    fn holder_name(&self, holder: &str) -> String {
        self.directory
            .display_name(holder)
            .unwrap_or_else(|| holder.to_string())
    }

    fn warning_for(&self, status: &StickStatus) -> String {
        match &status.current_holder {
            Some(holder) => format!(
                "Speaking-stick mode is active and {} holds the stick. Consider calling \
                 request_speaking_stick before broadcasting.",
                self.holder_name(holder)
            ),
            None => "Speaking-stick mode is active and no one holds the stick. Consider calling \
                     request_speaking_stick before broadcasting."
                .to_string(),
        }
    }

    fn deny(&self, sender_id: &str, status: &StickStatus, total_violations: u32) -> Decision {
        let level = SocialPressureLevel::for_count(total_violations);

        let queue_length = status.queue.len();
        let queue_position = status.queue_position(sender_id);
        let current_holder_name = status.current_holder.as_deref().map(|h| self.holder_name(h));

        let error = match &current_holder_name {
            Some(name) => format!(
                "Broadcast blocked: {} currently has the speaking stick ({} waiting in queue).",
                name, queue_length
            ),
            None => "Broadcast blocked: no one holds the speaking stick. Request it first."
                .to_string(),
        };

        let suggestion = if queue_position > 0 {
            format!(
                "You are #{} in the queue. Wait for your turn before broadcasting.",
                queue_position
            )
        } else if status.current_holder.is_none() {
            "Call request_speaking_stick to take the stick, then broadcast.".to_string()
        } else {
            format!(
                "Call request_speaking_stick to join the queue ({} ahead of you).",
                queue_length
            )
        };

        let violation_broadcast = status.enforcement_level.broadcasts_violations();
        let notify_agents = if violation_broadcast {
            self.directory
                .agent_ids()
                .into_iter()
                .filter(|id| id != sender_id)
                .collect()
        } else {
            Vec::new()
        };

        warn!(
            sender_id,
            total_violations,
            level = %level,
            enforcement = %status.enforcement_level,
            "Broadcast denied"
        );

        Decision {
            success: false,
            warning: None,
            denial: Some(Denial {
                error,
                suggestion,
                current_holder: status.current_holder.clone(),
                current_holder_name,
                queue_length,
                queue_position,
                violation_tracked: true,
                total_violations,
                social_pressure_level: level,
                consequence: level.consequence().to_string(),
                violation_broadcast,
                notify_agents,
            }),
        }
    }
}

impl<D: AgentDirectory> BroadcastAuthority for BroadcastGate<D> {
    fn decide(&self, sender_id: &str) -> CoordinationResult<Decision> {
        if sender_id.trim().is_empty() {
            return Err(CoordinationError::validation("sender agent_id must not be empty"));
        }

        let BroadcastCheck {
            status,
            total_violations,
        } = self.coordinator.check_and_track(sender_id)?;
        if let Some(total) = total_violations {
            return Ok(self.deny(sender_id, &status, total));
        }

        let is_holder = status.current_holder.as_deref() == Some(sender_id);
        match status.mode {
            Mode::SpeakingStick if !is_holder => {
                Ok(Decision::allow_with_warning(self.warning_for(&status)))
            }
            _ => Ok(Decision::allow()),
        }
    }
}

/// Deliver a `queue/violation` notice to every agent a denial lists,
/// subscribed or not. Returns how many mailboxes received it (0 when nothing
/// is to be announced).
pub fn announce_violation(
    hub: &NotificationHub,
    sender_id: &str,
    decision: &Decision,
) -> CoordinationResult<usize> {
    let Some(denial) = decision.denial.as_ref().filter(|d| d.violation_broadcast) else {
        return Ok(0);
    };

    let payload = json!({
        "offender": sender_id,
        "total_violations": denial.total_violations,
        "social_pressure_level": denial.social_pressure_level,
        "consequence": denial.consequence,
        "current_holder": denial.current_holder,
    });

    let notified = hub.publish_direct(
        &denial.notify_agents,
        Topic::queue("violation")?,
        payload,
    )?;
    info!(sender_id, notified, "Violation announced");
    Ok(notified)
}
