//! Speaking-stick state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

use crate::error::CoordinationError;

/// Agent identifier as handed out by the external registry
pub type AgentId = String;

/// Communication mode of the shared channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Anyone may broadcast at any time
    #[default]
    Chaos,
    /// Broadcasts are gated on holding the stick
    SpeakingStick,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chaos => write!(f, "chaos"),
            Self::SpeakingStick => write!(f, "speaking-stick"),
        }
    }
}

impl FromStr for Mode {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chaos" => Ok(Self::Chaos),
            "speaking-stick" | "speaking_stick" => Ok(Self::SpeakingStick),
            _ => Err(CoordinationError::invalid_mode(s)),
        }
    }
}

/// How strictly the stick requirement is applied in speaking-stick mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementLevel {
    /// Warn only, never deny
    Suggestion,
    /// Deny and fan the violation out to every other agent
    SocialPressure,
    /// Deny
    #[default]
    Strict,
}

impl EnforcementLevel {
    /// Whether non-holder broadcasts are denied at this level
    pub fn denies(&self) -> bool {
        !matches!(self, Self::Suggestion)
    }

    /// Whether denials are announced to the other agents
    pub fn broadcasts_violations(&self) -> bool {
        matches!(self, Self::SocialPressure)
    }
}

impl std::fmt::Display for EnforcementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suggestion => write!(f, "suggestion"),
            Self::SocialPressure => write!(f, "social-pressure"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for EnforcementLevel {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suggestion" => Ok(Self::Suggestion),
            "social-pressure" | "social_pressure" => Ok(Self::SocialPressure),
            "strict" => Ok(Self::Strict),
            other => Err(CoordinationError::validation(format!(
                "unknown enforcement level '{}': expected suggestion, social-pressure or strict",
                other
            ))),
        }
    }
}

/// What happens to the holder and queue when the mode changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSwitchPolicy {
    /// Only gating changes; holder and queue survive the switch
    #[default]
    Keep,
    /// Holder, queue and topic are cleared on every actual mode change
    Reset,
}

impl FromStr for ModeSwitchPolicy {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "reset" => Ok(Self::Reset),
            other => Err(CoordinationError::validation(format!(
                "unknown mode switch policy '{}': expected keep or reset",
                other
            ))),
        }
    }
}

/// Mutable coordinator state. Only [`super::TurnCoordinator`] touches it.
///
/// Invariants: `current_holder` is never in `queue`, and `queue` holds no
/// duplicates.
#[derive(Debug, Clone)]
pub(crate) struct StickState {
    pub mode: Mode,
    pub current_holder: Option<AgentId>,
    pub queue: VecDeque<AgentId>,
    pub enforcement_level: EnforcementLevel,
    pub topic: Option<String>,
    pub mode_set_by: Option<String>,
    pub mode_changed_at: Option<DateTime<Utc>>,
    pub holder_since: Option<DateTime<Utc>>,
}

impl StickState {
    pub fn new(mode: Mode, enforcement_level: EnforcementLevel) -> Self {
        Self {
            mode,
            current_holder: None,
            queue: VecDeque::new(),
            enforcement_level,
            topic: None,
            mode_set_by: None,
            mode_changed_at: None,
            holder_since: None,
        }
    }

    /// 1-based queue position, if queued
    pub fn position_of(&self, agent_id: &str) -> Option<usize> {
        self.queue.iter().position(|a| a == agent_id).map(|i| i + 1)
    }

    pub fn is_holder(&self, agent_id: &str) -> bool {
        self.current_holder.as_deref() == Some(agent_id)
    }

    /// Hand the stick to `holder` (or nobody), stamping `holder_since`
    pub fn set_holder(&mut self, holder: Option<AgentId>) {
        self.holder_since = holder.as_ref().map(|_| Utc::now());
        self.current_holder = holder;
    }

    pub fn status(&self) -> StickStatus {
        StickStatus {
            mode: self.mode,
            current_holder: self.current_holder.clone(),
            stick_available: self.current_holder.is_none(),
            queue: self.queue.iter().cloned().collect(),
            enforcement_level: self.enforcement_level,
            topic: self.topic.clone(),
            mode_set_by: self.mode_set_by.clone(),
            mode_changed_at: self.mode_changed_at,
            holder_since: self.holder_since,
        }
    }
}

/// Read-only snapshot returned by `status()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickStatus {
    pub mode: Mode,
    pub current_holder: Option<AgentId>,
    pub stick_available: bool,
    pub queue: Vec<AgentId>,
    pub enforcement_level: EnforcementLevel,
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_set_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_changed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_since: Option<DateTime<Utc>>,
}

impl StickStatus {
    /// 1-based queue position of `agent_id`, or 0 when not queued
    pub fn queue_position(&self, agent_id: &str) -> usize {
        self.queue
            .iter()
            .position(|a| a == agent_id)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

/// Stick snapshot taken for a broadcast, with the violation it cost
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastCheck {
    pub status: StickStatus,
    /// Sender's new violation total, set only when the broadcast is denied
    pub total_violations: Option<u32>,
}

/// Result of `request()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub granted: bool,
    pub current_holder: Option<AgentId>,
    /// 1-based position when queued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub queue: Vec<AgentId>,
    /// True when the agent was already queued or already held the stick
    pub already_present: bool,
}

/// Result of `release()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub released: bool,
    pub next_holder: Option<AgentId>,
    pub reason: String,
}

/// Result of `set_mode()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeChange {
    pub previous_mode: Mode,
    pub mode: Mode,
    pub enforcement_level: EnforcementLevel,
    pub set_by: String,
    /// True when the switch cleared holder and queue
    pub turn_state_cleared: bool,
}
