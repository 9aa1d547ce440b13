//! Violation tracking and social-pressure escalation
//!
//! ```text
//! violations   tier        consequence
//! ──────────   ────────    ──────────────────────────
//! 0            none        -
//! 1..=2        mild        warning issued
//! 3..=5        moderate    added to chatterbox list
//! 6+           shame       CHATTERBOX HALL OF SHAME
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::types::AgentId;
use crate::error::{CoordinationError, CoordinationResult};

/// Escalation tier derived from a violation count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialPressureLevel {
    None,
    Mild,
    Moderate,
    Shame,
}

impl SocialPressureLevel {
    /// Derive the tier for a total violation count
    pub fn for_count(count: u32) -> Self {
        match count {
            0 => Self::None,
            1..=2 => Self::Mild,
            3..=5 => Self::Moderate,
            _ => Self::Shame,
        }
    }

    /// Consequence text shown to the offender
    pub fn consequence(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mild => "warning issued",
            Self::Moderate => "added to chatterbox list",
            Self::Shame => "CHATTERBOX HALL OF SHAME",
        }
    }
}

impl std::fmt::Display for SocialPressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Mild => write!(f, "mild"),
            Self::Moderate => write!(f, "moderate"),
            Self::Shame => write!(f, "shame"),
        }
    }
}

/// Kind of rule an agent broke
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Broadcast attempted without holding the stick
    BroadcastWithoutStick,
    /// Reported by a collaborator
    Other(String),
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BroadcastWithoutStick => write!(f, "broadcast_without_stick"),
            Self::Other(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ViolationEntry {
    total: u32,
    by_kind: HashMap<ViolationKind, u32>,
    last_at: Option<DateTime<Utc>>,
}

/// Per-agent violation summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub agent_id: AgentId,
    pub total: u32,
    pub level: SocialPressureLevel,
    pub by_kind: HashMap<String, u32>,
    pub last_at: Option<DateTime<Utc>>,
}

/// Per-agent violation counters
///
/// Counts only grow until [`ViolationTracker::clear`] (called by the
/// coordinator's reset).
#[derive(Debug, Default)]
pub struct ViolationTracker {
    entries: Mutex<HashMap<AgentId, ViolationEntry>>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CoordinationResult<MutexGuard<'_, HashMap<AgentId, ViolationEntry>>> {
        self.entries
            .lock()
            .map_err(|_| CoordinationError::lock_poisoned("violation tracker"))
    }

    /// Record one violation and return the agent's new total
    pub fn track(&self, agent_id: &str, kind: ViolationKind) -> CoordinationResult<u32> {
        let mut entries = self.lock()?;
        let entry = entries.entry(agent_id.to_string()).or_default();
        entry.total += 1;
        *entry.by_kind.entry(kind.clone()).or_insert(0) += 1;
        entry.last_at = Some(Utc::now());

        debug!(agent_id, %kind, total = entry.total, "Violation tracked");
        Ok(entry.total)
    }

    /// Current total for `agent_id` (0 if never tracked)
    pub fn count(&self, agent_id: &str) -> CoordinationResult<u32> {
        Ok(self.lock()?.get(agent_id).map(|e| e.total).unwrap_or(0))
    }

    /// Pure tier derivation
    pub fn tier(count: u32) -> SocialPressureLevel {
        SocialPressureLevel::for_count(count)
    }

    /// Forget every counter
    pub fn clear(&self) -> CoordinationResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Summaries for every agent with at least one violation, worst first
    pub fn offenders(&self) -> CoordinationResult<Vec<ViolationSummary>> {
        let entries = self.lock()?;
        let mut summaries: Vec<ViolationSummary> = entries
            .iter()
            .map(|(agent_id, entry)| ViolationSummary {
                agent_id: agent_id.clone(),
                total: entry.total,
                level: SocialPressureLevel::for_count(entry.total),
                by_kind: entry
                    .by_kind
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect(),
                last_at: entry.last_at,
            })
            .collect();

        summaries.sort_by(|a, b| b.total.cmp(&a.total).then(a.agent_id.cmp(&b.agent_id)));
        Ok(summaries)
    }
}
