//! Turn coordinator: single-owner speaking stick with a fairness queue
//!
//! ```text
//!            request(a)                    request(b), request(c, urgent)
//!   Idle ───────────────▶ Held(a, []) ──────────────────────────────▶ Held(a, [c, b])
//!    ▲                         │
//!    │ release(a), queue empty │ release(a)             → Held(c, [b])
//!    └─────────────────────────┘ release(a, pass_to: b) → Held(b, [c])
//! ```
//!
//! Every transition runs under a single `std::sync::Mutex` guard and never
//! awaits, so interleaved callers cannot corrupt queue order. Violation
//! counters have their own lock, always taken after the stick guard.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::types::{
    AgentId, BroadcastCheck, EnforcementLevel, Mode, ModeChange, ModeSwitchPolicy,
    ReleaseOutcome, RequestOutcome, StickState, StickStatus,
};
use super::violations::{ViolationKind, ViolationTracker};
use crate::config::CoordinationConfig;
use crate::error::{CoordinationError, CoordinationResult};

/// Shared reference to a TurnCoordinator
pub type SharedTurnCoordinator = Arc<TurnCoordinator>;

struct Inner {
    stick: StickState,
    /// Topic each queued agent asked for, applied when they are promoted
    pending_topics: HashMap<AgentId, String>,
}

/// Owner of the speaking stick, its queue, and the violation counters
pub struct TurnCoordinator {
    inner: Mutex<Inner>,
    violations: ViolationTracker,
    config: CoordinationConfig,
}

fn validate_agent_id(agent_id: &str) -> CoordinationResult<()> {
    if agent_id.trim().is_empty() {
        return Err(CoordinationError::validation("agent_id must not be empty"));
    }
    Ok(())
}

impl TurnCoordinator {
    pub fn new(config: CoordinationConfig) -> Self {
        let stick = StickState::new(config.initial_mode, config.default_enforcement);
        Self {
            inner: Mutex::new(Inner {
                stick,
                pending_topics: HashMap::new(),
            }),
            violations: ViolationTracker::new(),
            config,
        }
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedTurnCoordinator {
        Arc::new(self)
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Violation counters cleared by [`TurnCoordinator::reset`]
    pub fn violations(&self) -> &ViolationTracker {
        &self.violations
    }

    fn lock(&self) -> CoordinationResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CoordinationError::lock_poisoned("speaking stick"))
    }

    /// Switch the communication mode.
    ///
    /// `method` is the enforcement level to apply; `None` keeps the current
    /// one. Caller authorization is enforced by the caller.
    pub fn set_mode(
        &self,
        mode: Mode,
        set_by: &str,
        method: Option<EnforcementLevel>,
    ) -> CoordinationResult<ModeChange> {
        if set_by.trim().is_empty() {
            return Err(CoordinationError::validation("set_by must not be empty"));
        }

        let mut inner = self.lock()?;
        let previous_mode = inner.stick.mode;

        let clear =
            previous_mode != mode && self.config.mode_switch_policy == ModeSwitchPolicy::Reset;
        if clear {
            inner.stick.set_holder(None);
            inner.stick.queue.clear();
            inner.stick.topic = None;
            inner.pending_topics.clear();
        }

        inner.stick.mode = mode;
        if let Some(level) = method {
            inner.stick.enforcement_level = level;
        }
        inner.stick.mode_set_by = Some(set_by.to_string());
        inner.stick.mode_changed_at = Some(Utc::now());

        info!(
            %previous_mode,
            %mode,
            enforcement = %inner.stick.enforcement_level,
            set_by,
            turn_state_cleared = clear,
            "Communication mode set"
        );

        Ok(ModeChange {
            previous_mode,
            mode,
            enforcement_level: inner.stick.enforcement_level,
            set_by: set_by.to_string(),
            turn_state_cleared: clear,
        })
    }

    /// Ask for the stick. Never blocks: returns a grant or a queue position.
    ///
    /// A holder re-requesting is an idempotent grant. An agent already queued
    /// keeps its position, even when the repeat request is urgent.
    pub fn request(
        &self,
        agent_id: &str,
        topic: Option<&str>,
        urgent: bool,
    ) -> CoordinationResult<RequestOutcome> {
        validate_agent_id(agent_id)?;
        let topic = topic.map(str::trim).filter(|t| !t.is_empty());

        let mut inner = self.lock()?;

        if inner.stick.current_holder.is_none() {
            inner.stick.set_holder(Some(agent_id.to_string()));
            inner.stick.topic = topic.map(String::from);
            info!(agent_id, topic = ?inner.stick.topic, "Speaking stick granted");
            return Ok(RequestOutcome {
                granted: true,
                current_holder: Some(agent_id.to_string()),
                queue_position: None,
                queue: inner.stick.queue.iter().cloned().collect(),
                already_present: false,
            });
        }

        if inner.stick.is_holder(agent_id) {
            debug!(agent_id, "Holder re-requested the stick");
            return Ok(RequestOutcome {
                granted: true,
                current_holder: Some(agent_id.to_string()),
                queue_position: None,
                queue: inner.stick.queue.iter().cloned().collect(),
                already_present: true,
            });
        }

        let (position, already_present) = match inner.stick.position_of(agent_id) {
            Some(position) => (position, true),
            None => {
                if urgent {
                    inner.stick.queue.push_front(agent_id.to_string());
                } else {
                    inner.stick.queue.push_back(agent_id.to_string());
                }
                if let Some(topic) = topic {
                    inner
                        .pending_topics
                        .insert(agent_id.to_string(), topic.to_string());
                }
                let position = if urgent { 1 } else { inner.stick.queue.len() };
                (position, false)
            }
        };

        info!(
            agent_id,
            position,
            urgent,
            already_present,
            queue_len = inner.stick.queue.len(),
            "Queued for speaking stick"
        );

        Ok(RequestOutcome {
            granted: false,
            current_holder: inner.stick.current_holder.clone(),
            queue_position: Some(position),
            queue: inner.stick.queue.iter().cloned().collect(),
            already_present,
        })
    }

    /// Give up the stick. Only the holder may release.
    ///
    /// With `pass_to`, that agent becomes holder and leaves the queue without
    /// reordering the rest; otherwise the queue head is promoted.
    pub fn release(
        &self,
        agent_id: &str,
        reason: &str,
        pass_to: Option<&str>,
    ) -> CoordinationResult<ReleaseOutcome> {
        validate_agent_id(agent_id)?;
        if let Some(target) = pass_to {
            validate_agent_id(target)?;
        }

        let mut inner = self.lock()?;

        if !inner.stick.is_holder(agent_id) {
            return Err(CoordinationError::not_holder(
                agent_id,
                inner.stick.current_holder.clone(),
            ));
        }

        let next_holder = match pass_to {
            Some(target) => {
                inner.stick.queue.retain(|queued| queued != target);
                Some(target.to_string())
            }
            None => inner.stick.queue.pop_front(),
        };

        let next_topic = next_holder
            .as_ref()
            .and_then(|next| inner.pending_topics.remove(next));
        inner.stick.topic = next_topic;
        inner.stick.set_holder(next_holder.clone());

        info!(
            agent_id,
            reason,
            next_holder = ?next_holder,
            direct_pass = pass_to.is_some(),
            queue_len = inner.stick.queue.len(),
            "Speaking stick released"
        );

        Ok(ReleaseOutcome {
            released: true,
            next_holder,
            reason: reason.to_string(),
        })
    }

    /// Pure read of the current state
    pub fn status(&self) -> CoordinationResult<StickStatus> {
        Ok(self.lock()?.stick.status())
    }

    /// 1-based queue position, or `None` when not queued
    pub fn position_of(&self, agent_id: &str) -> CoordinationResult<Option<usize>> {
        Ok(self.lock()?.stick.position_of(agent_id))
    }

    /// Snapshot the stick for a broadcast by `sender_id`. When the sender
    /// would be denied, the violation is counted before the guard drops, so
    /// a concurrent grant, mode change or reset cannot split the check from
    /// the count.
    pub fn check_and_track(&self, sender_id: &str) -> CoordinationResult<BroadcastCheck> {
        validate_agent_id(sender_id)?;
        let inner = self.lock()?;
        let stick = &inner.stick;

        let denied = stick.mode == Mode::SpeakingStick
            && stick.enforcement_level.denies()
            && !stick.is_holder(sender_id);
        let total_violations = if denied {
            Some(
                self.violations
                    .track(sender_id, ViolationKind::BroadcastWithoutStick)?,
            )
        } else {
            None
        };

        Ok(BroadcastCheck {
            status: stick.status(),
            total_violations,
        })
    }

    /// Restore defaults and clear every violation counter in one step
    pub fn reset(&self) -> CoordinationResult<()> {
        let mut inner = self.lock()?;
        self.violations.clear()?;
        inner.stick = StickState::new(Mode::Chaos, self.config.default_enforcement);
        inner.pending_topics.clear();

        info!("Speaking stick reset");
        Ok(())
    }
}

impl Default for TurnCoordinator {
    fn default() -> Self {
        Self::new(CoordinationConfig::default())
    }
}
