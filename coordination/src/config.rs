//! Coordinator configuration
//!
//! Defaults, overridden by environment variables (`from_env`) and then by CLI
//! flags in the server binary.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stick::{EnforcementLevel, Mode, ModeSwitchPolicy};

/// Default capacity of the hub's live delivery feed
pub const DEFAULT_LIVE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Mode the stick starts in. Reset always returns to chaos.
    pub initial_mode: Mode,

    /// Enforcement level used at startup, after reset, and when `set_mode`
    /// does not name one
    pub default_enforcement: EnforcementLevel,

    /// Whether switching modes clears holder and queue
    pub mode_switch_policy: ModeSwitchPolicy,

    /// Capacity of the live delivery broadcast channel
    pub live_capacity: usize,

    /// Per-agent mailbox cap (0 = unbounded); oldest records are dropped
    pub mailbox_limit: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            initial_mode: Mode::Chaos,
            default_enforcement: EnforcementLevel::Strict,
            mode_switch_policy: ModeSwitchPolicy::Keep,
            live_capacity: DEFAULT_LIVE_CAPACITY,
            mailbox_limit: 0,
        }
    }
}

impl CoordinationConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (env in production, maps in tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("STICK_INITIAL_MODE") {
            match val.parse() {
                Ok(mode) => config.initial_mode = mode,
                Err(e) => warn!(value = %val, "Ignoring STICK_INITIAL_MODE: {}", e),
            }
        }
        if let Some(val) = lookup("STICK_DEFAULT_ENFORCEMENT") {
            match val.parse() {
                Ok(level) => config.default_enforcement = level,
                Err(e) => warn!(value = %val, "Ignoring STICK_DEFAULT_ENFORCEMENT: {}", e),
            }
        }
        if let Some(val) = lookup("STICK_MODE_SWITCH_POLICY") {
            match val.parse() {
                Ok(policy) => config.mode_switch_policy = policy,
                Err(e) => warn!(value = %val, "Ignoring STICK_MODE_SWITCH_POLICY: {}", e),
            }
        }
        if let Some(val) = lookup("NOTIFY_LIVE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.live_capacity = n,
                _ => warn!(value = %val, "Ignoring NOTIFY_LIVE_CAPACITY: expected a positive integer"),
            }
        }
        if let Some(val) = lookup("NOTIFY_MAILBOX_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) => config.mailbox_limit = n,
                Err(_) => warn!(value = %val, "Ignoring NOTIFY_MAILBOX_LIMIT: expected an integer"),
            }
        }

        config
    }
}
