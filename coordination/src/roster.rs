//! Agent directory seam
//!
//! Agent identity lives in an external registry. The gate only needs two
//! things from it: a display name for the current holder, and the set of
//! agents to notify. [`AgentRoster`] is the in-memory implementation the tool
//! server fills from the agent ids it sees.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::stick::AgentId;

/// Read access to agent identity
pub trait AgentDirectory: Send + Sync {
    /// Human-readable name, if the registry knows one
    fn display_name(&self, agent_id: &str) -> Option<String>;

    /// Every known agent id
    fn agent_ids(&self) -> Vec<AgentId>;
}

impl<T: AgentDirectory + ?Sized> AgentDirectory for Arc<T> {
    fn display_name(&self, agent_id: &str) -> Option<String> {
        (**self).display_name(agent_id)
    }

    fn agent_ids(&self) -> Vec<AgentId> {
        (**self).agent_ids()
    }
}

/// In-memory roster of agents seen so far
#[derive(Debug, Default)]
pub struct AgentRoster {
    // Entries are plain data, so a poisoned guard is still safe to read
    agents: RwLock<BTreeMap<AgentId, Option<String>>>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `agent_id`; empty ids are ignored
    pub fn observe(&self, agent_id: &str) {
        if agent_id.trim().is_empty() {
            return;
        }
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.entry(agent_id.to_string()).or_insert(None);
    }

    pub fn set_display_name(&self, agent_id: &str, name: impl Into<String>) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.insert(agent_id.to_string(), Some(name.into()));
    }

    /// Forget `agent_id`. Returns whether it was known.
    pub fn remove(&self, agent_id: &str) -> bool {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.remove(agent_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AgentDirectory for AgentRoster {
    fn display_name(&self, agent_id: &str) -> Option<String> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent_id)
            .cloned()
            .flatten()
    }

    fn agent_ids(&self) -> Vec<AgentId> {
        self.agents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}
