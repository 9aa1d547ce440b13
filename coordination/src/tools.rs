//! MCP tool layer
//!
//! Request/response types and plain functions behind each server tool:
//! - request_speaking_stick / release_speaking_stick
//! - set_communication_mode / get_speaking_stick_status / reset_speaking_stick
//! - authorize_broadcast
//! - subscribe_to_notifications / unsubscribe_from_notifications
//! - get_pending_notifications / publish_notification
//!
//! Stick transitions are announced on `queue/<event>` topics after the
//! transition has committed.

use rmcp::schemars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::config::CoordinationConfig;
use crate::error::CoordinationResult;
use crate::gate::{announce_violation, BroadcastAuthority, BroadcastGate, Decision};
use crate::notify::{
    parse_patterns, NotificationHub, NotificationRecord, SharedNotificationHub, Topic,
    TopicPattern,
};
use crate::roster::AgentRoster;
use crate::stick::{
    AgentId, EnforcementLevel, Mode, ModeChange, ReleaseOutcome, SharedTurnCoordinator,
    StickStatus, TurnCoordinator, ViolationSummary,
};

/// Everything the tools operate on, built once per server
pub struct CoordinationState {
    pub coordinator: SharedTurnCoordinator,
    pub hub: SharedNotificationHub,
    pub roster: Arc<AgentRoster>,
    pub gate: BroadcastGate<Arc<AgentRoster>>,
}

impl CoordinationState {
    pub fn new(config: CoordinationConfig) -> Self {
        let hub = NotificationHub::from_config(&config).shared();
        let coordinator = TurnCoordinator::new(config).shared();
        let roster = Arc::new(AgentRoster::new());
        let gate = BroadcastGate::new(coordinator.clone(), roster.clone());

        Self {
            coordinator,
            hub,
            roster,
            gate,
        }
    }

    fn announce(&self, event: &str, payload: serde_json::Value) -> CoordinationResult<usize> {
        self.hub.publish(Topic::queue(event)?, payload)
    }
}

/// Thread-safe coordination state wrapper
pub type SharedCoordinationState = Arc<CoordinationState>;

/// Create shared coordination state
pub fn create_shared_state(config: CoordinationConfig) -> SharedCoordinationState {
    Arc::new(CoordinationState::new(config))
}

// ============================================================================
// Request/Response Types for MCP Tools
// ============================================================================

/// Request for request_speaking_stick tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RequestStickRequest {
    #[schemars(description = "ID of the agent asking for the stick")]
    pub agent_id: String,
    #[schemars(description = "What the agent wants to talk about")]
    pub topic: Option<String>,
    #[schemars(description = "Jump to the head of the queue (default: false)")]
    pub urgent: Option<bool>,
}

/// Response from request_speaking_stick tool
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestStickResponse {
    pub granted: bool,
    pub current_holder: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    pub queue: Vec<AgentId>,
    pub message: String,
}

/// Request for release_speaking_stick tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReleaseStickRequest {
    #[schemars(description = "ID of the agent releasing the stick (must be the holder)")]
    pub agent_id: String,
    #[schemars(description = "Why the stick is released (default: 'done')")]
    pub reason: Option<String>,
    #[schemars(description = "Hand the stick directly to this agent instead of the queue head")]
    pub pass_to: Option<String>,
}

/// Response from release_speaking_stick tool
#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseStickResponse {
    #[serde(flatten)]
    pub outcome: ReleaseOutcome,
    pub message: String,
}

/// Request for set_communication_mode tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetModeRequest {
    #[schemars(description = "Mode: 'chaos' or 'speaking-stick'")]
    pub mode: String,
    #[schemars(description = "Who is changing the mode")]
    pub set_by: String,
    #[schemars(
        description = "Enforcement: 'suggestion', 'social-pressure' or 'strict' (default: keep current)"
    )]
    pub method: Option<String>,
}

/// Response from set_communication_mode tool
#[derive(Debug, Serialize, Deserialize)]
pub struct SetModeResponse {
    pub change: ModeChange,
    pub status: StickStatus,
}

/// Response from get_speaking_stick_status tool
#[derive(Debug, Serialize, Deserialize)]
pub struct StickStatusResponse {
    #[serde(flatten)]
    pub status: StickStatus,
    pub violations: Vec<ViolationSummary>,
}

/// Request for authorize_broadcast tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AuthorizeBroadcastRequest {
    #[schemars(description = "ID of the agent about to broadcast")]
    pub agent_id: String,
}

/// Response from authorize_broadcast tool
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeBroadcastResponse {
    #[serde(flatten)]
    pub decision: Decision,
    /// Mailboxes that received the violation notice
    pub violation_notified: usize,
}

/// Request for subscribe_to_notifications tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SubscribeRequest {
    #[schemars(description = "ID of the subscribing agent")]
    pub agent_id: String,
    #[schemars(
        description = "Topics or wildcards, e.g. 'agent/registered', 'message/*', 'queue/*'"
    )]
    pub events: Vec<String>,
}

/// Request for unsubscribe_from_notifications tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UnsubscribeRequest {
    #[schemars(description = "ID of the agent")]
    pub agent_id: String,
    #[schemars(description = "Patterns to remove (default: all)")]
    pub events: Option<Vec<String>>,
}

/// Response from subscribe/unsubscribe tools
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub agent_id: AgentId,
    pub subscriptions: Vec<TopicPattern>,
}

/// Request for get_pending_notifications tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PendingNotificationsRequest {
    #[schemars(description = "ID of the agent whose mailbox to drain")]
    pub agent_id: String,
}

/// Response from get_pending_notifications tool
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingNotificationsResponse {
    pub agent_id: AgentId,
    pub count: usize,
    pub notifications: Vec<NotificationRecord>,
}

/// Request for publish_notification tool
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PublishNotificationRequest {
    #[schemars(description = "Topic, e.g. 'agent/registered' or 'message/delivered'")]
    pub topic: String,
    #[schemars(description = "Arbitrary JSON payload (default: null)")]
    pub payload: Option<serde_json::Value>,
}

/// Response from publish_notification tool
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishNotificationResponse {
    pub topic: Topic,
    pub notified: usize,
}

// ============================================================================
// Tool Implementations
// ============================================================================

/// Ask for the stick; grants immediately or returns a queue position
pub fn request_speaking_stick(
    state: &CoordinationState,
    req: RequestStickRequest,
) -> CoordinationResult<RequestStickResponse> {
    let urgent = req.urgent.unwrap_or(false);
    let outcome = state
        .coordinator
        .request(&req.agent_id, req.topic.as_deref(), urgent)?;
    state.roster.observe(&req.agent_id);

    let message = match (outcome.granted, outcome.queue_position) {
        (true, _) if outcome.already_present => "You already hold the speaking stick.".to_string(),
        (true, _) => "You have the speaking stick. Release it when you are done.".to_string(),
        (false, Some(position)) if outcome.already_present => {
            format!("Already queued at position {}.", position)
        }
        (false, Some(position)) => format!("Queued at position {}.", position),
        (false, None) => "Queued.".to_string(),
    };

    if !outcome.already_present {
        let (event, payload) = if outcome.granted {
            (
                "granted",
                json!({ "agent_id": req.agent_id, "topic": req.topic }),
            )
        } else {
            (
                "joined",
                json!({
                    "agent_id": req.agent_id,
                    "queue_position": outcome.queue_position,
                    "urgent": urgent,
                }),
            )
        };
        state.announce(event, payload)?;
    }

    Ok(RequestStickResponse {
        granted: outcome.granted,
        current_holder: outcome.current_holder,
        queue_position: outcome.queue_position,
        queue: outcome.queue,
        message,
    })
}

/// Release the stick (holder only), optionally passing it directly
pub fn release_speaking_stick(
    state: &CoordinationState,
    req: ReleaseStickRequest,
) -> CoordinationResult<ReleaseStickResponse> {
    let reason = req.reason.unwrap_or_else(|| "done".to_string());
    let outcome = state
        .coordinator
        .release(&req.agent_id, &reason, req.pass_to.as_deref())?;
    if let Some(next) = &outcome.next_holder {
        state.roster.observe(next);
    }

    state.announce(
        "released",
        json!({
            "agent_id": req.agent_id,
            "next_holder": outcome.next_holder,
            "reason": outcome.reason,
        }),
    )?;

    let message = match &outcome.next_holder {
        Some(next) => format!("Speaking stick passed to {}.", next),
        None => "Speaking stick is now available.".to_string(),
    };

    Ok(ReleaseStickResponse { outcome, message })
}

/// Switch between chaos and speaking-stick modes
pub fn set_communication_mode(
    state: &CoordinationState,
    req: SetModeRequest,
) -> CoordinationResult<SetModeResponse> {
    let mode: Mode = req.mode.parse()?;
    let method: Option<EnforcementLevel> = req.method.as_deref().map(str::parse).transpose()?;

    let change = state.coordinator.set_mode(mode, &req.set_by, method)?;
    state.announce(
        "modeChanged",
        json!({
            "mode": change.mode,
            "enforcement_level": change.enforcement_level,
            "set_by": change.set_by,
        }),
    )?;

    Ok(SetModeResponse {
        change,
        status: state.coordinator.status()?,
    })
}

/// Current holder, queue, mode and violation summaries
pub fn get_speaking_stick_status(
    state: &CoordinationState,
) -> CoordinationResult<StickStatusResponse> {
    Ok(StickStatusResponse {
        status: state.coordinator.status()?,
        violations: state.coordinator.violations().offenders()?,
    })
}

/// Administrative reset: chaos mode, empty queue, no violations
pub fn reset_speaking_stick(state: &CoordinationState) -> CoordinationResult<StickStatus> {
    state.coordinator.reset()?;
    state.announce("reset", serde_json::Value::Null)?;
    state.coordinator.status()
}

/// Run the broadcast gate, announcing violations under social pressure
pub fn authorize_broadcast(
    state: &CoordinationState,
    req: AuthorizeBroadcastRequest,
) -> CoordinationResult<AuthorizeBroadcastResponse> {
    let decision = state.gate.decide(&req.agent_id)?;
    state.roster.observe(&req.agent_id);

    let violation_notified = announce_violation(&state.hub, &req.agent_id, &decision)?;

    Ok(AuthorizeBroadcastResponse {
        decision,
        violation_notified,
    })
}

pub fn subscribe_to_notifications(
    state: &CoordinationState,
    req: SubscribeRequest,
) -> CoordinationResult<SubscriptionResponse> {
    let patterns = parse_patterns(req.events.as_slice())?;
    let subscriptions = state.hub.subscribe(&req.agent_id, &patterns)?;
    state.roster.observe(&req.agent_id);

    Ok(SubscriptionResponse {
        agent_id: req.agent_id,
        subscriptions,
    })
}

pub fn unsubscribe_from_notifications(
    state: &CoordinationState,
    req: UnsubscribeRequest,
) -> CoordinationResult<SubscriptionResponse> {
    let patterns = req.events.as_deref().map(parse_patterns).transpose()?;
    let subscriptions = state.hub.unsubscribe(&req.agent_id, patterns.as_deref())?;

    Ok(SubscriptionResponse {
        agent_id: req.agent_id,
        subscriptions,
    })
}

/// Drain the agent's mailbox (at-most-once)
pub fn get_pending_notifications(
    state: &CoordinationState,
    req: PendingNotificationsRequest,
) -> CoordinationResult<PendingNotificationsResponse> {
    let notifications = state.hub.drain(&req.agent_id)?;
    state.roster.observe(&req.agent_id);

    Ok(PendingNotificationsResponse {
        agent_id: req.agent_id,
        count: notifications.len(),
        notifications,
    })
}

/// Publish a lifecycle notification on behalf of a collaborator
pub fn publish_notification(
    state: &CoordinationState,
    req: PublishNotificationRequest,
) -> CoordinationResult<PublishNotificationResponse> {
    let topic: Topic = req.topic.parse()?;
    let payload = req.payload.unwrap_or(serde_json::Value::Null);

    let agent_id = payload.get("agent_id").and_then(|v| v.as_str());
    match (&topic, agent_id) {
        (Topic::AgentRegistered, Some(agent_id)) => {
            match payload.get("name").and_then(|v| v.as_str()) {
                Some(name) => state.roster.set_display_name(agent_id, name),
                None => state.roster.observe(agent_id),
            }
        }
        (Topic::AgentUnregistered, Some(agent_id)) => {
            state.roster.remove(agent_id);
            state.hub.remove_agent(agent_id)?;
        }
        _ => {}
    }

    let notified = state.hub.publish(topic.clone(), payload)?;
    Ok(PublishNotificationResponse { topic, notified })
}
