//! Integration tests for the MCP tool layer
//!
//! Walks the tool functions the server exposes through a full session:
//! agents subscribe, switch modes, take turns, get blocked and hear about
//! each other, all through request/response types.

use serde_json::json;
use turn_coordination::tools::{
    self, AuthorizeBroadcastRequest, PendingNotificationsRequest, PublishNotificationRequest,
    ReleaseStickRequest, RequestStickRequest, SetModeRequest, SubscribeRequest,
    UnsubscribeRequest,
};
use turn_coordination::{
    create_shared_state, CoordinationConfig, CoordinationError, Mode, SharedCoordinationState,
};

fn subscribe(state: &SharedCoordinationState, agent: &str, events: &[&str]) {
    tools::subscribe_to_notifications(
        state,
        SubscribeRequest {
            agent_id: agent.to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
        },
    )
    .unwrap();
}

fn request(state: &SharedCoordinationState, agent: &str, urgent: bool) -> bool {
    tools::request_speaking_stick(
        state,
        RequestStickRequest {
            agent_id: agent.to_string(),
            topic: None,
            urgent: Some(urgent),
        },
    )
    .unwrap()
    .granted
}

fn release(state: &SharedCoordinationState, agent: &str) -> Option<String> {
    tools::release_speaking_stick(
        state,
        ReleaseStickRequest {
            agent_id: agent.to_string(),
            reason: None,
            pass_to: None,
        },
    )
    .unwrap()
    .outcome
    .next_holder
}

fn pending_topics(state: &SharedCoordinationState, agent: &str) -> Vec<String> {
    tools::get_pending_notifications(
        state,
        PendingNotificationsRequest {
            agent_id: agent.to_string(),
        },
    )
    .unwrap()
    .notifications
    .iter()
    .map(|n| n.topic.to_string())
    .collect()
}

fn set_mode(state: &SharedCoordinationState, mode: &str, method: &str) {
    tools::set_communication_mode(
        state,
        SetModeRequest {
            mode: mode.to_string(),
            set_by: "moderator".to_string(),
            method: Some(method.to_string()),
        },
    )
    .unwrap();
}

/// Test: A whole moderated session, watched through queue notifications
#[test]
fn test_moderated_session() {
    let state = create_shared_state(CoordinationConfig::default());
    subscribe(&state, "observer", &["queue/*"]);

    set_mode(&state, "speaking-stick", "strict");
    assert!(request(&state, "a1", false));
    assert!(!request(&state, "a2", false));
    assert!(!request(&state, "a3", true));

    assert_eq!(release(&state, "a1").as_deref(), Some("a3"));
    assert_eq!(release(&state, "a3").as_deref(), Some("a2"));
    assert_eq!(release(&state, "a2"), None);

    assert_eq!(
        pending_topics(&state, "observer"),
        vec![
            "queue/modeChanged",
            "queue/granted",
            "queue/joined",
            "queue/joined",
            "queue/released",
            "queue/released",
            "queue/released",
        ]
    );
    assert!(pending_topics(&state, "observer").is_empty());
}

/// Test: Violations under social pressure land in other agents' mailboxes
#[test]
fn test_social_pressure_through_tools() {
    let state = create_shared_state(CoordinationConfig::default());
    for agent in ["a1", "a2", "a3"] {
        subscribe(&state, agent, &["queue/violation"]);
    }
    set_mode(&state, "speaking-stick", "social-pressure");
    request(&state, "a1", false);

    let response = tools::authorize_broadcast(
        &state,
        AuthorizeBroadcastRequest {
            agent_id: "a2".to_string(),
        },
    )
    .unwrap();

    assert!(!response.decision.success);
    assert_eq!(response.violation_notified, 2);
    assert_eq!(pending_topics(&state, "a1"), vec!["queue/violation"]);
    assert_eq!(pending_topics(&state, "a3"), vec!["queue/violation"]);
    assert!(pending_topics(&state, "a2").is_empty());

    let status = tools::get_speaking_stick_status(&state).unwrap();
    assert_eq!(status.violations.len(), 1);
    assert_eq!(status.violations[0].agent_id, "a2");
}

/// Test: Status serializes with the documented field names
#[test]
fn test_status_wire_shape() {
    let state = create_shared_state(CoordinationConfig::default());
    set_mode(&state, "speaking-stick", "suggestion");
    request(&state, "a1", false);
    request(&state, "a2", false);

    let status = tools::get_speaking_stick_status(&state).unwrap();
    let value = serde_json::to_value(&status).unwrap();

    assert_eq!(value["mode"], "speaking-stick");
    assert_eq!(value["enforcement_level"], "suggestion");
    assert_eq!(value["current_holder"], "a1");
    assert_eq!(value["queue"], json!(["a2"]));
    assert_eq!(value["stick_available"], false);
    assert_eq!(value["mode_set_by"], "moderator");
    assert!(value["violations"].as_array().unwrap().is_empty());
}

/// Test: Errors come back as structured JSON with a stable code
#[test]
fn test_errors_are_structured() {
    let state = create_shared_state(CoordinationConfig::default());
    request(&state, "a1", false);

    let err = tools::release_speaking_stick(
        &state,
        ReleaseStickRequest {
            agent_id: "a2".to_string(),
            reason: None,
            pass_to: None,
        },
    )
    .unwrap_err();
    assert!(matches!(err, CoordinationError::NotHolder { .. }));

    let body: serde_json::Value = serde_json::from_str(&err.to_structured_json()).unwrap();
    assert_eq!(body["context"]["current_holder"], "a1");
    assert_eq!(body["retryable"], false);

    let bad_method = tools::set_communication_mode(
        &state,
        SetModeRequest {
            mode: "chaos".to_string(),
            set_by: "moderator".to_string(),
            method: Some("gentle".to_string()),
        },
    )
    .unwrap_err();
    assert!(matches!(bad_method, CoordinationError::ValidationError { .. }));

    let bad_request = tools::request_speaking_stick(
        &state,
        RequestStickRequest {
            agent_id: "  ".to_string(),
            topic: None,
            urgent: None,
        },
    )
    .unwrap_err();
    assert!(matches!(bad_request, CoordinationError::ValidationError { .. }));
}

/// Test: Reset is announced and returns a clean chaos state
#[test]
fn test_reset_tool() {
    let state = create_shared_state(CoordinationConfig::default());
    subscribe(&state, "observer", &["queue/reset"]);
    set_mode(&state, "speaking-stick", "strict");
    request(&state, "a1", false);

    let status = tools::reset_speaking_stick(&state).unwrap();
    assert_eq!(status.mode, Mode::Chaos);
    assert!(status.stick_available);
    assert_eq!(pending_topics(&state, "observer"), vec!["queue/reset"]);
}

/// Test: Lifecycle publishes reach subscribers and unsubscribe stops them
#[test]
fn test_lifecycle_publish_and_unsubscribe() {
    let state = create_shared_state(CoordinationConfig::default());
    subscribe(&state, "a", &["agent/*", "message/*"]);

    let published = tools::publish_notification(
        &state,
        PublishNotificationRequest {
            topic: "message/delivered".to_string(),
            payload: Some(json!({ "message_id": "m-1" })),
        },
    )
    .unwrap();
    assert_eq!(published.notified, 1);

    let remaining = tools::unsubscribe_from_notifications(
        &state,
        UnsubscribeRequest {
            agent_id: "a".to_string(),
            events: Some(vec!["message/*".to_string()]),
        },
    )
    .unwrap();
    assert_eq!(remaining.subscriptions.len(), 1);

    let again = tools::publish_notification(
        &state,
        PublishNotificationRequest {
            topic: "message/delivered".to_string(),
            payload: None,
        },
    )
    .unwrap();
    assert_eq!(again.notified, 0);
    assert_eq!(pending_topics(&state, "a"), vec!["message/delivered"]);

    let unknown = tools::publish_notification(
        &state,
        PublishNotificationRequest {
            topic: "agent/exploded".to_string(),
            payload: None,
        },
    );
    assert!(unknown.is_err());
}
