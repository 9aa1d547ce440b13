//! Integration tests for broadcast enforcement
//!
//! Drives the coordinator, gate and hub together through the scenarios an
//! agent swarm actually hits: strict turn-taking, escalating repeat
//! offenders, advisory mode and social-pressure fan-out.

use std::sync::Arc;

use turn_coordination::{
    announce_violation, AgentRoster, BroadcastAuthority, BroadcastGate, EnforcementLevel, Mode,
    NotificationHub, SharedTurnCoordinator, SocialPressureLevel, TopicPattern, TurnCoordinator,
};

/// Build a gate over a fresh coordinator switched to speaking-stick mode
fn gated(
    level: EnforcementLevel,
    agents: &[&str],
) -> (SharedTurnCoordinator, BroadcastGate<Arc<AgentRoster>>) {
    let coordinator = TurnCoordinator::default().shared();
    coordinator
        .set_mode(Mode::SpeakingStick, "moderator", Some(level))
        .unwrap();

    let roster = Arc::new(AgentRoster::new());
    for agent in agents {
        roster.observe(agent);
    }
    let gate = BroadcastGate::new(coordinator.clone(), roster);
    (coordinator, gate)
}

/// Test: Strict mode, one holder talks, the other is told to wait
#[test]
fn test_strict_turn_taking_end_to_end() {
    let (coordinator, gate) = gated(EnforcementLevel::Strict, &["a1", "a2"]);

    let grant = coordinator.request("a1", None, false).unwrap();
    assert!(grant.granted);

    assert!(gate.decide("a1").unwrap().success);

    let blocked = gate.decide("a2").unwrap();
    assert!(!blocked.success);
    let denial = blocked.denial.unwrap();
    assert_eq!(denial.total_violations, 1);
    assert_eq!(denial.queue_length, 0);
    assert_eq!(denial.current_holder.as_deref(), Some("a1"));
    assert_eq!(denial.social_pressure_level, SocialPressureLevel::Mild);
    assert_eq!(denial.consequence, "warning issued");

    let released = coordinator.release("a1", "done", None).unwrap();
    assert_eq!(released.next_holder, None);
    assert!(coordinator.status().unwrap().stick_available);

    assert!(coordinator.request("a2", None, false).unwrap().granted);
    assert!(gate.decide("a2").unwrap().success);
    assert_eq!(coordinator.violations().count("a2").unwrap(), 1);
}

/// Test: Repeat offenders climb the consequence ladder
#[test]
fn test_repeat_offender_escalation() {
    let (coordinator, gate) = gated(EnforcementLevel::Strict, &["h", "loud"]);
    coordinator.request("h", None, false).unwrap();

    let mut ladder = Vec::new();
    for _ in 0..7 {
        let denial = gate.decide("loud").unwrap().denial.unwrap();
        ladder.push((denial.total_violations, denial.consequence));
    }

    assert_eq!(ladder[0], (1, "warning issued".to_string()));
    assert_eq!(ladder[1], (2, "warning issued".to_string()));
    assert_eq!(ladder[2], (3, "added to chatterbox list".to_string()));
    assert_eq!(ladder[4], (5, "added to chatterbox list".to_string()));
    assert_eq!(ladder[5], (6, "CHATTERBOX HALL OF SHAME".to_string()));
    assert_eq!(ladder[6], (7, "CHATTERBOX HALL OF SHAME".to_string()));

    let offenders = coordinator.violations().offenders().unwrap();
    assert_eq!(offenders.len(), 1);
    assert_eq!(offenders[0].agent_id, "loud");
    assert_eq!(offenders[0].total, 7);
    assert_eq!(offenders[0].level, SocialPressureLevel::Shame);
}

/// Test: Suggestion mode never denies and never counts
#[test]
fn test_suggestion_never_denies() {
    let (coordinator, gate) = gated(EnforcementLevel::Suggestion, &["h", "x"]);

    // Nobody holds the stick yet
    let early = gate.decide("x").unwrap();
    assert!(early.success);
    assert!(early.warning.is_some());

    coordinator.request("h", None, false).unwrap();
    for _ in 0..5 {
        let decision = gate.decide("x").unwrap();
        assert!(decision.success);
        assert!(decision.denial.is_none());
    }
    assert_eq!(coordinator.violations().count("x").unwrap(), 0);
}

/// Test: Chaos mode lets everyone through regardless of enforcement
#[test]
fn test_chaos_ignores_enforcement() {
    let (coordinator, gate) = gated(EnforcementLevel::Strict, &["h", "x"]);
    coordinator.request("h", None, false).unwrap();
    coordinator.set_mode(Mode::Chaos, "moderator", None).unwrap();

    let decision = gate.decide("x").unwrap();
    assert!(decision.success);
    assert!(decision.warning.is_none());
    assert_eq!(coordinator.violations().count("x").unwrap(), 0);
}

/// Test: Under social pressure everyone else hears about the violation
#[test]
fn test_social_pressure_fan_out() {
    let (coordinator, gate) = gated(EnforcementLevel::SocialPressure, &["h", "x", "y", "z"]);
    coordinator.request("h", None, false).unwrap();

    let hub = NotificationHub::new();
    let queue_events: Vec<TopicPattern> = vec!["queue/*".parse().unwrap()];
    for agent in ["h", "x", "y"] {
        hub.subscribe(agent, &queue_events).unwrap();
    }

    let decision = gate.decide("x").unwrap();
    let denial = decision.denial.clone().unwrap();
    assert!(denial.violation_broadcast);
    assert_eq!(denial.notify_agents, vec!["h", "y", "z"]);

    // Every listed agent is told, subscribed or not; the offender is not
    let notified = announce_violation(&hub, "x", &decision).unwrap();
    assert_eq!(notified, 3);
    for agent in ["h", "y", "z"] {
        assert_eq!(hub.pending_count(agent).unwrap(), 1);
    }
    assert_eq!(hub.pending_count("x").unwrap(), 0);

    let notice = hub.drain("h").unwrap().remove(0);
    assert_eq!(notice.topic.to_string(), "queue/violation");
    assert_eq!(notice.payload["offender"], "x");
    assert_eq!(notice.payload["consequence"], "warning issued");
}

/// Test: Reset returns to chaos and forgives everyone
#[test]
fn test_reset_clears_violations() {
    let (coordinator, gate) = gated(EnforcementLevel::Strict, &["h", "x"]);
    coordinator.request("h", None, false).unwrap();
    gate.decide("x").unwrap();
    gate.decide("x").unwrap();
    assert_eq!(coordinator.violations().count("x").unwrap(), 2);

    coordinator.reset().unwrap();

    let status = coordinator.status().unwrap();
    assert_eq!(status.mode, Mode::Chaos);
    assert!(status.stick_available);
    assert_eq!(status.enforcement_level, EnforcementLevel::Strict);
    assert_eq!(coordinator.violations().count("x").unwrap(), 0);
    assert!(coordinator.violations().offenders().unwrap().is_empty());
}

/// Test: Concurrent denials are all counted
#[test]
fn test_concurrent_denials_counted_exactly() {
    let (coordinator, gate) = gated(EnforcementLevel::Strict, &["h", "x"]);
    coordinator.request("h", None, false).unwrap();
    let gate = Arc::new(gate);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = gate.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    assert!(!gate.decide("x").unwrap().success);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(coordinator.violations().count("x").unwrap(), 200);
}

/// Test: Nobody subscribed, yet social pressure still reaches every other agent
#[test]
fn test_social_pressure_without_subscriptions() {
    let (coordinator, gate) = gated(EnforcementLevel::SocialPressure, &["h", "x", "y", "z"]);
    coordinator.request("h", None, false).unwrap();
    let hub = NotificationHub::new();

    let decision = gate.decide("x").unwrap();
    assert_eq!(announce_violation(&hub, "x", &decision).unwrap(), 3);

    let notice = hub.drain("z").unwrap().remove(0);
    assert_eq!(notice.topic.to_string(), "queue/violation");
    assert_eq!(notice.payload["offender"], "x");
    assert!(hub.subscribers().unwrap().is_empty());
}

/// Test: A reset racing with gate checks never leaves a violation behind
#[test]
fn test_reset_racing_with_denials() {
    let (coordinator, gate) = gated(EnforcementLevel::Strict, &["h", "x"]);
    coordinator.request("h", None, false).unwrap();
    let gate = Arc::new(gate);

    let sender = {
        let gate = gate.clone();
        std::thread::spawn(move || {
            for _ in 0..500 {
                let decision = gate.decide("x").unwrap();
                if let Some(denial) = decision.denial {
                    assert!(denial.current_holder.is_some());
                }
            }
        })
    };
    std::thread::yield_now();
    coordinator.reset().unwrap();
    sender.join().unwrap();

    assert_eq!(coordinator.status().unwrap().mode, Mode::Chaos);
    assert_eq!(coordinator.violations().count("x").unwrap(), 0);
}
