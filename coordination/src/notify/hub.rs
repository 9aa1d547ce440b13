//! Notification hub: subscriptions, per-agent mailboxes, publish/drain
//!
//! Publishing appends at most one record per subscribed agent to that agent's
//! mailbox. Mailboxes accumulate until drained; a drain hands back everything
//! in publish order and empties the mailbox (at-most-once delivery). Every
//! delivery is also mirrored onto a Tokio broadcast channel so a transport can
//! push records as they happen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::topic::{Topic, TopicPattern};
use crate::config::{CoordinationConfig, DEFAULT_LIVE_CAPACITY};
use crate::error::{CoordinationError, CoordinationResult};
use crate::stick::AgentId;

/// Shared reference to a NotificationHub
pub type SharedNotificationHub = Arc<NotificationHub>;

/// One undelivered notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Id of the publish call; identical across recipients of one publish
    pub id: String,
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(topic: Topic, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// A record as it lands in one agent's mailbox (live feed item)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub agent_id: AgentId,
    pub record: NotificationRecord,
}

#[derive(Default)]
struct HubInner {
    subscriptions: HashMap<AgentId, BTreeSet<TopicPattern>>,
    mailboxes: HashMap<AgentId, VecDeque<NotificationRecord>>,
}

/// Who a delivery goes to
enum Targets<'a> {
    /// Every agent with a matching pattern
    Subscribers,
    /// Exactly these agents, subscriptions ignored
    Direct(&'a [AgentId]),
}

pub struct NotificationHub {
    inner: Mutex<HubInner>,
    live: broadcast::Sender<Delivery>,
    /// 0 = unbounded
    mailbox_limit: usize,
}

fn validate_agent_id(agent_id: &str) -> CoordinationResult<()> {
    if agent_id.trim().is_empty() {
        return Err(CoordinationError::validation("agent_id must not be empty"));
    }
    Ok(())
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_LIVE_CAPACITY, 0)
    }

    pub fn from_config(config: &CoordinationConfig) -> Self {
        Self::with_limits(config.live_capacity, config.mailbox_limit)
    }

    fn with_limits(live_capacity: usize, mailbox_limit: usize) -> Self {
        let (live, _) = broadcast::channel(live_capacity.max(1));
        Self {
            inner: Mutex::new(HubInner::default()),
            live,
            mailbox_limit,
        }
    }

    /// Create a shared reference to this hub
    pub fn shared(self) -> SharedNotificationHub {
        Arc::new(self)
    }

    fn lock(&self) -> CoordinationResult<MutexGuard<'_, HubInner>> {
        self.inner
            .lock()
            .map_err(|_| CoordinationError::lock_poisoned("notification hub"))
    }

    /// Add `patterns` to the agent's subscription set. Returns the full set.
    /// An agent stays unregistered until it holds at least one pattern.
    pub fn subscribe(
        &self,
        agent_id: &str,
        patterns: &[TopicPattern],
    ) -> CoordinationResult<Vec<TopicPattern>> {
        validate_agent_id(agent_id)?;
        let mut inner = self.lock()?;
        if patterns.is_empty() {
            return Ok(inner
                .subscriptions
                .get(agent_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default());
        }

        let set = inner
            .subscriptions
            .entry(agent_id.to_string())
            .or_default();
        set.extend(patterns.iter().cloned());

        debug!(agent_id, patterns = set.len(), "Subscribed");
        Ok(set.iter().cloned().collect())
    }

    /// Remove the given patterns, or every pattern when `patterns` is `None`.
    /// Returns what remains. Pending mailbox records are kept.
    pub fn unsubscribe(
        &self,
        agent_id: &str,
        patterns: Option<&[TopicPattern]>,
    ) -> CoordinationResult<Vec<TopicPattern>> {
        validate_agent_id(agent_id)?;
        let mut inner = self.lock()?;

        let remaining = match (patterns, inner.subscriptions.get_mut(agent_id)) {
            (Some(patterns), Some(set)) => {
                for pattern in patterns {
                    set.remove(pattern);
                }
                set.iter().cloned().collect()
            }
            _ => Vec::new(),
        };
        if remaining.is_empty() {
            inner.subscriptions.remove(agent_id);
        }

        debug!(agent_id, remaining = remaining.len(), "Unsubscribed");
        Ok(remaining)
    }

    /// Fan `topic` out to every matching subscriber. Returns the number of
    /// agents notified.
    pub fn publish(&self, topic: Topic, payload: serde_json::Value) -> CoordinationResult<usize> {
        self.deliver(Targets::Subscribers, topic, payload)
    }

    /// Append one record to each of `recipients`' mailboxes whether or not
    /// they subscribed. Blank and repeated ids are skipped.
    pub fn publish_direct(
        &self,
        recipients: &[AgentId],
        topic: Topic,
        payload: serde_json::Value,
    ) -> CoordinationResult<usize> {
        self.deliver(Targets::Direct(recipients), topic, payload)
    }

    fn deliver(
        &self,
        targets: Targets<'_>,
        topic: Topic,
        payload: serde_json::Value,
    ) -> CoordinationResult<usize> {
        let record = NotificationRecord::new(topic, payload);

        let mut inner = self.lock()?;
        let HubInner {
            subscriptions,
            mailboxes,
        } = &mut *inner;

        let recipients: Vec<AgentId> = match targets {
            Targets::Subscribers => subscriptions
                .iter()
                .filter(|(_, patterns)| patterns.iter().any(|p| p.matches(&record.topic)))
                .map(|(agent_id, _)| agent_id.clone())
                .collect(),
            Targets::Direct(listed) => listed
                .iter()
                .filter(|agent_id| !agent_id.trim().is_empty())
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        for agent_id in &recipients {
            let mailbox = mailboxes.entry(agent_id.clone()).or_default();
            if self.mailbox_limit > 0 && mailbox.len() >= self.mailbox_limit {
                mailbox.pop_front();
                warn!(
                    agent_id = %agent_id,
                    limit = self.mailbox_limit,
                    "Mailbox full, dropped oldest notification"
                );
            }
            mailbox.push_back(record.clone());

            // Sent under the guard so live order matches mailbox order.
            // No live listeners is fine.
            let _ = self.live.send(Delivery {
                agent_id: agent_id.clone(),
                record: record.clone(),
            });
        }

        debug!(
            topic = %record.topic,
            notified = recipients.len(),
            "Notification published"
        );
        Ok(recipients.len())
    }

    /// Take every pending record for `agent_id`, oldest first
    pub fn drain(&self, agent_id: &str) -> CoordinationResult<Vec<NotificationRecord>> {
        validate_agent_id(agent_id)?;
        let drained: Vec<NotificationRecord> = self
            .lock()?
            .mailboxes
            .remove(agent_id)
            .map(Vec::from)
            .unwrap_or_default();

        debug!(agent_id, count = drained.len(), "Mailbox drained");
        Ok(drained)
    }

    /// Number of records waiting for `agent_id`
    pub fn pending_count(&self, agent_id: &str) -> CoordinationResult<usize> {
        Ok(self
            .lock()?
            .mailboxes
            .get(agent_id)
            .map(VecDeque::len)
            .unwrap_or(0))
    }

    pub fn subscriptions(&self, agent_id: &str) -> CoordinationResult<Vec<TopicPattern>> {
        Ok(self
            .lock()?
            .subscriptions
            .get(agent_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Every agent with at least one subscription, sorted
    pub fn subscribers(&self) -> CoordinationResult<Vec<AgentId>> {
        let mut agents: Vec<AgentId> = self.lock()?.subscriptions.keys().cloned().collect();
        agents.sort();
        Ok(agents)
    }

    /// Purge subscriptions and mailbox of a removed agent.
    /// Returns whether anything was held for it.
    pub fn remove_agent(&self, agent_id: &str) -> CoordinationResult<bool> {
        let mut inner = self.lock()?;
        let had_subscriptions = inner.subscriptions.remove(agent_id).is_some();
        let had_mailbox = inner.mailboxes.remove(agent_id).is_some();
        Ok(had_subscriptions || had_mailbox)
    }

    /// Receive every delivery as it happens. Lagging receivers lose items;
    /// mailboxes are unaffected.
    pub fn subscribe_live(&self) -> broadcast::Receiver<Delivery> {
        self.live.subscribe()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::topic::parse_patterns;
    use serde_json::json;

    fn subscribed(hub: &NotificationHub, agent: &str, patterns: &[&str]) {
        hub.subscribe(agent, &parse_patterns(patterns).unwrap())
            .unwrap();
    }

    #[test]
    fn test_publish_routes_by_pattern() {
        let hub = NotificationHub::new();
        subscribed(&hub, "exact", &["agent/registered"]);
        subscribed(&hub, "wild", &["agent/*"]);
        subscribed(&hub, "other", &["message/*"]);

        let notified = hub
            .publish(Topic::AgentRegistered, json!({"agent_id": "new"}))
            .unwrap();

        assert_eq!(notified, 2);
        assert_eq!(hub.drain("exact").unwrap().len(), 1);
        assert_eq!(hub.drain("wild").unwrap().len(), 1);
        assert!(hub.drain("other").unwrap().is_empty());
    }

    #[test]
    fn test_overlapping_patterns_deliver_once() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["agent/registered", "agent/*"]);

        assert_eq!(hub.publish(Topic::AgentRegistered, json!(1)).unwrap(), 1);
        assert_eq!(hub.pending_count("a").unwrap(), 1);
    }

    #[test]
    fn test_drain_is_fifo_and_empties() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["message/*"]);

        hub.publish(Topic::MessageDelivered, json!({"n": 1})).unwrap();
        hub.publish(Topic::MessageAcknowledged, json!({"n": 2})).unwrap();
        hub.publish(Topic::MessageDelivered, json!({"n": 3})).unwrap();

        let records = hub.drain("a").unwrap();
        let order: Vec<i64> = records
            .iter()
            .map(|r| r.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(records[1].topic, Topic::MessageAcknowledged);
        assert!(hub.drain("a").unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_is_idempotent_union() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["agent/*"]);
        subscribed(&hub, "a", &["agent/*", "broadcast/message"]);

        let subs = hub.subscriptions("a").unwrap();
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn test_unsubscribe_partial_and_all() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["agent/*", "message/*", "queue/*"]);

        let remaining = hub
            .unsubscribe("a", Some(&parse_patterns(&["message/*"]).unwrap()))
            .unwrap();
        assert_eq!(remaining.len(), 2);

        hub.publish(Topic::MessageDelivered, json!(null)).unwrap();
        assert_eq!(hub.pending_count("a").unwrap(), 0);

        assert!(hub.unsubscribe("a", None).unwrap().is_empty());
        assert!(hub.subscribers().unwrap().is_empty());
        assert_eq!(hub.publish(Topic::AgentRegistered, json!(null)).unwrap(), 0);
    }

    #[test]
    fn test_unsubscribe_keeps_pending_records() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["agent/*"]);
        hub.publish(Topic::AgentUnregistered, json!(null)).unwrap();

        hub.unsubscribe("a", None).unwrap();
        assert_eq!(hub.drain("a").unwrap().len(), 1);
    }

    #[test]
    fn test_publish_direct_ignores_subscriptions() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["queue/*"]);
        subscribed(&hub, "c", &["agent/*"]);

        let recipients = vec![
            "b".to_string(),
            "c".to_string(),
            "c".to_string(),
            " ".to_string(),
        ];
        let notified = hub
            .publish_direct(&recipients, Topic::queue("violation").unwrap(), json!({}))
            .unwrap();

        assert_eq!(notified, 2);
        assert_eq!(hub.pending_count("a").unwrap(), 0);
        assert_eq!(hub.pending_count("b").unwrap(), 1);
        assert_eq!(hub.pending_count("c").unwrap(), 1);
        // Direct delivery does not create a subscription
        assert_eq!(hub.subscribers().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_empty_subscribe_registers_nothing() {
        let hub = NotificationHub::new();
        assert!(hub.subscribe("a", &[]).unwrap().is_empty());
        assert!(hub.subscribers().unwrap().is_empty());

        subscribed(&hub, "b", &["agent/*"]);
        assert_eq!(hub.subscribe("b", &[]).unwrap().len(), 1);
        assert_eq!(hub.subscribers().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_mailbox_limit_drops_oldest() {
        let config = CoordinationConfig {
            mailbox_limit: 2,
            ..Default::default()
        };
        let hub = NotificationHub::from_config(&config);
        subscribed(&hub, "a", &["broadcast/message"]);

        for n in 0..3 {
            hub.publish(Topic::BroadcastMessage, json!(n)).unwrap();
        }

        let records = hub.drain("a").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, json!(1));
        assert_eq!(records[1].payload, json!(2));
    }

    #[test]
    fn test_remove_agent_purges_everything() {
        let hub = NotificationHub::new();
        subscribed(&hub, "a", &["agent/*"]);
        hub.publish(Topic::AgentRegistered, json!(null)).unwrap();

        assert!(hub.remove_agent("a").unwrap());
        assert!(hub.subscriptions("a").unwrap().is_empty());
        assert_eq!(hub.pending_count("a").unwrap(), 0);
        assert!(!hub.remove_agent("a").unwrap());
    }

    #[test]
    fn test_empty_agent_rejected() {
        let hub = NotificationHub::new();
        assert!(matches!(
            hub.subscribe("", &[]),
            Err(CoordinationError::ValidationError { .. })
        ));
        assert!(hub.drain(" ").is_err());
    }

    #[tokio::test]
    async fn test_live_feed_mirrors_deliveries() {
        let hub = NotificationHub::new().shared();
        let mut live = hub.subscribe_live();
        subscribed(&hub, "a", &["agent/*"]);
        subscribed(&hub, "b", &["agent/registered"]);

        hub.publish(Topic::AgentRegistered, json!({"agent_id": "c"}))
            .unwrap();

        let first = live.recv().await.unwrap();
        let second = live.recv().await.unwrap();
        let mut agents = vec![first.agent_id.clone(), second.agent_id.clone()];
        agents.sort();

        assert_eq!(agents, vec!["a", "b"]);
        assert_eq!(first.record.id, second.record.id);
        // Live delivery does not consume the mailbox
        assert_eq!(hub.pending_count("a").unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_and_drain_lose_nothing() {
        let hub = NotificationHub::new().shared();
        subscribed(&hub, "reader", &["message/*"]);

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for n in 0..50 {
                        hub.publish(Topic::MessageDelivered, json!(n)).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let reader = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let mut seen = 0;
                for _ in 0..100 {
                    seen += hub.drain("reader").unwrap().len();
                    tokio::task::yield_now().await;
                }
                seen
            })
        };

        for p in publishers {
            p.await.unwrap();
        }
        let mut total = reader.await.unwrap();
        total += hub.drain("reader").unwrap().len();

        assert_eq!(total, 200);
    }
}
