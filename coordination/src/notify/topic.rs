//! Notification topics and subscription patterns
//!
//! Topics are a closed vocabulary of `namespace/event` tags. A pattern is
//! either one exact topic or `namespace/*`, which matches every event in that
//! namespace.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::CoordinationError;

/// Free-form queue event names (`queue/<event>`)
static QUEUE_EVENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,63}$").unwrap());

/// Top-level topic namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicNamespace {
    Agent,
    Message,
    Broadcast,
    Queue,
}

impl TopicNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Message => "message",
            Self::Broadcast => "broadcast",
            Self::Queue => "queue",
        }
    }
}

impl FromStr for TopicNamespace {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "message" => Ok(Self::Message),
            "broadcast" => Ok(Self::Broadcast),
            "queue" => Ok(Self::Queue),
            other => Err(CoordinationError::validation(format!(
                "unknown topic namespace '{}'",
                other
            ))),
        }
    }
}

/// A published topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    AgentRegistered,
    AgentUnregistered,
    AgentStatusChanged,
    MessageDelivered,
    MessageAcknowledged,
    BroadcastMessage,
    /// `queue/<event>`, e.g. `queue/granted`
    Queue(String),
}

impl Topic {
    /// Build a `queue/<event>` topic, validating the event name
    pub fn queue(event: &str) -> Result<Self, CoordinationError> {
        if !QUEUE_EVENT_PATTERN.is_match(event) {
            return Err(CoordinationError::validation(format!(
                "invalid queue event name '{}'",
                event
            )));
        }
        Ok(Self::Queue(event.to_string()))
    }

    pub fn namespace(&self) -> TopicNamespace {
        match self {
            Self::AgentRegistered | Self::AgentUnregistered | Self::AgentStatusChanged => {
                TopicNamespace::Agent
            }
            Self::MessageDelivered | Self::MessageAcknowledged => TopicNamespace::Message,
            Self::BroadcastMessage => TopicNamespace::Broadcast,
            Self::Queue(_) => TopicNamespace::Queue,
        }
    }

    pub fn event(&self) -> &str {
        match self {
            Self::AgentRegistered => "registered",
            Self::AgentUnregistered => "unregistered",
            Self::AgentStatusChanged => "statusChanged",
            Self::MessageDelivered => "delivered",
            Self::MessageAcknowledged => "acknowledged",
            Self::BroadcastMessage => "message",
            Self::Queue(event) => event,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace().as_str(), self.event())
    }
}

impl FromStr for Topic {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, event) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CoordinationError::validation(format!("topic '{}' has no '/'", s)))?;

        let topic = match (namespace.parse::<TopicNamespace>()?, event) {
            (TopicNamespace::Agent, "registered") => Self::AgentRegistered,
            (TopicNamespace::Agent, "unregistered") => Self::AgentUnregistered,
            (TopicNamespace::Agent, "statusChanged") => Self::AgentStatusChanged,
            (TopicNamespace::Message, "delivered") => Self::MessageDelivered,
            (TopicNamespace::Message, "acknowledged") => Self::MessageAcknowledged,
            (TopicNamespace::Broadcast, "message") => Self::BroadcastMessage,
            (TopicNamespace::Queue, event) => Self::queue(event)?,
            _ => {
                return Err(CoordinationError::validation(format!(
                    "unknown topic '{}'",
                    s
                )))
            }
        };
        Ok(topic)
    }
}

impl TryFrom<String> for Topic {
    type Error = CoordinationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

/// Subscription filter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TopicPattern {
    /// Matches one topic, stored in canonical string form
    Exact(String),
    /// `namespace/*`
    Namespace(TopicNamespace),
}

impl TopicPattern {
    /// Whether `topic` passes this filter
    pub fn matches(&self, topic: &Topic) -> bool {
        match self {
            Self::Exact(exact) => *exact == topic.to_string(),
            Self::Namespace(namespace) => topic.namespace() == *namespace,
        }
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(exact) => write!(f, "{}", exact),
            Self::Namespace(namespace) => write!(f, "{}/*", namespace.as_str()),
        }
    }
}

impl FromStr for TopicPattern {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_suffix("/*") {
            Some(namespace) => Ok(Self::Namespace(namespace.parse()?)),
            None => Ok(Self::Exact(s.parse::<Topic>()?.to_string())),
        }
    }
}

impl From<Topic> for TopicPattern {
    fn from(topic: Topic) -> Self {
        Self::Exact(topic.to_string())
    }
}

impl TryFrom<String> for TopicPattern {
    type Error = CoordinationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TopicPattern> for String {
    fn from(pattern: TopicPattern) -> Self {
        pattern.to_string()
    }
}

/// Parse a list of pattern strings, failing on the first malformed one
pub fn parse_patterns<S: AsRef<str>>(raw: &[S]) -> Result<Vec<TopicPattern>, CoordinationError> {
    raw.iter().map(|p| p.as_ref().parse()).collect()
}
