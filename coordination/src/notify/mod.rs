//! Notification module: topic-based fan-out into per-agent mailboxes
//!
//! ```text
//! ┌──────────────┐ publish  ┌──────────────┐  match   ┌──────────────┐
//! │  Lifecycle   │─────────▶│     Hub      │─────────▶│  Mailboxes   │──▶ drain
//! │ collaborator │          │ (patterns)   │          │  (per agent) │
//! └──────────────┘          └──────┬───────┘          └──────────────┘
//!                                  │ live feed
//!                                  ▼
//!                           broadcast::Receiver
//! ```

pub mod hub;
pub mod topic;

pub use hub::{Delivery, NotificationHub, NotificationRecord, SharedNotificationHub};
pub use topic::{parse_patterns, Topic, TopicNamespace, TopicPattern};
