//! MCP Server for speaking-stick turn coordination
//!
//! Exposes the speaking stick and the notification hub as MCP tools over
//! stdio:
//! - `request_speaking_stick`, `release_speaking_stick`
//! - `set_communication_mode`, `get_speaking_stick_status`, `reset_speaking_stick`
//! - `authorize_broadcast`
//! - `subscribe_to_notifications`, `unsubscribe_from_notifications`
//! - `get_pending_notifications`, `publish_notification`
//!
//! # Usage
//!
//! ```bash
//! # Standard MCP mode
//! turn-coordination
//!
//! # Gated from the start, pushing notifications as MCP log frames
//! turn-coordination --initial-mode speaking-stick --enforcement strict --push-notifications
//!
//! # Configuration via environment
//! STICK_DEFAULT_ENFORCEMENT=social-pressure NOTIFY_MAILBOX_LIMIT=500 turn-coordination
//! ```

use anyhow::Result;
use clap::Parser;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{LoggingLevel, LoggingMessageNotificationParam, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::Serialize;
use tokio::io::{stdin, stdout};
use tokio::sync::broadcast::error::RecvError;

use turn_coordination::tools::{
    self, AuthorizeBroadcastRequest, PendingNotificationsRequest, PublishNotificationRequest,
    ReleaseStickRequest, RequestStickRequest, SetModeRequest, SubscribeRequest,
    UnsubscribeRequest,
};
use turn_coordination::{
    CoordinationConfig, CoordinationError, EnforcementLevel, Mode, ModeSwitchPolicy,
    SharedCoordinationState,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mode at startup: chaos or speaking-stick (overrides STICK_INITIAL_MODE)
    #[arg(long)]
    initial_mode: Option<Mode>,

    /// Default enforcement level: suggestion, social-pressure or strict
    /// (overrides STICK_DEFAULT_ENFORCEMENT)
    #[arg(long)]
    enforcement: Option<EnforcementLevel>,

    /// Whether a mode switch clears holder and queue: keep or reset
    /// (overrides STICK_MODE_SWITCH_POLICY)
    #[arg(long)]
    mode_switch_policy: Option<ModeSwitchPolicy>,

    /// Per-agent mailbox cap, 0 for unbounded (overrides NOTIFY_MAILBOX_LIMIT)
    #[arg(long)]
    mailbox_limit: Option<usize>,

    /// Also push every delivery to the client as an MCP logging notification
    #[arg(long, default_value_t = false)]
    push_notifications: bool,
}

/// Render a tool result the way every handler returns it
fn respond<T: Serialize>(result: Result<T, CoordinationError>) -> Result<String, String> {
    let response = result.map_err(|e| e.to_structured_json())?;
    serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
}

/// The MCP server handler
#[derive(Clone)]
struct TurnCoordinationServer {
    state: SharedCoordinationState,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TurnCoordinationServer {
    fn new(state: SharedCoordinationState) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Request the speaking stick. Granted immediately when nobody holds it, otherwise you join the queue (urgent=true jumps to the head). Never blocks."
    )]
    async fn request_speaking_stick(
        &self,
        Parameters(req): Parameters<RequestStickRequest>,
    ) -> Result<String, String> {
        respond(tools::request_speaking_stick(&self.state, req))
    }

    #[tool(
        description = "Release the speaking stick. Only the holder may release. The next queued agent gets it unless pass_to names someone."
    )]
    async fn release_speaking_stick(
        &self,
        Parameters(req): Parameters<ReleaseStickRequest>,
    ) -> Result<String, String> {
        respond(tools::release_speaking_stick(&self.state, req))
    }

    #[tool(
        description = "Switch the communication mode ('chaos' or 'speaking-stick') and optionally the enforcement method ('suggestion', 'social-pressure', 'strict')."
    )]
    async fn set_communication_mode(
        &self,
        Parameters(req): Parameters<SetModeRequest>,
    ) -> Result<String, String> {
        respond(tools::set_communication_mode(&self.state, req))
    }

    #[tool(
        description = "Get the current holder, queue, mode, enforcement level, topic and violation counts.",
        annotations(read_only_hint = true)
    )]
    async fn get_speaking_stick_status(&self) -> Result<String, String> {
        respond(tools::get_speaking_stick_status(&self.state))
    }

    #[tool(
        description = "Reset to chaos mode with no holder, an empty queue and zero violations. Administrative."
    )]
    async fn reset_speaking_stick(&self) -> Result<String, String> {
        respond(tools::reset_speaking_stick(&self.state))
    }

    #[tool(
        description = "Check whether an agent may broadcast right now. A denial is a normal result with guidance, violation count and consequence."
    )]
    async fn authorize_broadcast(
        &self,
        Parameters(req): Parameters<AuthorizeBroadcastRequest>,
    ) -> Result<String, String> {
        respond(tools::authorize_broadcast(&self.state, req))
    }

    #[tool(
        description = "Subscribe to notification topics. Use exact topics like 'agent/registered' or wildcards like 'message/*'."
    )]
    async fn subscribe_to_notifications(
        &self,
        Parameters(req): Parameters<SubscribeRequest>,
    ) -> Result<String, String> {
        respond(tools::subscribe_to_notifications(&self.state, req))
    }

    #[tool(description = "Unsubscribe from the given topics, or from everything when none are given.")]
    async fn unsubscribe_from_notifications(
        &self,
        Parameters(req): Parameters<UnsubscribeRequest>,
    ) -> Result<String, String> {
        respond(tools::unsubscribe_from_notifications(&self.state, req))
    }

    #[tool(
        description = "Collect and clear pending notifications, oldest first. Each notification is returned once."
    )]
    async fn get_pending_notifications(
        &self,
        Parameters(req): Parameters<PendingNotificationsRequest>,
    ) -> Result<String, String> {
        respond(tools::get_pending_notifications(&self.state, req))
    }

    #[tool(
        description = "Publish a lifecycle notification (agent/*, message/*, broadcast/message, queue/<event>) to every matching subscriber."
    )]
    async fn publish_notification(
        &self,
        Parameters(req): Parameters<PublishNotificationRequest>,
    ) -> Result<String, String> {
        respond(tools::publish_notification(&self.state, req))
    }
}

#[tool_handler]
impl ServerHandler for TurnCoordinationServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "MCP server coordinating turn-taking between agents sharing one broadcast channel.\n\
\n\
## Speaking Stick Workflow\n\
1. `request_speaking_stick` → take the stick or join the queue\n\
2. `authorize_broadcast` → check before every broadcast\n\
3. `release_speaking_stick` → hand over when done (optionally `pass_to` someone)\n\
\n\
Modes: `chaos` (anyone talks) and `speaking-stick` (holder talks). Enforcement: \
`suggestion` warns, `strict` blocks, `social-pressure` blocks and tells everyone. \
Repeat offenders escalate: mild → moderate (chatterbox list) → shame (hall of shame).\n\
\n\
## Notifications\n\
- `subscribe_to_notifications` with topics like `agent/*`, `message/delivered`, `queue/*`\n\
- `get_pending_notifications` drains your mailbox; each record is returned once\n\
\n\
## Safety Notes\n\
- `get_speaking_stick_status` is read-only, safe to call anytime\n\
- `reset_speaking_stick` clears holder, queue and violations: administrative use only";

        ServerInfo {
            instructions: Some(instructions.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_logging()
                .build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("turn_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = CoordinationConfig::from_env();
    if let Some(mode) = args.initial_mode {
        config.initial_mode = mode;
    }
    if let Some(level) = args.enforcement {
        config.default_enforcement = level;
    }
    if let Some(policy) = args.mode_switch_policy {
        config.mode_switch_policy = policy;
    }
    if let Some(limit) = args.mailbox_limit {
        config.mailbox_limit = limit;
    }

    tracing::info!(
        mode = %config.initial_mode,
        enforcement = %config.default_enforcement,
        policy = ?config.mode_switch_policy,
        mailbox_limit = config.mailbox_limit,
        "Starting Turn Coordination MCP Server"
    );

    let state = tools::create_shared_state(config);
    let server = TurnCoordinationServer::new(state.clone());

    let transport = (stdin(), stdout());
    let service = server.serve(transport).await?;

    if args.push_notifications {
        let peer = service.peer().clone();
        let mut live = state.hub.subscribe_live();
        tokio::spawn(async move {
            loop {
                match live.recv().await {
                    Ok(delivery) => {
                        let data = match serde_json::to_value(&delivery) {
                            Ok(data) => data,
                            Err(e) => {
                                tracing::warn!("Failed to encode delivery: {}", e);
                                continue;
                            }
                        };
                        let param = LoggingMessageNotificationParam {
                            level: LoggingLevel::Info,
                            logger: Some("notifications".to_string()),
                            data,
                        };
                        if let Err(e) = peer.notify_logging_message(param).await {
                            tracing::warn!("Failed to push notification: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Live notification feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        tracing::info!("Pushing notifications as MCP logging messages");
    }

    service.waiting().await?;

    Ok(())
}
