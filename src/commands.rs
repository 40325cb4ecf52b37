//! Operator command surface: backup, restore, status.
//!
//! Replies are private payloads returned to the invoking surface, never
//! posted publicly.

use crate::watchdog::Watchdog;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Backup,
    Restore,
    Status,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: CommandKind,
    pub guild_id: String,
    pub invoker_id: String,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<crate::watchdog::StatusReport>,
}

impl CommandReply {
    fn ok(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into(), status: None }
    }

    fn denied() -> Self {
        Self {
            ok: false,
            message: "you need guild owner or administrator permissions for that".into(),
            status: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into(), status: None }
    }
}

/// `backup` and `restore` are gated to the configured operator, the
/// guild owner, or an administrator member; `status` is open to anyone.
pub async fn handle_command(watchdog: &Watchdog, req: CommandRequest) -> CommandReply {
    info!(command = ?req.command, guild = %req.guild_id, invoker = %req.invoker_id, "command received");

    match req.command {
        CommandKind::Status => {
            let mut reply = CommandReply::ok("watchdog status");
            reply.status = Some(watchdog.status());
            reply
        }
        CommandKind::Backup => {
            if !is_privileged(watchdog, &req).await {
                return CommandReply::denied();
            }
            match watchdog.backup().snapshot(&req.guild_id).await {
                Ok(snap) => CommandReply::ok(format!(
                    "snapshot stored: {} channels",
                    snap.channels.len()
                )),
                Err(e) => CommandReply::failed(format!("snapshot failed: {e}")),
            }
        }
        CommandKind::Restore => {
            if !is_privileged(watchdog, &req).await {
                return CommandReply::denied();
            }
            let report = watchdog.backup().reconcile(&req.guild_id).await;
            if report.missing.is_empty() {
                CommandReply::ok(format!("restore complete: {} recreated", report.recreated))
            } else {
                CommandReply::failed(format!(
                    "restore partial: {} recreated, failed: {}",
                    report.recreated,
                    report.missing.join(", ")
                ))
            }
        }
    }
}

async fn is_privileged(watchdog: &Watchdog, req: &CommandRequest) -> bool {
    if req.invoker_id == watchdog.config().operator_id {
        return true;
    }
    let platform = watchdog.platform();
    if let Ok(owner) = platform.guild_owner(&req.guild_id).await {
        if owner == req.invoker_id {
            return true;
        }
    }
    matches!(
        platform.member(&req.guild_id, &req.invoker_id).await,
        Ok(Some(m)) if m.is_admin
    )
}
