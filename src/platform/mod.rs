//! Chat platform interface -- domain records, the event feed payloads,
//! and the `ChatPlatform` trait the watchdog drives the platform through.
//!
//! The gateway and REST transport are external collaborators; everything
//! in the detection/response path talks to this trait only.

pub mod rest;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform API error (status {status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("platform transport error: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Transport(e.to_string())
    }
}

/// Channel kind. Only `(name, kind)` identity matters to reconciliation,
/// so unknown platform kinds are preserved as raw discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Other(u16),
}

impl From<u16> for ChannelKind {
    fn from(v: u16) -> Self {
        match v {
            0 => ChannelKind::Text,
            2 => ChannelKind::Voice,
            4 => ChannelKind::Category,
            other => ChannelKind::Other(other),
        }
    }
}

impl From<ChannelKind> for u16 {
    fn from(k: ChannelKind) -> u16 {
        match k {
            ChannelKind::Text => 0,
            ChannelKind::Voice => 2,
            ChannelKind::Category => 4,
            ChannelKind::Other(v) => v,
        }
    }
}

/// A permission overwrite on a channel. Captured in snapshots but not
/// replayed by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub principal_id: String,
    pub allow_mask: u64,
    pub deny_mask: u64,
    /// 0 = role, 1 = member, matching the platform wire value.
    pub principal_kind: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<String>,
    pub position: i64,
    #[serde(default)]
    pub permission_overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: String,
    pub name: String,
    /// Platform-managed roles (integration/bot roles) cannot be assigned.
    pub managed: bool,
    /// The implicit role every member holds.
    pub everyone: bool,
}

#[derive(Debug, Clone)]
pub struct MemberRecord {
    pub user_id: String,
    pub is_bot: bool,
    /// Carries the platform's administrator permission bit; used only to
    /// gate operator commands.
    pub is_admin: bool,
    pub role_ids: Vec<String>,
}

/// Audit-log action kinds the watchdog attributes actors from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ChannelDelete,
    RoleDelete,
    MemberBan,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: String,
    pub at: DateTime<Utc>,
}

/// Administrative events delivered by the platform feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    ChannelDeleted {
        guild_id: String,
        channel_id: String,
    },
    RoleDeleted {
        guild_id: String,
        role_id: String,
    },
    MemberBanned {
        guild_id: String,
        user_id: String,
    },
    MessageCreated {
        guild_id: String,
        channel_id: String,
        author_id: String,
    },
}

/// Management API surface consumed by the watchdog. Object-safe so the
/// engine can run against the REST client or a test double.
#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The watchdog's own user id, excluded from actor attribution.
    fn self_id(&self) -> String;

    async fn list_guild_ids(&self) -> Result<Vec<String>, PlatformError>;
    async fn guild_owner(&self, guild_id: &str) -> Result<String, PlatformError>;

    async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelRecord>, PlatformError>;
    async fn create_channel(
        &self,
        guild_id: &str,
        name: &str,
        kind: ChannelKind,
    ) -> Result<ChannelRecord, PlatformError>;

    async fn list_roles(&self, guild_id: &str) -> Result<Vec<RoleRecord>, PlatformError>;
    /// Create a role with no granted permissions.
    async fn create_role(&self, guild_id: &str, name: &str) -> Result<RoleRecord, PlatformError>;

    /// Resolve a member; `Ok(None)` when the member does not exist.
    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRecord>, PlatformError>;

    /// Replace a member's role list, attributing the change to `reason`.
    async fn set_member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        role_ids: &[String],
        reason: &str,
    ) -> Result<(), PlatformError>;

    /// Recent audit-log entries for one action kind, newest first.
    async fn audit_log(
        &self,
        guild_id: &str,
        action: AuditAction,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, PlatformError>;

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), PlatformError>;
    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), PlatformError>;
}
