//! Quarantine state machine: role snapshot -> strip -> restore.

use crate::config::WatchdogConfig;
use crate::platform::{ChatPlatform, PlatformError};
use crate::storage::{role_backup_key, SnapshotStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Durable record of a member's roles immediately before quarantine,
/// keyed by (guild, member). A fresh quarantine overwrites it; restore
/// reads it without deleting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRoleBackup {
    pub taken_at: DateTime<Utc>,
    pub roles: Vec<String>,
}

/// Why a quarantine or restore ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Quarantined,
    Restored,
    MemberNotFound,
    BotAccount,
    GuildOwner,
    Protected,
    NoBackup,
    PlatformFailed,
    StoreFailed,
}

/// Transient result of one quarantine/restore attempt. Failures are
/// data, not errors: response paths report them and carry on.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub previous_roles: Option<Vec<String>>,
    pub detail: Option<String>,
}

impl Outcome {
    pub fn ok(&self) -> bool {
        matches!(self.kind, OutcomeKind::Quarantined | OutcomeKind::Restored)
    }

    fn refused(kind: OutcomeKind) -> Self {
        Self { kind, previous_roles: None, detail: None }
    }

    fn failed(kind: OutcomeKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            previous_roles: None,
            detail: Some(detail.into()),
        }
    }
}

pub struct QuarantineManager {
    platform: Arc<dyn ChatPlatform>,
    store: SnapshotStore,
    cfg: Arc<WatchdogConfig>,
}

impl QuarantineManager {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: SnapshotStore,
        cfg: Arc<WatchdogConfig>,
    ) -> Self {
        Self { platform, store, cfg }
    }

    /// Strip a member to the single quarantine role, persisting their
    /// prior roles first.
    ///
    /// Refusals (absent member, bot, guild owner, protected id) mutate
    /// nothing and report a distinct reason. The backup write happens
    /// before the role replacement, so a crash between the two never
    /// leaves a quarantined member without a recorded prior set. A
    /// repeat quarantine before restore overwrites the previous backup;
    /// nested quarantines do not stack.
    pub async fn quarantine(&self, guild_id: &str, member_id: &str, reason: &str) -> Outcome {
        if self.cfg.protected_ids.iter().any(|id| id.as_str() == member_id) {
            return Outcome::refused(OutcomeKind::Protected);
        }

        let member = match self.platform.member(guild_id, member_id).await {
            Ok(Some(m)) => m,
            Ok(None) => return Outcome::refused(OutcomeKind::MemberNotFound),
            Err(e) => return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string()),
        };
        if member.is_bot {
            return Outcome::refused(OutcomeKind::BotAccount);
        }
        match self.platform.guild_owner(guild_id).await {
            Ok(owner) if owner == member_id => {
                return Outcome::refused(OutcomeKind::GuildOwner)
            }
            Ok(_) => {}
            Err(e) => return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string()),
        }

        let quarantine_role = match self.ensure_quarantine_role(guild_id).await {
            Ok(id) => id,
            Err(e) => return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string()),
        };

        // Current assignable roles, minus the implicit everyone role and
        // platform-managed roles neither of which can be reassigned.
        let previous = match self.platform.list_roles(guild_id).await {
            Ok(roles) => {
                let assignable: Vec<String> = roles
                    .iter()
                    .filter(|r| !r.everyone && !r.managed)
                    .map(|r| r.id.clone())
                    .collect();
                member
                    .role_ids
                    .iter()
                    .filter(|id| assignable.contains(*id))
                    .cloned()
                    .collect::<Vec<_>>()
            }
            Err(e) => return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string()),
        };

        let backup = MemberRoleBackup {
            taken_at: Utc::now(),
            roles: previous.clone(),
        };
        if let Err(e) = self.store.put(&role_backup_key(guild_id, member_id), &backup) {
            return Outcome::failed(OutcomeKind::StoreFailed, e.to_string());
        }

        if let Err(e) = self
            .platform
            .set_member_roles(guild_id, member_id, &[quarantine_role], reason)
            .await
        {
            // Backup stays: retrying the quarantine overwrites the same key.
            warn!(guild = guild_id, member = member_id, "role replacement failed: {e}");
            return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string());
        }

        info!(guild = guild_id, member = member_id, %reason, "member quarantined");
        Outcome {
            kind: OutcomeKind::Quarantined,
            previous_roles: Some(previous),
            detail: None,
        }
    }

    /// Reassign exactly the backed-up role set. The backup is kept after
    /// a successful restore so a retried restore reapplies the same set.
    pub async fn restore_roles(&self, guild_id: &str, member_id: &str) -> Outcome {
        let backup: MemberRoleBackup =
            match self.store.get(&role_backup_key(guild_id, member_id)) {
                Ok(Some(b)) => b,
                Ok(None) => return Outcome::refused(OutcomeKind::NoBackup),
                Err(e) => return Outcome::failed(OutcomeKind::StoreFailed, e.to_string()),
            };

        match self.platform.member(guild_id, member_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return Outcome::refused(OutcomeKind::MemberNotFound),
            Err(e) => return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string()),
        }

        if let Err(e) = self
            .platform
            .set_member_roles(guild_id, member_id, &backup.roles, "quarantine lifted")
            .await
        {
            return Outcome::failed(OutcomeKind::PlatformFailed, e.to_string());
        }

        info!(guild = guild_id, member = member_id, "roles restored");
        Outcome {
            kind: OutcomeKind::Restored,
            previous_roles: Some(backup.roles),
            detail: None,
        }
    }

    /// Find the quarantine role by configured name, creating it with no
    /// granted permissions if the guild lacks one.
    async fn ensure_quarantine_role(&self, guild_id: &str) -> Result<String, PlatformError> {
        let roles = self.platform.list_roles(guild_id).await?;
        if let Some(role) = roles.iter().find(|r| r.name == self.cfg.quarantine_role_name) {
            return Ok(role.id.clone());
        }
        let role = self
            .platform
            .create_role(guild_id, &self.cfg.quarantine_role_name)
            .await?;
        info!(guild = guild_id, role = %role.name, "created quarantine role");
        Ok(role.id)
    }
}
