//! REST client for a Discord-compatible management API.
//!
//! Thin transport glue: every method maps to one endpoint, translates
//! the wire shape into the domain records in [`super`], and surfaces
//! failures as [`PlatformError`]. Rate-limit pacing lives in the
//! callers, not here.

use super::{
    AuditAction, AuditEntry, ChannelKind, ChannelRecord, ChatPlatform, MemberRecord,
    PermissionOverwrite, PlatformError, RoleRecord,
};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const ADMINISTRATOR_BIT: u64 = 1 << 3;

pub struct RestPlatform {
    client: Client,
    base: String,
    token: String,
    self_id: String,
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct WireGuild {
    id: String,
    #[serde(default)]
    owner_id: String,
}

#[derive(Deserialize)]
struct WireOverwrite {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    allow: String,
    #[serde(default)]
    deny: String,
}

#[derive(Deserialize)]
struct WireChannel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: u16,
    parent_id: Option<String>,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    permission_overwrites: Vec<WireOverwrite>,
}

#[derive(Deserialize)]
struct WireRole {
    id: String,
    name: String,
    #[serde(default)]
    managed: bool,
    #[serde(default)]
    permissions: String,
}

#[derive(Deserialize)]
struct WireMember {
    user: WireUser,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Deserialize)]
struct WireAuditLog {
    #[serde(default)]
    audit_log_entries: Vec<WireAuditEntry>,
}

#[derive(Deserialize)]
struct WireAuditEntry {
    id: String,
    user_id: Option<String>,
}

impl From<WireChannel> for ChannelRecord {
    fn from(c: WireChannel) -> Self {
        ChannelRecord {
            id: c.id,
            name: c.name,
            kind: ChannelKind::from(c.kind),
            parent_id: c.parent_id,
            position: c.position,
            permission_overwrites: c
                .permission_overwrites
                .into_iter()
                .map(|o| PermissionOverwrite {
                    principal_id: o.id,
                    allow_mask: o.allow.parse().unwrap_or(0),
                    deny_mask: o.deny.parse().unwrap_or(0),
                    principal_kind: o.kind,
                })
                .collect(),
        }
    }
}

impl RestPlatform {
    /// Build the client and resolve the bot's own identity. Fails fast
    /// on bad credentials, before any event processing begins.
    pub async fn connect(base: &str, token: &str) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(PlatformError::from)?;
        let mut platform = Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            self_id: String::new(),
        };
        let me: WireUser = platform.get_json("/users/@me").await?;
        platform.self_id = me.id;
        Ok(platform)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(resp.url().path().to_string()));
        }
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PlatformError::Api {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, PlatformError> {
        let resp = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
        reason: Option<&str>,
    ) -> Result<T, PlatformError> {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
            .json(body);
        if let Some(reason) = reason {
            req = req.header("X-Audit-Log-Reason", reason);
        }
        let resp = req.send().await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    /// Audit-log entry ids are snowflakes; the upper 42 bits hold
    /// milliseconds since the platform epoch (2015-01-01).
    fn snowflake_time(id: &str) -> DateTime<Utc> {
        const PLATFORM_EPOCH_MS: i64 = 1_420_070_400_000;
        let ms = id
            .parse::<u64>()
            .map(|v| (v >> 22) as i64 + PLATFORM_EPOCH_MS)
            .unwrap_or(0);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }
}

fn audit_action_code(action: AuditAction) -> u16 {
    match action {
        AuditAction::ChannelDelete => 12,
        AuditAction::RoleDelete => 32,
        AuditAction::MemberBan => 22,
    }
}

#[async_trait::async_trait]
impl ChatPlatform for RestPlatform {
    fn self_id(&self) -> String {
        self.self_id.clone()
    }

    async fn list_guild_ids(&self) -> Result<Vec<String>, PlatformError> {
        let guilds: Vec<WireGuild> = self.get_json("/users/@me/guilds").await?;
        Ok(guilds.into_iter().map(|g| g.id).collect())
    }

    async fn guild_owner(&self, guild_id: &str) -> Result<String, PlatformError> {
        let guild: WireGuild = self.get_json(&format!("/guilds/{guild_id}")).await?;
        Ok(guild.owner_id)
    }

    async fn list_channels(&self, guild_id: &str) -> Result<Vec<ChannelRecord>, PlatformError> {
        let channels: Vec<WireChannel> =
            self.get_json(&format!("/guilds/{guild_id}/channels")).await?;
        Ok(channels.into_iter().map(ChannelRecord::from).collect())
    }

    async fn create_channel(
        &self,
        guild_id: &str,
        name: &str,
        kind: ChannelKind,
    ) -> Result<ChannelRecord, PlatformError> {
        let body = json!({ "name": name, "type": u16::from(kind) });
        let channel: WireChannel = self
            .send_json(
                reqwest::Method::POST,
                &format!("/guilds/{guild_id}/channels"),
                &body,
                Some("guildwatch restore"),
            )
            .await?;
        Ok(channel.into())
    }

    async fn list_roles(&self, guild_id: &str) -> Result<Vec<RoleRecord>, PlatformError> {
        let roles: Vec<WireRole> = self.get_json(&format!("/guilds/{guild_id}/roles")).await?;
        Ok(roles
            .into_iter()
            .map(|r| RoleRecord {
                everyone: r.id == guild_id,
                id: r.id,
                name: r.name,
                managed: r.managed,
            })
            .collect())
    }

    async fn create_role(&self, guild_id: &str, name: &str) -> Result<RoleRecord, PlatformError> {
        let body = json!({ "name": name, "permissions": "0" });
        let role: WireRole = self
            .send_json(
                reqwest::Method::POST,
                &format!("/guilds/{guild_id}/roles"),
                &body,
                Some("guildwatch quarantine role"),
            )
            .await?;
        Ok(RoleRecord {
            everyone: role.id == guild_id,
            id: role.id,
            name: role.name,
            managed: role.managed,
        })
    }

    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRecord>, PlatformError> {
        let member: WireMember = match self
            .get_json(&format!("/guilds/{guild_id}/members/{user_id}"))
            .await
        {
            Ok(m) => m,
            Err(PlatformError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        // Admin bit comes from the member's roles.
        let roles: Vec<WireRole> = self.get_json(&format!("/guilds/{guild_id}/roles")).await?;
        let is_admin = roles.iter().any(|r| {
            member.roles.contains(&r.id) && r.permissions_mask() & ADMINISTRATOR_BIT != 0
        });

        Ok(Some(MemberRecord {
            user_id: member.user.id,
            is_bot: member.user.bot,
            is_admin,
            role_ids: member.roles,
        }))
    }

    async fn set_member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        role_ids: &[String],
        reason: &str,
    ) -> Result<(), PlatformError> {
        let body = json!({ "roles": role_ids });
        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::PATCH,
                &format!("/guilds/{guild_id}/members/{user_id}"),
                &body,
                Some(reason),
            )
            .await?;
        Ok(())
    }

    async fn audit_log(
        &self,
        guild_id: &str,
        action: AuditAction,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        let path = format!(
            "/guilds/{guild_id}/audit-logs?action_type={}&limit={limit}",
            audit_action_code(action)
        );
        let log: WireAuditLog = self.get_json(&path).await?;
        Ok(log
            .audit_log_entries
            .into_iter()
            .filter_map(|e| {
                e.user_id.map(|actor_id| AuditEntry {
                    actor_id,
                    at: Self::snowflake_time(&e.id),
                })
            })
            .collect())
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), PlatformError> {
        let body = json!({ "content": text });
        let _: serde_json::Value = self
            .send_json(
                reqwest::Method::POST,
                &format!("/channels/{channel_id}/messages"),
                &body,
                None,
            )
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), PlatformError> {
        let body = json!({ "recipient_id": user_id });
        let dm: WireChannel = self
            .send_json(reqwest::Method::POST, "/users/@me/channels", &body, None)
            .await?;
        self.send_message(&dm.id, text).await
    }
}

impl WireRole {
    fn permissions_mask(&self) -> u64 {
        self.permissions.parse().unwrap_or(0)
    }
}
