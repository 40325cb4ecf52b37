//! Raid response: alert, quarantine suspected actors, reconcile channels.
//!
//! The three steps are independent and individually caught; nothing in
//! this path propagates an error upward or stops a later step.

use crate::backup::BackupManager;
use crate::config::WatchdogConfig;
use crate::detect::incident::IncidentLog;
use crate::detect::RaidKind;
use crate::platform::{ChannelKind, ChatPlatform};
use crate::quarantine::QuarantineManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Orchestrator {
    platform: Arc<dyn ChatPlatform>,
    quarantine: Arc<QuarantineManager>,
    backup: Arc<BackupManager>,
    incidents: Arc<IncidentLog>,
    cfg: Arc<WatchdogConfig>,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        quarantine: Arc<QuarantineManager>,
        backup: Arc<BackupManager>,
        incidents: Arc<IncidentLog>,
        cfg: Arc<WatchdogConfig>,
    ) -> Self {
        Self { platform, quarantine, backup, incidents, cfg }
    }

    /// Run the full response for one detection. Always alerts, then
    /// quarantines identified actors when enabled, then reconciles
    /// channels. Runs to completion even if another raid fires meanwhile.
    pub async fn handle_raid(
        &self,
        guild_id: &str,
        kind: RaidKind,
        description: &str,
        suspected_actors: &[String],
    ) {
        warn!(guild = guild_id, %kind, actors = suspected_actors.len(), "raid response started");

        if let Err(e) =
            self.incidents
                .record_raid(guild_id, kind, description, suspected_actors)
        {
            error!(guild = guild_id, "failed to record incident: {e}");
        }

        // Step 1: alert channel + operator DM. DM delivery failure is
        // swallowed; the alert channel is the primary path.
        let alert_channel = self.alert_channel(guild_id).await;
        let actor_list = if suspected_actors.is_empty() {
            "unknown".to_string()
        } else {
            suspected_actors.join(", ")
        };
        let alert = format!("RAID DETECTED: {description}\nSuspected actors: {actor_list}");

        if let Some(channel_id) = &alert_channel {
            if let Err(e) = self.platform.send_message(channel_id, &alert).await {
                error!(guild = guild_id, "failed to post alert: {e}");
            }
        }
        if let Err(e) = self
            .platform
            .send_direct_message(&self.cfg.operator_id, &alert)
            .await
        {
            warn!(guild = guild_id, "operator notification failed: {e}");
        }

        // Step 2: sequential quarantine of suspected actors.
        if self.cfg.auto_quarantine && !suspected_actors.is_empty() {
            let pause = Duration::from_millis(self.cfg.timing.quarantine_pause_ms);
            for (i, actor) in suspected_actors.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(pause).await;
                }
                let outcome = self
                    .quarantine
                    .quarantine(guild_id, actor, &format!("raid response: {description}"))
                    .await;
                let note = if outcome.ok() {
                    format!("Quarantined <@{actor}>")
                } else {
                    format!("Could not quarantine <@{actor}>: {:?}", outcome.kind)
                };
                info!(guild = guild_id, actor = %actor, outcome = ?outcome.kind, "quarantine attempt");
                if let Some(channel_id) = &alert_channel {
                    if let Err(e) = self.platform.send_message(channel_id, &note).await {
                        warn!(guild = guild_id, "failed to post quarantine note: {e}");
                    }
                }
            }
        }

        // Step 3: structural recovery from the last snapshot.
        let report = self.backup.reconcile(guild_id).await;
        let summary = if report.missing.is_empty() {
            format!("Channel restore: {} recreated", report.recreated)
        } else {
            format!(
                "Channel restore: {} recreated, failed: {}",
                report.recreated,
                report.missing.join(", ")
            )
        };
        if let Some(channel_id) = &alert_channel {
            if let Err(e) = self.platform.send_message(channel_id, &summary).await {
                warn!(guild = guild_id, "failed to post restore summary: {e}");
            }
        }

        info!(guild = guild_id, %kind, "raid response finished");
    }

    /// Resolve the alert channel by configured name, creating it if the
    /// guild has none. `None` only if both lookup and creation fail.
    async fn alert_channel(&self, guild_id: &str) -> Option<String> {
        match self.platform.list_channels(guild_id).await {
            Ok(channels) => {
                if let Some(c) = channels
                    .iter()
                    .find(|c| c.name == self.cfg.alert_channel_name && c.kind == ChannelKind::Text)
                {
                    return Some(c.id.clone());
                }
            }
            Err(e) => {
                warn!(guild = guild_id, "failed to list channels for alert: {e}");
            }
        }
        match self
            .platform
            .create_channel(guild_id, &self.cfg.alert_channel_name, ChannelKind::Text)
            .await
        {
            Ok(c) => Some(c.id),
            Err(e) => {
                error!(guild = guild_id, "failed to create alert channel: {e}");
                None
            }
        }
    }
}
