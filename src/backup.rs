//! Channel topology snapshots and best-effort structural restore.

use crate::config::WatchdogConfig;
use crate::platform::{ChannelRecord, ChatPlatform, PlatformError};
use crate::storage::{guild_backup_key, SnapshotStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Point-in-time copy of a guild's channels, keyed by guild id; the
/// latest snapshot overwrites the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildChannelSnapshot {
    pub taken_at: DateTime<Utc>,
    pub guild_id: String,
    pub channels: Vec<ChannelRecord>,
}

/// What a reconcile pass accomplished. `missing` holds names it tried
/// and failed to recreate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub recreated: u32,
    pub missing: Vec<String>,
}

pub struct BackupManager {
    platform: Arc<dyn ChatPlatform>,
    store: SnapshotStore,
    cfg: Arc<WatchdogConfig>,
}

impl BackupManager {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: SnapshotStore,
        cfg: Arc<WatchdogConfig>,
    ) -> Self {
        Self { platform, store, cfg }
    }

    /// Snapshot the guild's current channels, overwriting the stored copy.
    pub async fn snapshot(&self, guild_id: &str) -> anyhow::Result<GuildChannelSnapshot> {
        let channels = self.platform.list_channels(guild_id).await?;
        let snap = GuildChannelSnapshot {
            taken_at: Utc::now(),
            guild_id: guild_id.to_string(),
            channels,
        };
        self.store.put(&guild_backup_key(guild_id), &snap)?;
        info!(guild = guild_id, channels = snap.channels.len(), "channel snapshot stored");
        Ok(snap)
    }

    /// Load the stored snapshot without touching the platform.
    pub fn stored_snapshot(&self, guild_id: &str) -> anyhow::Result<Option<GuildChannelSnapshot>> {
        self.store.get(&guild_backup_key(guild_id))
    }

    /// Recreate channels from the last snapshot that have no current
    /// `(name, kind)` match. Recreation is serial with a fixed pause to
    /// stay under platform rate limits; one channel's failure is noted
    /// in `missing` and the rest continue. Permission overwrites, parent
    /// grouping, and position from the snapshot are not reapplied.
    pub async fn reconcile(&self, guild_id: &str) -> ReconcileReport {
        let snap = match self.stored_snapshot(guild_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!(guild = guild_id, "no backup to reconcile against");
                return ReconcileReport::default();
            }
            Err(e) => {
                error!(guild = guild_id, "failed to load snapshot: {e}");
                return ReconcileReport::default();
            }
        };

        let current = match self.platform.list_channels(guild_id).await {
            Ok(c) => c,
            Err(e) => {
                error!(guild = guild_id, "failed to list channels: {e}");
                return ReconcileReport::default();
            }
        };

        let pause = Duration::from_millis(self.cfg.timing.reconcile_pause_ms);
        let mut report = ReconcileReport::default();
        let mut first = true;

        for wanted in &snap.channels {
            let exists = current
                .iter()
                .any(|c| c.name == wanted.name && c.kind == wanted.kind);
            if exists {
                continue;
            }

            if !first {
                tokio::time::sleep(pause).await;
            }
            first = false;

            match self
                .platform
                .create_channel(guild_id, &wanted.name, wanted.kind)
                .await
            {
                Ok(_) => {
                    info!(guild = guild_id, channel = %wanted.name, "recreated channel");
                    report.recreated += 1;
                }
                Err(e) => {
                    warn!(guild = guild_id, channel = %wanted.name, "recreate failed: {e}");
                    report.missing.push(wanted.name.clone());
                }
            }
        }

        report
    }

    /// Guilds the periodic sweep covers: the configured scope, or every
    /// guild the watchdog can see when the scope is empty.
    async fn sweep_targets(&self) -> Result<Vec<String>, PlatformError> {
        if !self.cfg.guild_ids.is_empty() {
            return Ok(self.cfg.guild_ids.clone());
        }
        self.platform.list_guild_ids().await
    }
}

/// Periodic snapshot sweep. One guild's failure never aborts the rest,
/// and the loop runs independently of the event-driven paths.
pub async fn run_snapshot_loop(manager: Arc<BackupManager>) {
    let period = Duration::from_secs(manager.cfg.timing.snapshot_interval_secs);
    info!(interval_secs = period.as_secs(), "snapshot sweep started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let guilds = match manager.sweep_targets().await {
            Ok(g) => g,
            Err(e) => {
                error!("failed to enumerate guilds for snapshot sweep: {e}");
                continue;
            }
        };

        for guild_id in guilds {
            if let Err(e) = manager.snapshot(&guild_id).await {
                error!(guild = %guild_id, "periodic snapshot failed: {e}");
            }
        }
    }
}
