//! Event dispatch: detectors in front, orchestrator behind.

use crate::backup::BackupManager;
use crate::config::WatchdogConfig;
use crate::detect::incident::IncidentLog;
use crate::detect::{FloodTracker, RaidDetector, RaidKind};
use crate::platform::{AuditAction, ChatPlatform, PlatformEvent};
use crate::quarantine::QuarantineManager;
use crate::response::Orchestrator;
use crate::storage::{Pool, SnapshotStore};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Most suspected actors attributed to one detection.
const MAX_SUSPECTS: usize = 6;

/// The watchdog engine: owns the detector state and fans detections out
/// to the response orchestrator. Detectors are plain owned state built
/// at startup -- no process globals -- so races stay testable.
pub struct Watchdog {
    cfg: Arc<WatchdogConfig>,
    platform: Arc<dyn ChatPlatform>,
    channel_delete: RaidDetector,
    role_delete: RaidDetector,
    ban: RaidDetector,
    flood: FloodTracker,
    orchestrator: Orchestrator,
    backup: Arc<BackupManager>,
    quarantine: Arc<QuarantineManager>,
    incidents: Arc<IncidentLog>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub channel_delete_count: usize,
    pub role_delete_count: usize,
    pub ban_count: usize,
    pub flood_active_pairs: usize,
    pub auto_quarantine: bool,
    pub quarantine_role_name: String,
}

impl Watchdog {
    pub fn new(cfg: Arc<WatchdogConfig>, platform: Arc<dyn ChatPlatform>, pool: Pool) -> Self {
        let store = SnapshotStore::new(pool.clone());
        let window_ms = cfg.window_ms();
        let t = &cfg.thresholds;

        let quarantine = Arc::new(QuarantineManager::new(
            platform.clone(),
            store.clone(),
            cfg.clone(),
        ));
        let backup = Arc::new(BackupManager::new(
            platform.clone(),
            store.clone(),
            cfg.clone(),
        ));
        let incidents = Arc::new(IncidentLog::new(pool));
        let orchestrator = Orchestrator::new(
            platform.clone(),
            quarantine.clone(),
            backup.clone(),
            incidents.clone(),
            cfg.clone(),
        );

        Self {
            channel_delete: RaidDetector::new(RaidKind::ChannelDelete, t.channel_delete, window_ms),
            role_delete: RaidDetector::new(RaidKind::RoleDelete, t.role_delete, window_ms),
            ban: RaidDetector::new(RaidKind::Ban, t.ban, window_ms),
            flood: FloodTracker::new(t.message_flood, window_ms),
            cfg,
            platform,
            orchestrator,
            backup,
            quarantine,
            incidents,
        }
    }

    pub fn backup(&self) -> &Arc<BackupManager> {
        &self.backup
    }

    pub fn quarantine_manager(&self) -> &Arc<QuarantineManager> {
        &self.quarantine
    }

    pub fn incidents(&self) -> &Arc<IncidentLog> {
        &self.incidents
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    pub fn config(&self) -> &Arc<WatchdogConfig> {
        &self.cfg
    }

    /// Route one platform event through its detector and, on a trigger,
    /// run the full raid response before returning.
    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::ChannelDeleted { guild_id, .. } => {
                if self.channel_delete.observe() {
                    let actors = self.attribute_actors(&guild_id, AuditAction::ChannelDelete).await;
                    let description = format!(
                        "{} channels deleted within {}s",
                        self.channel_delete.threshold(),
                        self.cfg.thresholds.window_secs
                    );
                    self.orchestrator
                        .handle_raid(&guild_id, RaidKind::ChannelDelete, &description, &actors)
                        .await;
                }
            }
            PlatformEvent::RoleDeleted { guild_id, .. } => {
                if self.role_delete.observe() {
                    let actors = self.attribute_actors(&guild_id, AuditAction::RoleDelete).await;
                    let description = format!(
                        "{} roles deleted within {}s",
                        self.role_delete.threshold(),
                        self.cfg.thresholds.window_secs
                    );
                    self.orchestrator
                        .handle_raid(&guild_id, RaidKind::RoleDelete, &description, &actors)
                        .await;
                }
            }
            PlatformEvent::MemberBanned { guild_id, .. } => {
                if self.ban.observe() {
                    let actors = self.attribute_actors(&guild_id, AuditAction::MemberBan).await;
                    let description = format!(
                        "{} members banned within {}s",
                        self.ban.threshold(),
                        self.cfg.thresholds.window_secs
                    );
                    self.orchestrator
                        .handle_raid(&guild_id, RaidKind::Ban, &description, &actors)
                        .await;
                }
            }
            PlatformEvent::MessageCreated { guild_id, author_id, .. } => {
                if author_id == self.platform.self_id() {
                    return;
                }
                if self.flood.observe(&guild_id, &author_id) {
                    let description = format!(
                        "message flood: {} messages from one author within {}s",
                        self.flood.threshold(),
                        self.cfg.thresholds.window_secs
                    );
                    let actors = vec![author_id];
                    self.orchestrator
                        .handle_raid(&guild_id, RaidKind::MessageFlood, &description, &actors)
                        .await;
                }
            }
        }
    }

    /// Best-effort actor attribution from the audit log: entries within
    /// twice the window, never the watchdog itself, deduplicated, capped.
    /// The log lags real actions, so this is a hint, not ground truth.
    async fn attribute_actors(&self, guild_id: &str, action: AuditAction) -> Vec<String> {
        let entries = match self.platform.audit_log(guild_id, action, 16).await {
            Ok(e) => e,
            Err(e) => {
                warn!(guild = guild_id, "audit log unavailable: {e}");
                return Vec::new();
            }
        };

        let cutoff = Utc::now()
            - ChronoDuration::milliseconds((2 * self.cfg.window_ms()) as i64);
        let self_id = self.platform.self_id();

        let mut actors: Vec<String> = Vec::new();
        for entry in entries {
            if entry.at < cutoff || entry.actor_id == self_id {
                continue;
            }
            if !actors.contains(&entry.actor_id) {
                actors.push(entry.actor_id);
            }
            if actors.len() >= MAX_SUSPECTS {
                break;
            }
        }
        actors
    }

    /// Current detector state for the `status` command and API.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            channel_delete_count: self.channel_delete.in_window_count(),
            role_delete_count: self.role_delete.in_window_count(),
            ban_count: self.ban.in_window_count(),
            flood_active_pairs: self.flood.active_pairs(),
            auto_quarantine: self.cfg.auto_quarantine,
            quarantine_role_name: self.cfg.quarantine_role_name.clone(),
        }
    }
}
