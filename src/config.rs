//! Watchdog configuration -- TOML file with defaults for everything
//! except the identity fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration. Every field except `operator_id` and
/// `bot_token` carries a default; those two are checked once at startup
/// and are the only fatal-if-missing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// User id that receives direct-message raid alerts.
    pub operator_id: String,
    /// Platform API token.
    pub bot_token: String,
    /// Base URL for the platform management API.
    pub api_base: String,
    /// Guilds to watch. Empty means discover from the platform.
    pub guild_ids: Vec<String>,
    /// Quarantine suspected actors automatically on detection.
    pub auto_quarantine: bool,
    /// Name of the restricted role applied during quarantine.
    pub quarantine_role_name: String,
    /// Name of the channel raid alerts are posted to (created if absent).
    pub alert_channel_name: String,
    /// Member ids that must never be quarantined.
    pub protected_ids: Vec<String>,
    pub thresholds: Thresholds,
    pub timing: Timing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Channel deletions within the window before a raid is declared.
    pub channel_delete: u32,
    /// Role deletions within the window.
    pub role_delete: u32,
    /// Member bans within the window.
    pub ban: u32,
    /// Messages from one (guild, author) pair within the window.
    pub message_flood: u32,
    /// Trailing window, in seconds, shared by all detectors.
    pub window_secs: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            channel_delete: 3,
            role_delete: 3,
            ban: 5,
            message_flood: 25,
            window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Periodic channel-snapshot sweep interval.
    pub snapshot_interval_secs: u64,
    /// Pause between serial channel recreations during reconcile.
    pub reconcile_pause_ms: u64,
    /// Pause between sequential quarantine attempts during a response.
    pub quarantine_pause_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: 300,
            reconcile_pause_ms: 300,
            quarantine_pause_ms: 400,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            operator_id: String::new(),
            bot_token: String::new(),
            api_base: "https://discord.com/api/v10".to_string(),
            guild_ids: Vec::new(),
            auto_quarantine: true,
            quarantine_role_name: "Quarantined".to_string(),
            alert_channel_name: "raid-alerts".to_string(),
            protected_ids: Vec::new(),
            thresholds: Thresholds::default(),
            timing: Timing::default(),
        }
    }
}

impl WatchdogConfig {
    /// Load from a TOML file and validate required identity fields.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&raw).context("parsing config file")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The only startup-fatal condition: missing identity/credentials.
    pub fn validate(&self) -> Result<()> {
        if self.operator_id.is_empty() {
            anyhow::bail!("config: operator_id is required");
        }
        if self.bot_token.is_empty() {
            anyhow::bail!("config: bot_token is required");
        }
        Ok(())
    }

    pub fn window_ms(&self) -> u64 {
        self.thresholds.window_secs * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg: WatchdogConfig = toml::from_str(
            r#"
            operator_id = "100"
            bot_token = "t"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.thresholds.channel_delete, 3);
        assert_eq!(cfg.thresholds.message_flood, 25);
        assert_eq!(cfg.timing.snapshot_interval_secs, 300);
        assert_eq!(cfg.quarantine_role_name, "Quarantined");
        assert!(cfg.auto_quarantine);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_missing_identity_is_fatal() {
        let cfg: WatchdogConfig = toml::from_str("bot_token = \"t\"").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_threshold_override() {
        let cfg: WatchdogConfig = toml::from_str(
            r#"
            operator_id = "100"
            bot_token = "t"
            [thresholds]
            ban = 2
            window_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.thresholds.ban, 2);
        assert_eq!(cfg.thresholds.role_delete, 3);
        assert_eq!(cfg.thresholds.window_secs, 30);
    }
}
