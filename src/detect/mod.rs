//! Raid detection -- sliding windows, per-author flood tracking, and
//! incident recording.

pub mod flood;
pub mod incident;
pub mod window;

pub use self::flood::FloodTracker;
pub use self::window::{RaidDetector, SlidingWindow};

/// The burst patterns the watchdog watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidKind {
    ChannelDelete,
    RoleDelete,
    Ban,
    MessageFlood,
}

impl std::fmt::Display for RaidKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaidKind::ChannelDelete => write!(f, "channel_delete"),
            RaidKind::RoleDelete => write!(f, "role_delete"),
            RaidKind::Ban => write!(f, "ban"),
            RaidKind::MessageFlood => write!(f, "message_flood"),
        }
    }
}
