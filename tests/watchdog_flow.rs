//! End-to-end engine tests against an in-memory platform double.

use guildwatch::backup::GuildChannelSnapshot;
use guildwatch::commands::{handle_command, CommandKind, CommandRequest};
use guildwatch::config::WatchdogConfig;
use guildwatch::platform::{
    AuditAction, AuditEntry, ChannelKind, ChannelRecord, ChatPlatform, MemberRecord,
    PlatformError, PlatformEvent, RoleRecord,
};
use guildwatch::quarantine::OutcomeKind;
use guildwatch::storage::{guild_backup_key, open_memory_pool, role_backup_key, SnapshotStore};
use guildwatch::watchdog::Watchdog;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const GUILD: &str = "g1";

#[derive(Default)]
struct MockState {
    owner: String,
    channels: Vec<ChannelRecord>,
    roles: Vec<RoleRecord>,
    members: HashMap<String, MemberRecord>,
    audit: Vec<(AuditAction, AuditEntry)>,
    messages: Vec<(String, String)>,
    dms: Vec<(String, String)>,
    role_updates: Vec<(String, Vec<String>)>,
    fail_create_channel: bool,
    fail_set_roles: bool,
    fail_messages: bool,
    fail_dms: bool,
}

struct MockPlatform {
    state: Mutex<MockState>,
    next_id: AtomicU64,
}

impl MockPlatform {
    fn new(state: MockState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            next_id: AtomicU64::new(9000),
        })
    }

    fn fresh_id(&self) -> String {
        format!("id{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

fn text_channel(id: &str, name: &str) -> ChannelRecord {
    ChannelRecord {
        id: id.to_string(),
        name: name.to_string(),
        kind: ChannelKind::Text,
        parent_id: None,
        position: 0,
        permission_overwrites: Vec::new(),
    }
}

fn role(id: &str, name: &str, managed: bool, everyone: bool) -> RoleRecord {
    RoleRecord {
        id: id.to_string(),
        name: name.to_string(),
        managed,
        everyone,
    }
}

fn human(id: &str, roles: &[&str]) -> MemberRecord {
    MemberRecord {
        user_id: id.to_string(),
        is_bot: false,
        is_admin: false,
        role_ids: roles.iter().map(|r| r.to_string()).collect(),
    }
}

#[async_trait::async_trait]
impl ChatPlatform for MockPlatform {
    fn self_id(&self) -> String {
        "bot".to_string()
    }

    async fn list_guild_ids(&self) -> Result<Vec<String>, PlatformError> {
        Ok(vec![GUILD.to_string()])
    }

    async fn guild_owner(&self, _guild_id: &str) -> Result<String, PlatformError> {
        Ok(self.with(|s| s.owner.clone()))
    }

    async fn list_channels(&self, _guild_id: &str) -> Result<Vec<ChannelRecord>, PlatformError> {
        Ok(self.with(|s| s.channels.clone()))
    }

    async fn create_channel(
        &self,
        _guild_id: &str,
        name: &str,
        kind: ChannelKind,
    ) -> Result<ChannelRecord, PlatformError> {
        if self.with(|s| s.fail_create_channel) {
            return Err(PlatformError::Api { status: 403, detail: "missing access".into() });
        }
        let record = ChannelRecord {
            id: self.fresh_id(),
            name: name.to_string(),
            kind,
            parent_id: None,
            position: 0,
            permission_overwrites: Vec::new(),
        };
        self.with(|s| s.channels.push(record.clone()));
        Ok(record)
    }

    async fn list_roles(&self, _guild_id: &str) -> Result<Vec<RoleRecord>, PlatformError> {
        Ok(self.with(|s| s.roles.clone()))
    }

    async fn create_role(
        &self,
        _guild_id: &str,
        name: &str,
    ) -> Result<RoleRecord, PlatformError> {
        let record = role(&self.fresh_id(), name, false, false);
        self.with(|s| s.roles.push(record.clone()));
        Ok(record)
    }

    async fn member(
        &self,
        _guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRecord>, PlatformError> {
        Ok(self.with(|s| s.members.get(user_id).cloned()))
    }

    async fn set_member_roles(
        &self,
        _guild_id: &str,
        user_id: &str,
        role_ids: &[String],
        _reason: &str,
    ) -> Result<(), PlatformError> {
        if self.with(|s| s.fail_set_roles) {
            return Err(PlatformError::Api { status: 403, detail: "missing permission".into() });
        }
        self.with(|s| {
            if let Some(m) = s.members.get_mut(user_id) {
                m.role_ids = role_ids.to_vec();
            }
            s.role_updates.push((user_id.to_string(), role_ids.to_vec()));
        });
        Ok(())
    }

    async fn audit_log(
        &self,
        _guild_id: &str,
        action: AuditAction,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        Ok(self.with(|s| {
            s.audit
                .iter()
                .filter(|(a, _)| *a == action)
                .map(|(_, e)| e.clone())
                .take(limit as usize)
                .collect()
        }))
    }

    async fn send_message(&self, channel_id: &str, text: &str) -> Result<(), PlatformError> {
        if self.with(|s| s.fail_messages) {
            return Err(PlatformError::Api { status: 500, detail: "unavailable".into() });
        }
        self.with(|s| s.messages.push((channel_id.to_string(), text.to_string())));
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), PlatformError> {
        if self.with(|s| s.fail_dms) {
            return Err(PlatformError::Api { status: 500, detail: "cannot DM".into() });
        }
        self.with(|s| s.dms.push((user_id.to_string(), text.to_string())));
        Ok(())
    }
}

fn test_config() -> WatchdogConfig {
    let mut cfg = WatchdogConfig::default();
    cfg.operator_id = "operator".into();
    cfg.bot_token = "token".into();
    cfg.protected_ids = vec!["vip".into()];
    cfg.thresholds.channel_delete = 5;
    cfg.timing.reconcile_pause_ms = 0;
    cfg.timing.quarantine_pause_ms = 0;
    cfg
}

struct Harness {
    watchdog: Watchdog,
    platform: Arc<MockPlatform>,
    store: SnapshotStore,
}

fn harness(state: MockState, cfg: WatchdogConfig) -> Harness {
    let pool = open_memory_pool().unwrap();
    let store = SnapshotStore::new(pool.clone());
    let platform = MockPlatform::new(state);
    let watchdog = Watchdog::new(Arc::new(cfg), platform.clone(), pool);
    Harness { watchdog, platform, store }
}

fn base_state() -> MockState {
    let mut state = MockState::default();
    state.owner = "owner".into();
    state.roles = vec![
        role(GUILD, "@everyone", false, true),
        role("r_mod", "Mods", false, false),
        role("r_member", "Members", false, false),
        role("r_hook", "Integration", true, false),
    ];
    state.members.insert("owner".into(), human("owner", &[GUILD, "r_mod"]));
    state.members.insert("vip".into(), human("vip", &[GUILD]));
    state.members.insert(
        "mallory".into(),
        human("mallory", &[GUILD, "r_mod", "r_member", "r_hook"]),
    );
    let mut bot = human("helperbot", &[GUILD]);
    bot.is_bot = true;
    state.members.insert("helperbot".into(), bot);
    state
}

#[tokio::test]
async fn quarantine_refusals_mutate_nothing() {
    let h = harness(base_state(), test_config());
    let q = h.watchdog.quarantine_manager();

    let cases = [
        ("owner", OutcomeKind::GuildOwner),
        ("vip", OutcomeKind::Protected),
        ("helperbot", OutcomeKind::BotAccount),
        ("ghost", OutcomeKind::MemberNotFound),
    ];
    for (member, expected) in cases {
        let outcome = q.quarantine(GUILD, member, "test").await;
        assert_eq!(outcome.kind, expected, "member {member}");
        assert!(!outcome.ok());
        assert!(
            h.store
                .get::<serde_json::Value>(&role_backup_key(GUILD, member))
                .unwrap()
                .is_none(),
            "no backup may be written for {member}"
        );
    }
    assert!(h.platform.with(|s| s.role_updates.is_empty()));
}

#[tokio::test]
async fn quarantine_then_restore_roundtrip() {
    let h = harness(base_state(), test_config());
    let q = h.watchdog.quarantine_manager();

    let outcome = q.quarantine(GUILD, "mallory", "raid cleanup").await;
    assert_eq!(outcome.kind, OutcomeKind::Quarantined);
    // everyone and the managed integration role are excluded.
    assert_eq!(
        outcome.previous_roles.clone().unwrap(),
        vec!["r_mod".to_string(), "r_member".to_string()]
    );

    // The member now holds only the freshly created quarantine role.
    let (quarantine_role, member_roles) = h.platform.with(|s| {
        (
            s.roles.iter().find(|r| r.name == "Quarantined").unwrap().id.clone(),
            s.members["mallory"].role_ids.clone(),
        )
    });
    assert_eq!(member_roles, vec![quarantine_role]);

    let restored = q.restore_roles(GUILD, "mallory").await;
    assert_eq!(restored.kind, OutcomeKind::Restored);
    assert_eq!(
        h.platform.with(|s| s.members["mallory"].role_ids.clone()),
        vec!["r_mod".to_string(), "r_member".to_string()]
    );

    // Backup survives a successful restore: retrying restore is a no-op
    // reapplication, not a NoBackup failure.
    let again = q.restore_roles(GUILD, "mallory").await;
    assert_eq!(again.kind, OutcomeKind::Restored);
}

#[tokio::test]
async fn restore_without_backup_changes_nothing() {
    let h = harness(base_state(), test_config());
    let outcome = h.watchdog.quarantine_manager().restore_roles(GUILD, "mallory").await;
    assert_eq!(outcome.kind, OutcomeKind::NoBackup);
    assert!(h.platform.with(|s| s.role_updates.is_empty()));
}

#[tokio::test]
async fn failed_role_replacement_keeps_backup_for_retry() {
    let mut state = base_state();
    state.fail_set_roles = true;
    let h = harness(state, test_config());

    let outcome = h.watchdog.quarantine_manager().quarantine(GUILD, "mallory", "test").await;
    assert_eq!(outcome.kind, OutcomeKind::PlatformFailed);

    // The backup was written before the replacement was attempted.
    let backup: serde_json::Value = h
        .store
        .get(&role_backup_key(GUILD, "mallory"))
        .unwrap()
        .expect("backup must survive a failed role replacement");
    assert_eq!(backup["roles"], serde_json::json!(["r_mod", "r_member"]));

    // Retry succeeds once the platform cooperates and overwrites in place.
    h.platform.with(|s| s.fail_set_roles = false);
    let retry = h.watchdog.quarantine_manager().quarantine(GUILD, "mallory", "test").await;
    assert_eq!(retry.kind, OutcomeKind::Quarantined);
}

#[tokio::test]
async fn reconcile_recreates_only_missing_channels() {
    let mut state = base_state();
    state.channels = vec![text_channel("c1", "general")];
    let h = harness(state, test_config());

    let snap = GuildChannelSnapshot {
        taken_at: chrono::Utc::now(),
        guild_id: GUILD.into(),
        channels: vec![text_channel("c1", "general"), text_channel("c2", "rules")],
    };
    h.store.put(&guild_backup_key(GUILD), &snap).unwrap();

    let report = h.watchdog.backup().reconcile(GUILD).await;
    assert_eq!(report.recreated, 1);
    assert!(report.missing.is_empty());
    assert!(h
        .platform
        .with(|s| s.channels.iter().any(|c| c.name == "rules")));
}

#[tokio::test]
async fn reconcile_reports_failed_recreations() {
    let mut state = base_state();
    state.channels = vec![text_channel("c1", "general")];
    state.fail_create_channel = true;
    let h = harness(state, test_config());

    let snap = GuildChannelSnapshot {
        taken_at: chrono::Utc::now(),
        guild_id: GUILD.into(),
        channels: vec![text_channel("c1", "general"), text_channel("c2", "rules")],
    };
    h.store.put(&guild_backup_key(GUILD), &snap).unwrap();

    let report = h.watchdog.backup().reconcile(GUILD).await;
    assert_eq!(report.recreated, 0);
    assert_eq!(report.missing, vec!["rules".to_string()]);
}

#[tokio::test]
async fn reconcile_without_snapshot_is_a_noop() {
    let h = harness(base_state(), test_config());
    let report = h.watchdog.backup().reconcile(GUILD).await;
    assert_eq!(report.recreated, 0);
    assert!(report.missing.is_empty());
}

#[tokio::test]
async fn five_channel_deletes_trigger_exactly_one_response() {
    let mut state = base_state();
    state.audit.push((
        AuditAction::ChannelDelete,
        AuditEntry { actor_id: "mallory".into(), at: chrono::Utc::now() },
    ));
    // The watchdog's own audit entries never count as suspects.
    state.audit.push((
        AuditAction::ChannelDelete,
        AuditEntry { actor_id: "bot".into(), at: chrono::Utc::now() },
    ));
    let h = harness(state, test_config());

    for i in 0..5 {
        h.watchdog
            .handle_event(PlatformEvent::ChannelDeleted {
                guild_id: GUILD.into(),
                channel_id: format!("c{i}"),
            })
            .await;
    }

    let incidents = h.watchdog.incidents().list_recent(10).unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].actors, vec!["mallory".to_string()]);
    // Counter reset on trigger; a sixth delete does not re-trigger.
    assert_eq!(h.watchdog.status().channel_delete_count, 0);

    h.watchdog
        .handle_event(PlatformEvent::ChannelDeleted {
            guild_id: GUILD.into(),
            channel_id: "c6".into(),
        })
        .await;
    assert_eq!(h.watchdog.incidents().list_recent(10).unwrap().len(), 1);

    // Auto-quarantine stripped the suspected actor.
    assert!(h
        .platform
        .with(|s| s.role_updates.iter().any(|(user, _)| user == "mallory")));
    // Operator was notified and an alert channel was created.
    assert!(h.platform.with(|s| !s.dms.is_empty()));
    assert!(h
        .platform
        .with(|s| s.channels.iter().any(|c| c.name == "raid-alerts")));
}

#[tokio::test]
async fn message_flood_triggers_per_author() {
    let mut cfg = test_config();
    cfg.auto_quarantine = false;
    let h = harness(base_state(), cfg);

    for _ in 0..24 {
        for author in ["bob", "alice"] {
            h.watchdog
                .handle_event(PlatformEvent::MessageCreated {
                    guild_id: GUILD.into(),
                    channel_id: "c1".into(),
                    author_id: author.into(),
                })
                .await;
        }
    }
    assert!(h.watchdog.incidents().list_recent(10).unwrap().is_empty());

    // Alice's 25th message crosses the threshold; Bob stays at 24.
    h.watchdog
        .handle_event(PlatformEvent::MessageCreated {
            guild_id: GUILD.into(),
            channel_id: "c1".into(),
            author_id: "alice".into(),
        })
        .await;

    let incidents = h.watchdog.incidents().list_recent(10).unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].actors, vec!["alice".to_string()]);
    assert_eq!(incidents[0].kind, "message_flood");
}

#[tokio::test]
async fn response_steps_are_isolated_from_platform_failures() {
    let mut state = base_state();
    state.audit.push((
        AuditAction::MemberBan,
        AuditEntry { actor_id: "mallory".into(), at: chrono::Utc::now() },
    ));
    state.fail_messages = true;
    state.fail_dms = true;
    state.fail_create_channel = true;
    let mut cfg = test_config();
    cfg.thresholds.ban = 2;
    let h = harness(state, cfg);

    for user in ["victim1", "victim2"] {
        h.watchdog
            .handle_event(PlatformEvent::MemberBanned {
                guild_id: GUILD.into(),
                user_id: user.into(),
            })
            .await;
    }

    // Alerting and reconciliation both failed, but the quarantine step
    // still ran and the incident was still recorded.
    assert_eq!(h.watchdog.incidents().list_recent(10).unwrap().len(), 1);
    assert!(h
        .platform
        .with(|s| s.role_updates.iter().any(|(user, _)| user == "mallory")));
}

#[tokio::test]
async fn commands_gate_backup_and_restore() {
    let mut state = base_state();
    state.channels = vec![text_channel("c1", "general")];
    let h = harness(state, test_config());

    let denied = handle_command(
        &h.watchdog,
        CommandRequest {
            command: CommandKind::Backup,
            guild_id: GUILD.into(),
            invoker_id: "mallory".into(),
        },
    )
    .await;
    assert!(!denied.ok);

    let allowed = handle_command(
        &h.watchdog,
        CommandRequest {
            command: CommandKind::Backup,
            guild_id: GUILD.into(),
            invoker_id: "operator".into(),
        },
    )
    .await;
    assert!(allowed.ok);
    assert!(allowed.message.contains("1 channels"));

    // status is open to anyone and reports the configured role name.
    let status = handle_command(
        &h.watchdog,
        CommandRequest {
            command: CommandKind::Status,
            guild_id: GUILD.into(),
            invoker_id: "anyone".into(),
        },
    )
    .await;
    assert!(status.ok);
    assert_eq!(
        status.status.unwrap().quarantine_role_name,
        "Quarantined"
    );
}

#[tokio::test]
async fn snapshot_command_overwrites_previous() {
    let mut state = base_state();
    state.channels = vec![text_channel("c1", "general")];
    let h = harness(state, test_config());

    h.watchdog.backup().snapshot(GUILD).await.unwrap();
    h.platform.with(|s| s.channels.push(text_channel("c2", "rules")));
    h.watchdog.backup().snapshot(GUILD).await.unwrap();

    let stored: GuildChannelSnapshot = h
        .store
        .get(&guild_backup_key(GUILD))
        .unwrap()
        .expect("snapshot stored");
    assert_eq!(stored.channels.len(), 2);
}
