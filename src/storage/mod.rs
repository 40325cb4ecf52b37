//! SQLite storage layer -- schema, pool, and the durable snapshot store.

pub mod schema;

use anyhow::Result;
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// In-memory pool for tests. Capped at one connection so every
/// checkout sees the same in-memory database.
pub fn open_memory_pool() -> Result<Pool> {
    let manager = SqliteConnectionManager::memory();
    let pool = R2D2Pool::builder().max_size(1).build(manager)?;
    let conn = pool.get()?;
    schema::migrate(&conn)?;
    Ok(pool)
}

/// Durable key -> JSON blob map. Last write wins; a missing key is an
/// explicit `None`, never an error. Each key is independent -- no
/// multi-key transaction guarantee.
#[derive(Clone)]
pub struct SnapshotStore {
    pool: Pool,
}

impl SnapshotStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let conn = self.pool.get()?;
        let json = serde_json::to_string(value)?;
        conn.execute(
            "INSERT INTO kv (key, value_json, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value_json = ?2, updated_at = datetime('now')",
            rusqlite::params![key, json],
        )?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT value_json FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(rusqlite::params![key])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }
}

/// Key for a guild's channel topology snapshot.
pub fn guild_backup_key(guild_id: &str) -> String {
    format!("backup_{guild_id}")
}

/// Key for a member's pre-quarantine role backup.
pub fn role_backup_key(guild_id: &str, member_id: &str) -> String {
    format!("roles_backup_{guild_id}_{member_id}")
}
