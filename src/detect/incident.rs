//! Raid incident log -- one row per detection, for operator review.

use super::RaidKind;
use crate::storage::Pool;
use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

pub struct IncidentLog {
    pool: Pool,
}

#[derive(Debug, serde::Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub guild_id: String,
    pub kind: String,
    pub description: String,
    pub actors: Vec<String>,
    pub created_at: String,
}

impl IncidentLog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn record_raid(
        &self,
        guild_id: &str,
        kind: RaidKind,
        description: &str,
        actors: &[String],
    ) -> Result<Uuid> {
        let conn = self.pool.get()?;
        let id = Uuid::new_v4();
        let actors_json = serde_json::to_string(actors)?;

        conn.execute(
            "INSERT INTO incidents (id, guild_id, kind, description, actors_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
            params![id.to_string(), guild_id, kind.to_string(), description, actors_json],
        )?;

        Ok(id)
    }

    pub fn list_recent(&self, limit: usize) -> Result<Vec<Incident>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, guild_id, kind, description, actors_json, created_at
             FROM incidents ORDER BY created_at DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id_str: String = row.get(0)?;
            let actors_str: String = row.get(4)?;
            Ok(Incident {
                id: Uuid::parse_str(&id_str).unwrap_or_default(),
                guild_id: row.get(1)?,
                kind: row.get(2)?,
                description: row.get(3)?,
                actors: serde_json::from_str(&actors_str).unwrap_or_default(),
                created_at: row.get(5)?,
            })
        })?;

        let mut incidents = Vec::new();
        for r in rows {
            incidents.push(r?);
        }
        Ok(incidents)
    }
}
