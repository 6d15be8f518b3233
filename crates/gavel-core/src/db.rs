// SQLite persistence layer for auction snapshots and the audit log.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::audit::{AuditAction, AuditEntry};

/// SQLite-backed persistence for the replicated auction snapshot and the
/// admin audit log.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS auction_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                action      TEXT NOT NULL,
                player_id   TEXT NOT NULL,
                player_name TEXT NOT NULL,
                team_id     TEXT,
                team_name   TEXT NOT NULL,
                price       INTEGER NOT NULL,
                timestamp   TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Persist an arbitrary JSON value under `key`. Uses INSERT OR REPLACE so
    /// repeated saves overwrite the previous value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO auction_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`. Returns `None` if the key
    /// does not exist.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT value FROM auction_state WHERE key = ?1")
            .context("failed to prepare load_state query")?;

        let mut rows = stmt
            .query_map(params![key], |row| {
                let json_str: String = row.get(0)?;
                Ok(json_str)
            })
            .context("failed to query auction state")?;

        match rows.next() {
            Some(row_result) => {
                let json_str = row_result.context("failed to read state row")?;
                let value: serde_json::Value = serde_json::from_str(&json_str)
                    .context("failed to deserialize state value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Remove the value stored under `key`. Missing keys are not an error.
    pub fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM auction_state WHERE key = ?1", params![key])
            .context("failed to delete state")?;
        Ok(())
    }

    /// Append one audit entry.
    pub fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log
                (action, player_id, player_name, team_id, team_name, price, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.action.as_str(),
                entry.player_id,
                entry.player_name,
                entry.team_id,
                entry.team_name,
                entry.price,
                entry.timestamp.to_rfc3339(),
            ],
        )
        .context("failed to record audit entry")?;
        Ok(())
    }

    /// Load the audit log, most recent entry first.
    pub fn load_audit(&self) -> Result<Vec<AuditEntry>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT action, player_id, player_name, team_id, team_name, price, timestamp
                 FROM audit_log ORDER BY id DESC",
            )
            .context("failed to prepare load_audit query")?;

        let rows = stmt
            .query_map([], |row| {
                let action: String = row.get(0)?;
                let timestamp: String = row.get(6)?;
                Ok((
                    action,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u32>(5)?,
                    timestamp,
                ))
            })
            .context("failed to query audit log")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map audit rows")?;

        rows.into_iter()
            .map(
                |(action, player_id, player_name, team_id, team_name, price, timestamp)| {
                    let action = AuditAction::parse(&action)
                        .with_context(|| format!("unknown audit action `{action}`"))?;
                    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                        .context("invalid audit timestamp")?
                        .with_timezone(&Utc);
                    Ok(AuditEntry {
                        action,
                        player_id,
                        player_name,
                        team_id,
                        team_name,
                        price,
                        timestamp,
                    })
                },
            )
            .collect()
    }

    /// Delete every audit entry.
    pub fn clear_audit(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM audit_log", [])
            .context("failed to clear audit log")?;
        Ok(())
    }
}
