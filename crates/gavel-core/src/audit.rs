// Append-only admin audit log, kept apart from the sale history.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::Database;
use crate::model::SaleRecord;
use crate::store::StoreError;

/// Kind of audited admin action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UndoSale,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UndoSale => "UNDO_SALE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNDO_SALE" => Some(AuditAction::UndoSale),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: AuditAction,
    pub player_id: String,
    pub player_name: String,
    pub team_id: Option<String>,
    pub team_name: String,
    pub price: u32,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry describing the reversal of `record`.
    pub fn undo(record: &SaleRecord, timestamp: DateTime<Utc>) -> Self {
        AuditEntry {
            action: AuditAction::UndoSale,
            player_id: record.player_id.clone(),
            player_name: record.player_name.clone(),
            team_id: record.team_id.clone(),
            team_name: record.team_name.clone(),
            price: record.price,
            timestamp,
        }
    }
}

/// Destination for audit entries. Readable by admins only; the app gates
/// access before calling `entries`.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// All entries, most recent first.
    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-process audit log.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.entries.lock().await.insert(0, entry);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// Audit log stored in the `audit_log` SQLite table.
pub struct SqliteAudit {
    db: Arc<Database>,
}

impl SqliteAudit {
    pub fn new(db: Arc<Database>) -> Self {
        SqliteAudit { db }
    }
}

#[async_trait]
impl AuditSink for SqliteAudit {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.db.record_audit(&entry).map_err(StoreError::Backend)
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.db.load_audit().map_err(StoreError::Backend)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.db.clear_audit().map_err(StoreError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(player_id: &str, price: u32) -> SaleRecord {
        SaleRecord {
            player_id: player_id.to_string(),
            player_name: format!("Player {player_id}"),
            category: "Gold".to_string(),
            team_id: Some("RED".to_string()),
            team_name: "Red Hawks".to_string(),
            price,
        }
    }

    #[test]
    fn undo_entry_copies_record_fields() {
        let now = Utc::now();
        let entry = AuditEntry::undo(&record("9", 14), now);
        assert_eq!(entry.action, AuditAction::UndoSale);
        assert_eq!(entry.player_id, "9");
        assert_eq!(entry.team_name, "Red Hawks");
        assert_eq!(entry.price, 14);
        assert_eq!(entry.timestamp, now);
    }

    #[test]
    fn action_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&AuditAction::UndoSale).unwrap();
        assert_eq!(json, "\"UNDO_SALE\"");
        assert_eq!(AuditAction::parse("UNDO_SALE"), Some(AuditAction::UndoSale));
        assert_eq!(AuditAction::parse("SELL"), None);
    }

    #[tokio::test]
    async fn memory_audit_keeps_most_recent_first() {
        let audit = MemoryAudit::new();
        audit.record(AuditEntry::undo(&record("1", 5), Utc::now())).await.unwrap();
        audit.record(AuditEntry::undo(&record("2", 6), Utc::now())).await.unwrap();

        let entries = audit.entries().await.unwrap();
        assert_eq!(entries[0].player_id, "2");
        assert_eq!(entries[1].player_id, "1");

        audit.clear().await.unwrap();
        assert!(audit.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_audit_round_trips_through_database() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let audit = SqliteAudit::new(db);
        audit.record(AuditEntry::undo(&record("3", 11), Utc::now())).await.unwrap();

        let entries = audit.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].player_id, "3");
        assert_eq!(entries[0].price, 11);
    }
}
