// State store: last-write-wins replica of the admin's auction snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::Database;
use crate::model::AuctionState;

/// Key the snapshot is stored under in the `auction_state` table.
pub const SNAPSHOT_KEY: &str = "snapshot";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode or decode snapshot: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("storage backend error: {0:#}")]
    Backend(anyhow::Error),
}

/// What a reader gets back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Snapshot(Box<AuctionState>),
    /// Nothing has been published yet.
    Waiting,
}

/// Replication target for auction snapshots. Writes overwrite; reads are
/// unauthenticated.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, snapshot: &AuctionState) -> Result<(), StoreError>;

    async fn get(&self) -> Result<Stored, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-process store, used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: RwLock<Option<AuctionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn put(&self, snapshot: &AuctionState) -> Result<(), StoreError> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }

    async fn get(&self) -> Result<Stored, StoreError> {
        Ok(match self.snapshot.read().await.as_ref() {
            Some(state) => Stored::Snapshot(Box::new(state.clone())),
            None => Stored::Waiting,
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.snapshot.write().await = None;
        Ok(())
    }
}

/// Store backed by the SQLite `auction_state` key-value table.
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        SqliteStore { db }
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn put(&self, snapshot: &AuctionState) -> Result<(), StoreError> {
        let value = serde_json::to_value(snapshot)?;
        self.db
            .save_state(SNAPSHOT_KEY, &value)
            .map_err(StoreError::Backend)
    }

    async fn get(&self) -> Result<Stored, StoreError> {
        match self.db.load_state(SNAPSHOT_KEY).map_err(StoreError::Backend)? {
            Some(value) => Ok(Stored::Snapshot(Box::new(serde_json::from_value(value)?))),
            None => Ok(Stored::Waiting),
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.db
            .delete_state(SNAPSHOT_KEY)
            .map_err(StoreError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Player, PlayerStatus, Team};

    fn sample_state() -> AuctionState {
        let players = vec![Player {
            id: "1".to_string(),
            name: "Ravi".to_string(),
            gender: "M".to_string(),
            category: "Platinum".to_string(),
            image_url: "ravi.png".to_string(),
            base_price: 2,
            status: PlayerStatus::Unsold,
        }];
        let teams = vec![Team::new("RED_HAWKS", "Red Hawks", "red.png", 60)];
        AuctionState::new(players, teams, "Platinum")
    }

    #[tokio::test]
    async fn memory_store_waits_until_first_put() {
        let store = MemoryStore::new();
        assert_eq!(store.get().await.unwrap(), Stored::Waiting);

        let state = sample_state();
        store.put(&state).await.unwrap();
        assert_eq!(
            store.get().await.unwrap(),
            Stored::Snapshot(Box::new(state))
        );

        store.clear().await.unwrap();
        assert_eq!(store.get().await.unwrap(), Stored::Waiting);
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_snapshot() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let store = SqliteStore::new(db);
        assert_eq!(store.get().await.unwrap(), Stored::Waiting);

        let mut state = sample_state();
        state.current_player_id = Some("1".to_string());
        store.put(&state).await.unwrap();

        match store.get().await.unwrap() {
            Stored::Snapshot(loaded) => assert_eq!(*loaded, state),
            Stored::Waiting => panic!("expected a stored snapshot"),
        }

        store.clear().await.unwrap();
        assert_eq!(store.get().await.unwrap(), Stored::Waiting);
    }

    #[tokio::test]
    async fn sqlite_store_put_overwrites() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let store = SqliteStore::new(db);

        let first = sample_state();
        let mut second = sample_state();
        second.meta.auction_started = true;

        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        assert_eq!(
            store.get().await.unwrap(),
            Stored::Snapshot(Box::new(second))
        );
    }
}
