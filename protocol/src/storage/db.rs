//! # HubDb, Persistent Storage Engine
//!
//! Durable home of the hub, built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                  | Value                   |
//! |------------|----------------------|-------------------------|
//! | `state`    | `snapshot`           | `json(HubState)`        |
//! | `events`   | `sequence` (8B BE)   | `json(EventRecord)`     |
//! | `metadata` | key (UTF-8)          | value (bytes)           |
//!
//! Event sequences are stored as big-endian u64 so sled's lexicographic
//! ordering matches numeric ordering and `events_since` is a range scan.
//!
//! ## Atomicity
//!
//! A committed hub operation writes the new snapshot and the events it
//! emitted in one multi-tree transaction. After a crash the database holds
//! either the state before the operation or the state after it, never a
//! snapshot without its events.

use alloy_primitives::Address;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

use super::events::EventRecord;
use super::state::HubState;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database belongs to hub {stored}, not {requested}")]
    HubMismatch { stored: Address, requested: Address },
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

const SNAPSHOT_KEY: &[u8] = b"snapshot";

/// Well-known key in the `metadata` tree for the hub this database serves.
const META_HUB_ADDRESS: &[u8] = b"hub_address";

// ---------------------------------------------------------------------------
// HubDb
// ---------------------------------------------------------------------------

/// Persistent storage for one hub instance.
///
/// sled trees are safe to share across threads; wrap in `Arc<HubDb>` to
/// share between the hub and the API layer.
#[derive(Debug, Clone)]
pub struct HubDb {
    db: Db,
    state: Tree,
    events: Tree,
    metadata: Tree,
}

impl HubDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let state = db.open_tree("state")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            state,
            events,
            metadata,
        })
    }

    /// Tie this database to `hub`. A fresh database records the address; an
    /// existing one must already carry the same address.
    pub fn bind_hub(&self, hub: Address) -> DbResult<()> {
        match self.metadata.get(META_HUB_ADDRESS)? {
            Some(bytes) if bytes.as_ref() == hub.as_slice() => Ok(()),
            Some(bytes) if bytes.len() == hub.len() => Err(DbError::HubMismatch {
                stored: Address::from_slice(&bytes),
                requested: hub,
            }),
            Some(_) => Err(DbError::Serialization("invalid hub address bytes".to_string())),
            None => {
                self.metadata.insert(META_HUB_ADDRESS, hub.as_slice())?;
                Ok(())
            }
        }
    }

    // -- State + events -----------------------------------------------------

    /// Atomically store a snapshot together with the events that produced it.
    ///
    /// The write is visible to readers once this returns; call [`flush`]
    /// to make it durable.
    ///
    /// [`flush`]: HubDb::flush
    pub fn commit(&self, snapshot: &HubState, records: &[EventRecord]) -> DbResult<()> {
        let snapshot_bytes =
            serde_json::to_vec(snapshot).map_err(|e| DbError::Serialization(e.to_string()))?;
        let mut event_rows = Vec::with_capacity(records.len());
        for record in records {
            let bytes =
                serde_json::to_vec(record).map_err(|e| DbError::Serialization(e.to_string()))?;
            event_rows.push((record.sequence.to_be_bytes(), bytes));
        }

        (&self.state, &self.events)
            .transaction(|(state, events)| {
                state.insert(SNAPSHOT_KEY, snapshot_bytes.as_slice())?;
                for (key, value) in &event_rows {
                    events.insert(&key[..], value.as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => DbError::Sled(e),
                TransactionError::Abort(()) => {
                    DbError::Serialization("commit transaction aborted".to_string())
                }
            })?;

        debug!(events = records.len(), "committed hub snapshot");
        Ok(())
    }

    /// Load the last committed snapshot, if any.
    pub fn load_snapshot(&self) -> DbResult<Option<HubState>> {
        match self.state.get(SNAPSHOT_KEY)? {
            Some(bytes) => {
                let state: HubState = serde_json::from_slice(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// All events with `sequence >= since`, oldest first, at most `limit`.
    pub fn events_since(&self, since: u64, limit: usize) -> DbResult<Vec<EventRecord>> {
        let mut records = Vec::new();
        for result in self.events.range(since.to_be_bytes()..).take(limit) {
            let (_key, value) = result?;
            let record: EventRecord = serde_json::from_slice(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Number of persisted events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::HubEvent;
    use crate::storage::state::{Relay, RelayState};
    use alloy_primitives::U256;

    fn record(sequence: u64) -> EventRecord {
        EventRecord {
            sequence,
            timestamp: 1000 + sequence,
            event: HubEvent::Unstaked {
                relay: Address::repeat_byte(sequence as u8),
                stake: U256::from(sequence),
            },
        }
    }

    #[test]
    fn open_temporary_database_is_empty() {
        let db = HubDb::open_temporary().expect("should create temp db");
        assert!(db.load_snapshot().unwrap().is_none());
        assert_eq!(db.event_count(), 0);
    }

    #[test]
    fn commit_then_load() {
        let db = HubDb::open_temporary().unwrap();
        let mut state = HubState::new();
        state.relays.insert(
            Address::repeat_byte(1),
            Relay {
                stake: U256::from(10u64),
                state: RelayState::Staked,
                ..Default::default()
            },
        );
        state.event_count = 2;

        db.commit(&state, &[record(0), record(1)]).unwrap();
        assert_eq!(db.load_snapshot().unwrap(), Some(state));
        assert_eq!(db.event_count(), 2);
    }

    #[test]
    fn commit_is_readable_before_flush() {
        let db = HubDb::open_temporary().unwrap();
        let mut state = HubState::new();
        state.event_count = 1;

        db.commit(&state, &[record(0)]).unwrap();
        assert_eq!(db.load_snapshot().unwrap(), Some(state.clone()));
        assert_eq!(db.events_since(0, 10).unwrap(), vec![record(0)]);

        db.flush().unwrap();
        assert_eq!(db.load_snapshot().unwrap(), Some(state));
    }

    #[test]
    fn events_since_is_ordered_and_bounded() {
        let db = HubDb::open_temporary().unwrap();
        let records: Vec<_> = (0..300).map(record).collect();
        db.commit(&HubState::new(), &records).unwrap();

        let tail = db.events_since(256, 100).unwrap();
        assert_eq!(tail.len(), 44);
        assert_eq!(tail[0].sequence, 256);
        assert!(tail.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let head = db.events_since(0, 10).unwrap();
        assert_eq!(head.len(), 10);
        assert_eq!(head[9].sequence, 9);
    }

    #[test]
    fn persistent_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut state = HubState::new();
        state.total_burned = U256::from(7u64);
        {
            let db = HubDb::open(dir.path()).expect("should open db");
            db.commit(&state, &[record(0)]).unwrap();
            db.flush().unwrap();
        }
        let db = HubDb::open(dir.path()).expect("should reopen db");
        assert_eq!(db.load_snapshot().unwrap(), Some(state));
        assert_eq!(db.events_since(0, 10).unwrap(), vec![record(0)]);
    }

    #[test]
    fn bind_hub_rejects_other_hub() {
        let db = HubDb::open_temporary().unwrap();
        let hub = Address::repeat_byte(0x25);
        db.bind_hub(hub).unwrap();
        db.bind_hub(hub).unwrap();

        match db.bind_hub(Address::repeat_byte(0x26)) {
            Err(DbError::HubMismatch { stored, .. }) => assert_eq!(stored, hub),
            other => panic!("expected HubMismatch, got {other:?}"),
        }
    }
}
