//! Embedded, transactional, thread-safe key/value-and-tabular store backing
//! metrics and semantic memory.
//!
//! Backed by SQLite (`rusqlite`, bundled), opening one `Connection` per call
//! against a shared file. Concurrent readers are allowed by SQLite itself;
//! writers are additionally serialized here with a mutex so callers never
//! see a `SQLITE_BUSY` under our own concurrent writers.

mod error;
mod events;
mod schema;

pub use error::StorageError;
pub use events::{AgentEvent, EventFilter};

use rusqlite::Connection;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

thread_local! {
    /// One connection per OS thread per store path. A process that opens more
    /// than one `Store` at different paths simply grows this map by one entry
    /// per (thread, path) pair it actually touches.
    static TLS_CONN: RefCell<Vec<(PathBuf, Connection)>> = RefCell::new(Vec::new());
}

/// Thread-safe, transactional embedded store. Cheap to clone (wraps an `Arc`-free
/// path + mutex; connections themselves live in thread-local storage).
pub struct Store {
    path: PathBuf,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Store {
    /// Opens (creating if absent) the store at `path` and applies any pending
    /// schema migrations. Safe to call concurrently from multiple threads
    /// against the same path; migrations run once, guarded by `write_lock`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let store = Self { path, write_lock: Mutex::new(()), closed: AtomicBool::new(false) };
        store.with_connection(|conn| schema::migrate(conn))?;
        Ok(store)
    }

    /// Releases this thread's cached connection for this store's path. Other
    /// threads' connections are released lazily as they exit; this call is
    /// enough to make `open()` safe to call again with a fresh instance.
    pub fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        TLS_CONN.with(|cell| cell.borrow_mut().retain(|(p, _)| p != &self.path));
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T, StorageError> {
        self.ensure_open()?;
        TLS_CONN.with(|cell| -> Result<T, StorageError> {
            let mut conns = cell.borrow_mut();
            if !conns.iter().any(|(p, _)| p == &self.path) {
                let conn = Connection::open(&self.path)?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conns.push((self.path.clone(), conn));
            }
            let (_, conn) = conns.iter().find(|(p, _)| p == &self.path).expect("just inserted");
            Ok(f(conn)?)
        })
    }

    /// Executes a statement that does not return rows. Serialized against
    /// other writers on this `Store`.
    pub fn execute(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.with_connection(|conn| conn.execute(sql, params))
    }

    /// Runs a read query and maps each row with `map_row`. Not serialized:
    /// SQLite allows concurrent readers.
    pub fn query<T>(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        map_row: impl Fn(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StorageError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, map_row)?;
            rows.collect::<rusqlite::Result<Vec<T>>>()
        })
    }

    /// Scoped write transaction: commits if `f` returns `Ok`, rolls back
    /// (implicitly, by dropping the uncommitted transaction) otherwise.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.ensure_open()?;
        TLS_CONN.with(|cell| -> Result<T, StorageError> {
            let mut conns = cell.borrow_mut();
            if !conns.iter().any(|(p, _)| p == &self.path) {
                let conn = Connection::open(&self.path)?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conns.push((self.path.clone(), conn));
            }
            let (_, conn) = conns.iter_mut().find(|(p, _)| p == &self.path).expect("just inserted");
            let txn = conn.transaction()?;
            match f(&txn) {
                Ok(value) => {
                    txn.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    drop(txn); // explicit: rollback on drop without commit
                    Err(e)
                }
            }
        })
    }

    /// Inserts one lifecycle event into `agent_events`.
    pub fn insert_event(&self, event: &AgentEvent) -> Result<(), StorageError> {
        self.execute(
            "INSERT INTO agent_events (event_type, agent_id, agent_type, timestamp, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                &event.event_type,
                &event.agent_id,
                &event.agent_type,
                &event.timestamp.to_rfc3339(),
                &event.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Returns events matching `filter`, most recent first, capped at `limit`.
    pub fn get_events(&self, filter: EventFilter, limit: usize) -> Result<Vec<AgentEvent>, StorageError> {
        events::query_events(self, filter, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("swarm.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_is_idempotent_and_creates_schema() {
        let (_dir, store) = temp_store();
        let version: i64 = store
            .query("SELECT MAX(version) FROM schema_info", &[], |r| r.get(0))
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert!(version >= 1);
    }

    #[test]
    fn insert_and_fetch_events_round_trip() {
        let (_dir, store) = temp_store();
        let event = AgentEvent {
            event_type: "agent_spawn".into(),
            agent_id: "a1".into(),
            agent_type: "worker".into(),
            timestamp: Utc::now(),
            metadata: serde_json::json!({"k": "v"}),
        };
        store.insert_event(&event).unwrap();
        let fetched = store.get_events(EventFilter::default(), 10).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].agent_id, "a1");
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let (_dir, store) = temp_store();
        let result: Result<(), StorageError> = store.transaction(|txn| {
            txn.execute(
                "INSERT INTO agent_events (event_type, agent_id, agent_type, timestamp, metadata) VALUES ('x','a1','worker','now','{}')",
                [],
            )?;
            Err(StorageError::Io("forced rollback".into()))
        });
        assert!(result.is_err());
        let count: i64 = store
            .query("SELECT COUNT(*) FROM agent_events", &[], |r| r.get(0))
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn closed_store_rejects_further_calls() {
        let (_dir, store) = temp_store();
        store.close().unwrap();
        assert!(matches!(store.execute("SELECT 1", &[]), Err(StorageError::Closed)));
    }
}
