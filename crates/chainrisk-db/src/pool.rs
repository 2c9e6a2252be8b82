//! SQLite connection pool.
//!
//! A single connection guarded by a mutex. The store is written by one
//! scoring run per tenant plus the connection workflow, so contention stays low
//! and SQLite's own locking does the rest.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use tracing::warn;

use crate::broadcast::{create_event_channel, EventReceiver, EventSender, StoreEvent};

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Connection(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection mutex poisoned")]
    Poisoned,
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Shared handle to the authoritative store.
///
/// Cloning is cheap; every clone talks to the same connection and publishes on
/// the same event channel.
#[derive(Clone)]
pub struct DbPool {
    conn: Arc<Mutex<Connection>>,
    events: EventSender,
    /// Tags events this handle logs so its own relay can skip them.
    origin: Arc<str>,
}

impl DbPool {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database. Used by tests and dry runs.
    pub fn in_memory() -> DbResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> DbResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let origin = format!(
            "{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            events: create_event_channel(),
            origin: origin.into(),
        })
    }

    /// Run a closure with shared access to the connection.
    pub fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&conn)
    }

    /// Run a closure with exclusive access, needed for transactions and migrations.
    pub fn with_conn_mut<T, F>(&self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Connection) -> DbResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        f(&mut conn)
    }

    /// Publish a store event: log it for other processes, then broadcast it
    /// in-process. Having no subscribers is not an error. A failure to log is
    /// only warned about; pending sync and interval runs cover the gap.
    pub fn publish(&self, event: StoreEvent) {
        let logged = serde_json::to_string(&event)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                crate::queries::store_events::append(self, &self.origin, event.tenant_id(), &payload)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = logged {
            warn!(error = %e, tenant_id = event.tenant_id(), "Failed to log store event");
        }
        self.broadcast(event);
    }

    /// Broadcast in-process only. Used for events relayed from the log.
    pub fn broadcast(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    /// Origin tag of events logged through this handle.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Subscribe to store events published after this call.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

/// Map a UNIQUE constraint violation to [`DbError::Conflict`].
pub(crate) fn map_unique(err: rusqlite::Error, what: impl FnOnce() -> String) -> DbError {
    match err {
        rusqlite::Error::SqliteFailure(ref code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DbError::Conflict(what())
        }
        e => DbError::Connection(e),
    }
}

/// Map `QueryReturnedNoRows` to [`DbError::NotFound`].
pub(crate) fn map_not_found(err: rusqlite::Error, what: impl FnOnce() -> String) -> DbError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(what()),
        e => DbError::Connection(e),
    }
}
