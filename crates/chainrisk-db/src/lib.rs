//! chainrisk database layer.
//!
//! SQLite is the system of record for tenants, actors, supply chains,
//! connections and scored vertices. Writes publish [`StoreEvent`]s that the
//! graph mirror and the scheduler consume, in-process directly and across
//! processes through the event log and [`EventRelay`].

pub mod broadcast;
pub mod migrations;
pub mod pool;
pub mod queries;
pub mod relay;

pub use broadcast::{create_event_channel, EventReceiver, EventSender, StoreEvent};
pub use pool::{DbError, DbPool, DbResult};
pub use relay::EventRelay;

use std::path::Path;

/// Open a database file and bring its schema up to date.
pub fn init_pool(path: impl AsRef<Path>) -> DbResult<DbPool> {
    let pool = DbPool::open(path)?;
    migrations::run_migrations(&pool)?;
    Ok(pool)
}

/// Create a migrated in-memory database.
pub fn init_in_memory() -> DbResult<DbPool> {
    let pool = DbPool::in_memory()?;
    migrations::run_migrations(&pool)?;
    Ok(pool)
}

/// Current time as an RFC 3339 string, the format every timestamp column uses.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_pool_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chainrisk.db");

        let pool = init_pool(&path).unwrap();
        assert!(path.exists());

        let tables: i64 = pool
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='actors'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let pool = init_in_memory().unwrap();
        let mut rx = pool.subscribe();

        pool.publish(StoreEvent::BaselineUpdated {
            tenant_id: "t1".to_string(),
            actor_id: "a1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.tenant_id(), "t1");
    }
}
