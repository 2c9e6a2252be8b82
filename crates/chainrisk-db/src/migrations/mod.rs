//! Database migrations.

use crate::pool::{DbError, DbPool, DbResult};
use rusqlite_migration::{Migrations, M};
use tracing::debug;

/// SQL schema definition.
const SCHEMA: &str = include_str!("schema.sql");

/// Store event log, added after the initial schema.
const STORE_EVENTS: &str = include_str!("store_events.sql");

/// Run all database migrations.
pub fn run_migrations(pool: &DbPool) -> DbResult<()> {
    let migrations = Migrations::new(vec![M::up(SCHEMA), M::up(STORE_EVENTS)]);

    pool.with_conn_mut(|conn| {
        migrations
            .to_latest(conn)
            .map_err(|e| DbError::Migration(e.to_string()))
    })?;

    debug!("Database schema up to date");
    Ok(())
}
