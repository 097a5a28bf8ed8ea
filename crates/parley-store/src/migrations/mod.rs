//! Schema migrations, applied on open.
//!
//! `PRAGMA user_version` records the last applied step. Each pending step
//! runs in its own transaction together with the version bump.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered steps; step `n` moves the schema to version `n`.
const MIGRATIONS: &[(u32, &str, Migration)] = &[(1, "v001_initial", v001_initial::up)];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let latest = MIGRATIONS.last().map_or(0, |(version, _, _)| *version);

    if current > latest {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{latest}"
        )));
    }

    for (version, name, up) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        tracing::info!(version, name, "applying migration");

        let tx = conn.unchecked_transaction()?;
        up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
