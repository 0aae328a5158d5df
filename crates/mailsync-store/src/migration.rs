//! Database schema migrations for SQLite.
//!
//! Versioned migrations recorded in `schema_migrations`. Each version is
//! applied at most once, inside one transaction with the version row.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent. Several connections may open the same file; whichever
/// migrates first wins and the others see the version row.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let current: u32 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    for version in (current + 1)..=CURRENT_VERSION {
        apply_migration(&tx, version)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now_millis()],
        )?;
        tracing::debug!(version, "applied schema migration");
    }

    tx.commit()?;
    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: packets, lower bounds and sync cursors, all keyed by box.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Stored packets. seq_number is 16 hex digits so TEXT order is numeric order.
        CREATE TABLE packets (
            box_id TEXT NOT NULL,
            src TEXT NOT NULL,
            dst TEXT NOT NULL,
            seq_number TEXT NOT NULL,
            label INTEGER NOT NULL,
            data BLOB NOT NULL,
            PRIMARY KEY (box_id, src, dst, seq_number)
        );

        -- Persisted per-channel floors
        CREATE TABLE lower_bounds (
            box_id TEXT NOT NULL,
            src TEXT NOT NULL,
            dst TEXT NOT NULL,
            lower_bound TEXT NOT NULL,
            PRIMARY KEY (box_id, src, dst)
        );

        -- How far each channel has been read from each peer
        CREATE TABLE cursors (
            box_id TEXT NOT NULL,
            peer TEXT NOT NULL,
            src TEXT NOT NULL,
            dst TEXT NOT NULL,
            cursor TEXT NOT NULL,
            PRIMARY KEY (box_id, peer, src, dst)
        );
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
