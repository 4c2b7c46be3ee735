//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! batch that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            tracing::info!(version, "applying schema migration");
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Per-owner, per-resource-type visibility policies
        CREATE TABLE policies (
            owner TEXT NOT NULL,
            resource_type TEXT NOT NULL,          -- ResourceType stable string
            policy TEXT NOT NULL,                 -- VisibilityPolicy as JSON
            updated_at INTEGER NOT NULL,          -- Unix ms

            PRIMARY KEY (owner, resource_type)
        );

        -- Access requests: append-only lifecycle ledger
        CREATE TABLE requests (
            id TEXT PRIMARY KEY,                  -- RequestId (uuid)
            owner TEXT NOT NULL,
            requester TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            message TEXT,
            status TEXT NOT NULL,                 -- pending|approved|rejected|cancelled
            created_at INTEGER NOT NULL,          -- Unix ms
            responded_at INTEGER                  -- Unix ms, set on leaving pending
        );

        -- At most one pending request per (owner, requester, resource_type)
        CREATE UNIQUE INDEX idx_requests_one_pending
            ON requests(owner, requester, resource_type)
            WHERE status = 'pending';

        -- Access grants: append-only, transitioned but never deleted
        CREATE TABLE grants (
            id TEXT PRIMARY KEY,                  -- GrantId (uuid)
            owner TEXT NOT NULL,
            grantee TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_ref TEXT,                    -- NULL for scalar PII fields
            duration TEXT NOT NULL,               -- DurationPolicy as JSON
            expires_at INTEGER,                   -- denormalized from duration, for the sweeper
            views_consumed INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL,                  -- active|expired|revoked
            granted_at INTEGER NOT NULL,          -- Unix ms
            terminated_at INTEGER,                -- Unix ms
            termination_reason TEXT,
            warning_sent INTEGER NOT NULL DEFAULT 0,
            original_duration_ms INTEGER
        );

        -- At most one active grant per resource tuple
        CREATE UNIQUE INDEX idx_grants_one_active
            ON grants(owner, grantee, resource_type, COALESCE(resource_ref, ''))
            WHERE state = 'active';

        -- Indexes for common queries
        CREATE INDEX idx_requests_owner ON requests(owner, status);
        CREATE INDEX idx_requests_requester ON requests(requester, status);
        CREATE INDEX idx_grants_owner ON grants(owner, state);
        CREATE INDEX idx_grants_grantee ON grants(grantee, state);
        CREATE INDEX idx_grants_timed ON grants(state, expires_at);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
