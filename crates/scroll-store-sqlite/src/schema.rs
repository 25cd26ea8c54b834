//! SQL schema for the scroll SQLite store.
//!
//! Executed once at connection startup. The table layout is versioned with
//! `PRAGMA user_version`; record field layouts are versioned per row and
//! reconciled on load, so adding a record field never needs a table
//! migration.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per thread that ever held a record. `last_sort_id` is the
-- ordering authority and is never decremented, even when records go away.
CREATE TABLE IF NOT EXISTS threads (
    thread_id        TEXT PRIMARY KEY,
    last_sort_id     INTEGER NOT NULL DEFAULT 0,
    last_activity_ms INTEGER             -- unix millis of newest previewable record
);

CREATE TABLE IF NOT EXISTS records (
    unique_id           TEXT PRIMARY KEY,
    thread_id           TEXT NOT NULL REFERENCES threads(thread_id),
    sort_id             INTEGER NOT NULL,
    record_type         TEXT NOT NULL,   -- 'incoming' | 'outgoing' | 'info'
    info_type           TEXT,            -- InfoMessageType discriminant or NULL
    is_unread           INTEGER NOT NULL DEFAULT 0,
    expires_at_ms       INTEGER,         -- unix millis; NULL until the timer starts
    schema_version      INTEGER NOT NULL,
    info_schema_version INTEGER,         -- NULL on non-info rows
    fields_json         TEXT NOT NULL,   -- everything else, as a JSON object
    UNIQUE (thread_id, sort_id)
);

CREATE INDEX IF NOT EXISTS records_unread_idx  ON records(thread_id, is_unread);
CREATE INDEX IF NOT EXISTS records_expires_idx ON records(expires_at_ms)
    WHERE expires_at_ms IS NOT NULL;

PRAGMA user_version = 1;
";
