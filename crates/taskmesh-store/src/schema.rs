//! Database schema SQL.

/// Task metadata, keyed by task id. Rows past `expires_at` are invisible
/// and purged lazily.
pub const METADATA_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS task_metadata (
    task_id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    priority TEXT NOT NULL,
    delay_secs INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER,
    expires_at INTEGER NOT NULL,
    result_json TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_metadata_expires ON task_metadata(expires_at);
"#;

/// Broker tables: queue entries and worker heartbeats.
pub const BROKER_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queue_entries (
    task_id TEXT PRIMARY KEY,
    queue TEXT NOT NULL,
    category TEXT NOT NULL,
    priority TEXT NOT NULL,
    weight INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    state TEXT NOT NULL,
    enqueued_at INTEGER NOT NULL,
    eligible_at INTEGER NOT NULL,
    lease_owner TEXT,
    lease_expires_at INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    result_json TEXT,
    error TEXT,
    finished_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_queue_ready ON queue_entries(queue, state, eligible_at);
CREATE INDEX IF NOT EXISTS idx_queue_lease ON queue_entries(state, lease_expires_at);

CREATE TABLE IF NOT EXISTS workers (
    name TEXT PRIMARY KEY,
    queues TEXT NOT NULL,
    last_heartbeat INTEGER NOT NULL
);
"#;
