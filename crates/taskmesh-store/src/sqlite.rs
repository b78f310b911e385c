//! SQLite-backed metadata store and work-queue broker.
//!
//! One database file holds both. Reservation runs inside an immediate
//! transaction, so several worker processes can share the file without
//! handing the same entry out twice within one lease.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::backend::{Broker, MetadataStore};
use crate::schema::{BROKER_SCHEMA_SQL, METADATA_SCHEMA_SQL};
use crate::types::*;
use taskmesh_core::clock::now_millis;
use taskmesh_core::{Error, QueueConfig, Result, TaskStatus, KNOWN_QUEUES};

/// SQLite store implementing both [`MetadataStore`] and [`Broker`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    retention_ms: i64,
    visibility_ms: i64,
    aging_ms: i64,
    liveness_ms: i64,
}

fn unavailable(e: rusqlite::Error) -> Error {
    Error::BackendUnavailable(format!("task store: {}", e))
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/queue/`). The file will be `db_dir/taskmesh.db`.
    pub fn open(db_dir: impl AsRef<Path>, config: &QueueConfig) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)
            .map_err(|e| Error::BackendUnavailable(format!("task store: {}", e)))?;
        let db_path = db_dir.join("taskmesh.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            retention_ms: config.retention_secs as i64 * 1000,
            visibility_ms: config.visibility_timeout_secs as i64 * 1000,
            aging_ms: config.aging_interval_ms.max(1),
            liveness_ms: config.worker_liveness_secs as i64 * 1000,
        };

        let purged = store.purge_expired_at(now_millis())?;
        info!(
            "SqliteStore initialized: path={}, purged {} expired rows",
            store.db_path.display(),
            purged
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(unavailable)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(unavailable)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(unavailable)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}", METADATA_SCHEMA_SQL, BROKER_SCHEMA_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::BackendUnavailable(format!("schema init failed: {}", e)))?;
        Ok(())
    }

    /// Retention window applied to new metadata rows, in milliseconds.
    pub fn retention_ms(&self) -> i64 {
        self.retention_ms
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Task metadata
    // ---------------------------------------------------------------

    pub fn put_metadata(&self, meta: &TaskMetadata) -> Result<()> {
        let result_json = meta.result.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO task_metadata (task_id, category, status, priority, \
             delay_secs, created_at, updated_at, expires_at, result_json, error) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .map_err(unavailable)?
        .execute(params![
            meta.task_id,
            meta.category.as_str(),
            meta.status.as_str(),
            meta.priority.as_str(),
            meta.delay_secs as i64,
            meta.created_at,
            meta.updated_at,
            meta.expires_at,
            result_json,
            meta.error,
        ])
        .map_err(unavailable)?;
        Ok(())
    }

    /// Fetch a metadata row that has not expired at `now`.
    pub fn get_metadata_at(&self, task_id: &str, now: i64) -> Result<Option<TaskMetadata>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM task_metadata WHERE task_id = ?1 AND expires_at > ?2")
            .map_err(unavailable)?
            .query_row(params![task_id, now], Self::row_to_metadata)
            .optional()
            .map_err(unavailable)?;
        Ok(row)
    }

    pub fn update_status_at(
        &self,
        task_id: &str,
        status: TaskStatus,
        outcome: Option<&TaskOutcome>,
        now: i64,
    ) -> Result<bool> {
        if !matches!(
            status,
            TaskStatus::Running | TaskStatus::Succeeded | TaskStatus::Failed
        ) {
            return Err(Error::Internal(format!(
                "cannot move task {} back to {}",
                task_id, status
            )));
        }
        let result_json = outcome
            .and_then(|o| o.result())
            .map(serde_json::to_string)
            .transpose()?;
        let error = outcome.and_then(|o| o.error()).map(str::to_string);

        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE task_metadata SET status = ?1, \
                 result_json = COALESCE(?2, result_json), error = COALESCE(?3, error), \
                 updated_at = ?4 \
                 WHERE task_id = ?5 AND expires_at > ?4 \
                 AND status NOT IN ('succeeded', 'failed')",
                params![status.as_str(), result_json, error, now, task_id],
            )
            .map_err(unavailable)?;
        Ok(count > 0)
    }

    /// Drop expired metadata and finished queue entries older than the
    /// retention window.
    pub fn purge_expired_at(&self, now: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let metadata = conn
            .execute(
                "DELETE FROM task_metadata WHERE expires_at <= ?1",
                params![now],
            )
            .map_err(unavailable)?;
        let entries = conn
            .execute(
                "DELETE FROM queue_entries WHERE state IN ('succeeded', 'failed') \
                 AND finished_at <= ?1",
                params![now - self.retention_ms],
            )
            .map_err(unavailable)?;
        if metadata + entries > 0 {
            debug!(
                "Purged {} metadata rows and {} finished queue entries",
                metadata, entries
            );
        }
        Ok(metadata + entries)
    }

    // ---------------------------------------------------------------
    // Broker
    // ---------------------------------------------------------------

    pub fn enqueue_at(&self, req: &EnqueueRequest, now: i64) -> Result<()> {
        let payload_json = serde_json::to_string(&req.payload)?;
        let eligible_at = now + req.delay_secs as i64 * 1000;

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO queue_entries (task_id, queue, category, priority, weight, \
             payload_json, state, enqueued_at, eligible_at, attempts) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'waiting', ?7, ?8, 0)",
        )
        .map_err(unavailable)?
        .execute(params![
            req.task_id,
            req.category.queue_name(),
            req.category.as_str(),
            req.priority.as_str(),
            req.priority.weight(),
            payload_json,
            now,
            eligible_at,
        ])
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                Error::Internal(format!("duplicate task id: {}", req.task_id))
            } else {
                unavailable(e)
            }
        })?;
        Ok(())
    }

    /// Lease the best eligible entry at `now`.
    ///
    /// Score is `weight + waited_ms / aging_ms`, so priority biases the pick
    /// without starving old low-priority work.
    pub fn reserve_at(
        &self,
        worker: &str,
        queues: &[&str],
        now: i64,
    ) -> Result<Option<QueueEntry>> {
        let queues: Vec<&str> = if queues.is_empty() {
            KNOWN_QUEUES.to_vec()
        } else {
            queues.to_vec()
        };

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(unavailable)?;

        let reclaimed = tx
            .execute(
                "UPDATE queue_entries SET state = 'waiting', lease_owner = NULL, \
                 lease_expires_at = NULL \
                 WHERE state IN ('reserved', 'active') AND lease_expires_at <= ?1",
                params![now],
            )
            .map_err(unavailable)?;
        if reclaimed > 0 {
            warn!("Redelivering {} task(s) with expired leases", reclaimed);
        }

        let placeholders: Vec<String> = (0..queues.len()).map(|i| format!("?{}", i + 3)).collect();
        let sql = format!(
            "SELECT *, weight + CAST(?1 - eligible_at AS REAL) / ?2 AS score \
             FROM queue_entries \
             WHERE state = 'waiting' AND eligible_at <= ?1 AND queue IN ({}) \
             ORDER BY score DESC, eligible_at ASC, enqueued_at ASC \
             LIMIT 1",
            placeholders.join(", ")
        );
        let mut values = vec![SqlValue::Integer(now), SqlValue::Real(self.aging_ms as f64)];
        values.extend(queues.iter().map(|q| SqlValue::Text(q.to_string())));

        let candidate = {
            let mut stmt = tx.prepare(&sql).map_err(unavailable)?;
            stmt.query_row(params_from_iter(values.iter()), Self::row_to_entry)
                .optional()
                .map_err(unavailable)?
        };

        let Some(mut entry) = candidate else {
            tx.commit().map_err(unavailable)?;
            return Ok(None);
        };

        let lease_expires_at = now + self.visibility_ms;
        tx.execute(
            "UPDATE queue_entries SET state = 'reserved', lease_owner = ?1, \
             lease_expires_at = ?2, attempts = attempts + 1 WHERE task_id = ?3",
            params![worker, lease_expires_at, entry.task_id],
        )
        .map_err(unavailable)?;
        tx.commit().map_err(unavailable)?;

        entry.state = QueueState::Reserved;
        entry.lease_owner = Some(worker.to_string());
        entry.lease_expires_at = Some(lease_expires_at);
        entry.attempts += 1;

        debug!(
            "Reserved {} from queue {} for {} (attempt {})",
            entry.task_id, entry.queue, worker, entry.attempts
        );
        Ok(Some(entry))
    }

    pub fn start_at(&self, task_id: &str, worker: &str, now: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE queue_entries SET state = 'active', lease_expires_at = ?1 \
                 WHERE task_id = ?2 AND lease_owner = ?3 AND state = 'reserved'",
                params![now + self.visibility_ms, task_id, worker],
            )
            .map_err(unavailable)?;
        Ok(count > 0)
    }

    pub fn ack_at(&self, task_id: &str, outcome: &TaskOutcome, now: i64) -> Result<bool> {
        let state = match outcome {
            TaskOutcome::Succeeded { .. } => QueueState::Succeeded,
            TaskOutcome::Failed { .. } => QueueState::Failed,
        };
        let result_json = outcome.result().map(serde_json::to_string).transpose()?;

        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE queue_entries SET state = ?1, result_json = ?2, error = ?3, \
                 finished_at = ?4, lease_owner = NULL, lease_expires_at = NULL \
                 WHERE task_id = ?5 AND state NOT IN ('succeeded', 'failed')",
                params![state.as_str(), result_json, outcome.error(), now, task_id],
            )
            .map_err(unavailable)?;
        Ok(count > 0)
    }

    pub fn heartbeat_at(&self, worker: &str, queues: &[&str], now: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workers (name, queues, last_heartbeat) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET queues = excluded.queues, \
             last_heartbeat = excluded.last_heartbeat",
            params![worker, queues.join(","), now],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    pub fn snapshot_at(&self, now: i64) -> Result<BrokerSnapshot> {
        let conn = self.conn.lock();
        let mut snapshot = BrokerSnapshot::default();

        let mut stmt = conn
            .prepare_cached(
                "SELECT state, COUNT(*) FROM queue_entries \
                 WHERE state IN ('waiting', 'reserved', 'active') GROUP BY state",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(unavailable)?;
        for row in rows {
            let (state, count) = row.map_err(unavailable)?;
            match QueueState::parse(&state) {
                Some(QueueState::Waiting) => snapshot.scheduled = count as usize,
                Some(QueueState::Reserved) => snapshot.reserved = count as usize,
                Some(QueueState::Active) => snapshot.active = count as usize,
                _ => {}
            }
        }

        let mut stmt = conn
            .prepare_cached(
                "SELECT name FROM workers WHERE last_heartbeat >= ?1 ORDER BY name",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![now - self.liveness_ms], |row| row.get::<_, String>(0))
            .map_err(unavailable)?;
        for row in rows {
            snapshot.workers.push(row.map_err(unavailable)?);
        }

        Ok(snapshot)
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_metadata(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskMetadata> {
        Ok(TaskMetadata {
            task_id: row.get("task_id")?,
            category: text_enum(row, "category", |s| s.parse().ok())?,
            status: text_enum(row, "status", TaskStatus::parse)?,
            priority: text_enum(row, "priority", |s| s.parse().ok())?,
            delay_secs: row.get::<_, i64>("delay_secs")?.max(0) as u64,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            expires_at: row.get("expires_at")?,
            result: row
                .get::<_, Option<String>>("result_json")?
                .and_then(|s| serde_json::from_str(&s).ok()),
            error: row.get("error")?,
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
        Ok(QueueEntry {
            task_id: row.get("task_id")?,
            queue: row.get("queue")?,
            category: text_enum(row, "category", |s| s.parse().ok())?,
            priority: text_enum(row, "priority", |s| s.parse().ok())?,
            payload: row
                .get::<_, String>("payload_json")
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Null),
            state: text_enum(row, "state", QueueState::parse)?,
            enqueued_at: row.get("enqueued_at")?,
            eligible_at: row.get("eligible_at")?,
            lease_owner: row.get("lease_owner")?,
            lease_expires_at: row.get("lease_expires_at")?,
            attempts: row.get("attempts")?,
            result: row
                .get::<_, Option<String>>("result_json")?
                .and_then(|s| serde_json::from_str(&s).ok()),
            error: row.get("error")?,
        })
    }
}

/// Read a text column and parse it into one of the domain enums.
fn text_enum<T>(
    row: &rusqlite::Row<'_>,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    parse(&raw).ok_or_else(|| rusqlite::Error::InvalidColumnType(0, column.to_string(), Type::Text))
}

impl MetadataStore for SqliteStore {
    fn put(&self, meta: &TaskMetadata) -> Result<()> {
        self.put_metadata(meta)
    }

    fn get(&self, task_id: &str) -> Result<Option<TaskMetadata>> {
        self.get_metadata_at(task_id, now_millis())
    }

    fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        outcome: Option<&TaskOutcome>,
    ) -> Result<bool> {
        self.update_status_at(task_id, status, outcome, now_millis())
    }

    fn purge_expired(&self) -> Result<usize> {
        self.purge_expired_at(now_millis())
    }
}

impl Broker for SqliteStore {
    fn enqueue(&self, req: &EnqueueRequest) -> Result<()> {
        self.enqueue_at(req, now_millis())
    }

    fn reserve(&self, worker: &str, queues: &[&str]) -> Result<Option<QueueEntry>> {
        self.reserve_at(worker, queues, now_millis())
    }

    fn start(&self, task_id: &str, worker: &str) -> Result<bool> {
        self.start_at(task_id, worker, now_millis())
    }

    fn ack(&self, task_id: &str, outcome: &TaskOutcome) -> Result<bool> {
        self.ack_at(task_id, outcome, now_millis())
    }

    fn release(&self, task_id: &str, worker: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .execute(
                "UPDATE queue_entries SET state = 'waiting', lease_owner = NULL, \
                 lease_expires_at = NULL \
                 WHERE task_id = ?1 AND lease_owner = ?2 AND state IN ('reserved', 'active')",
                params![task_id, worker],
            )
            .map_err(unavailable)?;
        Ok(count > 0)
    }

    fn entry(&self, task_id: &str) -> Result<Option<QueueEntry>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM queue_entries WHERE task_id = ?1")
            .map_err(unavailable)?
            .query_row(params![task_id], Self::row_to_entry)
            .optional()
            .map_err(unavailable)?;
        Ok(row)
    }

    fn heartbeat(&self, worker: &str, queues: &[&str]) -> Result<()> {
        self.heartbeat_at(worker, queues, now_millis())
    }

    fn snapshot(&self) -> Result<BrokerSnapshot> {
        self.snapshot_at(now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::{Priority, TaskCategory};
    use tempfile::TempDir;

    const T0: i64 = 1_700_000_000_000;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path(), &QueueConfig::default()).unwrap();
        (store, dir)
    }

    fn request(id: &str, priority: Priority, delay_secs: u64) -> EnqueueRequest {
        EnqueueRequest {
            task_id: id.into(),
            category: TaskCategory::Search,
            priority,
            payload: serde_json::json!({"query": id}),
            delay_secs,
        }
    }

    fn metadata(id: &str, created_at: i64) -> TaskMetadata {
        TaskMetadata {
            task_id: id.into(),
            category: TaskCategory::Voice,
            status: TaskStatus::Pending,
            priority: Priority::Normal,
            delay_secs: 0,
            created_at,
            updated_at: None,
            expires_at: created_at + 3_600_000,
            result: None,
            error: None,
        }
    }

    #[test]
    fn test_metadata_put_and_get() {
        let (store, _dir) = test_store();
        store.put_metadata(&metadata("voice_1", T0)).unwrap();

        let meta = store.get_metadata_at("voice_1", T0 + 10).unwrap().unwrap();
        assert_eq!(meta.category, TaskCategory::Voice);
        assert_eq!(meta.status, TaskStatus::Pending);
        assert!(store.get_metadata_at("voice_2", T0).unwrap().is_none());
    }

    #[test]
    fn test_metadata_expiry() {
        let (store, _dir) = test_store();
        store.put_metadata(&metadata("voice_1", T0)).unwrap();

        assert!(store.get_metadata_at("voice_1", T0 + 3_599_999).unwrap().is_some());
        assert!(store.get_metadata_at("voice_1", T0 + 3_600_000).unwrap().is_none());

        let purged = store.purge_expired_at(T0 + 3_600_000).unwrap();
        assert_eq!(purged, 1);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let (store, _dir) = test_store();
        store.put_metadata(&metadata("voice_1", T0)).unwrap();

        assert!(store
            .update_status_at("voice_1", TaskStatus::Running, None, T0 + 1)
            .unwrap());
        let failed = TaskOutcome::Failed {
            error: "voice backend timeout".into(),
        };
        assert!(store
            .update_status_at("voice_1", TaskStatus::Failed, Some(&failed), T0 + 2)
            .unwrap());

        let late = TaskOutcome::Succeeded {
            result: serde_json::json!({"text": "late"}),
        };
        assert!(!store
            .update_status_at("voice_1", TaskStatus::Succeeded, Some(&late), T0 + 3)
            .unwrap());

        let meta = store.get_metadata_at("voice_1", T0 + 4).unwrap().unwrap();
        assert_eq!(meta.status, TaskStatus::Failed);
        assert_eq!(meta.error.as_deref(), Some("voice backend timeout"));
        assert!(meta.result.is_none());
    }

    #[test]
    fn test_status_cannot_move_back_to_pending() {
        let (store, _dir) = test_store();
        store.put_metadata(&metadata("voice_1", T0)).unwrap();
        let err = store
            .update_status_at("voice_1", TaskStatus::Pending, None, T0 + 1)
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_enqueue_and_reserve() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("search_1", Priority::Normal, 0), T0).unwrap();

        let entry = store.reserve_at("w1", &["search"], T0).unwrap().unwrap();
        assert_eq!(entry.task_id, "search_1");
        assert_eq!(entry.queue, "search");
        assert_eq!(entry.state, QueueState::Reserved);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.payload["query"], "search_1");

        // Already leased.
        assert!(store.reserve_at("w2", &["search"], T0 + 1).unwrap().is_none());
    }

    #[test]
    fn test_reserve_respects_queue_routing() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("search_1", Priority::High, 0), T0).unwrap();

        assert!(store.reserve_at("w1", &["voice", "image"], T0).unwrap().is_none());
        assert!(store.reserve_at("w1", &[], T0).unwrap().is_some());
    }

    #[test]
    fn test_delay_withholds_eligibility() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("search_1", Priority::High, 5), T0).unwrap();

        assert!(store.reserve_at("w1", &[], T0).unwrap().is_none());
        assert!(store.reserve_at("w1", &[], T0 + 4_999).unwrap().is_none());
        assert!(store.reserve_at("w1", &[], T0 + 5_000).unwrap().is_some());
    }

    #[test]
    fn test_priority_biases_pick() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("low", Priority::Low, 0), T0).unwrap();
        store.enqueue_at(&request("high", Priority::High, 0), T0).unwrap();
        store.enqueue_at(&request("normal", Priority::Normal, 0), T0).unwrap();

        let order: Vec<String> = (0..3)
            .map(|_| store.reserve_at("w1", &[], T0).unwrap().unwrap().task_id)
            .collect();
        assert_eq!(order, vec!["high", "normal", "low"]);
    }

    #[test]
    fn test_aged_low_priority_outranks_fresh_high() {
        let (store, _dir) = test_store();
        // 100s of waiting at 10s per weight point adds 10 to the low entry's score.
        store.enqueue_at(&request("old_low", Priority::Low, 0), T0).unwrap();
        store
            .enqueue_at(&request("fresh_high", Priority::High, 0), T0 + 100_000)
            .unwrap();

        let first = store.reserve_at("w1", &[], T0 + 100_000).unwrap().unwrap();
        assert_eq!(first.task_id, "old_low");
    }

    #[test]
    fn test_expired_lease_is_redelivered() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("search_1", Priority::Normal, 0), T0).unwrap();

        let first = store.reserve_at("w1", &[], T0).unwrap().unwrap();
        assert!(store.start_at(&first.task_id, "w1", T0 + 10).unwrap());

        // Worker w1 vanished; lease (300s) runs out.
        let again = store
            .reserve_at("w2", &[], T0 + 10 + 300_000)
            .unwrap()
            .unwrap();
        assert_eq!(again.task_id, "search_1");
        assert_eq!(again.attempts, 2);
        assert!(again.is_redelivery());
        assert_eq!(again.lease_owner.as_deref(), Some("w2"));

        // The stale worker can no longer start it.
        assert!(!store.start_at("search_1", "w1", T0 + 300_020).unwrap());
    }

    #[test]
    fn test_ack_is_terminal() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("search_1", Priority::Normal, 0), T0).unwrap();
        store.reserve_at("w1", &[], T0).unwrap().unwrap();

        let ok = TaskOutcome::Succeeded {
            result: serde_json::json!({"hits": 3}),
        };
        assert!(store.ack_at("search_1", &ok, T0 + 5).unwrap());
        let err = TaskOutcome::Failed {
            error: "duplicate delivery".into(),
        };
        assert!(!store.ack_at("search_1", &err, T0 + 6).unwrap());

        let entry = store.entry("search_1").unwrap().unwrap();
        assert_eq!(entry.state, QueueState::Succeeded);
        assert_eq!(entry.result, Some(serde_json::json!({"hits": 3})));
        assert!(entry.lease_owner.is_none());
    }

    #[test]
    fn test_release_returns_entry() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("search_1", Priority::Normal, 0), T0).unwrap();
        store.reserve_at("w1", &[], T0).unwrap().unwrap();

        assert!(!store.release("search_1", "w2").unwrap());
        assert!(store.release("search_1", "w1").unwrap());
        assert!(store.reserve_at("w2", &[], T0 + 1).unwrap().is_some());
    }

    #[test]
    fn test_snapshot_counts() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("a", Priority::Normal, 0), T0).unwrap();
        store.enqueue_at(&request("b", Priority::Normal, 0), T0).unwrap();
        store.enqueue_at(&request("c", Priority::Normal, 30), T0).unwrap();

        let a = store.reserve_at("w1", &[], T0).unwrap().unwrap();
        store.start_at(&a.task_id, "w1", T0).unwrap();
        store.reserve_at("w2", &[], T0).unwrap().unwrap();
        store.heartbeat_at("w1", &["search"], T0).unwrap();
        store.heartbeat_at("w2", &["search"], T0 - 120_000).unwrap();

        let snap = store.snapshot_at(T0).unwrap();
        assert_eq!(snap.active, 1);
        assert_eq!(snap.reserved, 1);
        assert_eq!(snap.scheduled, 1);
        assert_eq!(snap.workers, vec!["w1"]);
    }

    #[test]
    fn test_finished_entries_purged_after_retention() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("a", Priority::Normal, 0), T0).unwrap();
        store.reserve_at("w1", &[], T0).unwrap();
        let ok = TaskOutcome::Succeeded {
            result: serde_json::Value::Null,
        };
        store.ack_at("a", &ok, T0).unwrap();

        assert_eq!(store.purge_expired_at(T0 + 1_000).unwrap(), 0);
        assert_eq!(store.purge_expired_at(T0 + 3_600_000).unwrap(), 1);
        assert!(store.entry("a").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_task_id_rejected() {
        let (store, _dir) = test_store();
        store.enqueue_at(&request("a", Priority::Normal, 0), T0).unwrap();
        let err = store.enqueue_at(&request("a", Priority::Normal, 0), T0).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
