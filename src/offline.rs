//! Persistent offline queue for heartbeats that could not be sent.
//!
//! A single-file SQLite database holds pending heartbeats keyed by their
//! deterministic id; the JSON-serialized heartbeat is the value. All
//! operations run inside one read-write transaction. Concurrent processes
//! serialize on SQLite's file lock with a 30 second acquisition window.
//!
//! Iteration order is byte order of ids, which interleaves heartbeats from
//! different invocations; strict FIFO across invocations is not promised.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::Error;
use crate::heartbeat::{Heartbeat, HeartbeatResult};
use crate::pipeline::Sender;

/// Default offline queue filename inside the resource directory.
pub const DB_FILENAME: &str = "offline_heartbeats.db";
/// Maximum number of heartbeats sent to the API at once.
pub const SEND_LIMIT: usize = 25;
/// Default maximum number of queued heartbeats synced per invocation.
pub const SYNC_MAX_DEFAULT: usize = 1000;
/// Default maximum number of heartbeats to print.
pub const PRINT_MAX_DEFAULT: usize = 10;
/// Default seconds between deliveries; excess heartbeats are queued.
pub const RATE_LIMIT_DEFAULT_SECS: u64 = 120;

/// Attempts to requeue heartbeats that failed to send before giving up.
const MAX_REQUEUE_ATTEMPTS: u32 = 3;
/// How long to wait on the database file lock.
const OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Transactional store of pending heartbeats.
pub struct Queue {
    conn: Connection,
}

impl Queue {
    /// Open (creating if needed) the queue database at `path`.
    ///
    /// Lock contention past the acquisition window or a corrupt file
    /// surfaces as [`Error::OpenDb`].
    pub fn open(path: &Path) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(|err| Error::OpenDb(err.to_string()))?;

        conn.busy_timeout(OPEN_TIMEOUT)
            .map_err(|err| Error::OpenDb(err.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS heartbeats (
                id        TEXT PRIMARY KEY,
                heartbeat TEXT NOT NULL
            )",
            [],
        )
        .map_err(|err| Error::OpenDb(err.to_string()))?;

        Ok(Self { conn })
    }

    /// Total number of queued heartbeats.
    pub fn count(&mut self) -> Result<usize, Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM heartbeats", [], |row| row.get(0))
            .map_err(|err| Error::Queue(err.to_string()))?;

        Ok(count as usize)
    }

    /// Store heartbeats keyed by id. Re-pushing an id overwrites its value,
    /// so pushing the same batch twice does not grow the queue.
    pub fn push_many(&mut self, heartbeats: &[Heartbeat]) -> Result<(), Error> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| Error::Queue(err.to_string()))?;

        for h in heartbeats {
            let serialized = serde_json::to_string(h)
                .map_err(|err| Error::Queue(format!("failed to json marshal heartbeat: {err}")))?;

            tx.execute(
                "INSERT OR REPLACE INTO heartbeats (id, heartbeat) VALUES (?1, ?2)",
                params![h.id(), serialized],
            )
            .map_err(|err| Error::Queue(format!("failed to store heartbeat {:?}: {err}", h.id())))?;
        }

        tx.commit().map_err(|err| Error::Queue(err.to_string()))
    }

    /// Read up to `limit` heartbeats in key order and delete them in the
    /// same transaction.
    pub fn pop_many(&mut self, limit: usize) -> Result<Vec<Heartbeat>, Error> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| Error::Queue(err.to_string()))?;

        let rows = load_rows(&tx, limit)?;

        for (id, _) in &rows {
            tx.execute("DELETE FROM heartbeats WHERE id = ?1", params![id])
                .map_err(|err| Error::Queue(format!("failed to delete key {id:?}: {err}")))?;
        }

        tx.commit().map_err(|err| Error::Queue(err.to_string()))?;

        Ok(rows.into_iter().map(|(_, h)| h).collect())
    }

    /// Read up to `limit` heartbeats without deleting them.
    pub fn read_many(&mut self, limit: usize) -> Result<Vec<Heartbeat>, Error> {
        let tx = self
            .conn
            .transaction()
            .map_err(|err| Error::Queue(err.to_string()))?;

        let rows = load_rows(&tx, limit)?;

        // read-only; roll the transaction back
        tx.rollback().map_err(|err| Error::Queue(err.to_string()))?;

        Ok(rows.into_iter().map(|(_, h)| h).collect())
    }
}

fn load_rows(
    tx: &rusqlite::Transaction<'_>,
    limit: usize,
) -> Result<Vec<(String, Heartbeat)>, Error> {
    let mut stmt = tx
        .prepare("SELECT id, heartbeat FROM heartbeats ORDER BY id LIMIT ?1")
        .map_err(|err| Error::Queue(err.to_string()))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|err| Error::Queue(err.to_string()))?;

    let mut result = Vec::new();

    for row in rows {
        let (id, value) = row.map_err(|err| Error::Queue(err.to_string()))?;
        let heartbeat: Heartbeat = serde_json::from_str(&value).map_err(|err| {
            Error::Queue(format!("failed to json unmarshal heartbeat data: {err}"))
        })?;
        result.push((id, heartbeat));
    }

    Ok(result)
}

/// Push heartbeats with exponential retry (2, 4, 8 seconds). After the
/// attempts are exhausted the heartbeats are logged serialized and dropped.
pub fn push_with_retry(path: &Path, heartbeats: &[Heartbeat]) -> Result<(), Error> {
    let mut attempts = 0;

    loop {
        let err = match Queue::open(path).and_then(|mut q| q.push_many(heartbeats)) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        attempts += 1;

        if attempts >= MAX_REQUEUE_ATTEMPTS {
            let serialized =
                serde_json::to_string(heartbeats).unwrap_or_else(|e| format!("<unserializable: {e}>"));

            return Err(Error::Queue(format!(
                "abort requeuing after {attempts} unsuccessful attempts: {err}. heartbeats: {serialized}"
            )));
        }

        let sleep_secs = 2u64.pow(attempts);
        debug!("requeue attempt {attempts} failed: {err}; retrying in {sleep_secs}s");
        std::thread::sleep(Duration::from_secs(sleep_secs));
    }
}

/// Sender decorator that guarantees no heartbeat is lost on delivery
/// failure. Wraps the backoff-gated API sender.
///
/// On any error from the inner sender the whole batch is pushed to the
/// queue and the error propagates. On success, per-result statuses decide:
/// 2xx results are done, 400s are logged and dropped, anything else is
/// re-enqueued, and heartbeats missing a result are re-enqueued too.
pub struct QueueSender<S> {
    inner: S,
    path: PathBuf,
}

impl<S> QueueSender<S> {
    pub fn new(inner: S, path: PathBuf) -> Self {
        Self { inner, path }
    }
}

impl<S: Sender> Sender for QueueSender<S> {
    fn send_heartbeats(&mut self, heartbeats: Vec<Heartbeat>) -> Result<Vec<HeartbeatResult>, Error> {
        debug!("execute offline queue with file {}", self.path.display());

        if heartbeats.is_empty() {
            debug!("abort execution, as there are no heartbeats ready for sending");
            return Ok(Vec::new());
        }

        let results = match self.inner.send_heartbeats(heartbeats.clone()) {
            Ok(results) => results,
            Err(err) => {
                debug!(
                    "pushing {} heartbeat(s) to queue after error: {err}",
                    heartbeats.len()
                );

                push_with_retry(&self.path, &heartbeats).map_err(|requeue_err| {
                    Error::Queue(format!("failed to push heartbeats to queue: {requeue_err}"))
                })?;

                return Err(err);
            }
        };

        handle_results(&self.path, &results, &heartbeats);

        Ok(results)
    }
}

/// Requeue heartbeats whose result status was not a success.
pub fn handle_results(path: &Path, results: &[HeartbeatResult], heartbeats: &[Heartbeat]) {
    let mut with_invalid_status = Vec::new();

    for (n, result) in results.iter().enumerate() {
        if n >= heartbeats.len() {
            warn!("results from api not matching heartbeats sent");
            break;
        }

        if result.status == 400 {
            let serialized = serde_json::to_string(&result.heartbeat).unwrap_or_default();
            debug!("heartbeat result status bad request: {serialized}");
            continue;
        }

        if !(200..300).contains(&result.status) {
            with_invalid_status.push(heartbeats[n].clone());
        }
    }

    if !with_invalid_status.is_empty() {
        debug!(
            "pushing {} heartbeat(s) with invalid result to queue",
            with_invalid_status.len()
        );

        if let Err(err) = push_with_retry(path, &with_invalid_status) {
            warn!("failed to push heartbeats with invalid status to queue: {err}");
        }
    }

    // heartbeats for which the api returned no result at all
    if results.len() < heartbeats.len() {
        let leftovers = &heartbeats[results.len()..];
        warn!("missing {} results from api.", leftovers.len());

        if let Err(err) = push_with_retry(path, leftovers) {
            warn!("failed to push leftover heartbeats to queue: {err}");
        }
    }
}

/// Drain the queue to the API in pages of [`SEND_LIMIT`].
///
/// `sync_max` caps the total synced heartbeats (0 means unlimited). A page
/// that fails to send is re-enqueued and the error propagates.
pub fn sync(path: &Path, sync_max: usize, sender: &mut dyn Sender) -> Result<(), Error> {
    let sync_max = if sync_max == 0 { usize::MAX } else { sync_max };

    let mut already_sent = 0;
    let mut run = 0;

    loop {
        run += 1;

        if already_sent >= sync_max {
            break;
        }

        let num = SEND_LIMIT.min(sync_max - already_sent);

        let heartbeats = Queue::open(path)?.pop_many(num)?;
        if heartbeats.is_empty() {
            debug!("no queued heartbeats ready for sending");
            break;
        }

        already_sent += heartbeats.len();
        debug!("send {} heartbeats on sync run {run}", heartbeats.len());

        let results = match sender.send_heartbeats(heartbeats.clone()) {
            Ok(results) => results,
            Err(err) => {
                if let Err(requeue_err) = push_with_retry(path, &heartbeats) {
                    warn!("failed to push heartbeats to queue after api error: {requeue_err}");
                }

                return Err(err);
            }
        };

        handle_results(path, &results, &heartbeats);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::{Category, EntityType};

    fn heartbeat(entity: &str, time: f64) -> Heartbeat {
        Heartbeat {
            category: Category::Coding,
            entity: entity.to_string(),
            entity_type: EntityType::File,
            time,
            user_agent: "wakatime/0.6.2".to_string(),
            ..Default::default()
        }
    }

    fn queue_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join(DB_FILENAME)
    }

    #[test]
    fn push_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = Queue::open(&queue_path(&dir)).unwrap();

        q.push_many(&[heartbeat("/tmp/a.go", 1.0), heartbeat("/tmp/b.go", 2.0)])
            .unwrap();
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn push_is_idempotent_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = Queue::open(&queue_path(&dir)).unwrap();

        let batch = [heartbeat("/tmp/a.go", 1.0), heartbeat("/tmp/b.go", 2.0)];
        q.push_many(&batch).unwrap();
        q.push_many(&batch).unwrap();
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn pop_many_removes_read_heartbeats() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = Queue::open(&queue_path(&dir)).unwrap();

        q.push_many(&[
            heartbeat("/tmp/a.go", 1.0),
            heartbeat("/tmp/b.go", 2.0),
            heartbeat("/tmp/c.go", 3.0),
        ])
        .unwrap();

        let popped = q.pop_many(2).unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(q.count().unwrap(), 1);

        let rest = q.pop_many(10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(q.count().unwrap(), 0);
    }

    #[test]
    fn read_many_does_not_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = Queue::open(&queue_path(&dir)).unwrap();

        q.push_many(&[heartbeat("/tmp/a.go", 1.0)]).unwrap();

        let read = q.read_many(10).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(q.count().unwrap(), 1);
    }

    #[test]
    fn roundtrip_preserves_heartbeat_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = Queue::open(&queue_path(&dir)).unwrap();

        let mut h = heartbeat("/tmp/a.go", 1585598059.1);
        h.project = Some("codetick".to_string());
        h.branch = Some("main".to_string());
        h.lines = Some(42);
        q.push_many(&[h.clone()]).unwrap();

        let popped = q.pop_many(1).unwrap();
        assert_eq!(popped[0].entity, h.entity);
        assert_eq!(popped[0].project, h.project);
        assert_eq!(popped[0].branch, h.branch);
        assert_eq!(popped[0].lines, h.lines);
    }

    struct FailingSender;

    impl Sender for FailingSender {
        fn send_heartbeats(
            &mut self,
            _: Vec<Heartbeat>,
        ) -> Result<Vec<HeartbeatResult>, Error> {
            Err(Error::Api("connection refused".to_string()))
        }
    }

    struct StatusSender(Vec<u16>);

    impl Sender for StatusSender {
        fn send_heartbeats(
            &mut self,
            hh: Vec<Heartbeat>,
        ) -> Result<Vec<HeartbeatResult>, Error> {
            Ok(hh
                .into_iter()
                .zip(self.0.iter())
                .map(|(heartbeat, &status)| HeartbeatResult {
                    errors: Vec::new(),
                    status,
                    heartbeat,
                })
                .collect())
        }
    }

    #[test]
    fn queue_sender_pushes_batch_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        let mut sender = QueueSender::new(FailingSender, path.clone());
        let batch = vec![heartbeat("/tmp/a.go", 1.0), heartbeat("/tmp/b.go", 2.0)];

        let err = sender.send_heartbeats(batch).unwrap_err();
        assert!(matches!(err, Error::Api(_)));

        let mut q = Queue::open(&path).unwrap();
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn queue_sender_requeues_failed_statuses_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        // 201 accepted, 400 dropped, 500 requeued
        let inner = StatusSender(vec![201, 400, 500]);
        let mut sender = QueueSender::new(inner, path.clone());

        let batch = vec![
            heartbeat("/tmp/a.go", 1.0),
            heartbeat("/tmp/b.go", 2.0),
            heartbeat("/tmp/c.go", 3.0),
        ];

        let results = sender.send_heartbeats(batch).unwrap();
        assert_eq!(results.len(), 3);

        let mut q = Queue::open(&path).unwrap();
        let queued = q.pop_many(10).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].entity, "/tmp/c.go");
    }

    #[test]
    fn queue_sender_requeues_missing_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        // only one result for two heartbeats
        let inner = StatusSender(vec![201]);
        let mut sender = QueueSender::new(inner, path.clone());

        let batch = vec![heartbeat("/tmp/a.go", 1.0), heartbeat("/tmp/b.go", 2.0)];
        sender.send_heartbeats(batch).unwrap();

        let mut q = Queue::open(&path).unwrap();
        let queued = q.pop_many(10).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].entity, "/tmp/b.go");
    }

    struct CountingSender {
        pages: Vec<usize>,
    }

    impl Sender for CountingSender {
        fn send_heartbeats(
            &mut self,
            hh: Vec<Heartbeat>,
        ) -> Result<Vec<HeartbeatResult>, Error> {
            self.pages.push(hh.len());
            Ok(hh
                .into_iter()
                .map(|heartbeat| HeartbeatResult {
                    errors: Vec::new(),
                    status: 201,
                    heartbeat,
                })
                .collect())
        }
    }

    #[test]
    fn sync_pages_through_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        let batch: Vec<Heartbeat> = (0..60)
            .map(|i| heartbeat(&format!("/tmp/file{i:03}.go"), i as f64))
            .collect();
        Queue::open(&path).unwrap().push_many(&batch).unwrap();

        let mut sender = CountingSender { pages: Vec::new() };
        sync(&path, 0, &mut sender).unwrap();

        assert_eq!(sender.pages, vec![25, 25, 10]);
        assert_eq!(Queue::open(&path).unwrap().count().unwrap(), 0);
    }

    #[test]
    fn sync_respects_sync_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        let batch: Vec<Heartbeat> = (0..60)
            .map(|i| heartbeat(&format!("/tmp/file{i:03}.go"), i as f64))
            .collect();
        Queue::open(&path).unwrap().push_many(&batch).unwrap();

        let mut sender = CountingSender { pages: Vec::new() };
        sync(&path, 30, &mut sender).unwrap();

        assert_eq!(sender.pages, vec![25, 5]);
        assert_eq!(Queue::open(&path).unwrap().count().unwrap(), 30);
    }

    #[test]
    fn sync_requeues_page_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        let batch: Vec<Heartbeat> = (0..5)
            .map(|i| heartbeat(&format!("/tmp/file{i}.go"), i as f64))
            .collect();
        Queue::open(&path).unwrap().push_many(&batch).unwrap();

        let mut sender = FailingSender;
        let err = sync(&path, 0, &mut sender).unwrap_err();
        assert!(matches!(err, Error::Api(_)));

        assert_eq!(Queue::open(&path).unwrap().count().unwrap(), 5);
    }
}
