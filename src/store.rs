//! SQLite-backed time series for snapshots: append-only rows, range
//! queries, and age-based retention. Rows are never updated in place; the
//! only mutation besides insert is the bulk delete the sweeper runs.

use crate::types::{MetricsSnapshot, ProcessMetricRecord, SystemMetricRecord};
use rusqlite::Connection;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::info;

/// Store failures. Callers must not assume partial success: an append that
/// reports this wrote nothing visible.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS system_metrics (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     INTEGER NOT NULL,
    cpu_percent   REAL NOT NULL,
    ram_percent   REAL NOT NULL,
    ram_used_gb   REAL NOT NULL,
    ram_total_gb  REAL NOT NULL,
    disk_percent  REAL NOT NULL,
    disk_used_gb  REAL NOT NULL,
    disk_total_gb REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_system_metrics_ts ON system_metrics (timestamp);

CREATE TABLE IF NOT EXISTS process_metrics (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    INTEGER NOT NULL,
    process_name TEXT NOT NULL,
    pid          INTEGER NOT NULL,
    cpu_percent  REAL NOT NULL,
    memory_mb    REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_process_metrics_ts ON process_metrics (timestamp);
";

/// Timestamps are stored as unix milliseconds.
fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(col: usize, ms: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Integer, Box::new(e))
    })
}

/// Handle to the durable time series. Constructed once at startup and
/// shared; all access serializes on the inner connection.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    /// Open (or create) the store at the given SQLite path. `:memory:` is
    /// accepted for ephemeral use.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        if path != ":memory:" {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        }
        conn.execute_batch(SCHEMA)?;
        info!(path, "metrics store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist one snapshot as one system row plus its process rows, all
    /// carrying the snapshot's timestamp, in a single transaction: readers
    /// see the whole fan-out or none of it.
    pub async fn append(&self, snapshot: &MetricsSnapshot) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let ts = to_millis(snapshot.timestamp);
        tx.execute(
            "INSERT INTO system_metrics \
             (timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb, \
              disk_percent, disk_used_gb, disk_total_gb) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                ts,
                snapshot.cpu.percent as f64,
                snapshot.ram.percent as f64,
                snapshot.ram.used_gb,
                snapshot.ram.total_gb,
                snapshot.disk.percent as f64,
                snapshot.disk.used_gb,
                snapshot.disk.total_gb,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO process_metrics \
                 (timestamp, process_name, pid, cpu_percent, memory_mb) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for p in &snapshot.top_processes {
                stmt.execute(rusqlite::params![
                    ts,
                    p.name,
                    p.pid,
                    p.cpu_percent as f64,
                    p.memory_mb,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// System rows with `timestamp >= cutoff`, newest first, capped at
    /// `max_rows`. Equal timestamps fall back to id order, but timestamp is
    /// the authoritative key.
    pub async fn history_since(
        &self,
        cutoff: OffsetDateTime,
        max_rows: usize,
    ) -> Result<Vec<SystemMetricRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb, \
                    disk_percent, disk_used_gb, disk_total_gb \
             FROM system_metrics \
             WHERE timestamp >= ?1 \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![to_millis(cutoff), max_rows as i64],
            |row| {
                Ok(SystemMetricRecord {
                    id: row.get(0)?,
                    timestamp: from_millis(1, row.get(1)?)?,
                    cpu_percent: row.get::<_, f64>(2)? as f32,
                    ram_percent: row.get::<_, f64>(3)? as f32,
                    ram_used_gb: row.get(4)?,
                    ram_total_gb: row.get(5)?,
                    disk_percent: row.get::<_, f64>(6)? as f32,
                    disk_used_gb: row.get(7)?,
                    disk_total_gb: row.get(8)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Process rows with `timestamp >= cutoff`, newest first, capped at
    /// `max_rows`.
    pub async fn top_processes_since(
        &self,
        cutoff: OffsetDateTime,
        max_rows: usize,
    ) -> Result<Vec<ProcessMetricRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, process_name, pid, cpu_percent, memory_mb \
             FROM process_metrics \
             WHERE timestamp >= ?1 \
             ORDER BY timestamp DESC, id DESC \
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![to_millis(cutoff), max_rows as i64],
            |row| {
                Ok(ProcessMetricRecord {
                    id: row.get(0)?,
                    timestamp: from_millis(1, row.get(1)?)?,
                    process_name: row.get(2)?,
                    pid: row.get(3)?,
                    cpu_percent: row.get::<_, f64>(4)? as f32,
                    memory_mb: row.get(5)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Retention sweep: unconditionally delete rows strictly older than
    /// `cutoff` from both tables. Returns (system, process) delete counts,
    /// both reported even when zero.
    pub async fn delete_older_than(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<(u64, u64), StoreError> {
        let mut conn = self.conn.lock().await;
        let ts = to_millis(cutoff);
        let tx = conn.transaction()?;
        let systems = tx.execute(
            "DELETE FROM system_metrics WHERE timestamp < ?1",
            rusqlite::params![ts],
        )?;
        let processes = tx.execute(
            "DELETE FROM process_metrics WHERE timestamp < ?1",
            rusqlite::params![ts],
        )?;
        tx.commit()?;
        Ok((systems as u64, processes as u64))
    }

    /// Sabotage the schema so subsequent operations fail; exercises the
    /// degraded paths.
    #[cfg(test)]
    pub(crate) async fn break_for_tests(&self) {
        let conn = self.conn.lock().await;
        conn.execute_batch("DROP TABLE system_metrics; DROP TABLE process_metrics;")
            .expect("drop tables");
    }
}

impl std::fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStore").finish_non_exhaustive()
    }
}
