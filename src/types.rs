//! Data types served to clients and persisted to the store.
//! Keep this module minimal and stable — it defines the wire format.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One process as observed at a single instant. A pid may recur, vanish,
/// or be reused by the OS between cycles; no identity is tracked across
/// snapshots.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct CpuStats {
    pub percent: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RamStats {
    pub percent: f32,
    pub used_gb: f64,
    pub total_gb: f64,
    pub available_gb: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct DiskStats {
    pub percent: f32,
    pub used_gb: f64,
    pub total_gb: f64,
    pub free_gb: f64,
}

/// One immutable, single-instant bundle of host + top-process metrics.
/// All fields share the one `timestamp` read taken when the snapshot was
/// built; the same value stamps every row the store writes for it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub cpu: CpuStats,
    pub ram: RamStats,
    pub disk: DiskStats,
    pub top_processes: Vec<ProcessSample>,
}

/// Persisted system row: the snapshot's ram/disk/cpu scalars flattened.
/// Immutable once written; only retention ever removes it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SystemMetricRecord {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
    pub disk_percent: f32,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
}

/// Persisted process row; up to the configured top-N of these share each
/// system row's timestamp.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProcessMetricRecord {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub process_name: String,
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}
