//! Metrics sampling using sysinfo: host CPU/RAM/disk readings, per-process
//! samples, top-N ranking, and snapshot assembly.

use crate::state::AppState;
use crate::types::{CpuStats, DiskStats, MetricsSnapshot, ProcessSample, RamStats};
use once_cell::sync::OnceCell;
use std::cmp::Ordering;
use std::time::Duration;
use sysinfo::{Disks, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use time::OffsetDateTime;
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// CPU usage is a rate, so it is measured over a fixed interval between two
/// refreshes. This is a measurement parameter, held constant across calls;
/// anything under ~100ms reads 0% on the first window. Overridable via
/// SYSMON_AGENT_CPU_SAMPLE_MS (floored at 100) for test setups.
fn cpu_sample_interval() -> Duration {
    static MS: OnceCell<u64> = OnceCell::new();
    let ms = *MS.get_or_init(|| {
        std::env::var("SYSMON_AGENT_CPU_SAMPLE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(|v: u64| v.max(100))
            .unwrap_or(200)
    });
    Duration::from_millis(ms)
}

/// Why a process was left out of a sample. Skips are absorbed here and
/// never surface as errors; the rest of the snapshot stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Zombie or otherwise defunct; its counters are meaningless.
    Defunct,
    /// The OS reported no name for it (usually mid-exit or access denied).
    Unnamed,
}

fn read_process(p: &sysinfo::Process) -> Result<ProcessSample, SkipReason> {
    match p.status() {
        ProcessStatus::Zombie | ProcessStatus::Dead => return Err(SkipReason::Defunct),
        _ => {}
    }
    let name = p.name().to_string_lossy().into_owned();
    if name.is_empty() {
        return Err(SkipReason::Unnamed);
    }
    Ok(ProcessSample {
        pid: p.pid().as_u32(),
        name,
        cpu_percent: p.cpu_usage(),
        memory_mb: p.memory() as f64 / MIB,
    })
}

/// Keep the readable samples, drop the rest. A single unreadable process
/// never aborts the sample.
pub fn usable(samples: Vec<Result<ProcessSample, SkipReason>>) -> Vec<ProcessSample> {
    let mut out = Vec::with_capacity(samples.len());
    let mut skipped = 0usize;
    for s in samples {
        match s {
            Ok(p) => out.push(p),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(skipped, "dropped unreadable processes from sample");
    }
    out
}

/// Top-N by `cpu_percent` descending. Ties break on ascending pid so the
/// result does not depend on OS enumeration order.
pub fn rank(mut processes: Vec<ProcessSample>, limit: usize) -> Vec<ProcessSample> {
    processes.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.pid.cmp(&b.pid))
    });
    processes.truncate(limit);
    processes
}

fn ram_stats(sys: &System) -> RamStats {
    let total = sys.total_memory();
    let available = sys.available_memory();
    let used = total.saturating_sub(available);
    let percent = if total > 0 {
        (used as f64 / total as f64 * 100.0) as f32
    } else {
        0.0
    };
    RamStats {
        percent,
        used_gb: used as f64 / GIB,
        total_gb: total as f64 / GIB,
        available_gb: available as f64 / GIB,
    }
}

/// Root filesystem usage; falls back to the largest mounted disk when no
/// "/" mount is listed (e.g. some containers).
fn disk_stats(disks: &Disks) -> DiskStats {
    let root = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()));
    let Some(d) = root else {
        return DiskStats {
            percent: 0.0,
            used_gb: 0.0,
            total_gb: 0.0,
            free_gb: 0.0,
        };
    };
    let total = d.total_space();
    let free = d.available_space();
    let used = total.saturating_sub(free);
    let percent = if total > 0 {
        (used as f64 / total as f64 * 100.0) as f32
    } else {
        0.0
    };
    DiskStats {
        percent,
        used_gb: used as f64 / GIB,
        total_gb: total as f64 / GIB,
        free_gb: free as f64 / GIB,
    }
}

/// Build one snapshot: two CPU/process refreshes spaced by the measurement
/// interval, then RAM/disk reads, all stamped with a single clock read.
/// The System lock is released during the measurement sleep so concurrent
/// cycles only serialize on the refresh calls themselves.
pub async fn build_snapshot(state: &AppState) -> MetricsSnapshot {
    let proc_kind = ProcessRefreshKind::nothing().with_cpu().with_memory();
    {
        let mut sys = state.sys.lock().await;
        sys.refresh_cpu_usage();
        // remove_dead_processes=true: the System handle lives for the whole
        // process, and a pid that exited between cycles must not keep its
        // stale cpu reading in every later sample.
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, proc_kind);
    }
    tokio::time::sleep(cpu_sample_interval()).await;

    let (cpu, ram, processes) = {
        let mut sys = state.sys.lock().await;
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, proc_kind);

        let cpu = CpuStats {
            percent: sys.global_cpu_usage(),
        };
        let ram = ram_stats(&sys);
        let samples: Vec<Result<ProcessSample, SkipReason>> =
            sys.processes().values().map(read_process).collect();
        (cpu, ram, usable(samples))
    };

    let disk = {
        let mut disks = state.disks.lock().await;
        disks.refresh(false); // don't drop missing disks
        disk_stats(&disks)
    };

    let top_processes = rank(processes, state.config.top_n);

    // One clock read per cycle; every row persisted for this snapshot
    // carries exactly this value. Truncated to millisecond resolution to
    // match what the store keeps.
    let now = OffsetDateTime::now_utc();
    let timestamp = now
        .replace_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now);

    MetricsSnapshot {
        timestamp,
        cpu,
        ram,
        disk,
        top_processes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ps(pid: u32, cpu: f32) -> ProcessSample {
        ProcessSample {
            pid,
            name: format!("proc-{pid}"),
            cpu_percent: cpu,
            memory_mb: 1.0,
        }
    }

    #[test]
    fn rank_truncates_to_limit() {
        let procs: Vec<_> = (0..25).map(|i| ps(i, i as f32)).collect();
        assert_eq!(rank(procs.clone(), 10).len(), 10);
        assert_eq!(rank(procs.clone(), 100).len(), 25);
        assert!(rank(procs, 0).is_empty());
    }

    #[test]
    fn rank_sorts_cpu_descending() {
        let procs = vec![ps(1, 3.0), ps(2, 99.5), ps(3, 0.0), ps(4, 42.0)];
        let ranked = rank(procs, 10);
        let cpus: Vec<f32> = ranked.iter().map(|p| p.cpu_percent).collect();
        assert_eq!(cpus, vec![99.5, 42.0, 3.0, 0.0]);
        for w in ranked.windows(2) {
            assert!(w[0].cpu_percent >= w[1].cpu_percent);
        }
    }

    #[test]
    fn rank_breaks_ties_by_ascending_pid() {
        let procs = vec![ps(40, 5.0), ps(7, 5.0), ps(19, 5.0), ps(2, 9.0)];
        let ranked = rank(procs, 3);
        let pids: Vec<u32> = ranked.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![2, 7, 19]);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn exited_process_is_evicted_from_long_lived_handle() {
        let kind = ProcessRefreshKind::nothing().with_cpu().with_memory();
        let mut sys = System::new();

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = sysinfo::Pid::from_u32(child.id());

        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        assert!(sys.processes().contains_key(&pid));

        child.kill().expect("kill child");
        child.wait().expect("reap child");

        // With dead-process removal the exited pid cannot linger in later
        // samples with a stale cpu reading.
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        assert!(!sys.processes().contains_key(&pid));
    }

    #[test]
    fn usable_drops_errors_keeps_order() {
        let samples = vec![
            Ok(ps(1, 1.0)),
            Err(SkipReason::Defunct),
            Ok(ps(2, 2.0)),
            Err(SkipReason::Unnamed),
        ];
        let kept = usable(samples);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].pid, 1);
        assert_eq!(kept[1].pid, 2);
    }
}
