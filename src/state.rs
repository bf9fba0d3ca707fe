//! Shared agent state: sysinfo handles, the store, and the live hub.

use crate::config::Config;
use crate::hub::MetricsHub;
use crate::store::MetricsStore;
use std::sync::Arc;
use sysinfo::{Disks, System};
use tokio::sync::Mutex;

pub type SharedSystem = Arc<Mutex<System>>;
pub type SharedDisks = Arc<Mutex<Disks>>;

#[derive(Clone)]
pub struct AppState {
    // Persistent sysinfo handles; CPU percentages need history between
    // refreshes, so these live for the whole process.
    pub sys: SharedSystem,
    pub disks: SharedDisks,

    pub store: Arc<MetricsStore>,
    pub hub: MetricsHub,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: MetricsStore, config: Config) -> Self {
        let sys = System::new_with_specifics(
            sysinfo::RefreshKind::nothing()
                .with_cpu(sysinfo::CpuRefreshKind::everything())
                .with_memory(sysinfo::MemoryRefreshKind::everything())
                .with_processes(sysinfo::ProcessRefreshKind::nothing().with_cpu().with_memory()),
        );
        let mut disks = Disks::new();
        disks.refresh(true);

        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            store: Arc::new(store),
            hub: MetricsHub::new(),
            config: Arc::new(config),
        }
    }
}
