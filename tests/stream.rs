//! Live broadcast hub behavior: per-subscriber isolation, no replay, and
//! survival of the remaining subscribers when one disconnects mid-stream.

use std::sync::Arc;
use sysmon_agent::hub::{CycleUpdate, MetricsHub};
use sysmon_agent::types::{CpuStats, DiskStats, MetricsSnapshot, RamStats};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast::error::TryRecvError;

fn update_at(timestamp: OffsetDateTime) -> CycleUpdate {
    CycleUpdate {
        snapshot: Arc::new(MetricsSnapshot {
            timestamp,
            cpu: CpuStats { percent: 12.0 },
            ram: RamStats {
                percent: 40.0,
                used_gb: 6.4,
                total_gb: 16.0,
                available_gb: 9.6,
            },
            disk: DiskStats {
                percent: 50.0,
                used_gb: 250.0,
                total_gb: 500.0,
                free_gb: 250.0,
            },
            top_processes: Vec::new(),
        }),
        degraded: false,
    }
}

const T0: OffsetDateTime = datetime!(2025-06-01 12:00:00 UTC);

#[tokio::test]
async fn surviving_subscriber_sees_every_cycle_after_one_disconnects() {
    let hub = MetricsHub::new();
    let mut alpha = hub.subscribe();
    let beta = hub.subscribe();
    assert_eq!(hub.subscriber_count(), 2);

    assert_eq!(hub.publish(update_at(T0)), 2);
    assert_eq!(alpha.recv().await.unwrap().snapshot.timestamp, T0);

    // One subscriber disconnects mid-stream.
    drop(beta);

    for i in 1..=3i64 {
        let ts = T0 + Duration::seconds(i);
        assert_eq!(hub.publish(update_at(ts)), 1);
        // The survivor receives every subsequent cycle with no gap.
        assert_eq!(alpha.recv().await.unwrap().snapshot.timestamp, ts);
    }
}

#[tokio::test]
async fn late_subscriber_gets_no_replay() {
    let hub = MetricsHub::new();

    // Published before anyone connects: delivered to nobody, kept nowhere.
    assert_eq!(hub.publish(update_at(T0)), 0);

    let mut rx = hub.subscribe();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // Forward delivery starts with the next cycle.
    let ts = T0 + Duration::seconds(1);
    hub.publish(update_at(ts));
    assert_eq!(rx.recv().await.unwrap().snapshot.timestamp, ts);
}

#[tokio::test]
async fn lagging_subscriber_is_cut_off_without_blocking_publish() {
    let hub = MetricsHub::new();
    let mut slow = hub.subscribe();

    // Push well past the per-subscriber buffer without the slow consumer
    // draining anything; publishing never blocks.
    for i in 0..64i64 {
        hub.publish(update_at(T0 + Duration::seconds(i)));
    }

    // The slow consumer observes the overflow as a lag error, which the
    // WS layer treats as a disconnect.
    assert!(matches!(
        slow.try_recv(),
        Err(TryRecvError::Lagged(_))
    ));
}

#[tokio::test]
async fn degraded_flag_travels_with_the_update() {
    let hub = MetricsHub::new();
    let mut rx = hub.subscribe();

    let mut update = update_at(T0);
    update.degraded = true;
    hub.publish(update);

    assert!(rx.recv().await.unwrap().degraded);
}
