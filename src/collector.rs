//! Collection cycles: build a snapshot, append it to the store, then
//! publish it live — in that order, so a subscriber never sees a snapshot
//! the store could not have. Runs either on demand (fresh data for a
//! "current metrics" query) or on the background timer cadence.

use crate::hub::CycleUpdate;
use crate::sampler::build_snapshot;
use crate::state::AppState;
use crate::store::StoreError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct CycleResult {
    pub update: CycleUpdate,
    /// Present when the durable append failed. The snapshot was still
    /// published (flagged degraded); on-demand callers surface this as a
    /// server error, the timer loop just logs it and keeps going.
    pub append_error: Option<StoreError>,
}

/// Run one full cycle. Not cancellable midway by design: spawn it and await
/// the handle, so an abandoned request still commits its snapshot for the
/// store and the live subscribers.
pub async fn run_cycle(state: AppState) -> CycleResult {
    let snapshot = Arc::new(build_snapshot(&state).await);

    let append_error = match state.store.append(&snapshot).await {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "snapshot append failed; publishing degraded");
            Some(e)
        }
    };

    let update = CycleUpdate {
        snapshot,
        degraded: append_error.is_some(),
    };
    let delivered = state.hub.publish(update.clone());
    debug!(
        subscribers = delivered,
        degraded = update.degraded,
        "cycle published"
    );

    CycleResult {
        update,
        append_error,
    }
}

/// Timer-driven loop: one cycle per tick, independent of inbound requests.
/// A failed cycle never stops the next tick.
pub fn spawn_collector(state: AppState) -> JoinHandle<()> {
    let period = state.config.sample_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Append failures are logged inside the cycle; the next tick
            // always gets a fresh chance.
            let _ = run_cycle(state.clone()).await;
        }
    })
}
