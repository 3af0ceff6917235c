//! Background sweep of expired cache entries.
//!
//! Expired entries are already ignored on read; the sweep only bounds memory
//! for keys that are never asked for again.

use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::main_lib::AppState;

/// Starts the periodic purge of the result cache and the auth decision cache.
pub fn start_cache_sweeper(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        info!("Cache sweeper started ({}s interval)", every.as_secs());

        let mut sweep_interval = interval(every);
        // The first tick completes immediately
        sweep_interval.tick().await;

        loop {
            sweep_interval.tick().await;
            sweep(&state);
        }
    });
}

fn sweep(state: &AppState) {
    let results = state.orchestrator.cache().purge_expired();
    let decisions = state.auth.decision_cache().purge_expired();
    if results > 0 || decisions > 0 {
        debug!(
            "Purged {} cached results and {} auth decisions",
            results, decisions
        );
    }
}
