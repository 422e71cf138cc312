use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::tracker::RateTracker;

/// Request counters shared between the detection middleware and the reporter.
pub struct Metrics {
    /// Requests that passed through detection.
    pub requests: AtomicU64,
    /// Requests that came back `ThresholdExceeded`.
    pub flagged: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            requests: AtomicU64::new(0),
            flagged: AtomicU64::new(0),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the current counters along with the number of tracked clients.
    pub fn report(&self, tracker: &RateTracker) {
        info!(
            requests = self.requests.load(Ordering::Relaxed),
            flagged = self.flagged.load(Ordering::Relaxed),
            tracked_clients = tracker.len(),
            "[METRICS]"
        );
    }
}

/// Report metrics every `interval_secs` until the runtime shuts down.
pub async fn run_reporter(metrics: Arc<Metrics>, tracker: Arc<RateTracker>, interval_secs: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        metrics.report(&tracker);
    }
}
