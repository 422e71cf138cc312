use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ClientKey;
use crate::metrics::Metrics;
use crate::tracker::{RateTracker, Verdict};

/// State shared by every request passing through detection.
#[derive(Clone)]
pub struct Detector {
    pub tracker: Arc<RateTracker>,
    pub metrics: Arc<Metrics>,
    pub client_key: ClientKey,
}

impl Detector {
    pub fn new(tracker: Arc<RateTracker>, metrics: Arc<Metrics>, client_key: ClientKey) -> Self {
        Self {
            tracker,
            metrics,
            client_key,
        }
    }

    /// Observe one request from `peer`, count it, and log it if flagged.
    pub fn inspect(&self, peer: SocketAddr) -> Verdict {
        let client_id = self.client_key.key_for(peer);
        let verdict = self.tracker.observe(&client_id, Instant::now());
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        match &verdict {
            Verdict::ThresholdExceeded {
                client_id,
                count,
                window,
            } => {
                self.metrics.flagged.fetch_add(1, Ordering::Relaxed);
                warn!(
                    client = %client_id,
                    count = *count,
                    window = ?window,
                    "potential DDoS detected"
                );
            }
            Verdict::Normal { count } => {
                debug!(client = %client_id, count = *count, "request observed");
            }
        }
        verdict
    }
}

/// Middleware run ahead of every route. Flags clients over the limit but
/// always passes the request on untouched.
///
/// Requests without a known peer address (the router was served without
/// connect info) are forwarded unobserved.
pub async fn detect(State(detector): State<Detector>, request: Request, next: Next) -> Response {
    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(peer)) => {
            detector.inspect(*peer);
        }
        None => debug!(uri = %request.uri(), "no peer address, request not observed"),
    }
    next.run(request).await
}
