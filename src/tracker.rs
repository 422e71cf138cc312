use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Requests observed for one client in its current window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientRecord {
    pub count: u32,
    pub window_start: Instant,
}

/// Outcome of a single observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Still within the limit. Carries the client's count after this request.
    Normal { count: u32 },
    /// The client went over the limit within the current window.
    ThresholdExceeded {
        client_id: String,
        count: u32,
        window: Duration,
    },
}

impl Verdict {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Verdict::ThresholdExceeded { .. })
    }

    /// Count recorded for the client after the observation.
    pub fn count(&self) -> u32 {
        match self {
            Verdict::Normal { count } | Verdict::ThresholdExceeded { count, .. } => *count,
        }
    }
}

/// Per-client request counting over a fixed window.
///
/// A client's window opens on its first request and is replaced by a fresh
/// one on the first request seen after it has fully elapsed. This is not a
/// sliding window: a client can send `limit` requests just before a window
/// ends and `limit` more right after without being flagged.
///
/// Detection only. The tracker never rejects anything and performs no I/O;
/// acting on a [`Verdict`] is up to the caller.
pub struct RateTracker {
    records: Mutex<HashMap<String, ClientRecord>>,
    limit: u32,
    window: Duration,
}

impl RateTracker {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    /// Record one request from `client_id` at `now` and judge it.
    ///
    /// All callers are serialized on a single lock, so increments for the
    /// same client are never lost or reordered.
    pub fn observe(&self, client_id: &str, now: Instant) -> Verdict {
        let fresh = ClientRecord {
            count: 1,
            window_start: now,
        };
        let mut records = self.lock();

        let record = match records.get_mut(client_id) {
            Some(record) => record,
            None => {
                records.insert(client_id.to_string(), fresh);
                return Verdict::Normal { count: 1 };
            }
        };

        if self.elapsed(record, now) {
            *record = fresh;
            return Verdict::Normal { count: 1 };
        }

        record.count = record.count.saturating_add(1);
        if record.count > self.limit {
            Verdict::ThresholdExceeded {
                client_id: client_id.to_string(),
                count: record.count,
                window: self.window,
            }
        } else {
            Verdict::Normal {
                count: record.count,
            }
        }
    }

    /// Drop every record whose window has elapsed at `now`.
    ///
    /// An elapsed record is replaced on its next observation exactly as a
    /// missing one is created, so sweeping never changes a verdict.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, record| !self.elapsed(record, now));
        before - records.len()
    }

    /// Snapshot of a client's current record.
    pub fn record(&self, client_id: &str) -> Option<ClientRecord> {
        self.lock().get(client_id).copied()
    }

    /// Number of clients currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Strictly greater: a request landing exactly on the boundary still counts
    // toward the current window.
    fn elapsed(&self, record: &ClientRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.window_start) > self.window
    }

    // Nothing panics while the lock is held, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sweep `tracker` every `interval_secs` until the runtime shuts down.
pub async fn run_sweeper(tracker: Arc<RateTracker>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let removed = tracker.sweep(Instant::now());
        debug!(removed, remaining = tracker.len(), "swept expired client records");
    }
}
