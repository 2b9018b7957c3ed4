//! Service-wide runtime counters and shutdown timing

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

/// How long in-flight requests get to finish after a shutdown signal.
///
/// A request waiting on a refresh cycle counts as in flight.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime counters tracked while the service is running
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn clones_share_counters() {
        let metrics = ServiceMetrics::new();
        let clone = metrics.clone();
        clone.requests_total.fetch_add(3, Ordering::Relaxed);
        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.errors_total.load(Ordering::Relaxed), 0);
    }
}
