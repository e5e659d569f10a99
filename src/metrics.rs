use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::logging;
use crate::scheduler::CancellationToken;

#[derive(Debug, Default)]
pub struct Metrics {
    api_requests: AtomicU64,
    api_duration_millis: AtomicU64,
    refresh_successes: AtomicU64,
    refresh_failures: AtomicU64,
    issues_fetched: AtomicU64,
    http_errors: Mutex<BTreeMap<u16, u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub api_requests: u64,
    pub api_duration_millis: u64,
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub issues_fetched: u64,
    pub http_errors: BTreeMap<u16, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_api_request(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_error(&self, status: u16) {
        let mut errors = self
            .http_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *errors.entry(status).or_insert(0) += 1;
    }

    pub fn record_api_duration(&self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.api_duration_millis.store(millis, Ordering::Relaxed);
    }

    pub fn inc_refresh_success(&self, issues: usize) {
        self.refresh_successes.fetch_add(1, Ordering::Relaxed);
        self.issues_fetched.store(issues as u64, Ordering::Relaxed);
    }

    pub fn inc_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            api_requests: self.api_requests.load(Ordering::Relaxed),
            api_duration_millis: self.api_duration_millis.load(Ordering::Relaxed),
            refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            issues_fetched: self.issues_fetched.load(Ordering::Relaxed),
            http_errors: self
                .http_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

pub fn spawn_metrics_logger(
    metrics: Arc<Metrics>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !cancel.wait_timeout(interval) {
            let s = metrics.snapshot();
            logging::info(format!(
                "metrics api_requests={} api_duration_ms={} refresh_ok={} refresh_failed={} issues={} http_errors={:?}",
                s.api_requests,
                s.api_duration_millis,
                s.refresh_successes,
                s.refresh_failures,
                s.issues_fetched,
                s.http_errors
            ));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_errors_per_status() {
        let metrics = Metrics::new();
        metrics.record_http_error(503);
        metrics.record_http_error(503);
        metrics.record_http_error(401);
        metrics.inc_refresh_failure();
        metrics.inc_refresh_success(12);
        metrics.record_api_duration(Duration::from_millis(1500));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.http_errors.get(&503), Some(&2));
        assert_eq!(snapshot.http_errors.get(&401), Some(&1));
        assert_eq!(snapshot.refresh_failures, 1);
        assert_eq!(snapshot.refresh_successes, 1);
        assert_eq!(snapshot.issues_fetched, 12);
        assert_eq!(snapshot.api_duration_millis, 1500);
    }

    #[test]
    fn logger_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = spawn_metrics_logger(
            Arc::new(Metrics::new()),
            Duration::from_secs(3600),
            cancel.clone(),
        );
        cancel.cancel();
        handle.join().expect("logger thread should exit");
    }
}
