use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::cache::SnapshotCache;
use crate::issue::NormalizedIssue;
use crate::logging;
use crate::mapper::map_issues;
use crate::metrics::Metrics;
use crate::query::IssueSource;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cv) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cv) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = cv
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }

    pub fn wait(&self) {
        let (flag, cv) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let _cancelled = cv
            .wait_while(guard, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

pub trait Ticker {
    fn wait_next(&mut self, cancel: &CancellationToken) -> bool;
}

/// Fires on a fixed schedule starting at construction, independent of how
/// long each cycle takes. Deadlines missed while a cycle ran collapse into a
/// single immediate tick.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicker {
    interval: Duration,
    next_deadline: Instant,
}

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_deadline: Instant::now() + interval,
        }
    }
}

impl Ticker for IntervalTicker {
    fn wait_next(&mut self, cancel: &CancellationToken) -> bool {
        let remaining = self
            .next_deadline
            .saturating_duration_since(Instant::now());
        if cancel.wait_timeout(remaining) {
            return false;
        }

        self.next_deadline += self.interval;
        if !self.interval.is_zero() {
            let now = Instant::now();
            while self.next_deadline <= now {
                self.next_deadline += self.interval;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed {
        issues: usize,
        refreshed_at: DateTime<Utc>,
        latest: Option<NormalizedIssue>,
    },
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub cycles: usize,
    pub successes: usize,
    pub failures: usize,
}

pub struct RefreshScheduler<S> {
    source: S,
    cache: Arc<SnapshotCache>,
    metrics: Option<Arc<Metrics>>,
    clock: fn() -> DateTime<Utc>,
}

impl<S: IssueSource> RefreshScheduler<S> {
    pub fn new(source: S, cache: Arc<SnapshotCache>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            source,
            cache,
            metrics,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn refresh_once(&self) -> RefreshOutcome {
        logging::info("refreshing jira data");

        let raw = match self.source.fetch_issues() {
            Ok(raw) => raw,
            Err(err) => {
                logging::error(format!("failed to refresh jira data: {}", err));
                if let Some(metrics) = &self.metrics {
                    metrics.inc_refresh_failure();
                }
                return RefreshOutcome::Failed(err.to_string());
            }
        };

        let mut normalized = Vec::with_capacity(raw.len());
        let mut skipped = 0;
        for result in map_issues(&raw) {
            match result {
                Ok(issue) => normalized.push(issue),
                Err(err) => {
                    skipped += 1;
                    logging::debug(format!("skipping unmappable issue: {}", err));
                }
            }
        }
        if skipped > 0 {
            logging::warn(format!("{} issues could not be normalized", skipped));
        }

        let issues = raw.len();
        let refreshed_at = self.cache.update(raw, (self.clock)());
        if let Some(metrics) = &self.metrics {
            metrics.inc_refresh_success(issues);
        }

        logging::info(format!(
            "jira data refreshed successfully. total issues: {}",
            issues
        ));
        let latest = latest_created(normalized);
        if let Some(issue) = &latest {
            logging::info(format!(
                "latest issue: {}, created: {}",
                issue.key,
                issue
                    .created
                    .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "unknown".to_string())
            ));
            if let Ok(json) = serde_json::to_string(issue) {
                logging::debug(format!("latest issue record: {}", json));
            }
        }

        RefreshOutcome::Refreshed {
            issues,
            refreshed_at,
            latest,
        }
    }

    pub fn run<T: Ticker>(&self, mut ticker: T, cancel: &CancellationToken) -> LoopReport {
        let mut report = LoopReport::default();
        if cancel.is_cancelled() {
            return report;
        }

        loop {
            report.cycles += 1;
            match self.refresh_once() {
                RefreshOutcome::Refreshed { .. } => report.successes += 1,
                RefreshOutcome::Failed(_) => report.failures += 1,
            }

            if cancel.is_cancelled() || !ticker.wait_next(cancel) {
                break;
            }
        }

        logging::info("stopping jira refresh loop");
        report
    }
}

impl<S: IssueSource + Send + 'static> RefreshScheduler<S> {
    pub fn spawn<T: Ticker + Send + 'static>(
        self,
        ticker: T,
        cancel: CancellationToken,
    ) -> RefreshLoopHandle {
        let loop_cancel = cancel.clone();
        let thread = thread::spawn(move || self.run(ticker, &loop_cancel));
        RefreshLoopHandle { cancel, thread }
    }
}

pub struct RefreshLoopHandle {
    cancel: CancellationToken,
    thread: JoinHandle<LoopReport>,
}

impl RefreshLoopHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn stop(self, grace: Duration) -> Option<LoopReport> {
        self.cancel.cancel();
        let deadline = Instant::now() + grace;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                logging::warn("jira refresh loop did not stop within grace period");
                return None;
            }
            thread::sleep(Duration::from_millis(20));
        }
        self.thread.join().ok()
    }
}

fn latest_created(issues: Vec<NormalizedIssue>) -> Option<NormalizedIssue> {
    let mut latest: Option<NormalizedIssue> = None;
    for issue in issues {
        let newer = match &latest {
            None => true,
            Some(current) => issue.created > current.created,
        };
        if newer {
            latest = Some(issue);
        }
    }
    latest
}
