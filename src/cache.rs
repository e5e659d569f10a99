use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::issue::RawIssue;

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    issues: HashMap<String, RawIssue>,
    last_refresh: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn issues(&self) -> &HashMap<String, RawIssue> {
        &self.issues
    }

    pub fn get(&self, key: &str) -> Option<&RawIssue> {
        self.issues.get(key)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole snapshot and returns the recorded refresh time,
    /// which never moves backwards even if the wall clock does. Issues
    /// without a key are dropped.
    pub fn update(&self, issues: Vec<RawIssue>, refreshed_at: DateTime<Utc>) -> DateTime<Utc> {
        let issues: HashMap<String, RawIssue> = issues
            .into_iter()
            .filter(|issue| !issue.key.trim().is_empty())
            .map(|issue| (issue.key.clone(), issue))
            .collect();

        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let refreshed_at = match current.last_refresh {
            Some(previous) if previous > refreshed_at => previous,
            _ => refreshed_at,
        };
        *current = Arc::new(Snapshot {
            issues,
            last_refresh: Some(refreshed_at),
        });
        refreshed_at
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.snapshot().last_refresh
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
