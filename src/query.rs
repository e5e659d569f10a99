use std::sync::Arc;
use std::time::Instant;

use crate::issue::RawIssue;
use crate::jira::{JiraClient, JiraError};
use crate::logging;
use crate::metrics::Metrics;

pub const SEARCH_FIELDS: [&str; 25] = [
    "key",
    "created",
    "updated",
    "resolutiondate",
    "assignee",
    "customfield_22501",
    "customfield_18117",
    "customfield_21200",
    "customfield_20908",
    "customfield_20905",
    "customfield_18119",
    "customfield_33803",
    "customfield_21501",
    "customfield_24800",
    "customfield_20911",
    "customfield_21201",
    "reporter",
    "customfield_31207",
    "customfield_31208",
    "issuetype",
    "customfield_29800",
    "customfield_28222",
    "customfield_32112",
    "customfield_30304",
    "customfield_37238",
];

pub const EXCLUDED_STATUSES: [&str; 2] = ["Cancelled", "Rejected"];

pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("search page at startAt={start_at} failed: {source}")]
    Page {
        start_at: usize,
        #[source]
        source: JiraError,
    },
    #[error("jira client is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueQuery {
    pub project_key: String,
    pub filter: Option<String>,
    pub page_size: usize,
}

impl IssueQuery {
    pub fn new(project_key: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            filter: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter.filter(|f| !f.trim().is_empty());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn jql(&self) -> String {
        let mut jql = format!(
            "project = {} AND status not in ({}) AND created>=startOfYear(-1y)",
            self.project_key,
            EXCLUDED_STATUSES.join(",")
        );
        if let Some(filter) = self.filter.as_deref().map(str::trim) {
            if !filter.is_empty() {
                jql.push_str(&format!(" AND ({filter})"));
            }
        }
        jql.push_str(" ORDER BY created DESC");
        jql
    }
}

pub trait PageSource {
    fn fetch_page(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
        fields: &[&str],
    ) -> Result<Vec<RawIssue>, QueryError>;
}

impl PageSource for JiraClient {
    fn fetch_page(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
        fields: &[&str],
    ) -> Result<Vec<RawIssue>, QueryError> {
        self.search_page(jql, start_at, max_results, fields)
            .map_err(|source| QueryError::Page { start_at, source })
    }
}

impl<S: PageSource> PageSource for Option<S> {
    fn fetch_page(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
        fields: &[&str],
    ) -> Result<Vec<RawIssue>, QueryError> {
        match self {
            Some(source) => source.fetch_page(jql, start_at, max_results, fields),
            None => Err(QueryError::NotConfigured(
                "base url or credentials missing".to_string(),
            )),
        }
    }
}

/// Retrieves every page for `query`. Any failed page discards the whole result.
pub fn fetch_all<S: PageSource + ?Sized>(
    source: &S,
    query: &IssueQuery,
) -> Result<Vec<RawIssue>, QueryError> {
    let jql = query.jql();
    let page_size = query.page_size.max(1);
    let mut start_at = 0;
    let mut all = Vec::new();

    logging::info(format!("querying jira with jql: {}", jql));

    loop {
        let page = source.fetch_page(&jql, start_at, page_size, &SEARCH_FIELDS)?;
        let page_count = page.len();
        if page_count == 0 {
            break;
        }

        all.extend(page);
        if page_count < page_size {
            break;
        }
        start_at += page_count;
    }

    Ok(all)
}

pub trait IssueSource {
    fn fetch_issues(&self) -> Result<Vec<RawIssue>, QueryError>;
}

pub struct QueryEngine<S> {
    source: S,
    query: IssueQuery,
    metrics: Option<Arc<Metrics>>,
}

impl<S: PageSource> QueryEngine<S> {
    pub fn new(source: S, query: IssueQuery, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            source,
            query,
            metrics,
        }
    }

    pub fn query(&self) -> &IssueQuery {
        &self.query
    }
}

impl<S: PageSource> IssueSource for QueryEngine<S> {
    fn fetch_issues(&self) -> Result<Vec<RawIssue>, QueryError> {
        let started = Instant::now();
        let issues = fetch_all(&self.source, &self.query)?;
        let elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_api_duration(elapsed);
        }
        logging::info(format!(
            "retrieved {} issues from jira in {:.3}s",
            issues.len(),
            elapsed.as_secs_f64()
        ));
        Ok(issues)
    }
}
