use std::sync::Arc;

use reqwest::blocking::{Client, Response};
use serde::Deserialize;

use crate::issue::RawIssue;
use crate::logging;
use crate::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct JiraIdentity {
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    #[error("jira request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("jira returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode jira response: {source}; body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid jira base url '{0}'")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    pub base_url: String,
    pub username: String,
    pub api_token: String,
    pub http: Client,
    metrics: Option<Arc<Metrics>>,
}

impl JiraClient {
    pub fn new(base_url: String, username: String, api_token: String) -> Result<Self, JiraError> {
        Self::with_metrics(base_url, username, api_token, None)
    }

    pub fn with_metrics(
        base_url: String,
        username: String,
        api_token: String,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, JiraError> {
        let http = Client::builder().build()?;
        let normalized_base_url = normalize_base_url(&base_url)?;
        Ok(Self {
            base_url: normalized_base_url,
            username,
            api_token,
            http,
            metrics,
        })
    }

    fn send<F>(&self, send: F) -> Result<Response, JiraError>
    where
        F: FnOnce() -> Result<Response, reqwest::Error>,
    {
        if let Some(metrics) = &self.metrics {
            metrics.inc_api_request();
        }

        let response = send().map_err(|err| {
            logging::error(format!("jira request transport error: {}", err));
            JiraError::Request(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            logging::error(format!("jira request failed with status {}", status));
            if let Some(metrics) = &self.metrics {
                metrics.record_http_error(status.as_u16());
            }
            let body = response.text().unwrap_or_default();
            return Err(JiraError::Http { status, body });
        }

        Ok(response)
    }

    pub fn search_page(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
        fields: &[&str],
    ) -> Result<Vec<RawIssue>, JiraError> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let query = [
            ("jql", jql.to_string()),
            ("startAt", start_at.to_string()),
            ("maxResults", max_results.to_string()),
            ("fields", fields.join(",")),
        ];
        let response = self.send(|| {
            self.http
                .get(&url)
                .basic_auth(&self.username, Some(&self.api_token))
                .query(&query)
                .send()
        })?;

        let body = response.text()?;
        let payload: SearchResponse = serde_json::from_str(&body).map_err(|source| {
            let short_body = if body.len() > 1000 {
                format!("{}...", truncate_at_char_boundary(&body, 1000))
            } else {
                body.clone()
            };
            logging::warn(format!(
                "failed decoding jira search response at startAt={}: {}",
                start_at, short_body
            ));
            JiraError::Decode {
                source,
                body: short_body,
            }
        })?;

        logging::debug(format!(
            "jira search page start_at={} max_results={} page_count={} total={:?}",
            start_at,
            max_results,
            payload.issues.len(),
            payload.total
        ));
        Ok(payload.issues)
    }

    pub fn get_myself(&self) -> Result<JiraIdentity, JiraError> {
        let url = format!("{}/rest/api/2/myself", self.base_url);
        let response = self.send(|| {
            self.http
                .get(&url)
                .basic_auth(&self.username, Some(&self.api_token))
                .send()
        })?;

        let body = response.text()?;
        let payload: MyselfResponse =
            serde_json::from_str(&body).map_err(|source| JiraError::Decode { source, body })?;

        Ok(JiraIdentity {
            account_id: payload.account_id,
            name: payload.name,
            display_name: payload.display_name,
            email_address: payload.email_address,
        })
    }

    pub fn test_connection(&self) -> Result<JiraIdentity, JiraError> {
        match self.get_myself() {
            Ok(me) => {
                logging::info(format!(
                    "connected to jira as {}",
                    me.display_name
                        .as_deref()
                        .or(me.name.as_deref())
                        .unwrap_or("<unknown>")
                ));
                Ok(me)
            }
            Err(err) => {
                logging::error(format!("jira connection test failed: {}", err));
                Err(err)
            }
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String, JiraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JiraError::InvalidBaseUrl(raw.to_string()));
    }

    let mut candidate = trimmed.to_string();

    if candidate.starts_with("https://https//") {
        candidate = candidate.replacen("https://https//", "https://", 1);
    } else if candidate.starts_with("http://http//") {
        candidate = candidate.replacen("http://http//", "http://", 1);
    }

    if candidate.starts_with("https//") {
        candidate = format!("https://{}", candidate.trim_start_matches("https//"));
    } else if candidate.starts_with("http//") {
        candidate = format!("http://{}", candidate.trim_start_matches("http//"));
    } else if !candidate.starts_with("https://") && !candidate.starts_with("http://") {
        candidate = format!("https://{candidate}");
    }

    let parsed =
        reqwest::Url::parse(&candidate).map_err(|_| JiraError::InvalidBaseUrl(raw.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn truncate_at_char_boundary(raw: &str, max: usize) -> &str {
    let mut end = max.min(raw.len());
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyselfResponse {
    account_id: Option<String>,
    name: Option<String>,
    display_name: Option<String>,
    email_address: Option<String>,
}
