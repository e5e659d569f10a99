use std::fmt::Write as _;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tiny_http::{Header, Response, Server, StatusCode};

use crate::cache::SnapshotCache;
use crate::logging;
use crate::metrics::Metrics;
use crate::scheduler::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ExpositionError {
    #[error("failed to bind metrics server on {addr}: {message}")]
    Bind { addr: String, message: String },
}

fn describe(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

pub fn render(prefix: &str, cache: &SnapshotCache, metrics: Option<&Metrics>) -> String {
    let snapshot = cache.snapshot();
    let mut out = String::new();

    let name = format!("{prefix}_jira_issues");
    describe(&mut out, &name, "gauge", "Issues in the last snapshot.");
    let _ = writeln!(out, "{name} {}", snapshot.len());

    let name = format!("{prefix}_jira_last_refresh_timestamp_seconds");
    describe(
        &mut out,
        &name,
        "gauge",
        "Unix time of the last successful refresh, 0 if none.",
    );
    let _ = writeln!(
        out,
        "{name} {}",
        snapshot.last_refresh().map(|ts| ts.timestamp()).unwrap_or(0)
    );

    let Some(metrics) = metrics else {
        return out;
    };
    let s = metrics.snapshot();

    let name = format!("{prefix}_jira_api_requests_total");
    describe(&mut out, &name, "counter", "Requests sent to the Jira API.");
    let _ = writeln!(out, "{name} {}", s.api_requests);

    let name = format!("{prefix}_jira_api_duration_seconds");
    describe(
        &mut out,
        &name,
        "gauge",
        "Wall time of the last complete paginated search.",
    );
    let _ = writeln!(out, "{name} {}", s.api_duration_millis as f64 / 1000.0);

    let name = format!("{prefix}_jira_issues_fetched");
    describe(
        &mut out,
        &name,
        "gauge",
        "Issues returned by the last successful search.",
    );
    let _ = writeln!(out, "{name} {}", s.issues_fetched);

    let name = format!("{prefix}_jira_refresh_total");
    describe(&mut out, &name, "counter", "Refresh cycles by result.");
    let _ = writeln!(out, "{name}{{result=\"success\"}} {}", s.refresh_successes);
    let _ = writeln!(out, "{name}{{result=\"failure\"}} {}", s.refresh_failures);

    let name = format!("{prefix}_jira_http_errors_total");
    describe(
        &mut out,
        &name,
        "counter",
        "Non-2xx responses from the Jira API by status code.",
    );
    for (status, count) in &s.http_errors {
        let _ = writeln!(out, "{name}{{status=\"{status}\"}} {count}");
    }
    out
}

pub struct MetricsServer {
    server: Server,
    path: String,
    prefix: String,
}

impl MetricsServer {
    pub fn bind(listen: &str, path: &str, prefix: &str) -> Result<Self, ExpositionError> {
        let server = Server::http(listen).map_err(|err| ExpositionError::Bind {
            addr: listen.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            server,
            path: path.to_string(),
            prefix: prefix.to_string(),
        })
    }

    pub fn local_addr(&self) -> String {
        self.server.server_addr().to_string()
    }

    pub fn spawn(
        self,
        cache: Arc<SnapshotCache>,
        metrics: Option<Arc<Metrics>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            logging::info(format!(
                "metrics endpoint listening on {}{}",
                self.local_addr(),
                self.path
            ));
            while !cancel.is_cancelled() {
                let request = match self.server.recv_timeout(Duration::from_millis(200)) {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(err) => {
                        logging::error(format!("metrics server receive failed: {}", err));
                        continue;
                    }
                };

                let url_path = request.url().split('?').next().unwrap_or_default();
                let result = if url_path == self.path {
                    let body = render(&self.prefix, &cache, metrics.as_deref());
                    let mut response = Response::from_string(body);
                    if let Ok(header) = Header::from_bytes(
                        &b"Content-Type"[..],
                        &b"text/plain; version=0.0.4; charset=utf-8"[..],
                    ) {
                        response = response.with_header(header);
                    }
                    request.respond(response)
                } else {
                    let response =
                        Response::from_string("not found").with_status_code(StatusCode(404));
                    request.respond(response)
                };
                if let Err(err) = result {
                    logging::debug(format!("metrics response failed: {}", err));
                }
            }
            logging::info("metrics endpoint stopped");
        })
    }
}
