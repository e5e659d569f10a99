use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use aim_jira::cache::SnapshotCache;
use aim_jira::config::{self, AppConfigOverrides};
use aim_jira::exposition::MetricsServer;
use aim_jira::jira::JiraClient;
use aim_jira::logging::{self, LogFormat, LogLevel};
use aim_jira::metrics::{spawn_metrics_logger, Metrics};
use aim_jira::query::QueryEngine;
use aim_jira::scheduler::{CancellationToken, IntervalTicker, RefreshScheduler};
use clap::{Parser, Subcommand};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// AIM - Analysis Issues and Metrics.
///
/// Collects incident tickets from Jira and exposes them as Prometheus metrics.
#[derive(Debug, Parser)]
#[command(name = "aim", version)]
struct Cli {
    /// TOML config file (default: $XDG_CONFIG_HOME/aim/config.toml if present)
    #[arg(long, env = "AIM_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "AIM_JIRA_URL")]
    jira_url: Option<String>,
    #[arg(long, env = "AIM_JIRA_USERNAME")]
    jira_username: Option<String>,
    #[arg(long, env = "AIM_JIRA_API_TOKEN", hide_env_values = true)]
    jira_api_token: Option<String>,
    #[arg(long, env = "AIM_JIRA_PROJECT_KEY")]
    jira_project_key: Option<String>,
    /// Additional JQL ANDed with the incident query
    #[arg(long, env = "AIM_JIRA_QUERY_FILTER")]
    jira_query_filter: Option<String>,
    #[arg(long, env = "AIM_JIRA_PAGE_SIZE")]
    jira_page_size: Option<usize>,
    /// Seconds between Jira refreshes
    #[arg(long, env = "AIM_JIRA_REFRESH_INTERVAL")]
    jira_refresh_interval: Option<u64>,
    /// Metrics listen address; empty disables the endpoint
    #[arg(long, env = "AIM_PROMETHEUS_METRICS_LISTEN")]
    prometheus_listen: Option<String>,
    #[arg(long, env = "AIM_PROMETHEUS_METRICS_URL")]
    prometheus_url: Option<String>,
    #[arg(long, env = "AIM_PROMETHEUS_METRICS_PREFIX")]
    prometheus_prefix: Option<String>,
    #[arg(long, env = "AIM_DEBUG")]
    debug: Option<bool>,
    /// Log level: debug, info, warn or error
    #[arg(long, env = "AIM_STDOUT_LEVEL")]
    stdout_level: Option<LogLevel>,
    /// Log format: text or json
    #[arg(long, env = "AIM_STDOUT_FORMAT")]
    stdout_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the version number
    Version,
}

impl Cli {
    fn overrides(&self) -> AppConfigOverrides {
        AppConfigOverrides {
            jira_base_url: self.jira_url.clone(),
            jira_username: self.jira_username.clone(),
            jira_api_token: self.jira_api_token.clone(),
            jira_project_key: self.jira_project_key.clone(),
            jira_query_filter: self.jira_query_filter.clone(),
            jira_page_size: self.jira_page_size,
            refresh_interval_secs: self.jira_refresh_interval,
            metrics_listen: self.prometheus_listen.clone(),
            metrics_path: self.prometheus_url.clone(),
            metrics_prefix: self.prometheus_prefix.clone(),
            logging_debug: self.debug,
            logging_level: self.stdout_level,
            logging_format: self.stdout_format,
        }
    }
}

fn join_within(name: &str, handle: JoinHandle<()>, grace: Duration) {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            logging::warn(format!("{} did not stop within grace period", name));
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    let _ = handle.join();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Some(Command::Version) = cli.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut cfg = config::load(cli.config.as_deref())?;
    cfg.apply_overrides(&cli.overrides())?;

    logging::init(cfg.logging.effective_level(), cfg.logging.format);
    logging::info("initializing aim service");
    for problem in cfg.problems() {
        logging::error(problem);
    }

    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(SnapshotCache::new());
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        logging::info("received shutdown signal - exiting gracefully");
        signal_cancel.cancel();
    })?;

    let client = match JiraClient::with_metrics(
        cfg.jira.base_url.clone(),
        cfg.jira.username.clone(),
        cfg.jira.api_token.clone(),
        Some(Arc::clone(&metrics)),
    ) {
        Ok(client) => {
            logging::info(format!("using jira base url {}", client.base_url));
            if let Err(err) = client.test_connection() {
                logging::warn(format!("continuing without jira connectivity: {}", err));
            }
            Some(client)
        }
        Err(err) => {
            logging::error(format!("failed to create jira client: {}", err));
            None
        }
    };

    let background = if cfg.metrics.listen.trim().is_empty() {
        logging::info("metrics endpoint disabled");
        spawn_metrics_logger(
            Arc::clone(&metrics),
            Duration::from_secs(cfg.metrics.log_interval_secs),
            cancel.clone(),
        )
    } else {
        MetricsServer::bind(&cfg.metrics.listen, &cfg.metrics.path, &cfg.metrics.prefix)?.spawn(
            Arc::clone(&cache),
            Some(Arc::clone(&metrics)),
            cancel.clone(),
        )
    };

    let engine = QueryEngine::new(client, cfg.issue_query(), Some(Arc::clone(&metrics)));
    let refresh_loop = RefreshScheduler::new(engine, Arc::clone(&cache), Some(metrics)).spawn(
        IntervalTicker::new(Duration::from_secs(cfg.refresh.interval_secs)),
        cancel.clone(),
    );
    logging::info(format!(
        "jira data collection started with refresh interval of {} seconds",
        cfg.refresh.interval_secs
    ));

    cancel.wait();
    if let Some(report) = refresh_loop.stop(SHUTDOWN_GRACE) {
        logging::info(format!(
            "refresh loop stopped after {} cycles ({} ok, {} failed)",
            report.cycles, report.successes, report.failures
        ));
    }
    join_within("metrics endpoint", background, SHUTDOWN_GRACE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_config_overrides() {
        let cli = Cli::try_parse_from([
            "aim",
            "--jira-url",
            "https://example.atlassian.net",
            "--jira-project-key",
            "OPS",
            "--jira-refresh-interval",
            "60",
            "--prometheus-listen",
            "",
        ])
        .expect("flags should parse");

        let overrides = cli.overrides();
        assert_eq!(
            overrides.jira_base_url.as_deref(),
            Some("https://example.atlassian.net")
        );
        assert_eq!(overrides.jira_project_key.as_deref(), Some("OPS"));
        assert_eq!(overrides.refresh_interval_secs, Some(60));
        assert_eq!(overrides.metrics_listen.as_deref(), Some(""));
    }

    #[test]
    fn stdout_flags_select_level_and_format() {
        let cli = Cli::try_parse_from(["aim", "--stdout-level", "warn", "--stdout-format", "json"])
            .expect("flags should parse");

        let overrides = cli.overrides();
        assert_eq!(overrides.logging_level, Some(LogLevel::Warn));
        assert_eq!(overrides.logging_format, Some(LogFormat::Json));
    }

    #[test]
    fn unknown_stdout_format_is_rejected() {
        assert!(Cli::try_parse_from(["aim", "--stdout-format", "template"]).is_err());
    }

    #[test]
    fn version_subcommand_parses() {
        let cli = Cli::try_parse_from(["aim", "version"]).expect("version should parse");
        assert!(matches!(cli.command, Some(Command::Version)));
    }
}
