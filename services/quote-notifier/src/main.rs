//! Kakao quote notifier
//!
//! One-shot job run by a scheduler:
//! 1. Loads configuration and the durable token record
//! 2. Reads the already formatted quote summary from `--message`,
//!    `--message-file` or stdin
//! 3. Delivers it as "memo to self" chunks, renewing tokens as needed
//! 4. Prints a JSON run report to stdout and exits 0 (delivered),
//!    1 (nothing delivered or setup failure) or 2 (partial delivery)

mod config;
mod metrics;
mod report;
mod sink;

use anyhow::{Context, Result};
use kakao_auth::{Bootstrap, CredentialSet, CredentialStore, TokenManager};
use memo_delivery::{DeliveryPipeline, MemoClient, MemoTemplate, RetryPolicy, split_message};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::report::{RunReport, TokenCounters};
use crate::sink::CommandSink;

/// Command line flags. Unrecognised `--` flags are collected so they can be
/// logged; other stray arguments are ignored.
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    config: Option<String>,
    message: Option<String>,
    message_file: Option<PathBuf>,
    unknown: Vec<String>,
}

impl CliArgs {
    fn parse(args: &[String]) -> Self {
        let mut cli = Self::default();
        let mut rest = args.iter().skip(1);
        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "--config" => cli.config = rest.next().cloned(),
                "--message" => cli.message = rest.next().cloned(),
                "--message-file" => cli.message_file = rest.next().map(PathBuf::from),
                flag if flag.starts_with("--") => cli.unknown.push(flag.to_owned()),
                _ => {}
            }
        }
        cli
    }
}

#[tokio::main]
async fn main() {
    // JSON logs on stderr; stdout carries only the run report
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("starting quote-notifier");

    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args);
    for flag in &cli.unknown {
        warn!(flag = %flag, "ignoring unrecognised flag");
    }

    let report = match run(&cli).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %format!("{e:#}"), "run failed before delivery");
            RunReport::setup_failure(&e)
        }
    };

    println!("{}", report.to_json());
    info!(outcome = ?report.outcome, exit_code = report.exit_code(), "quote-notifier finished");
    std::process::exit(report.exit_code());
}

async fn run(cli: &CliArgs) -> Result<RunReport> {
    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.path.display(), explicit = config_path.explicit, "loading configuration");

    let config = Config::load_from(&config_path).with_context(|| {
        format!("failed to load config from {}", config_path.path.display())
    })?;

    info!(
        credentials_path = %config.kakao.credentials_path.display(),
        max_attempts = config.delivery.max_attempts,
        max_chunk_chars = config.delivery.max_chunk_chars,
        secret_sink = config.secret_sink.is_some(),
        "configuration loaded"
    );

    // Install the recorder before any metrics are emitted
    let prometheus = match &config.metrics.textfile_path {
        Some(path) => Some((metrics::install_recorder()?, path.clone())),
        None => None,
    };

    let message = read_message(cli).await?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.kakao.http_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let endpoints = config.endpoints();

    let seed = CredentialSet {
        access_token: config.kakao.access_token.clone(),
        refresh_token: config.kakao.refresh_token.clone(),
        expires_at: None,
    };
    let store = CredentialStore::load(config.kakao.credentials_path.clone(), seed)
        .await
        .with_context(|| {
            format!(
                "failed to load credential record {}",
                config.kakao.credentials_path.display()
            )
        })?;

    let bootstrap = Bootstrap {
        access_token: config.kakao.access_token.clone(),
        authorization_code: config.kakao.auth_code.clone(),
    };
    let mut manager = TokenManager::new(
        store,
        http.clone(),
        endpoints.clone(),
        config.oauth_client(),
        bootstrap,
    );
    if let Some(sink) = config
        .secret_sink
        .as_ref()
        .and_then(|s| CommandSink::from_argv(&s.command))
    {
        manager = manager.with_sink(Arc::new(sink));
    }

    let client = MemoClient::new(
        http,
        endpoints.memo_send.clone(),
        MemoTemplate {
            link_url: config.delivery.link_url.clone(),
            button_title: config.delivery.button_title.clone(),
        },
    );
    let policy = RetryPolicy {
        max_attempts: config.delivery.max_attempts,
        delay: Duration::from_secs(config.delivery.retry_delay_secs),
    };
    let mut pipeline = DeliveryPipeline::new(manager, client, policy)
        .with_max_chunk_chars(config.delivery.max_chunk_chars);

    let chunks_total = split_message(&message, config.delivery.max_chunk_chars).len();
    let result = match config.delivery.run_timeout_secs {
        Some(secs) => {
            pipeline
                .deliver_with_timeout(&message, Duration::from_secs(secs))
                .await
        }
        None => pipeline.deliver(&message).await,
    };

    let counters = TokenCounters {
        renewals: pipeline.source().renewals(),
        sink_failures: pipeline.source().sink_failures(),
    };
    let report = RunReport::from_delivery(&result, pipeline.run_id(), chunks_total, counters);

    if let Some((handle, path)) = prometheus
        && let Err(e) = metrics::write_textfile(&handle, &path).await
    {
        warn!(error = %format!("{e:#}"), "failed to write metrics textfile");
    }

    Ok(report)
}

/// Message from `--message`, else `--message-file`, else stdin. Trailing
/// whitespace from files and pipes is dropped.
async fn read_message(cli: &CliArgs) -> Result<String> {
    if let Some(message) = &cli.message {
        return Ok(message.clone());
    }

    let raw = match &cli.message_file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read message file {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read message from stdin")?;
            buf
        }
    };
    Ok(raw.trim_end().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cli_flags_are_parsed() {
        let cli = CliArgs::parse(&args(&[
            "quote-notifier",
            "--config",
            "/etc/quote-notifier.toml",
            "--message-file",
            "/tmp/summary.txt",
        ]));
        assert_eq!(cli.config.as_deref(), Some("/etc/quote-notifier.toml"));
        assert_eq!(cli.message_file, Some(PathBuf::from("/tmp/summary.txt")));
        assert!(cli.message.is_none());
    }

    #[test]
    fn flag_without_value_is_ignored() {
        let cli = CliArgs::parse(&args(&["quote-notifier", "--config"]));
        assert_eq!(cli, CliArgs::default());
    }

    #[test]
    fn unrecognised_flags_are_collected() {
        let cli = CliArgs::parse(&args(&[
            "quote-notifier",
            "--mesage",
            "hello",
            "--config",
            "/etc/quote-notifier.toml",
            "--dry-run",
        ]));
        assert_eq!(cli.unknown, vec!["--mesage", "--dry-run"]);
        assert_eq!(cli.config.as_deref(), Some("/etc/quote-notifier.toml"));
        assert!(cli.message.is_none());
    }

    #[tokio::test]
    async fn inline_message_wins_over_file() {
        let cli = CliArgs {
            message: Some("AAPL 189.84\n".into()),
            message_file: Some(PathBuf::from("/nonexistent/summary.txt")),
            ..Default::default()
        };
        assert_eq!(read_message(&cli).await.unwrap(), "AAPL 189.84\n");
    }

    #[tokio::test]
    async fn message_file_is_read_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        std::fs::write(&path, "📊 주식 정보\nAAPL: 189.84 🔺\n\n").unwrap();

        let cli = CliArgs {
            message_file: Some(path),
            ..Default::default()
        };
        assert_eq!(
            read_message(&cli).await.unwrap(),
            "📊 주식 정보\nAAPL: 189.84 🔺"
        );
    }

    #[tokio::test]
    async fn missing_message_file_is_error() {
        let cli = CliArgs {
            message_file: Some(PathBuf::from("/nonexistent/summary.txt")),
            ..Default::default()
        };
        let err = read_message(&cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/summary.txt"));
    }
}
