//! CLI entry point for the batchfetch tool.

use std::io::{self, IsTerminal, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use batchfetch_core::{
    BodyDestination, BodyFilter, DEFAULT_MAX_CONCURRENT, DEFAULT_REQUEST_TIMEOUT, HttpResult,
    RateLimitConfig, RequestOptions, ReqwestTransport, Scheduler, SchedulerConfig,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info};

mod cli;
mod config;

use cli::Args;
use config::FileConfig;

/// Default rate-limit cycle when only a quota is given.
const DEFAULT_CYCLE_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = config::load_file_config(args.config.as_deref())?;
    if let Some(path) = loaded.path.as_deref() {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file resolved");
    }
    let file = loaded.config.unwrap_or_default();

    // Read input: from positional args or stdin
    let input_text = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/' | batchfetch");
        return Ok(());
    };

    let urls = parse_urls(&input_text);
    if urls.is_empty() {
        info!("No URLs found in input");
        return Ok(());
    }

    let scheduler_config = build_scheduler_config(&args, &file)?;
    let mut transport =
        ReqwestTransport::builder().connection_limit(scheduler_config.max_concurrent);
    if let Some(user_agent) = &file.user_agent {
        transport = transport.user_agent(user_agent.clone());
    }
    let transport = transport.build()?;
    let mut scheduler = Scheduler::from_config(transport, scheduler_config, HttpResult::from)?;

    for (line, url) in urls.iter().enumerate() {
        scheduler
            .add(RequestOptions::get(*url), json!({ "line": line + 1 }), None)
            .with_context(|| format!("Failed to enqueue '{url}'"))?;
    }
    info!(urls = urls.len(), "Fetching");

    let progress = progress_bar(urls.len() as u64, args.quiet);
    let print_headers = args.headers;
    let mut failed = 0usize;
    let mut received_bytes = 0usize;

    let chunk_size = args.chunk.and_then(|chunk| usize::try_from(chunk).ok());
    let summary = scheduler
        .all_async(
            |result: &HttpResult| {
                let body_len = result.body().map_or(0, |body| body.len());
                received_bytes += body_len;
                if result.has_error(None) {
                    failed += 1;
                }
                emit(&progress, describe(result, body_len));
                if print_headers && let Some(headers) = result.headers() {
                    for (name, value) in headers.iter() {
                        emit(&progress, format!("    {name}: {value}"));
                    }
                }
                progress.inc(1);
            },
            chunk_size,
        )
        .await?;
    progress.finish_and_clear();

    info!(
        completed = summary.delivered,
        failed,
        chunks = summary.chunks,
        bytes = received_bytes,
        elapsed_ms = scheduler.session_elapsed().unwrap_or_default().as_millis(),
        requests_per_second = scheduler.requests_per_second(),
        "Fetch complete"
    );

    Ok(())
}

/// Extracts one URL per non-empty line, skipping `#` comments.
fn parse_urls(input: &str) -> Vec<&str> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Merges file defaults and CLI flags (flags win) into a scheduler config.
fn build_scheduler_config(args: &Args, file: &FileConfig) -> Result<SchedulerConfig> {
    let mut config = SchedulerConfig {
        max_concurrent: args
            .concurrency
            .map(usize::from)
            .or(file.concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENT),
        base_url: args.base_url.clone().or_else(|| file.base_url.clone()),
        capture_headers: args.headers || file.headers.unwrap_or(false),
        wait_for_readiness: !args.no_select,
        ..SchedulerConfig::default()
    };

    let timeout = args
        .timeout
        .or(file.timeout_secs)
        .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs);
    config.default_options = RequestOptions::default().with_timeout(timeout);

    if args.temp_files || file.temp_files.unwrap_or(false) {
        config.body_destination = BodyDestination::TempFile;
    }
    if args.lowercase {
        config.body_filters = vec![BodyFilter::Lowercase].into();
    }

    let quota = args
        .rate
        .and_then(|rate| usize::try_from(rate).ok())
        .or(file.rate);
    if let Some(quota) = quota {
        let cycle_ms = args.cycle_ms.or(file.cycle_ms).unwrap_or(DEFAULT_CYCLE_MS);
        let blocking = !(args.non_blocking || file.non_blocking.unwrap_or(false));
        let mut limit = RateLimitConfig::new(quota, Duration::from_millis(cycle_ms), blocking)?;
        if let Some(coefficient) = args.pacing.or(file.pacing) {
            limit = limit.with_pacing(coefficient)?;
        }
        config.rate_limit = Some(limit);
    } else if args.pacing.is_some() {
        anyhow::bail!("--pacing requires --rate");
    }

    config.validate()?;
    Ok(config)
}

/// One output line per result: status or error, size, URL.
fn describe(result: &HttpResult, body_len: usize) -> String {
    let url = result
        .effective_url()
        .or(result.options().url.as_deref())
        .unwrap_or("-");
    let elapsed = result.elapsed().as_millis();
    match (result.http_status(), result.error_message()) {
        (Some(status), None) => format!("{status} {body_len:>9}B {elapsed:>6}ms {url}"),
        (Some(status), Some(_)) => {
            format!("{status} {body_len:>9}B {elapsed:>6}ms {url} (http error)")
        }
        (None, message) => format!(
            "ERR {:>9} {elapsed:>6}ms {url} ({})",
            result.error_code().unwrap_or_default(),
            message.unwrap_or_default()
        ),
    }
}

/// Prints above the progress bar, or straight to stdout when it is hidden.
fn emit(progress: &ProgressBar, line: String) {
    if progress.is_hidden() {
        println!("{line}");
    } else {
        progress.println(line);
    }
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {per_sec} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["batchfetch"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_parse_urls_skips_blank_and_comments() {
        let input = "https://a.example\n\n  # comment\n  https://b.example  \n";
        assert_eq!(
            parse_urls(input),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_build_config_defaults() {
        let config = build_scheduler_config(&args(&[]), &FileConfig::default()).unwrap();
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert!(config.rate_limit.is_none());
        assert!(config.wait_for_readiness);
        assert_eq!(config.default_options.timeout, Some(DEFAULT_REQUEST_TIMEOUT));
    }

    #[test]
    fn test_build_config_flags_override_file() {
        let file = FileConfig {
            concurrency: Some(50),
            rate: Some(2),
            cycle_ms: Some(5000),
            ..FileConfig::default()
        };
        let config = build_scheduler_config(&args(&["-c", "4", "--rate", "8"]), &file).unwrap();

        assert_eq!(config.max_concurrent, 4);
        let limit = config.rate_limit.unwrap();
        assert_eq!(limit.quota, 8);
        assert_eq!(limit.cycle, Duration::from_millis(5000));
        assert!(limit.blocking);
    }

    #[test]
    fn test_build_config_non_blocking_and_pacing() {
        let config = build_scheduler_config(
            &args(&["--rate", "5", "--non-blocking", "--pacing", "1.5"]),
            &FileConfig::default(),
        )
        .unwrap();
        let limit = config.rate_limit.unwrap();
        assert!(!limit.blocking);
        assert!(limit.pacing.enabled);
    }

    #[test]
    fn test_build_config_pacing_without_rate_rejected() {
        let result = build_scheduler_config(&args(&["--pacing", "1.0"]), &FileConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_build_config_body_options() {
        let config = build_scheduler_config(
            &args(&["--temp-files", "--lowercase", "--headers", "--no-select"]),
            &FileConfig::default(),
        )
        .unwrap();
        assert_eq!(config.body_destination, BodyDestination::TempFile);
        assert_eq!(config.body_filters.len(), 1);
        assert!(config.capture_headers);
        assert!(!config.wait_for_readiness);
    }
}
