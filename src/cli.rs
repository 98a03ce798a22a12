//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch many URLs concurrently over a bounded, rate-limited window.
///
/// URLs are read from the arguments or, when none are given, from stdin
/// (one per line, `#` starts a comment).
#[derive(Parser, Debug)]
#[command(name = "batchfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to fetch (reads stdin when empty)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum requests in flight at once (1-1000) [default: 10]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub concurrency: Option<u16>,

    /// Admit at most this many requests per cycle
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub rate: Option<u32>,

    /// Rate-limit cycle length in milliseconds [default: 1000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3_600_000))]
    pub cycle_ms: Option<u64>,

    /// Defer admissions instead of sleeping when the cycle quota is spent
    #[arg(long)]
    pub non_blocking: bool,

    /// Pause after each completion, spreading the cycle (coefficient, e.g. 1.0)
    #[arg(long, value_name = "COEFFICIENT")]
    pub pacing: Option<f64>,

    /// String prepended to relative URLs
    #[arg(short = 'b', long)]
    pub base_url: Option<String>,

    /// Capture and print response headers
    #[arg(long)]
    pub headers: bool,

    /// Spool response bodies to temporary files instead of memory
    #[arg(long)]
    pub temp_files: bool,

    /// Lower-case response bodies as they arrive
    #[arg(long)]
    pub lowercase: bool,

    /// Release results in chunks of this size
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk: Option<u64>,

    /// Do not wait for readiness between progress passes
    #[arg(long)]
    pub no_select: bool,

    /// Per-request timeout in seconds [default: 60]
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Read defaults from this config file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["batchfetch"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.urls.is_empty());
        assert_eq!(args.concurrency, None);
        assert_eq!(args.rate, None);
        assert!(!args.non_blocking);
        assert!(!args.no_select);
    }

    #[test]
    fn test_cli_positional_urls() {
        let args =
            Args::try_parse_from(["batchfetch", "https://a.example", "https://b.example"]).unwrap();
        assert_eq!(args.urls, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["batchfetch", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["batchfetch", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["batchfetch", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["batchfetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["batchfetch", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Concurrency Tests ====================

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["batchfetch", "-c", "1000"]).unwrap();
        assert_eq!(args.concurrency, Some(1000));

        let err = Args::try_parse_from(["batchfetch", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let err = Args::try_parse_from(["batchfetch", "-c", "1001"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    // ==================== Rate Limit Tests ====================

    #[test]
    fn test_cli_rate_limit_flags() {
        let args = Args::try_parse_from([
            "batchfetch",
            "--rate",
            "5",
            "--cycle-ms",
            "2000",
            "--non-blocking",
            "--pacing",
            "0.5",
        ])
        .unwrap();
        assert_eq!(args.rate, Some(5));
        assert_eq!(args.cycle_ms, Some(2000));
        assert!(args.non_blocking);
        assert_eq!(args.pacing, Some(0.5));
    }

    #[test]
    fn test_cli_rate_zero_rejected() {
        let err = Args::try_parse_from(["batchfetch", "--rate", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    // ==================== Output Tests ====================

    #[test]
    fn test_cli_body_and_chunk_flags() {
        let args = Args::try_parse_from([
            "batchfetch",
            "--temp-files",
            "--lowercase",
            "--headers",
            "--chunk",
            "3",
            "--no-select",
        ])
        .unwrap();
        assert!(args.temp_files);
        assert!(args.lowercase);
        assert!(args.headers);
        assert_eq!(args.chunk, Some(3));
        assert!(args.no_select);
    }

    #[test]
    fn test_cli_chunk_zero_rejected() {
        let err = Args::try_parse_from(["batchfetch", "--chunk", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
