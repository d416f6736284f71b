use anyhow::{Context, Result};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ranon",
    version,
    about = "Copy a directory tree, replacing sensitive words in every file",
    long_about = "`ranon` mirrors a source directory into a destination directory, rewriting every file line by line.

Each line has the following replacements applied (case-insensitive, in this order):
    amet -> AMET_REPLACE
    enim -> ENIM_REPLACE

Relative paths and file permissions are preserved. Files that cannot be read are reported and
skipped; the rest of the tree is still processed.

EXAMPLE:
    # Anonymize ./data into ./data-anon with a summary at the end
    ranon ./data ./data-anon --summary

Note: the destination directory is REMOVED before the run, without confirmation."
)]
struct Args {
    // Progress & output
    /// Do not show progress
    #[arg(long, conflicts_with_all = ["progress_type", "progress_delay"], help_heading = "Progress & output")]
    no_progress: bool,

    /// Toggles the type of progress to show
    ///
    /// Options are: `ProgressBar` (animated progress bar), `TextUpdates` (appropriate for logging), Auto (default, will
    /// choose between `ProgressBar` or `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=ProgressBar), the default is 200ms.
    /// - For the non-interactive (--progress-type=TextUpdates), the default is 10s.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance
    /// Maximum number of files processed concurrently, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance"
    )]
    max_jobs: usize,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Source directory
    #[arg()]
    src: std::path::PathBuf,

    /// Destination directory (removed and recreated)
    #[arg()]
    dst: std::path::PathBuf,
}

#[instrument]
async fn async_main(args: Args) -> Result<common::Summary> {
    let rules = common::rules::RuleSet::builtin().context("invalid built-in replacement rules")?;
    let settings = common::Settings {
        max_jobs: args.max_jobs,
    };
    common::anonymize(&args.src, &args.dst, std::sync::Arc::new(rules), &settings).await
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary || args.verbose > 0,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let progress = if args.no_progress {
        None
    } else {
        Some(common::ProgressSettings {
            progress_type: args.progress_type.unwrap_or_default(),
            progress_delay: args.progress_delay,
        })
    };
    let res = common::run(progress, output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
