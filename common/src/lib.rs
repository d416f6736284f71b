//! Shared implementation of the `ranon` tool.
//!
//! `ranon` copies a directory tree while rewriting the contents of every file line by line:
//! each configured pattern (case-insensitive) is replaced by a fixed placeholder token. The
//! relative layout of the tree and the permission bits of every file are preserved.
//!
//! # Modules
//!
//! - [`walk`] - enumerates every non-directory entry of the source tree
//! - [`rules`] - replacement rules and the line rewriter
//! - [`transform`] - rewrites a single file into its destination
//! - [`anonymize`] - resets the destination and runs all file tasks on a bounded worker pool
//! - [`progress`] - progress counters and their renderers
//! - [`config`] - runtime, output and progress configuration
//!
//! # Error handling
//!
//! Errors affecting a single file (cannot open, read or write it) and errors while walking the
//! source tree are logged and the run continues. Only setup errors (invalid rules, destination
//! cannot be reset, runtime cannot start) fail the run. See [`run`].

#[macro_use]
extern crate lazy_static;

use std::io::IsTerminal;

pub mod anonymize;
pub mod config;
pub mod progress;
pub mod rules;
pub mod transform;
pub mod walk;

#[cfg(test)]
mod testutils;

pub use anonymize::Settings;
pub use config::{OutputConfig, ProgressSettings, ProgressType, RuntimeConfig};
pub use transform::Summary;

lazy_static! {
    static ref PROGRESS: progress::Progress = progress::Progress::new();
}

/// Anonymizes `src` into `dst` using the process-wide progress counters.
pub async fn anonymize(
    src: &std::path::Path,
    dst: &std::path::Path,
    rules: std::sync::Arc<rules::RuleSet>,
    settings: &Settings,
) -> anyhow::Result<Summary> {
    anonymize::anonymize(&PROGRESS, src, dst, rules, settings).await
}

struct ProgressTracker {
    stop: std::sync::mpsc::Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

impl ProgressTracker {
    fn start(settings: &ProgressSettings) -> anyhow::Result<Self> {
        let progress_type = settings
            .progress_type
            .resolve(std::io::stderr().is_terminal());
        let delay = settings.delay(progress_type)?;
        let (stop, stop_receiver) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            let wait = || {
                matches!(
                    stop_receiver.recv_timeout(delay),
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout)
                )
            };
            match progress_type {
                ProgressType::ProgressBar => {
                    let printer = progress::ProgressBarPrinter::new(&PROGRESS);
                    while wait() {
                        printer.update();
                    }
                    printer.finish();
                }
                _ => {
                    let mut printer = progress::ProgressPrinter::new(&PROGRESS);
                    while wait() {
                        eprintln!("{}", printer.print());
                    }
                    eprintln!("{}", printer.print());
                }
            }
        });
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        // a closed channel also stops the thread, so a failed send is fine
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("progress thread panicked");
        }
    }
}

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(output.log_level())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error"));
    // a subscriber may already be installed (e.g. by tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Sets up logging, the tokio runtime and progress reporting, then runs `func` to completion.
///
/// Prints the elapsed time (and the summary if requested) to stdout. Returns `None` if setup
/// failed or `func` returned an error; the error is logged to stderr unless `quiet` is set.
pub fn run<Fut>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start tokio runtime: {error}");
            }
            return None;
        }
    };
    let start = std::time::Instant::now();
    let tracker = match progress.as_ref().map(ProgressTracker::start).transpose() {
        Ok(tracker) => tracker,
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            return None;
        }
    };
    let res = tokio_runtime.block_on(func());
    if let Some(tracker) = tracker {
        tracker.stop();
    }
    match res {
        Ok(summary) => {
            let elapsed = std::time::Duration::from_millis(start.elapsed().as_millis() as u64);
            println!("Took {}", humantime::format_duration(elapsed));
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}
