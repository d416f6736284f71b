//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Log filter directive matching the requested verbosity
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressType {
    /// Progress bar when stderr is a terminal, text updates otherwise
    #[default]
    #[value(name = "auto", alias = "Auto")]
    Auto,
    /// Animated progress bar
    #[value(name = "ProgressBar", alias = "progress-bar")]
    ProgressBar,
    /// Periodic text updates, suitable for logs
    #[value(name = "TextUpdates", alias = "text-updates")]
    TextUpdates,
}

impl ProgressType {
    /// Replaces `Auto` with the concrete type for the given terminal state
    #[must_use]
    pub fn resolve(self, is_terminal: bool) -> Self {
        match self {
            ProgressType::Auto if is_terminal => ProgressType::ProgressBar,
            ProgressType::Auto => ProgressType::TextUpdates,
            other => other,
        }
    }
}

/// Progress reporting configuration
#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Human readable delay between updates, e.g. "200ms" (None = default for the type)
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    /// Update interval: explicit delay, or 200ms for the bar and 10s for text updates
    pub fn delay(&self, progress_type: ProgressType) -> anyhow::Result<std::time::Duration> {
        if let Some(delay) = &self.progress_delay {
            return humantime::parse_duration(delay)
                .map_err(|err| anyhow::anyhow!("invalid progress delay {:?}: {}", delay, err));
        }
        Ok(match progress_type {
            ProgressType::ProgressBar => std::time::Duration::from_millis(200),
            _ => std::time::Duration::from_secs(10),
        })
    }
}
