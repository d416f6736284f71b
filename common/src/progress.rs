use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{event, instrument, Level};

#[derive(Debug)]
pub struct TlsCounter {
    // mutex is used primarily from one thread, so it's not a bottleneck
    count: thread_local::ThreadLocal<std::sync::Mutex<u64>>,
}

impl TlsCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: thread_local::ThreadLocal::new(),
        }
    }

    pub fn add(&self, value: u64) {
        let mutex = self.count.get_or(|| std::sync::Mutex::new(0));
        let mut guard = mutex.lock().unwrap();
        *guard += value;
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count.iter().fold(0, |x, y| x + *y.lock().unwrap())
    }
}

impl Default for TlsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ProgressCounter {
    started: TlsCounter,
    finished: TlsCounter,
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressGuard<'a> {
    progress: &'a ProgressCounter,
}

impl<'a> ProgressGuard<'a> {
    pub fn new(progress: &'a ProgressCounter) -> Self {
        progress.started.inc();
        Self { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.finished.inc();
    }
}

pub struct Status {
    pub started: u64,
    pub finished: u64,
}

impl ProgressCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: TlsCounter::new(),
            finished: TlsCounter::new(),
        }
    }

    pub fn guard(&self) -> ProgressGuard<'_> {
        ProgressGuard::new(self)
    }

    #[instrument]
    pub fn get(&self) -> Status {
        let mut status = Status {
            started: self.started.get(),
            finished: self.finished.get(),
        };
        if status.finished > status.started {
            event!(
                Level::DEBUG,
                "Progress inversion - started: {}, finished {}",
                status.started,
                status.finished
            );
            status.started = status.finished;
        }
        status
    }
}

/// Process-wide progress of an anonymization run.
///
/// `files_completed` is bumped exactly once per finished file task (successful or not) by the
/// single consumer of the completion channel; all other counters are updated by the workers.
#[derive(Debug)]
pub struct Progress {
    pub ops: ProgressCounter,
    pub files_completed: TlsCounter,
    pub files_failed: TlsCounter,
    pub lines_written: TlsCounter,
    pub replacements: TlsCounter,
    pub bytes_written: TlsCounter,
    files_total: AtomicU64,
    start_time: std::time::Instant,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Default::default(),
            files_completed: Default::default(),
            files_failed: Default::default(),
            lines_written: Default::default(),
            replacements: Default::default(),
            bytes_written: Default::default(),
            files_total: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    /// Number of file tasks the run will complete; known once enumeration is done.
    pub fn set_total(&self, total: u64) {
        self.files_total.store(total, Ordering::Release);
    }

    pub fn get_total(&self) -> u64 {
        self.files_total.load(Ordering::Acquire)
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// Multi-line status block for non-interactive output (logs, pipes).
pub struct ProgressPrinter<'a> {
    progress: &'a Progress,
    last_files: u64,
    last_bytes: u64,
    last_update: std::time::Instant,
}

impl<'a> ProgressPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        Self {
            progress,
            last_files: progress.files_completed.get(),
            last_bytes: progress.bytes_written.get(),
            last_update: std::time::Instant::now(),
        }
    }

    pub fn print(&mut self) -> String {
        let time_now = std::time::Instant::now();
        let ops = self.progress.ops.get();
        let files = self.progress.files_completed.get();
        let bytes = self.progress.bytes_written.get();
        let total_duration_secs = self.progress.get_duration().as_secs_f64();
        let curr_duration_secs = (time_now - self.last_update).as_secs_f64();
        let average_files_rate = files as f64 / total_duration_secs;
        let current_files_rate = (files - self.last_files) as f64 / curr_duration_secs;
        let average_bytes_rate = bytes as f64 / total_duration_secs;
        let current_bytes_rate = (bytes - self.last_bytes) as f64 / curr_duration_secs;
        self.last_files = files;
        self.last_bytes = bytes;
        self.last_update = time_now;
        format!(
            "-----------------------\n\
            FILES:\n\
            done:    {:>10} / {}\n\
            failed:  {:>10}\n\
            active:  {:>10}\n\
            average: {:>10.2} files/s\n\
            current: {:>10.2} files/s\n\
            -----------------------\n\
            WRITTEN:\n\
            average: {:>10}/s\n\
            current: {:>10}/s\n\
            total:   {:>10}\n\
            lines:        {:>10}\n\
            replacements: {:>10}",
            files,
            self.progress.get_total(),
            self.progress.files_failed.get(),
            ops.started - ops.finished,
            average_files_rate,
            current_files_rate,
            bytesize::ByteSize(average_bytes_rate as u64),
            bytesize::ByteSize(current_bytes_rate as u64),
            bytesize::ByteSize(bytes),
            self.progress.lines_written.get(),
            self.progress.replacements.get(),
        )
    }
}

/// Animated terminal progress bar: one tick per completed file.
pub struct ProgressBarPrinter<'a> {
    progress: &'a Progress,
    bar: indicatif::ProgressBar,
}

impl<'a> ProgressBarPrinter<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        let bar = indicatif::ProgressBar::new(progress.get_total());
        let style = indicatif::ProgressStyle::with_template(
            "{msg} [{bar:15.green/blue}] {pos}/{len} ({elapsed_precise})",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message("[Working...] Anonymizing files...");
        Self { progress, bar }
    }

    pub fn update(&self) {
        self.bar.set_length(self.progress.get_total());
        self.bar.set_position(self.progress.files_completed.get());
    }

    pub fn finish(&self) {
        self.update();
        self.bar.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn workers_update_shared_progress() -> Result<()> {
        let progress = Progress::new();
        progress.set_total(40);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for file in 0..10 {
                        let _guard = progress.ops.guard();
                        progress.lines_written.add(3);
                        progress.replacements.add(2);
                        progress.bytes_written.add(100);
                        if file == 0 {
                            progress.files_failed.inc();
                        }
                        progress.files_completed.inc();
                    }
                });
            }
        });
        assert_eq!(progress.get_total(), 40);
        assert_eq!(progress.files_completed.get(), 40);
        assert_eq!(progress.files_failed.get(), 4);
        assert_eq!(progress.lines_written.get(), 120);
        assert_eq!(progress.replacements.get(), 80);
        assert_eq!(progress.bytes_written.get(), 4000);
        let ops = progress.ops.get();
        assert_eq!((ops.started, ops.finished), (40, 40));
        Ok(())
    }

    #[test]
    fn total_is_replaced_not_accumulated() -> Result<()> {
        let progress = Progress::new();
        assert_eq!(progress.get_total(), 0);
        progress.set_total(7);
        progress.set_total(3);
        assert_eq!(progress.get_total(), 3);
        Ok(())
    }

    #[test]
    fn guard_tracks_active_operations() -> Result<()> {
        let counter = ProgressCounter::new();
        {
            let _guard = counter.guard();
            let status = counter.get();
            assert_eq!(status.started - status.finished, 1);
        }
        let status = counter.get();
        assert_eq!((status.started, status.finished), (1, 1));
        Ok(())
    }

    #[test]
    fn printer_reports_counts() -> Result<()> {
        let progress = Progress::new();
        progress.set_total(5);
        progress.files_completed.add(3);
        progress.files_failed.inc();
        progress.replacements.add(42);
        let mut printer = ProgressPrinter::new(&progress);
        let text = printer.print();
        assert!(text.contains("3 / 5"), "{text}");
        assert!(
            text.contains(&format!("replacements: {:>10}", 42)),
            "{text}"
        );
        Ok(())
    }

    #[test]
    fn bar_follows_completed_files() -> Result<()> {
        let progress = Progress::new();
        progress.set_total(4);
        let printer = ProgressBarPrinter::new(&progress);
        progress.files_completed.add(2);
        printer.update();
        assert_eq!(printer.bar.position(), 2);
        assert_eq!(printer.bar.length(), Some(4));
        printer.finish();
        assert!(printer.bar.is_finished());
        Ok(())
    }
}
