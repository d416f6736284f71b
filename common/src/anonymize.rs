//! Concurrent anonymization of a whole directory tree.
//!
//! The run goes through the following stages:
//!
//! 1. the destination root is removed (if present) and recreated empty,
//! 2. the source tree is enumerated into a list of [`FileTask`]s,
//! 3. the tasks are queued and drained by a bounded pool of worker tasks,
//! 4. every worker sends one completion per finished task; a watcher closes the completion
//!    channel once all workers are done, which ends the collecting loop after exactly as many
//!    completions as there were tasks.
//!
//! Per-file errors are logged and counted, they never stop other files or the run itself.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::instrument;

use crate::progress;
use crate::rules::RuleSet;
use crate::transform::{self, FileTask, Summary};
use crate::walk;

#[derive(Debug, Copy, Clone, Default)]
pub struct Settings {
    /// Maximum number of files processed at the same time (0 = number of CPU cores)
    pub max_jobs: usize,
}

impl Settings {
    #[must_use]
    pub fn jobs(&self) -> usize {
        if self.max_jobs == 0 {
            num_cpus::get()
        } else {
            self.max_jobs
        }
    }
}

type Completion = Result<Summary, transform::Error>;

/// Refuses destinations that would delete the source when reset.
async fn check_roots(src: &std::path::Path, dst: &std::path::Path) -> anyhow::Result<()> {
    let src = match tokio::fs::canonicalize(src).await {
        Ok(src) => src,
        // a missing source is reported by the walk
        Err(_) => return Ok(()),
    };
    let dst = match tokio::fs::canonicalize(dst).await {
        Ok(dst) => dst,
        Err(_) => return Ok(()),
    };
    if src.starts_with(&dst) {
        return Err(anyhow!(
            "destination {:?} contains source {:?}, refusing to remove it",
            dst,
            src
        ));
    }
    Ok(())
}

/// Removes `dst` (file or directory tree) if it exists and creates it as an empty directory.
#[instrument]
async fn reset_destination(dst: &std::path::Path) -> anyhow::Result<()> {
    match tokio::fs::symlink_metadata(dst).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(dst)
            .await
            .with_context(|| format!("failed removing directory {:?}", dst))?,
        Ok(_) => tokio::fs::remove_file(dst)
            .await
            .with_context(|| format!("failed removing {:?}", dst))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error).with_context(|| format!("failed reading metadata from {:?}", dst));
        }
    }
    tokio::fs::create_dir_all(dst)
        .await
        .with_context(|| format!("cannot create destination directory {:?}", dst))?;
    Ok(())
}

/// Mirrors `src` into a freshly reset `dst`, rewriting every file with `rules`.
///
/// Only setup failures (overlapping roots, destination cannot be reset) are returned as errors.
#[instrument(skip(prog_track, rules))]
pub async fn anonymize(
    prog_track: &'static progress::Progress,
    src: &std::path::Path,
    dst: &std::path::Path,
    rules: Arc<RuleSet>,
    settings: &Settings,
) -> anyhow::Result<Summary> {
    check_roots(src, dst).await?;
    reset_destination(dst).await?;
    let listing = walk::walk(src).await;
    for error in &listing.errors {
        tracing::error!("{}", error);
    }
    let tasks = listing
        .files
        .into_iter()
        .filter_map(|path| match FileTask::new(src, dst, path) {
            Ok(task) => Some(task),
            Err(error) => {
                tracing::error!("cannot map source path to destination: {}", error);
                None
            }
        })
        .collect::<Vec<_>>();
    tracing::info!("anonymizing {} files", tasks.len());
    Ok(run_tasks(prog_track, tasks, rules, settings).await)
}

/// Runs `tasks` on a pool of `settings.jobs()` workers and collects their completions.
#[instrument(skip_all, fields(tasks = tasks.len()))]
async fn run_tasks(
    prog_track: &'static progress::Progress,
    tasks: Vec<FileTask>,
    rules: Arc<RuleSet>,
    settings: &Settings,
) -> Summary {
    prog_track.set_total(tasks.len() as u64);
    let workers_count = settings.jobs().min(tasks.len());
    let (task_sender, task_receiver) = async_channel::bounded::<FileTask>(tasks.len().max(1));
    for task in tasks {
        // capacity covers every task and the receiver is alive
        if let Err(error) = task_sender.try_send(task) {
            tracing::error!("cannot queue {:?}", error.into_inner().src);
        }
    }
    task_sender.close();
    let (done_sender, mut done_receiver) = tokio::sync::mpsc::unbounded_channel::<Completion>();
    let mut workers = tokio::task::JoinSet::new();
    for _ in 0..workers_count {
        let task_receiver = task_receiver.clone();
        let done_sender = done_sender.clone();
        let rules = rules.clone();
        workers.spawn(async move {
            while let Ok(task) = task_receiver.recv().await {
                let completion = transform::transform_file(prog_track, &rules, &task).await;
                if done_sender.send(completion).is_err() {
                    tracing::debug!("completion channel closed, stopping worker");
                    break;
                }
            }
        });
    }
    drop(task_receiver);
    let watcher = tokio::spawn(async move {
        while let Some(res) = workers.join_next().await {
            if let Err(error) = res {
                tracing::error!("worker task failed: {}", error);
            }
        }
        // the last sender goes away here, which closes the completion channel
        drop(done_sender);
    });
    let mut summary = Summary::default();
    while let Some(completion) = done_receiver.recv().await {
        prog_track.files_completed.inc();
        match completion {
            Ok(file_summary) => summary = summary + file_summary,
            Err(error) => {
                tracing::error!("{}", &error);
                prog_track.files_failed.inc();
                summary = summary + error.summary;
            }
        }
    }
    if let Err(error) = watcher.await {
        tracing::error!("completion watcher failed: {}", error);
    }
    summary
}
