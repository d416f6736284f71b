use std::os::unix::fs::PermissionsExt;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tracing::instrument;

use crate::progress;
use crate::rules::RuleSet;

/// Why a single file could not be (fully) transformed.
#[derive(Debug, thiserror::Error)]
pub enum Cause {
    #[error("cannot open {path:?} for reading: {source}")]
    OpenSource {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot open {path:?} for writing: {source}")]
    OpenDestination {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed reading {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed writing {path:?}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for file transforms that keeps the work done before the failure.
///
/// Anything already written to the destination stays there; `summary` accounts for it.
#[derive(Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    pub cause: Cause,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(cause: Cause, summary: Summary) -> Self {
        let summary = Summary {
            files_failed: 1,
            ..summary
        };
        Error { cause, summary }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files_transformed: usize,
    pub files_failed: usize,
    pub lines_written: u64,
    pub replacements: u64,
    pub bytes_written: u64,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_transformed: self.files_transformed + other.files_transformed,
            files_failed: self.files_failed + other.files_failed,
            lines_written: self.lines_written + other.lines_written,
            replacements: self.replacements + other.replacements,
            bytes_written: self.bytes_written + other.bytes_written,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "files transformed: {}\n\
            files failed: {}\n\
            lines written: {}\n\
            replacements: {}\n\
            bytes written: {}",
            self.files_transformed,
            self.files_failed,
            self.lines_written,
            self.replacements,
            bytesize::ByteSize(self.bytes_written),
        )
    }
}

/// One source file and the destination path it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub src: std::path::PathBuf,
    pub dst: std::path::PathBuf,
}

impl FileTask {
    /// Maps `src` (a path under `src_root`) to the same relative path under `dst_root`.
    pub fn new(
        src_root: &std::path::Path,
        dst_root: &std::path::Path,
        src: std::path::PathBuf,
    ) -> Result<Self, std::path::StripPrefixError> {
        let dst = dst_root.join(src.strip_prefix(src_root)?);
        Ok(Self { src, dst })
    }
}

/// Strips the line terminator (`\n` or `\r\n`) from a line returned by `read_until`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Streams `task.src` line by line through `rules` into `task.dst`.
///
/// Parent directories of the destination are created as needed and the destination gets the
/// permission bits of the source. Each output line is terminated with `\n`, including the last
/// one. Output is buffered and flushed once the source is exhausted.
#[instrument(skip(prog_track, rules))]
pub async fn transform_file(
    prog_track: &'static progress::Progress,
    rules: &RuleSet,
    task: &FileTask,
) -> Result<Summary, Error> {
    let _ops_guard = prog_track.ops.guard();
    tracing::debug!("opening 'src' for reading");
    let reader = tokio::fs::File::open(&task.src).await.map_err(|source| {
        Error::new(
            Cause::OpenSource {
                path: task.src.clone(),
                source,
            },
            Default::default(),
        )
    })?;
    let src_metadata = reader.metadata().await.map_err(|source| {
        Error::new(
            Cause::OpenSource {
                path: task.src.clone(),
                source,
            },
            Default::default(),
        )
    })?;
    let mode = src_metadata.permissions().mode() & 0o7777;
    let open_dst_error = |source: std::io::Error| {
        Error::new(
            Cause::OpenDestination {
                path: task.dst.clone(),
                source,
            },
            Default::default(),
        )
    };
    if let Some(parent) = task.dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(open_dst_error)?;
    }
    tracing::debug!("opening 'dst' for writing");
    let writer = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .mode(mode)
        .open(&task.dst)
        .await
        .map_err(open_dst_error)?;
    // the mode passed to open() is subject to umask
    let dst_mode = writer
        .metadata()
        .await
        .map_err(open_dst_error)?
        .permissions()
        .mode()
        & 0o7777;
    if dst_mode != mode {
        tracing::debug!("setting permissions to {:o}", mode);
        writer
            .set_permissions(std::fs::Permissions::from_mode(mode))
            .await
            .map_err(open_dst_error)?;
    }
    let mut reader = tokio::io::BufReader::new(reader);
    let mut writer = tokio::io::BufWriter::new(writer);
    let mut summary = Summary::default();
    let write_error = |source: std::io::Error, summary: Summary| {
        Error::new(
            Cause::Write {
                path: task.dst.clone(),
                source,
            },
            summary,
        )
    };
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await.map_err(|source| {
            Error::new(
                Cause::Read {
                    path: task.src.clone(),
                    source,
                },
                summary,
            )
        })?;
        if read == 0 {
            break;
        }
        let rewrite = rules.rewrite_line(trim_line_ending(&buf));
        if let Err(source) = writer.write_all(&rewrite.line).await {
            return Err(write_error(source, summary));
        }
        if let Err(source) = writer.write_all(b"\n").await {
            return Err(write_error(source, summary));
        }
        let written = rewrite.line.len() as u64 + 1;
        summary.lines_written += 1;
        summary.replacements += rewrite.replacements as u64;
        summary.bytes_written += written;
        prog_track.lines_written.inc();
        prog_track.replacements.add(rewrite.replacements as u64);
        prog_track.bytes_written.add(written);
    }
    if let Err(source) = writer.flush().await {
        return Err(write_error(source, summary));
    }
    summary.files_transformed = 1;
    Ok(summary)
}
