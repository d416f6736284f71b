use async_recursion::async_recursion;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
#[error("cannot traverse {path:?}: {source}")]
pub struct TraversalError {
    pub path: std::path::PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl TraversalError {
    fn new(path: &std::path::Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_owned(),
            source,
        }
    }
}

/// Every non-directory path found under a root, plus the subtrees that could not be read.
#[derive(Debug, Default)]
pub struct Listing {
    pub files: Vec<std::path::PathBuf>,
    pub errors: Vec<TraversalError>,
}

impl std::ops::Add for Listing {
    type Output = Self;
    fn add(mut self, other: Self) -> Self {
        self.files.extend(other.files);
        self.errors.extend(other.errors);
        self
    }
}

/// Collects all non-directory entries under `root`.
///
/// Returned paths are rooted at `root` (i.e. `root.join(relative)`). Subdirectories are listed
/// concurrently so the order of `files` is unspecified. Symlinks are resolved: a link to a file
/// is listed, a link to a directory is skipped (never followed) and a dangling link is reported
/// as an error. An unreadable directory is reported once and its subtree is left out.
#[instrument]
pub async fn walk(root: &std::path::Path) -> Listing {
    match tokio::fs::metadata(root).await {
        Ok(metadata) if metadata.is_dir() => walk_dir(root.to_owned()).await,
        Ok(_) => Listing {
            errors: vec![TraversalError::new(
                root,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            )],
            ..Default::default()
        },
        Err(error) => Listing {
            errors: vec![TraversalError::new(root, error)],
            ..Default::default()
        },
    }
}

#[async_recursion]
async fn walk_dir(path: std::path::PathBuf) -> Listing {
    tracing::debug!("listing {:?}", &path);
    let mut listing = Listing::default();
    let mut entries = match tokio::fs::read_dir(&path).await {
        Ok(entries) => entries,
        Err(error) => {
            listing.errors.push(TraversalError::new(&path, error));
            return listing;
        }
    };
    let mut join_set = tokio::task::JoinSet::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                listing.errors.push(TraversalError::new(&path, error));
                break;
            }
        };
        let entry_path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(error) => {
                listing.errors.push(TraversalError::new(&entry_path, error));
                continue;
            }
        };
        if file_type.is_dir() {
            join_set.spawn(walk_dir(entry_path));
            continue;
        }
        if file_type.is_symlink() {
            match tokio::fs::metadata(&entry_path).await {
                Ok(metadata) if metadata.is_dir() => {
                    tracing::debug!("not following directory symlink {:?}", &entry_path);
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    listing.errors.push(TraversalError::new(&entry_path, error));
                    continue;
                }
            }
        }
        listing.files.push(entry_path);
    }
    while let Some(res) = join_set.join_next().await {
        match res {
            Ok(sub_listing) => listing = listing + sub_listing,
            Err(error) => {
                listing.errors.push(TraversalError::new(
                    &path,
                    std::io::Error::other(format!("directory listing task failed: {error}")),
                ));
            }
        }
    }
    listing
}
