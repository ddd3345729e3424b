//! Bucketed on-disk image library.

use crate::error::{StorageError, StorageResult};
use crate::naming;
use konakore_core::config::LibraryConfig;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

/// A post image found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFile {
    pub post_id: i64,
    pub path: PathBuf,
    pub size: u64,
    /// Lowercased extension, `jpg` when the name has none.
    pub ext: String,
}

/// Local library rooted at one directory.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    bucket_size: i64,
    max_tags_len: usize,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>, bucket_size: i64, max_tags_len: usize) -> Self {
        Self {
            root: root.into(),
            bucket_size: bucket_size.max(1),
            max_tags_len,
        }
    }

    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(config.root.clone(), config.bucket_size, config.max_tags_len)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the given post's files.
    pub fn bucket_dir(&self, post_id: i64) -> PathBuf {
        self.root.join(naming::bucket_name(post_id, self.bucket_size))
    }

    /// Create the bucket directory for a post if it does not exist.
    pub async fn ensure_bucket(&self, post_id: i64) -> StorageResult<PathBuf> {
        let dir = self.bucket_dir(post_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// File name a new download of this post should be saved as.
    pub fn file_name_for(&self, post_id: i64, tags: &[String], ext: &str) -> String {
        naming::build_filename(post_id, tags, ext, self.max_tags_len)
    }

    /// Look for an existing file of this post in its bucket.
    ///
    /// Control files, directories and files aria2 is still writing are ignored.
    /// With several candidates the lexically smallest name wins so the result
    /// is stable.
    #[instrument(skip(self))]
    pub async fn find_existing(&self, post_id: i64) -> StorageResult<Option<LibraryFile>> {
        let dir = self.bucket_dir(post_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut candidates: Vec<(String, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_file()
                && let Some(name) = entry.file_name().to_str()
                && naming::matches_post(name, post_id)
            {
                let path = entry.path();
                if self.is_in_progress(&path).await? {
                    debug!(post_id, path = %path.display(), "skipping partial download");
                    continue;
                }
                candidates.push((name.to_string(), path));
            }
        }

        let Some((name, path)) = candidates.into_iter().min() else {
            return Ok(None);
        };
        let size = fs::metadata(&path).await?.len();
        debug!(post_id, path = %path.display(), "found existing library file");
        Ok(Some(LibraryFile {
            post_id,
            ext: naming::extension_of(&name),
            path,
            size,
        }))
    }

    /// Size of a regular file, `None` when it does not exist.
    pub async fn file_size(&self, path: &Path) -> StorageResult<Option<u64>> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Whether aria2 still holds a control file next to `path`.
    pub async fn is_in_progress(&self, path: &Path) -> StorageResult<bool> {
        let mut control = path.as_os_str().to_owned();
        control.push(naming::CONTROL_FILE_SUFFIX);
        match fs::try_exists(PathBuf::from(control)).await {
            Ok(exists) => Ok(exists),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Size of a finished download at `path`.
    ///
    /// `None` while the file is missing or aria2 is still writing it.
    pub async fn completed_size(&self, path: &Path) -> StorageResult<Option<u64>> {
        if self.is_in_progress(path).await? {
            return Ok(None);
        }
        self.file_size(path).await
    }

    /// Remove a library file. Returns `false` if it was already gone.
    ///
    /// Paths outside the library root are refused.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn remove(&self, path: &Path) -> StorageResult<bool> {
        self.ensure_within_root(path)?;
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Walk the whole library and list every post image in it.
    ///
    /// Symlinks are not followed. Files that do not carry a post id are
    /// skipped.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn scan(&self) -> StorageResult<Vec<LibraryFile>> {
        let mut results = Vec::new();

        match fs::try_exists(&self.root).await {
            Ok(false) => return Ok(results),
            Ok(true) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && let Some(name) = entry.file_name().to_str()
                    && let Some(post_id) = naming::parse_post_id(name)
                {
                    let size = entry.metadata().await?.len();
                    results.push(LibraryFile {
                        post_id,
                        ext: naming::extension_of(name),
                        path,
                        size,
                    });
                }
            }
        }

        results.sort_by(|a, b| a.post_id.cmp(&b.post_id).then_with(|| a.path.cmp(&b.path)));
        debug!(files = results.len(), "library scan finished");
        Ok(results)
    }

    /// Verify the root is an accessible directory.
    pub async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("library root {} is not accessible: {}", self.root.display(), e),
            ))
        })?;
        if !metadata.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "library root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    fn ensure_within_root(&self, path: &Path) -> StorageResult<()> {
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(StorageError::InvalidPath(format!(
                "{} is outside the library root",
                path.display()
            )));
        }
        Ok(())
    }
}
