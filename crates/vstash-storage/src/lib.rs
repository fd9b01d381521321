//! # vstash-storage
//!
//! File operations against the storage tree, addressed only by
//! [`CanonicalPath`]. Callers authorize first; this crate never re-checks
//! scope.
//!
//! ## Directory lifecycle
//!
//! ```text
//! write("a/b/c.txt")   mkdir -p a/b, then stream c.txt
//! delete("a/b/c.txt")  unlink c.txt, then rmdir b, rmdir a while empty
//! list("new/dir")      mkdir -p new/dir, return []
//! ```
//!
//! The root itself is never written as a file and never removed. Paths that
//! run through a symbolic link below the root are refused, and links are
//! left out of listings.

mod item;

pub use item::{ItemKind, StorageItem};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::field::display;
use tracing::instrument;
use vstash_config::{log_store_debug, log_store_info, log_store_warn};
use vstash_path::CanonicalPath;

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(CanonicalPath),

    #[error("Is a directory: {0}")]
    IsDirectory(CanonicalPath),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("The storage root cannot be deleted")]
    RootDeletion,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The storage tree rooted at one directory.
#[derive(Debug, Clone)]
pub struct StorageEngine {
    root: PathBuf,
    atomic_writes: bool,
}

impl StorageEngine {
    /// Open the tree at `root`, creating it if needed.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        let root = fs::canonicalize(root.as_ref()).await?;
        log_store_debug!("Opened storage root", root = display(root.display()));
        Ok(Self {
            root,
            atomic_writes: false,
        })
    }

    /// Write to a temporary sibling and rename into place, so readers never
    /// observe a partial file. Off by default.
    pub fn with_atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, path: &CanonicalPath) -> PathBuf {
        path.to_absolute(&self.root)
    }

    /// Walk `path` from the root and refuse it if a component is a symbolic
    /// link. With `include_last` false the final component is not checked.
    async fn refuse_symlinks(&self, path: &CanonicalPath, include_last: bool) -> Result<()> {
        let segments: Vec<&str> = path.segments().collect();
        let checked = if include_last {
            segments.len()
        } else {
            segments.len().saturating_sub(1)
        };

        let mut abs = self.root.clone();
        for segment in &segments[..checked] {
            abs.push(segment);
            match fs::symlink_metadata(&abs).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    log_store_warn!("Refused symlinked path", path = display(path));
                    return Err(StorageError::InvalidTarget(format!(
                        "{path} passes through a symbolic link"
                    )));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Stream `body` into the file at `path`, creating missing parents.
    ///
    /// Returns the number of bytes written. Without atomic writes a failed
    /// stream leaves the partial file in place.
    #[instrument(skip_all, fields(path = %path), level = "debug")]
    pub async fn write<R>(&self, path: &CanonicalPath, body: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if path.is_root() {
            return Err(StorageError::InvalidTarget(
                "the storage root is not a file".to_string(),
            ));
        }

        self.refuse_symlinks(path, true).await?;
        let abs = self.absolute(path);
        match fs::metadata(&abs).await {
            Ok(meta) if meta.is_dir() => return Err(StorageError::IsDirectory(path.clone())),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // A file where a parent directory should be
        for ancestor in path.ancestors().filter(|a| !a.is_root()) {
            match fs::metadata(self.absolute(&ancestor)).await {
                Ok(meta) if !meta.is_dir() => {
                    return Err(StorageError::InvalidTarget(format!(
                        "{ancestor} is a file"
                    )))
                }
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).await?;
        }

        let written = if self.atomic_writes {
            self.write_atomic(&abs, body).await?
        } else {
            let mut file = File::create(&abs).await?;
            let n = tokio::io::copy(body, &mut file).await?;
            file.flush().await?;
            n
        };

        log_store_info!("Wrote file", path = display(path), bytes = written);
        Ok(written)
    }

    async fn write_atomic<R>(&self, abs: &Path, body: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = abs.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&temp_path).await?;
            let n = tokio::io::copy(body, &mut file).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, abs).await?;
            Ok::<u64, io::Error>(n)
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp_path).await;
        }
        Ok(result?)
    }

    /// Open a file for streaming. Returns the handle and its length.
    #[instrument(skip_all, fields(path = %path), level = "debug")]
    pub async fn read(&self, path: &CanonicalPath) -> Result<(File, u64)> {
        self.refuse_symlinks(path, true).await?;
        let abs = self.absolute(path);
        let meta = match fs::metadata(&abs).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            return Err(StorageError::IsDirectory(path.clone()));
        }
        let file = File::open(&abs).await?;
        Ok((file, meta.len()))
    }

    /// Describe whatever is at `path`, if anything.
    pub async fn stat(&self, path: &CanonicalPath) -> Result<Option<StorageItem>> {
        self.refuse_symlinks(path, true).await?;
        match fs::metadata(self.absolute(path)).await {
            Ok(meta) => Ok(Some(StorageItem::from_metadata(path.clone(), &meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Entries of the directory at `path`: folders first, then by name.
    ///
    /// A missing directory is created and listed as empty.
    #[instrument(skip_all, fields(path = %path), level = "debug")]
    pub async fn list(&self, path: &CanonicalPath) -> Result<Vec<StorageItem>> {
        self.refuse_symlinks(path, true).await?;
        let abs = self.absolute(path);
        match fs::metadata(&abs).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StorageError::InvalidTarget(format!(
                    "{path} is a file, not a directory"
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&abs).await?;
                log_store_debug!("Created directory for listing", path = display(path));
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        }

        let mut items = Vec::new();
        let mut entries = fs::read_dir(&abs).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                log_store_warn!("Skipping non-UTF-8 entry", dir = display(path));
                continue;
            };
            // In-flight atomic write
            if name.starts_with('.') && name.ends_with(".tmp") {
                continue;
            }
            let Ok(relative) = path.join(&name) else {
                log_store_warn!("Skipping unaddressable entry", name = name.as_str());
                continue;
            };
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.file_type().is_symlink() {
                continue;
            }
            items.push(StorageItem::from_metadata(relative, &meta));
        }

        items.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        Ok(items)
    }

    /// Remove a file or directory tree, then prune ancestors left empty.
    ///
    /// Pruning stops at the first non-empty ancestor and never reaches the
    /// root. Pruning failures do not fail the delete.
    pub async fn delete(&self, path: &CanonicalPath) -> Result<()> {
        self.delete_within(path, &CanonicalPath::root()).await
    }

    /// [`delete`](Self::delete), with pruning confined to directories
    /// strictly below `base`.
    #[instrument(skip_all, fields(path = %path, base = %base), level = "debug")]
    pub async fn delete_within(&self, path: &CanonicalPath, base: &CanonicalPath) -> Result<()> {
        if path.is_root() {
            return Err(StorageError::RootDeletion);
        }

        // The link itself may go; nothing above it may be one.
        self.refuse_symlinks(path, false).await?;
        let abs = self.absolute(path);
        let meta = match fs::symlink_metadata(&abs).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let removed = if meta.is_dir() {
            fs::remove_dir_all(&abs).await
        } else {
            fs::remove_file(&abs).await
        };
        match removed {
            Ok(()) => {}
            // Lost a race with another deleter
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.clone()))
            }
            Err(e) => return Err(e.into()),
        }
        log_store_info!("Deleted", path = display(path));

        self.prune_empty_ancestors(path, base).await;
        Ok(())
    }

    async fn prune_empty_ancestors(&self, path: &CanonicalPath, base: &CanonicalPath) {
        for dir in path.ancestors().take_while(|a| a.is_below(base)) {
            match fs::remove_dir(self.absolute(&dir)).await {
                Ok(()) => log_store_debug!("Pruned empty directory", dir = display(&dir)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                // Not empty, or not ours to remove
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vstash_path::canonicalize;

    fn p(s: &str) -> CanonicalPath {
        canonicalize(s).unwrap()
    }

    async fn engine() -> (TempDir, StorageEngine) {
        let temp = TempDir::new().unwrap();
        let engine = StorageEngine::open(temp.path().join("storage")).await.unwrap();
        (temp, engine)
    }

    async fn put(engine: &StorageEngine, path: &str, data: &[u8]) {
        let mut body = data;
        engine.write(&p(path), &mut body).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let (_temp, engine) = engine().await;
        let mut body: &[u8] = b"hello";
        let n = engine.write(&p("a/b/c.txt"), &mut body).await.unwrap();

        assert_eq!(n, 5);
        let on_disk = std::fs::read(engine.root().join("a/b/c.txt")).unwrap();
        assert_eq!(on_disk, b"hello");
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let (_temp, engine) = engine().await;
        put(&engine, "f.txt", b"first version").await;
        put(&engine, "f.txt", b"second").await;
        assert_eq!(std::fs::read(engine.root().join("f.txt")).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_write_refuses_root_and_directories() {
        let (_temp, engine) = engine().await;
        put(&engine, "docs/a.txt", b"x").await;

        let mut body: &[u8] = b"y";
        assert!(matches!(
            engine.write(&CanonicalPath::root(), &mut body).await,
            Err(StorageError::InvalidTarget(_))
        ));
        assert!(matches!(
            engine.write(&p("docs"), &mut body).await,
            Err(StorageError::IsDirectory(_))
        ));
        assert!(matches!(
            engine.write(&p("docs/a.txt/nested"), &mut body).await,
            Err(StorageError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_files() {
        let (_temp, engine) = engine().await;
        let engine = engine.with_atomic_writes(true);
        put(&engine, "d/file.bin", &[7u8; 4096]).await;

        let names: Vec<String> = std::fs::read_dir(engine.root().join("d"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["file.bin"]);
        assert_eq!(std::fs::read(engine.root().join("d/file.bin")).unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_read() {
        use tokio::io::AsyncReadExt;

        let (_temp, engine) = engine().await;
        put(&engine, "docs/a.txt", b"content").await;

        let (mut file, len) = engine.read(&p("docs/a.txt")).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(len, 7);
        assert_eq!(buf, b"content");

        assert!(matches!(
            engine.read(&p("docs/missing")).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            engine.read(&p("docs")).await,
            Err(StorageError::IsDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_temp, engine) = engine().await;
        put(&engine, "docs/a.txt", b"abc").await;

        let file = engine.stat(&p("docs/a.txt")).await.unwrap().unwrap();
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.kind, ItemKind::File);
        assert_eq!(file.size, Some(3));

        let dir = engine.stat(&p("docs")).await.unwrap().unwrap();
        assert!(dir.is_folder());
        assert_eq!(dir.size, None);

        assert!(engine.stat(&p("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_folders_first() {
        let (_temp, engine) = engine().await;
        put(&engine, "b.txt", b"1").await;
        put(&engine, "a.txt", b"1").await;
        put(&engine, "zeta/x", b"1").await;
        put(&engine, "alpha/y", b"1").await;

        let names: Vec<String> = engine
            .list(&CanonicalPath::root())
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta", "a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_list_missing_directory_creates_it() {
        let (_temp, engine) = engine().await;
        let items = engine.list(&p("fresh/dir")).await.unwrap();
        assert!(items.is_empty());
        assert!(engine.root().join("fresh/dir").is_dir());
    }

    #[tokio::test]
    async fn test_list_relative_paths() {
        let (_temp, engine) = engine().await;
        put(&engine, "docs/sub/a.txt", b"1").await;

        let items = engine.list(&p("docs")).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative_path, p("docs/sub"));
        assert!(items[0].is_folder());

        assert!(matches!(
            engine.list(&p("docs/sub/a.txt")).await,
            Err(StorageError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_empty_parents() {
        let (_temp, engine) = engine().await;
        put(&engine, "a/b/c/only.txt", b"1").await;

        engine.delete(&p("a/b/c/only.txt")).await.unwrap();

        assert!(!engine.root().join("a").exists());
        assert!(engine.root().exists());
    }

    #[tokio::test]
    async fn test_delete_stops_at_non_empty_ancestor() {
        let (_temp, engine) = engine().await;
        put(&engine, "a/b/c/only.txt", b"1").await;
        put(&engine, "a/keep.txt", b"1").await;

        engine.delete(&p("a/b/c/only.txt")).await.unwrap();

        assert!(!engine.root().join("a/b").exists());
        assert!(engine.root().join("a/keep.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_within_keeps_base() {
        let (_temp, engine) = engine().await;
        put(&engine, "uploads/img/pic.png", b"1").await;

        engine
            .delete_within(&p("uploads/img/pic.png"), &p("uploads"))
            .await
            .unwrap();

        assert!(!engine.root().join("uploads/img").exists());
        assert!(engine.root().join("uploads").is_dir());
    }

    #[tokio::test]
    async fn test_delete_within_unrelated_base_prunes_nothing() {
        let (_temp, engine) = engine().await;
        put(&engine, "a/b/c.txt", b"1").await;

        engine
            .delete_within(&p("a/b/c.txt"), &p("elsewhere"))
            .await
            .unwrap();

        assert!(!engine.root().join("a/b/c.txt").exists());
        assert!(engine.root().join("a/b").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escaping_root_refused() {
        let (temp, engine) = engine().await;
        let outside = temp.path().join("outside");
        std::fs::create_dir(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(&outside, engine.root().join("link")).unwrap();

        assert!(matches!(
            engine.read(&p("link/secret.txt")).await,
            Err(StorageError::InvalidTarget(_))
        ));
        assert!(matches!(
            engine.stat(&p("link")).await,
            Err(StorageError::InvalidTarget(_))
        ));
        assert!(matches!(
            engine.list(&p("link")).await,
            Err(StorageError::InvalidTarget(_))
        ));
        let mut body: &[u8] = b"overwrite";
        assert!(matches!(
            engine.write(&p("link/secret.txt"), &mut body).await,
            Err(StorageError::InvalidTarget(_))
        ));
        assert!(matches!(
            engine.delete(&p("link/secret.txt")).await,
            Err(StorageError::InvalidTarget(_))
        ));
        assert_eq!(std::fs::read(outside.join("secret.txt")).unwrap(), b"secret");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_hidden_from_listing_and_deletable() {
        let (temp, engine) = engine().await;
        put(&engine, "dir/real.txt", b"1").await;
        std::os::unix::fs::symlink(temp.path(), engine.root().join("dir/link")).unwrap();

        let names: Vec<String> = engine
            .list(&p("dir"))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["real.txt"]);

        engine.delete(&p("dir/link")).await.unwrap();
        assert!(temp.path().exists());
        assert!(engine.root().join("dir/real.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_directory_recursively() {
        let (_temp, engine) = engine().await;
        put(&engine, "proj/src/main.rs", b"1").await;
        put(&engine, "proj/README", b"1").await;

        engine.delete(&p("proj")).await.unwrap();
        assert!(!engine.root().join("proj").exists());
    }

    #[tokio::test]
    async fn test_delete_root_refused() {
        let (_temp, engine) = engine().await;
        assert!(matches!(
            engine.delete(&CanonicalPath::root()).await,
            Err(StorageError::RootDeletion)
        ));
        assert!(engine.root().exists());
    }

    #[tokio::test]
    async fn test_second_delete_is_not_found() {
        let (_temp, engine) = engine().await;
        put(&engine, "x/y.txt", b"1").await;

        engine.delete(&p("x/y.txt")).await.unwrap();
        assert!(matches!(
            engine.delete(&p("x/y.txt")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_prune_tolerates_vanished_ancestor() {
        let (_temp, engine) = engine().await;
        put(&engine, "a/b/c.txt", b"1").await;
        std::fs::remove_file(engine.root().join("a/b/c.txt")).unwrap();
        std::fs::remove_dir(engine.root().join("a/b")).unwrap();

        // Nothing left to prune below "a"; it still goes.
        engine
            .prune_empty_ancestors(&p("a/b/c.txt"), &CanonicalPath::root())
            .await;
        assert!(!engine.root().join("a").exists());
        assert!(engine.root().exists());
    }
}
