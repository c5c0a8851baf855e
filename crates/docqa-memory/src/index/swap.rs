use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::IndexError;

/// Committed index directory, relative to the session root.
pub const INDEX_DIR: &str = "db";
/// Directory a rebuild writes into before it is committed.
pub const STAGING_DIR: &str = "db.staging";
/// Where the committed index waits while a rebuild is in progress.
pub const PREVIOUS_DIR: &str = "db.previous";
/// Created exclusively for the duration of a rebuild.
pub const LOCK_FILE: &str = "index.lock";

/// Layout of the index-related paths under a session directory.
#[derive(Debug, Clone)]
pub struct IndexDirectory {
    root: PathBuf,
}

impl IndexDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn committed_path(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    #[must_use]
    pub fn previous_path(&self) -> PathBuf {
        self.root.join(PREVIOUS_DIR)
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    #[must_use]
    pub fn has_committed(&self) -> bool {
        self.committed_path().is_dir()
    }

    /// Take the rebuild lock and move the committed index aside, on the blocking pool.
    ///
    /// On success the caller owns a [`RebuildGuard`]; dropping it without
    /// calling [`RebuildGuard::commit`] restores the previous index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Locked`] if another rebuild holds the lock, a leftover
    /// cannot be deleted or the committed index cannot be moved. The committed
    /// index stays in place in that case.
    pub async fn begin(&self) -> Result<RebuildGuard, IndexError> {
        let dir = self.clone();
        tokio::task::spawn_blocking(move || dir.begin_blocking()).await?
    }

    fn begin_blocking(self) -> Result<RebuildGuard, IndexError> {
        std::fs::create_dir_all(&self.root)?;

        let lock = self.lock_path();
        if let Err(e) = OpenOptions::new().write(true).create_new(true).open(&lock) {
            let reason = if e.kind() == ErrorKind::AlreadyExists {
                format!(
                    "{} exists, another rebuild may be running; remove it if it is stale",
                    lock.display()
                )
            } else {
                format!("cannot create {}: {e}", lock.display())
            };
            return Err(IndexError::Locked(reason));
        }

        let mut guard = RebuildGuard {
            dir: self,
            retired: false,
            finished: false,
        };

        if let Err(e) = guard.prepare() {
            guard.finished = true;
            guard.dir.release_lock();
            return Err(e);
        }
        Ok(guard)
    }

    fn release_lock(&self) {
        if let Err(e) = std::fs::remove_file(self.lock_path()) {
            tracing::warn!(path = %self.lock_path().display(), "failed to remove index lock: {e}");
        }
    }
}

fn locked(action: &str, path: &Path, e: &std::io::Error) -> IndexError {
    IndexError::Locked(format!("cannot {action} {}: {e}", path.display()))
}

/// Flush the directory entry so a finished rename survives a crash.
#[cfg(unix)]
fn sync_dir(path: &Path) {
    if let Err(e) = std::fs::File::open(path).and_then(|dir| dir.sync_all()) {
        tracing::warn!(path = %path.display(), "failed to sync directory: {e}");
    }
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) {}

/// An in-progress rebuild holding the index lock.
#[derive(Debug)]
pub struct RebuildGuard {
    dir: IndexDirectory,
    retired: bool,
    finished: bool,
}

impl RebuildGuard {
    /// Clear leftovers of an interrupted rebuild, then retire the committed index.
    fn prepare(&mut self) -> Result<(), IndexError> {
        let committed = self.dir.committed_path();
        let staging = self.dir.staging_path();
        let previous = self.dir.previous_path();

        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| locked("remove", &staging, &e))?;
        }
        if previous.exists() {
            if committed.exists() {
                std::fs::remove_dir_all(&previous).map_err(|e| locked("remove", &previous, &e))?;
            } else {
                tracing::info!("recovering index left aside by an interrupted rebuild");
                std::fs::rename(&previous, &committed)
                    .map_err(|e| locked("restore", &previous, &e))?;
            }
        }

        if committed.exists() {
            std::fs::rename(&committed, &previous)
                .map_err(|e| locked("move aside", &committed, &e))?;
            self.retired = true;
        }
        Ok(())
    }

    /// Directory the new index must be written into.
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.dir.staging_path()
    }

    /// Whether a committed index existed when the rebuild began.
    #[must_use]
    pub fn had_previous(&self) -> bool {
        self.retired
    }

    /// Promote the staging directory to the committed index and release the lock.
    ///
    /// The staging database must be closed before calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails. The previous index is restored first.
    pub async fn commit(self) -> Result<(), IndexError> {
        tokio::task::spawn_blocking(move || self.commit_blocking()).await?
    }

    fn commit_blocking(mut self) -> Result<(), IndexError> {
        if let Err(e) = std::fs::rename(self.dir.staging_path(), self.dir.committed_path()) {
            self.restore();
            return Err(e.into());
        }
        self.finished = true;
        sync_dir(self.dir.root());

        if self.retired {
            if let Err(e) = std::fs::remove_dir_all(self.dir.previous_path()) {
                tracing::warn!("failed to remove previous index: {e}");
            }
        }
        self.dir.release_lock();
        Ok(())
    }

    /// Discard the staging directory and put the previous index back.
    ///
    /// Returns `true` if a committed index exists afterwards.
    pub async fn rollback(self) -> bool {
        let dir = self.dir.clone();
        let restored = tokio::task::spawn_blocking(move || {
            let mut guard = self;
            guard.restore();
        })
        .await;
        if let Err(e) = restored {
            tracing::error!("index rollback task failed: {e}");
        }
        dir.has_committed()
    }

    fn restore(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let staging = self.dir.staging_path();
        if staging.exists() {
            if let Err(e) = std::fs::remove_dir_all(&staging) {
                tracing::warn!("failed to remove staging index: {e}");
            }
        }
        if self.retired {
            match std::fs::rename(self.dir.previous_path(), self.dir.committed_path()) {
                Ok(()) => sync_dir(self.dir.root()),
                Err(e) => tracing::error!("failed to restore previous index: {e}"),
            }
        }
        self.dir.release_lock();
    }
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_marker(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("marker"), content).unwrap();
    }

    fn read_marker(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("marker")).unwrap()
    }

    #[tokio::test]
    async fn commit_replaces_committed_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());
        write_marker(&dirs.committed_path(), "old");

        let guard = dirs.begin().await.unwrap();
        assert!(guard.had_previous());
        assert!(!dirs.committed_path().exists());
        assert!(dirs.lock_path().exists());
        write_marker(&guard.staging_path(), "new");
        guard.commit().await.unwrap();

        assert_eq!(read_marker(&dirs.committed_path()), "new");
        assert!(!dirs.previous_path().exists());
        assert!(!dirs.staging_path().exists());
        assert!(!dirs.lock_path().exists());
    }

    #[tokio::test]
    async fn rollback_restores_previous_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());
        write_marker(&dirs.committed_path(), "old");

        let guard = dirs.begin().await.unwrap();
        write_marker(&guard.staging_path(), "partial");
        assert!(guard.rollback().await);

        assert_eq!(read_marker(&dirs.committed_path()), "old");
        assert!(!dirs.staging_path().exists());
        assert!(!dirs.lock_path().exists());
    }

    #[tokio::test]
    async fn rollback_without_previous_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());

        let guard = dirs.begin().await.unwrap();
        assert!(!guard.had_previous());
        write_marker(&guard.staging_path(), "partial");
        assert!(!guard.rollback().await);
        assert!(!dirs.committed_path().exists());
    }

    #[tokio::test]
    async fn drop_acts_as_rollback() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());
        write_marker(&dirs.committed_path(), "old");

        {
            let guard = dirs.begin().await.unwrap();
            write_marker(&guard.staging_path(), "partial");
        }

        assert_eq!(read_marker(&dirs.committed_path()), "old");
        assert!(!dirs.lock_path().exists());
    }

    #[tokio::test]
    async fn existing_lock_aborts_without_touching_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());
        write_marker(&dirs.committed_path(), "old");
        std::fs::write(dirs.lock_path(), "").unwrap();

        let err = dirs.begin().await.unwrap_err();
        assert!(matches!(err, IndexError::Locked(_)));
        assert_eq!(read_marker(&dirs.committed_path()), "old");
        assert!(!dirs.previous_path().exists());
        assert!(dirs.lock_path().exists());
    }

    #[tokio::test]
    async fn second_begin_while_held_is_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());

        let _guard = dirs.begin().await.unwrap();
        assert!(matches!(dirs.begin().await, Err(IndexError::Locked(_))));
    }

    #[tokio::test]
    async fn interrupted_rebuild_is_recovered() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());
        write_marker(&dirs.previous_path(), "survivor");
        write_marker(&dirs.staging_path(), "junk");

        let guard = dirs.begin().await.unwrap();
        assert!(guard.had_previous());
        assert!(!dirs.staging_path().exists());
        assert!(guard.rollback().await);
        assert_eq!(read_marker(&dirs.committed_path()), "survivor");
    }

    #[tokio::test]
    async fn undeletable_leftover_aborts_without_moving_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = IndexDirectory::new(tmp.path());
        write_marker(&dirs.committed_path(), "old");
        std::fs::write(dirs.previous_path(), "not a directory").unwrap();

        let err = dirs.begin().await.unwrap_err();
        assert!(matches!(err, IndexError::Locked(ref r) if r.contains("cannot remove")));
        assert_eq!(read_marker(&dirs.committed_path()), "old");
        assert!(!dirs.lock_path().exists());
    }
}
