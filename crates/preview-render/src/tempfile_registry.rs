use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

/// Grace delay before a released temporary file's refcount is actually
/// decremented, matching the original's `time.Sleep(1 * time.Minute)`.
const RELEASE_GRACE: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Registry {
    files: HashMap<PathBuf, usize>,
}

/// Reference-counted registry of on-disk temporary files shared by the
/// downloader and both render agents. A path is removed once its count
/// drops to zero, mirroring `defaultTemporaryFileManager`.
#[derive(Clone, Default)]
pub struct TemporaryFileRegistry {
    inner: Arc<Mutex<Registry>>,
}

/// A handle returned by [`TemporaryFileRegistry::create`]. Calling
/// [`TemporaryFile::release`] schedules the refcount decrement after the
/// grace delay; there is no way to cancel a pending release.
pub struct TemporaryFile {
    registry: TemporaryFileRegistry,
    path: PathBuf,
}

impl TemporaryFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, incrementing its refcount if already tracked.
    pub fn create(&self, path: impl Into<PathBuf>) -> TemporaryFile {
        let path = path.into();
        let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *registry.files.entry(path.clone()).or_insert(0) += 1;
        TemporaryFile {
            registry: self.clone(),
            path,
        }
    }

    /// Snapshot of every tracked path and its current refcount, used by the
    /// (external) admin introspection surface.
    pub fn list(&self) -> HashMap<PathBuf, usize> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).files.clone()
    }

    fn notify(&self, path: &Path) {
        let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = registry.files.get_mut(path) {
            *count -= 1;
            if *count > 0 {
                return;
            }
            registry.files.remove(path);
            drop(registry);
            let path = path.to_path_buf();
            tokio::spawn(async move {
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %err, "failed to remove released temporary file");
                }
            });
        }
    }
}

impl TemporaryFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schedule the refcount decrement after the grace delay. There is no
    /// cancellation of a pending release.
    pub fn release(self) {
        let registry = self.registry.clone();
        let path = self.path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RELEASE_GRACE).await;
            registry.notify(&path);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_create_increments_and_first_release_alone_keeps_the_file_tracked() {
        let registry = TemporaryFileRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        tokio::fs::write(&path, b"x").await.unwrap();

        let first = registry.create(&path);
        let second = registry.create(&path);
        assert_eq!(registry.list().get(&path), Some(&2));

        first.release();
        tokio::time::advance(RELEASE_GRACE + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(registry.list().get(&path), Some(&1));
        second.release();
    }

    #[tokio::test(start_paused = true)]
    async fn release_at_zero_removes_the_file_from_disk() {
        let registry = TemporaryFileRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        tokio::fs::write(&path, b"x").await.unwrap();

        registry.create(&path).release();
        tokio::time::advance(RELEASE_GRACE + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1)).await;

        assert!(registry.list().get(&path).is_none());
    }
}
