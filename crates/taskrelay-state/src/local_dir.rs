use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{StateAcquisition, StateError, StateRepository};

/// Local-directory state backend (spec §4.2 / §6.6).
///
/// `{root}/{path}.json` holds the value; `{root}/{path}.lock` is the
/// advisory lock file used while the path is under [`StateAcquisition`].
#[derive(Clone)]
pub struct LocalDirStateRepository {
    root: PathBuf,
    // In-process exclusion layered under the OS advisory lock: `flock` is
    // scoped to an open file description, so two opens from the *same*
    // process would otherwise both succeed. One async mutex per path closes
    // that gap.
    locks: Arc<StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl LocalDirStateRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    fn json_path(&self, path: &str) -> PathBuf {
        self.root.join(format!("{path}.json"))
    }

    fn lock_path(&self, path: &str) -> PathBuf {
        self.root.join(format!("{path}.lock"))
    }

    fn path_mutex(&self, json_path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock registry mutex poisoned");
        locks
            .entry(json_path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn read_value(json_path: &Path) -> Result<Option<Value>, StateError> {
        match tokio::fs::read(json_path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|source| StateError::Malformed {
                    path: json_path.display().to_string(),
                    source,
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateError::Io {
                path: json_path.display().to_string(),
                source,
            }),
        }
    }

    async fn write_value(json_path: &Path, data: &Value) -> Result<(), StateError> {
        if let Some(parent) = json_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StateError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        let bytes = serde_json::to_vec_pretty(data).map_err(|source| StateError::Malformed {
            path: json_path.display().to_string(),
            source,
        })?;
        tokio::fs::write(json_path, bytes)
            .await
            .map_err(|source| StateError::Io {
                path: json_path.display().to_string(),
                source,
            })
    }
}

/// Holds the OS advisory lock file and the in-process guard for one
/// acquisition; both are released when this drops.
struct LockGuard {
    file: std::fs::File,
    lock_path: PathBuf,
    _in_process: tokio::sync::OwnedMutexGuard<()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.lock_path.display(), error = %e, "failed to release advisory lock");
        }
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

#[async_trait]
impl StateRepository for LocalDirStateRepository {
    async fn get(&self, path: &str) -> Result<Option<Value>, StateError> {
        Self::read_value(&self.json_path(path)).await
    }

    async fn set(&self, path: &str, data: Value) -> Result<(), StateError> {
        debug!(path, "state set");
        Self::write_value(&self.json_path(path), &data).await
    }

    async fn clear(&self, path: &str) -> Result<(), StateError> {
        debug!(path, "state clear");
        match tokio::fs::remove_file(self.json_path(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn acquire(&self, path: &str) -> Result<StateAcquisition, StateError> {
        let json_path = self.json_path(path);
        let lock_path = self.lock_path(path);
        let path_mutex = self.path_mutex(&json_path);
        let in_process = path_mutex.lock_owned().await;

        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StateError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let lock_path_for_blocking = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<std::fs::File, StateError> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(&lock_path_for_blocking)
                .map_err(|source| StateError::Io {
                    path: lock_path_for_blocking.display().to_string(),
                    source,
                })?;
            file.lock_exclusive()
                .map_err(|_| StateError::LockFailed(lock_path_for_blocking.display().to_string()))?;
            Ok(file)
        })
        .await
        .expect("lock acquisition task panicked")?;

        debug!(path, "state acquire");
        let value = Self::read_value(&json_path).await?;

        let commit_json_path = json_path.clone();
        let commit_fn: Box<
            dyn FnOnce(Value) -> futures::future::BoxFuture<'static, Result<(), StateError>> + Send,
        > = Box::new(move |data: Value| {
            Box::pin(async move { LocalDirStateRepository::write_value(&commit_json_path, &data).await })
        });

        Ok(StateAcquisition {
            path: path.to_string(),
            value,
            commit_fn,
            lock: Box::new(LockGuard {
                file,
                lock_path,
                _in_process: in_process,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_on_missing_path_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalDirStateRepository::new(dir.path());
        assert_eq!(repo.get("tasks/t1/state").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalDirStateRepository::new(dir.path());
        repo.set("tasks/t1/state", json!({"last_run": "2026-01-01"}))
            .await
            .unwrap();
        let value = repo.get("tasks/t1/state").await.unwrap().unwrap();
        assert_eq!(value["last_run"], "2026-01-01");
    }

    #[tokio::test]
    async fn clear_removes_value() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalDirStateRepository::new(dir.path());
        repo.set("p", json!({"a": 1})).await.unwrap();
        repo.clear("p").await.unwrap();
        assert_eq!(repo.get("p").await.unwrap(), None);
        // Clearing an already-missing path is not an error.
        repo.clear("p").await.unwrap();
    }

    #[tokio::test]
    async fn acquire_exposes_current_value_and_commit_persists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalDirStateRepository::new(dir.path());
        repo.set("p", json!({"cursor": 1})).await.unwrap();

        let handle = repo.acquire("p").await.unwrap();
        assert_eq!(handle.value().unwrap()["cursor"], 1);
        handle.commit(json!({"cursor": 2})).await.unwrap();

        assert_eq!(repo.get("p").await.unwrap().unwrap()["cursor"], 2);
    }

    #[tokio::test]
    async fn dropping_without_commit_leaves_value_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalDirStateRepository::new(dir.path());
        repo.set("p", json!({"cursor": 1})).await.unwrap();

        {
            let _handle = repo.acquire("p").await.unwrap();
            // scope exits without calling commit
        }
        assert_eq!(repo.get("p").await.unwrap().unwrap()["cursor"], 1);
    }

    #[tokio::test]
    async fn acquire_is_mutually_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(LocalDirStateRepository::new(dir.path()));

        let first = repo.acquire("p").await.unwrap();
        let repo2 = repo.clone();
        let second = tokio::spawn(async move {
            tokio::time::timeout(std::time::Duration::from_millis(150), repo2.acquire("p")).await
        });

        // Second acquire should not complete while the first is held.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        drop(first);
        let result = second.await.unwrap();
        assert!(result.is_ok(), "second acquire should succeed once released");
    }
}
