//! Repository adapter persisting a service's state as a JSON snapshot on disk.
//!
//! Each commit writes the whole versioned snapshot to a sibling temporary
//! file and renames it over the previous one, so a crash leaves either the
//! old or the new snapshot in place, never a torn one.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;

use recycling_core::ports::{Repository, StoreError, Versioned};

/// Repository backed by one JSON file.
pub struct JsonFileRepository<S> {
    path: PathBuf,
    current: Mutex<Versioned<S>>,
}

impl<S> JsonFileRepository<S>
where
    S: Serialize + DeserializeOwned + Default + Send,
{
    /// Load the snapshot at `path`, or start empty at version 0 if there is none yet.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let current = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Versioned<S>>(&bytes)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Versioned::default(),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(path = %path.display(), version = current.version, "snapshot loaded");

        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    /// Open `<dir>/<name>.json`.
    ///
    /// # Errors
    ///
    /// Same as [`JsonFileRepository::open`].
    pub async fn open_in(dir: &Path, name: &str) -> Result<Self, StoreError> {
        Self::open(dir.join(format!("{name}.json"))).await
    }

    /// File the snapshot lives in.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<S> Repository<S> for JsonFileRepository<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn snapshot(&self) -> Result<Versioned<S>, StoreError> {
        Ok(self.current.lock().await.clone())
    }

    async fn commit(&self, base: u64, next: S) -> Result<u64, StoreError> {
        let mut current = self.current.lock().await;
        if current.version != base {
            return Err(StoreError::Conflict {
                expected: base,
                found: current.version,
            });
        }

        let candidate = Versioned {
            version: base + 1,
            state: next,
        };
        write_atomically(&self.path, &serde_json::to_vec_pretty(&candidate)?).await?;
        tracing::debug!(path = %self.path.display(), version = candidate.version, "snapshot written");

        *current = candidate;
        Ok(current.version)
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, bytes).await?;
    fs::rename(&staging, path).await
}
