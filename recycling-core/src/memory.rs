//! In-memory [`Repository`] for tests and ephemeral deployments.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{Repository, StoreError, Versioned};

/// Repository keeping the state behind an async lock. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRepository<S> {
    inner: RwLock<Versioned<S>>,
}

impl<S> MemoryRepository<S> {
    /// Start from the given state at version 0.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            inner: RwLock::new(Versioned { version: 0, state }),
        }
    }
}

#[async_trait]
impl<S> Repository<S> for MemoryRepository<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn snapshot(&self) -> Result<Versioned<S>, StoreError> {
        Ok(self.inner.read().await.clone())
    }

    async fn commit(&self, base: u64, next: S) -> Result<u64, StoreError> {
        let mut current = self.inner.write().await;
        if current.version != base {
            return Err(StoreError::Conflict {
                expected: base,
                found: current.version,
            });
        }
        current.version += 1;
        current.state = next;
        Ok(current.version)
    }
}
