//! Traits describing persistence and messaging collaborators, plus the commit loop built on them.

use std::io::Error as IoError;
use std::result::Result as StdResult;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;

use crate::error::{Error, Result};
use crate::events::{Event, EventEnvelope, Topic};

#[derive(thiserror::Error, Debug)]
/// Errors raised by repository backends.
pub enum StoreError {
    /// Another writer committed since the snapshot was taken.
    #[error("version conflict: expected {expected}, found {found}")]
    Conflict {
        /// Version the caller based its change on.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    /// Snapshot could not be encoded or decoded.
    #[error("serialisation error: {0}")]
    Serialization(#[from] JsonError),
}

#[derive(thiserror::Error, Debug)]
/// Errors raised while publishing an event.
pub enum PublishError {
    /// The broker is shut down.
    #[error("broker is closed")]
    Closed,
    /// The event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] JsonError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// A state aggregate together with the version it was read at.
pub struct Versioned<S> {
    /// Monotonic commit counter.
    pub version: u64,
    /// The state itself.
    pub state: S,
}

#[async_trait]
/// Durable keyed storage for one service's state aggregate.
pub trait Repository<S>: Send + Sync
where
    S: Send + Sync + 'static,
{
    /// Read a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backend cannot be read.
    async fn snapshot(&self) -> StdResult<Versioned<S>, StoreError>;

    /// Replace the state if nothing was committed since `base`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `base` is stale, or another
    /// [`StoreError`] if the backend cannot be written.
    async fn commit(&self, base: u64, next: S) -> StdResult<u64, StoreError>;
}

#[async_trait]
/// Outbound side of the message broker.
pub trait EventPublisher: Send + Sync {
    /// Hand an event to the broker. Delivery is at-least-once and unordered.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] when the broker rejects the message.
    async fn publish(&self, envelope: EventEnvelope) -> StdResult<(), PublishError>;
}

#[async_trait]
/// Inbound side of the message broker: applies replicated events.
pub trait EventHandler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Topics this handler consumes.
    fn topics(&self) -> &'static [Topic];

    /// Apply one delivery. Must be safe to call again with the same envelope.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`]; [`Error::is_retryable`] tells the transport
    /// whether redelivery makes sense.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// What a transactional mutation wants done with its working copy.
pub enum Change<T> {
    /// Persist the mutated state and return the value.
    Commit(T),
    /// Drop the working copy; nothing changed.
    Discard(T),
}

/// Run `mutate` against a fresh snapshot and commit the result optimistically.
///
/// The closure is synchronous, so planning and mutation happen on one
/// consistent snapshot with no suspension in between. When another writer
/// commits first the closure runs again on the newer state, up to
/// `max_attempts` times. An `Err` from the closure aborts without writing.
///
/// # Errors
///
/// Propagates the closure's error, any [`StoreError`] other than a conflict,
/// and [`Error::Conflict`] once the attempts are used up.
pub async fn transact<S, T, F>(repository: &dyn Repository<S>, max_attempts: u32, mut mutate: F) -> Result<T>
where
    S: Send + Sync + 'static,
    T: Send,
    F: FnMut(&mut S) -> Result<Change<T>> + Send,
{
    for attempt in 1..=max_attempts.max(1) {
        let Versioned { version, mut state } = repository.snapshot().await?;

        let output = match mutate(&mut state)? {
            Change::Discard(output) => return Ok(output),
            Change::Commit(output) => output,
        };

        match repository.commit(version, state).await {
            Ok(_) => return Ok(output),
            Err(StoreError::Conflict { expected, found }) => {
                tracing::debug!(attempt, expected, found, "commit conflict, retrying on newer state");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(Error::Conflict {
        attempts: max_attempts.max(1),
    })
}

/// Read the current state without writing.
///
/// # Errors
///
/// Returns an [`Error::Store`] if the backend cannot be read.
pub async fn read<S>(repository: &dyn Repository<S>) -> Result<S>
where
    S: Send + Sync + 'static,
{
    Ok(repository.snapshot().await?.state)
}

/// Publish an event after a successful commit.
///
/// Publishing is fire-and-forget: the state change is already durable, so a
/// broker failure is logged and not reported to the caller.
pub(crate) async fn emit(publisher: &dyn EventPublisher, event: Event) {
    let envelope = EventEnvelope::new(event);
    let topic = envelope.topic();
    let event_id = envelope.event_id;

    match publisher.publish(envelope).await {
        Ok(()) => tracing::debug!(%topic, %event_id, "event published"),
        Err(err) => tracing::warn!(%topic, %event_id, error = %err, "failed to publish event"),
    }
}
