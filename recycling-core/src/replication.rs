//! Replication handlers keeping each service's shadow copies in step with the other service.
//!
//! Handlers tolerate at-least-once delivery in any order: "created" events
//! upsert, "deleted" events leave a tombstone so a creation arriving after
//! them is ignored, and a reference to a copy that has not arrived yet fails
//! with a retryable error so the transport can redeliver it later. `capacity.updated` applies a delta and
//! is not protected against redelivery.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::distance::{References, RegistryError, Upsert};
use crate::error::{Error, Result};
use crate::events::{Event, EventEnvelope, Topic};
use crate::ledger::DeltaSign;
use crate::model::{DistanceId, OrganisationCopy, OrganisationId, StorageCopy, StorageDistance, StorageId, WasteAmounts, WasteCapacity};
use crate::organisation::{DEFAULT_COMMIT_ATTEMPTS, OrganisationState};
use crate::ports::{Change, EventHandler, Repository, transact};
use crate::storage::StorageState;

/// Applies storage-side events to the organisation service's shadow copies.
pub struct OrganisationReplicaHandler {
    repository: Arc<dyn Repository<OrganisationState>>,
    commit_attempts: u32,
}

impl OrganisationReplicaHandler {
    /// Handler writing through the organisation service's repository.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository<OrganisationState>>) -> Self {
        Self {
            repository,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }

    /// Override how many times a conflicting commit is retried.
    #[must_use]
    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }

    async fn storage_created(&self, id: StorageId, capacity: &WasteCapacity) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            // A copy that already exists may carry local recycle deltas; keep it.
            if state.storages.contains(&id) || state.deleted_storages.contains(&id) {
                return Ok(Change::Discard(false));
            }
            state.storages.insert(
                id,
                StorageCopy {
                    id,
                    capacity: capacity.clone(),
                },
            );
            Ok(Change::Commit(true))
        })
        .await
    }

    async fn storage_deleted(&self, id: StorageId) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            let tombstoned = state.deleted_storages.insert(id);
            let removed = state.storages.remove(&id).is_some();
            let cascaded = state.distances.remove_for_storage(id);
            if !tombstoned && !removed && cascaded.is_empty() {
                return Ok(Change::Discard(false));
            }
            Ok(Change::Commit(true))
        })
        .await
    }

    async fn distance_created(&self, record: StorageDistance) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            if state.deleted_storages.contains(&record.storage_id) {
                return Ok(Change::Discard(false));
            }
            let references = References {
                storage_known: state.storages.contains(&record.storage_id),
                organisation_known: state.organisations.contains(&record.organisation_id),
            };
            let upsert = state.distances.replicate(record, references).map_err(|err| match err {
                // The organisation is authoritative here; a missing one is gone for good.
                RegistryError::UnknownOrganisation(id) => Error::not_found("organisation", id),
                other => other.into(),
            })?;
            Ok(match upsert {
                Upsert::Unchanged => Change::Discard(false),
                Upsert::Inserted | Upsert::Replaced => Change::Commit(true),
            })
        })
        .await
    }

    async fn distance_deleted(&self, id: DistanceId) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            Ok(match state.distances.delete(id) {
                Ok(_) => Change::Commit(true),
                Err(_) => Change::Discard(false),
            })
        })
        .await
    }
}

#[async_trait]
impl EventHandler for OrganisationReplicaHandler {
    fn name(&self) -> &'static str {
        "organisation-replica"
    }

    fn topics(&self) -> &'static [Topic] {
        &[
            Topic::StorageCreated,
            Topic::StorageDeleted,
            Topic::StorageDistanceCreated,
            Topic::StorageDistanceDeleted,
        ]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let changed = match &envelope.event {
            Event::StorageCreated { id, capacity } => self.storage_created(*id, capacity).await?,
            Event::StorageDeleted { id } => self.storage_deleted(*id).await?,
            Event::StorageDistanceCreated(record) => self.distance_created(*record).await?,
            Event::StorageDistanceDeleted { id } => self.distance_deleted(*id).await?,
            Event::OrganisationCreated { .. } | Event::OrganisationDeleted { .. } | Event::CapacityUpdated { .. } => {
                tracing::debug!(topic = %envelope.topic(), "ignoring event for another service");
                return Ok(());
            }
        };
        tracing::debug!(topic = %envelope.topic(), changed, "replicated into organisation service");
        Ok(())
    }
}

/// Applies organisation-side events to the storage service.
pub struct StorageReplicaHandler {
    repository: Arc<dyn Repository<StorageState>>,
    commit_attempts: u32,
}

impl StorageReplicaHandler {
    /// Handler writing through the storage service's repository.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository<StorageState>>) -> Self {
        Self {
            repository,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }

    /// Override how many times a conflicting commit is retried.
    #[must_use]
    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }

    async fn organisation_created(&self, id: OrganisationId) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            if state.organisations.contains_key(&id) || state.deleted_organisations.contains(&id) {
                return Ok(Change::Discard(false));
            }
            state.organisations.insert(id, OrganisationCopy { id });
            Ok(Change::Commit(true))
        })
        .await
    }

    async fn organisations_deleted(&self, ids: &[OrganisationId]) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            let mut changed = false;
            for id in ids {
                changed |= state.deleted_organisations.insert(*id);
                changed |= state.organisations.remove(id).is_some();
                changed |= !state.distances.remove_for_organisation(*id).is_empty();
            }
            Ok(if changed {
                Change::Commit(true)
            } else {
                Change::Discard(false)
            })
        })
        .await
    }

    async fn capacity_updated(&self, storage_id: StorageId, amounts: &WasteAmounts) -> Result<bool> {
        transact(self.repository.as_ref(), self.commit_attempts, |state| {
            state.storages.apply_delta(&storage_id, amounts, DeltaSign::Receive)?;
            Ok(Change::Commit(true))
        })
        .await
    }
}

#[async_trait]
impl EventHandler for StorageReplicaHandler {
    fn name(&self) -> &'static str {
        "storage-replica"
    }

    fn topics(&self) -> &'static [Topic] {
        &[
            Topic::OrganisationCreated,
            Topic::OrganisationDeleted,
            Topic::CapacityUpdated,
        ]
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let changed = match &envelope.event {
            Event::OrganisationCreated { id } => self.organisation_created(*id).await?,
            Event::OrganisationDeleted { ids } => self.organisations_deleted(ids).await?,
            Event::CapacityUpdated {
                storage_id,
                updated_capacity,
            } => self.capacity_updated(*storage_id, updated_capacity).await?,
            Event::StorageCreated { .. }
            | Event::StorageDeleted { .. }
            | Event::StorageDistanceCreated(_)
            | Event::StorageDistanceDeleted { .. } => {
                tracing::debug!(topic = %envelope.topic(), "ignoring event for another service");
                return Ok(());
            }
        };
        tracing::debug!(topic = %envelope.topic(), changed, "replicated into storage service");
        Ok(())
    }
}

/// Topic-to-handler routing table for one deployment.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<Topic, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Build a registry subscribing every handler to the topics it declares.
    #[must_use]
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let mut registry = Self::default();
        for handler in handlers {
            registry.register(handler);
        }
        registry
    }

    /// Subscribe one more handler.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        for topic in handler.topics() {
            self.handlers.entry(*topic).or_default().push(Arc::clone(&handler));
        }
    }

    /// Topics with at least one handler, in catalogue order.
    pub fn topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.handlers.keys().copied()
    }

    /// Handlers subscribed to a topic.
    #[must_use]
    pub fn handlers_for(&self, topic: Topic) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(&topic).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every `(topic, handler)` subscription.
    pub fn subscriptions(&self) -> impl Iterator<Item = (Topic, &Arc<dyn EventHandler>)> {
        self.handlers
            .iter()
            .flat_map(|(topic, handlers)| handlers.iter().map(move |handler| (*topic, handler)))
    }
}
