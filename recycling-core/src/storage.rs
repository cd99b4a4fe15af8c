//! Storage service: authoritative storages and distances plus shadow copies of organisations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::distance::{DistanceRegistry, References, RegistryError};
use crate::error::{Error, Result, ValidationError};
use crate::events::Event;
use crate::ledger::{CapacityLedger, validate_initial};
use crate::model::{
    DistanceId, NewDistance, NewStorage, OrganisationCopy, OrganisationId, Storage, StorageDistance, StorageId,
    take_next_id,
};
use crate::organisation::DEFAULT_COMMIT_ATTEMPTS;
use crate::ports::{Change, EventPublisher, Repository, emit, read, transact};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Everything the storage service persists.
pub struct StorageState {
    pub(crate) storages: CapacityLedger<StorageId, Storage>,
    pub(crate) next_storage_id: u64,
    pub(crate) organisations: BTreeMap<OrganisationId, OrganisationCopy>,
    /// Organisations the organisation service has deleted; late creations are ignored.
    #[serde(default)]
    pub(crate) deleted_organisations: BTreeSet<OrganisationId>,
    pub(crate) distances: DistanceRegistry,
}

/// Inbound operations of the storage service.
pub struct StorageService {
    repository: Arc<dyn Repository<StorageState>>,
    publisher: Arc<dyn EventPublisher>,
    commit_attempts: u32,
}

impl StorageService {
    /// Create a service on top of a repository and a broker.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository<StorageState>>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            repository,
            publisher,
            commit_attempts: DEFAULT_COMMIT_ATTEMPTS,
        }
    }

    /// Override how many times a conflicting commit is retried.
    #[must_use]
    pub fn with_commit_attempts(mut self, attempts: u32) -> Self {
        self.commit_attempts = attempts.max(1);
        self
    }

    /// Register a storage and announce it, with its capacity, to the organisation service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank or taken name, or a capacity
    /// entry with `used > total`.
    pub async fn create_storage(&self, new: NewStorage) -> Result<Storage> {
        let name = new.name.trim().to_owned();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        validate_initial(&new.capacity)?;

        let storage = transact(self.repository.as_ref(), self.commit_attempts, |state| {
            if state.storages.values().any(|existing| existing.name == name) {
                return Err(ValidationError::DuplicateName(name.clone()).into());
            }
            let storage = Storage {
                id: StorageId(take_next_id(&mut state.next_storage_id)),
                name: name.clone(),
                location: new.location.trim().to_owned(),
                capacity: new.capacity.clone(),
            };
            state.storages.insert(storage.id, storage.clone());
            Ok(Change::Commit(storage))
        })
        .await?;

        tracing::info!(storage_id = storage.id.0, name = %storage.name, "storage created");
        emit(
            self.publisher.as_ref(),
            Event::StorageCreated {
                id: storage.id,
                capacity: storage.capacity.clone(),
            },
        )
        .await;
        Ok(storage)
    }

    /// All storages in id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the state cannot be read.
    pub async fn storages(&self) -> Result<Vec<Storage>> {
        let state = read(self.repository.as_ref()).await?;
        Ok(state.storages.values().cloned().collect())
    }

    /// One storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn storage(&self, id: StorageId) -> Result<Storage> {
        let state = read(self.repository.as_ref()).await?;
        state
            .storages
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("storage", id))
    }

    /// Delete a storage and every distance record pointing at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn delete_storage(&self, id: StorageId) -> Result<Storage> {
        let removed = transact(self.repository.as_ref(), self.commit_attempts, |state| {
            let storage = state
                .storages
                .remove(&id)
                .ok_or_else(|| Error::not_found("storage", id))?;
            state.distances.remove_for_storage(id);
            Ok(Change::Commit(storage))
        })
        .await?;

        tracing::info!(storage_id = id.0, "storage deleted");
        emit(self.publisher.as_ref(), Event::StorageDeleted { id }).await;
        Ok(removed)
    }

    /// Record the distance between a storage and an organisation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the exact triple exists,
    /// [`Error::NotFound`] for an unknown storage or a deleted organisation,
    /// and a retryable [`Error::UnresolvedReference`] while the organisation
    /// has not been replicated here yet.
    pub async fn register_distance(&self, new: NewDistance) -> Result<StorageDistance> {
        let record = transact(self.repository.as_ref(), self.commit_attempts, |state| {
            let references = References {
                storage_known: state.storages.contains(&new.storage_id),
                organisation_known: state.organisations.contains_key(&new.organisation_id),
            };
            let record = state.distances.register(new, references).map_err(|err| match err {
                RegistryError::UnknownStorage(id) => Error::not_found("storage", id),
                RegistryError::UnknownOrganisation(id) if state.deleted_organisations.contains(&id) => {
                    Error::not_found("organisation", id)
                }
                other => other.into(),
            })?;
            Ok(Change::Commit(record))
        })
        .await?;

        tracing::info!(
            distance_id = record.id.0,
            storage_id = record.storage_id.0,
            organisation_id = record.organisation_id.0,
            distance = record.distance,
            "distance registered"
        );
        emit(self.publisher.as_ref(), Event::StorageDistanceCreated(record)).await;
        Ok(record)
    }

    /// All distance records in id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the state cannot be read.
    pub async fn distances(&self) -> Result<Vec<StorageDistance>> {
        let state = read(self.repository.as_ref()).await?;
        Ok(state.distances.records().copied().collect())
    }

    /// Remove a distance record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn delete_distance(&self, id: DistanceId) -> Result<StorageDistance> {
        let removed = transact(self.repository.as_ref(), self.commit_attempts, |state| {
            Ok(Change::Commit(state.distances.delete(id)?))
        })
        .await?;

        tracing::info!(distance_id = id.0, "distance deleted");
        emit(self.publisher.as_ref(), Event::StorageDistanceDeleted { id }).await;
        Ok(removed)
    }

    /// Organisations as this service currently sees them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the state cannot be read.
    pub async fn organisation_copies(&self) -> Result<Vec<OrganisationCopy>> {
        let state = read(self.repository.as_ref()).await?;
        Ok(state.organisations.values().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ErrorKind;
    use crate::events::EventEnvelope;
    use crate::memory::MemoryRepository;
    use crate::model::WasteCapacity;
    use crate::ports::PublishError;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Event>>);

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, envelope: EventEnvelope) -> std::result::Result<(), PublishError> {
            self.0.lock().unwrap().push(envelope.event);
            Ok(())
        }
    }

    fn service_with(organisations: &[u64]) -> (StorageService, Arc<Recorder>) {
        let state = StorageState {
            organisations: organisations
                .iter()
                .map(|id| (OrganisationId(*id), OrganisationCopy { id: OrganisationId(*id) }))
                .collect(),
            ..StorageState::default()
        };
        let recorder = Arc::new(Recorder::default());
        let service = StorageService::new(
            Arc::new(MemoryRepository::new(state)),
            Arc::clone(&recorder) as Arc<dyn EventPublisher>,
        );
        (service, recorder)
    }

    fn new_storage(name: &str) -> NewStorage {
        NewStorage {
            name: name.to_owned(),
            location: "Moscow".to_owned(),
            capacity: WasteCapacity::from([("Glass", (0, 300)), ("Plastic", (0, 100))]),
        }
    }

    #[tokio::test]
    async fn create_announces_capacity() {
        let (service, recorder) = service_with(&[]);

        let storage = service.create_storage(new_storage("MNO1")).await.unwrap();

        assert_eq!(storage.id, StorageId(1));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![Event::StorageCreated {
                id: storage.id,
                capacity: storage.capacity.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_distance_is_rejected_and_original_kept() {
        let (service, recorder) = service_with(&[1]);
        let storage = service.create_storage(new_storage("MNO1")).await.unwrap();
        let new = NewDistance {
            storage_id: storage.id,
            organisation_id: OrganisationId(1),
            distance: 100,
        };

        let original = service.register_distance(new).await.unwrap();
        let err = service.register_distance(new).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(service.distances().await.unwrap(), vec![original]);
        assert_eq!(recorder.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn distance_to_unreplicated_organisation_is_retryable() {
        let (service, _recorder) = service_with(&[]);
        let storage = service.create_storage(new_storage("MNO1")).await.unwrap();

        let err = service
            .register_distance(NewDistance {
                storage_id: storage.id,
                organisation_id: OrganisationId(4),
                distance: 10,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn distance_to_unknown_storage_is_not_found() {
        let (service, _recorder) = service_with(&[1]);

        let err = service
            .register_distance(NewDistance {
                storage_id: StorageId(9),
                organisation_id: OrganisationId(1),
                distance: 10,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_storage_cascades_distances() {
        let (service, recorder) = service_with(&[1]);
        let kept = service.create_storage(new_storage("MNO1")).await.unwrap();
        let doomed = service.create_storage(new_storage("MNO2")).await.unwrap();
        for storage_id in [kept.id, doomed.id] {
            service
                .register_distance(NewDistance {
                    storage_id,
                    organisation_id: OrganisationId(1),
                    distance: 50,
                })
                .await
                .unwrap();
        }

        service.delete_storage(doomed.id).await.unwrap();

        let remaining: Vec<StorageId> = service
            .distances()
            .await
            .unwrap()
            .iter()
            .map(|record| record.storage_id)
            .collect();
        assert_eq!(remaining, vec![kept.id]);
        assert_eq!(
            recorder.0.lock().unwrap().last(),
            Some(&Event::StorageDeleted { id: doomed.id })
        );
        assert_eq!(
            service.storage(doomed.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn delete_distance_announces_removal() {
        let (service, recorder) = service_with(&[1]);
        let storage = service.create_storage(new_storage("MNO1")).await.unwrap();
        let record = service
            .register_distance(NewDistance {
                storage_id: storage.id,
                organisation_id: OrganisationId(1),
                distance: 5,
            })
            .await
            .unwrap();

        service.delete_distance(record.id).await.unwrap();

        assert!(service.distances().await.unwrap().is_empty());
        assert_eq!(
            recorder.0.lock().unwrap().last(),
            Some(&Event::StorageDistanceDeleted { id: record.id })
        );
        assert_eq!(
            service.delete_distance(record.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
