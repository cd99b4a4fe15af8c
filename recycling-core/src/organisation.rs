//! Organisation service: authoritative organisations plus shadow copies of storages and distances.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::allocation::{Allocation, Candidate, allocate};
use crate::distance::{DistanceRegistry, Reachable};
use crate::error::{Error, Result, ValidationError};
use crate::events::Event;
use crate::ledger::{CapacityLedger, validate_initial};
use crate::model::{NewOrganisation, Organisation, OrganisationId, StorageCopy, StorageId, take_next_id};
use crate::ports::{Change, EventPublisher, Repository, emit, read, transact};

/// Optimistic commit attempts used unless configured otherwise.
pub const DEFAULT_COMMIT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Everything the organisation service persists.
pub struct OrganisationState {
    pub(crate) organisations: CapacityLedger<OrganisationId, Organisation>,
    pub(crate) next_organisation_id: u64,
    pub(crate) storages: CapacityLedger<StorageId, StorageCopy>,
    /// Storages the storage service has deleted; late events for them are ignored.
    #[serde(default)]
    pub(crate) deleted_storages: BTreeSet<StorageId>,
    pub(crate) distances: DistanceRegistry,
}

impl OrganisationState {
    /// Compute the allocation for an organisation against the local shadow copies.
    ///
    /// Distance records whose storage copy has not arrived yet are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the organisation does not exist.
    pub fn plan(&self, id: OrganisationId) -> Result<Allocation> {
        let organisation = self
            .organisations
            .get(&id)
            .ok_or_else(|| Error::not_found("organisation", id))?;

        Ok(allocate(&organisation.capacity, &self.candidates(id)))
    }

    /// Reachable storages whose shadow copy is present, nearest first.
    pub(crate) fn candidates(&self, id: OrganisationId) -> Vec<Candidate<'_>> {
        self.distances
            .list_for_organisation(id)
            .into_iter()
            .filter_map(|reachable| {
                self.storages.get(&reachable.storage_id).map(|copy| Candidate {
                    storage_id: reachable.storage_id,
                    distance: reachable.distance,
                    capacity: &copy.capacity,
                })
            })
            .collect()
    }

    fn ensure_unique_name(&self, name: &str) -> Result<()> {
        if self.organisations.values().any(|existing| existing.name == name) {
            return Err(ValidationError::DuplicateName(name.to_owned()).into());
        }
        Ok(())
    }
}

/// Inbound operations of the organisation service.
pub struct OrganisationService {
    repository: Arc<dyn Repository<OrganisationState>>,
    publisher: Arc<dyn EventPublisher>,
    pub(crate) commit_attempts: u32,
}

impl OrganisationService {
    /// Create a service on top of a repository and a broker.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository<OrganisationState>>, publisher: Arc<dyn EventPublisher>) -> Self {
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

    pub(crate) fn repository(&self) -> &dyn Repository<OrganisationState> {
        self.repository.as_ref()
    }

    pub(crate) fn publisher(&self) -> &dyn EventPublisher {
        self.publisher.as_ref()
    }

    /// Register an organisation and announce it to the storage service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank or taken name, or a capacity
    /// entry with `used > total`.
    pub async fn create_organisation(&self, new: NewOrganisation) -> Result<Organisation> {
        let name = new.name.trim().to_owned();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        validate_initial(&new.capacity)?;

        let organisation = transact(self.repository(), self.commit_attempts, |state| {
            state.ensure_unique_name(&name)?;
            let organisation = Organisation {
                id: OrganisationId(take_next_id(&mut state.next_organisation_id)),
                name: name.clone(),
                capacity: new.capacity.clone(),
            };
            state.organisations.insert(organisation.id, organisation.clone());
            Ok(Change::Commit(organisation))
        })
        .await?;

        tracing::info!(organisation_id = organisation.id.0, name = %organisation.name, "organisation created");
        emit(self.publisher(), Event::OrganisationCreated { id: organisation.id }).await;
        Ok(organisation)
    }

    /// All organisations in id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the state cannot be read.
    pub async fn organisations(&self) -> Result<Vec<Organisation>> {
        let state = read(self.repository()).await?;
        Ok(state.organisations.values().cloned().collect())
    }

    /// One organisation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn organisation(&self, id: OrganisationId) -> Result<Organisation> {
        let state = read(self.repository()).await?;
        state
            .organisations
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("organisation", id))
    }

    /// Delete an organisation and every distance record pointing at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub async fn delete_organisation(&self, id: OrganisationId) -> Result<Organisation> {
        let removed = transact(self.repository(), self.commit_attempts, |state| {
            let organisation = state
                .organisations
                .remove(&id)
                .ok_or_else(|| Error::not_found("organisation", id))?;
            state.distances.remove_for_organisation(id);
            Ok(Change::Commit(organisation))
        })
        .await?;

        tracing::info!(organisation_id = id.0, "organisation deleted");
        emit(self.publisher(), Event::OrganisationDeleted { ids: vec![id] }).await;
        Ok(removed)
    }

    /// Delete every organisation. One event carries all removed ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when there is nothing to delete.
    pub async fn delete_all_organisations(&self) -> Result<Vec<OrganisationId>> {
        let ids = transact(self.repository(), self.commit_attempts, |state| {
            if state.organisations.is_empty() {
                return Err(Error::not_found("organisation", "*"));
            }
            let ids: Vec<OrganisationId> = state
                .organisations
                .drain()
                .into_iter()
                .map(|organisation| organisation.id)
                .collect();
            for id in &ids {
                state.distances.remove_for_organisation(*id);
            }
            Ok(Change::Commit(ids))
        })
        .await?;

        tracing::info!(count = ids.len(), "all organisations deleted");
        emit(self.publisher(), Event::OrganisationDeleted { ids: ids.clone() }).await;
        Ok(ids)
    }

    /// Storages as this service currently sees them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the state cannot be read.
    pub async fn storage_copies(&self) -> Result<Vec<StorageCopy>> {
        let state = read(self.repository()).await?;
        Ok(state.storages.values().cloned().collect())
    }

    /// Storages reachable from an organisation, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown organisation.
    pub async fn distances(&self, id: OrganisationId) -> Result<Vec<Reachable>> {
        let state = read(self.repository()).await?;
        if !state.organisations.contains(&id) {
            return Err(Error::not_found("organisation", id));
        }
        Ok(state.distances.list_for_organisation(id))
    }

    /// Preview the allocation a recycle request would make, without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown organisation.
    pub async fn allocate(&self, id: OrganisationId) -> Result<Allocation> {
        read(self.repository()).await?.plan(id)
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

    fn service() -> (OrganisationService, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let service = OrganisationService::new(
            Arc::new(MemoryRepository::<OrganisationState>::default()),
            Arc::clone(&recorder) as Arc<dyn EventPublisher>,
        );
        (service, recorder)
    }

    fn new_organisation(name: &str) -> NewOrganisation {
        NewOrganisation {
            name: name.to_owned(),
            capacity: WasteCapacity::from([("Glass", (10, 40))]),
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_announces() {
        let (service, recorder) = service();

        let first = service.create_organisation(new_organisation("  OO1 ")).await.unwrap();
        let second = service.create_organisation(new_organisation("OO2")).await.unwrap();

        assert_eq!(first.id, OrganisationId(1));
        assert_eq!(first.name, "OO1");
        assert_eq!(second.id, OrganisationId(2));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                Event::OrganisationCreated { id: OrganisationId(1) },
                Event::OrganisationCreated { id: OrganisationId(2) },
            ]
        );
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let (service, recorder) = service();
        service.create_organisation(new_organisation("OO1")).await.unwrap();

        let duplicate = service.create_organisation(new_organisation("OO1")).await.unwrap_err();
        assert!(matches!(duplicate, Error::Validation(ValidationError::DuplicateName(_))));

        let blank = service.create_organisation(new_organisation("   ")).await.unwrap_err();
        assert!(matches!(blank, Error::Validation(ValidationError::EmptyName)));

        let overflowing = NewOrganisation {
            name: "OO3".to_owned(),
            capacity: WasteCapacity::from([("Glass", (41, 40))]),
        };
        let err = service.create_organisation(overflowing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(service.organisations().await.unwrap().len(), 1);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_missing_organisation() {
        let (service, _recorder) = service();

        let err = service.delete_organisation(OrganisationId(7)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_all_emits_one_event_with_every_id() {
        let (service, recorder) = service();
        service.create_organisation(new_organisation("OO1")).await.unwrap();
        service.create_organisation(new_organisation("OO2")).await.unwrap();

        let ids = service.delete_all_organisations().await.unwrap();

        assert_eq!(ids, vec![OrganisationId(1), OrganisationId(2)]);
        assert_eq!(
            recorder.0.lock().unwrap().last(),
            Some(&Event::OrganisationDeleted { ids })
        );
        assert!(service.organisations().await.unwrap().is_empty());

        let err = service.delete_all_organisations().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let (service, _recorder) = service();
        let first = service.create_organisation(new_organisation("OO1")).await.unwrap();
        service.delete_organisation(first.id).await.unwrap();

        let second = service.create_organisation(new_organisation("OO1")).await.unwrap();

        assert_eq!(second.id, OrganisationId(2));
    }
}
