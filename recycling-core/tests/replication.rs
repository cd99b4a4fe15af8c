//! Replication under redelivery and out-of-order arrival.

#![expect(clippy::unwrap_used, reason = "integration tests")]

use std::result::Result as StdResult;
use std::sync::Arc;

use async_trait::async_trait;
use recycling_core::{
    DistanceId, ErrorKind, Event, EventEnvelope, EventHandler, EventPublisher, MemoryRepository, NewOrganisation,
    NewDistance, NewStorage, OrganisationId, OrganisationReplicaHandler, OrganisationService, OrganisationState,
    PublishError, RecycleOutcome, Repository, StorageDistance, StorageId, StorageReplicaHandler, StorageService,
    StorageState, WasteCapacity, WasteType,
};

struct Discard;

#[async_trait]
impl EventPublisher for Discard {
    async fn publish(&self, _envelope: EventEnvelope) -> StdResult<(), PublishError> {
        Ok(())
    }
}

async fn organisation_service() -> (OrganisationService, OrganisationReplicaHandler, OrganisationId) {
    let repository: Arc<dyn Repository<OrganisationState>> = Arc::new(MemoryRepository::<OrganisationState>::default());
    let service = OrganisationService::new(Arc::clone(&repository), Arc::new(Discard));
    let organisation = service
        .create_organisation(NewOrganisation {
            name: "OO1".to_owned(),
            capacity: WasteCapacity::from([("Glass", (10, 10))]),
        })
        .await
        .unwrap();
    (service, OrganisationReplicaHandler::new(repository), organisation.id)
}

#[tokio::test]
async fn distance_waits_for_its_storage_copy() {
    let (service, handler, organisation_id) = organisation_service().await;
    let distance = EventEnvelope::new(Event::StorageDistanceCreated(StorageDistance {
        id: DistanceId(1),
        storage_id: StorageId(1),
        organisation_id,
        distance: 10,
    }));
    let storage = EventEnvelope::new(Event::StorageCreated {
        id: StorageId(1),
        capacity: WasteCapacity::from([("Glass", (0, 50))]),
    });

    let early = handler.handle(&distance).await.unwrap_err();
    assert_eq!(early.kind(), ErrorKind::UnresolvedReference);
    assert!(service.distances(organisation_id).await.unwrap().is_empty());

    handler.handle(&storage).await.unwrap();
    handler.handle(&distance).await.unwrap();

    let reachable = service.distances(organisation_id).await.unwrap();
    assert_eq!(reachable.len(), 1);
    assert_eq!(service.allocate(organisation_id).await.unwrap().total_sent.get("Glass"), Some(&10));
}

#[tokio::test]
async fn redelivered_events_change_nothing() {
    let (service, handler, organisation_id) = organisation_service().await;
    let events = [
        EventEnvelope::new(Event::StorageCreated {
            id: StorageId(1),
            capacity: WasteCapacity::from([("Glass", (0, 50))]),
        }),
        EventEnvelope::new(Event::StorageDistanceCreated(StorageDistance {
            id: DistanceId(1),
            storage_id: StorageId(1),
            organisation_id,
            distance: 10,
        })),
    ];

    for envelope in &events {
        handler.handle(envelope).await.unwrap();
    }
    let copies = service.storage_copies().await.unwrap();
    let distances = service.distances(organisation_id).await.unwrap();

    for envelope in &events {
        handler.handle(envelope).await.unwrap();
    }

    assert_eq!(service.storage_copies().await.unwrap(), copies);
    assert_eq!(service.distances(organisation_id).await.unwrap(), distances);
}

#[tokio::test]
async fn storage_copy_survives_a_late_duplicate_create() {
    let (service, handler, organisation_id) = organisation_service().await;
    let created = EventEnvelope::new(Event::StorageCreated {
        id: StorageId(1),
        capacity: WasteCapacity::from([("Glass", (0, 50))]),
    });
    handler.handle(&created).await.unwrap();
    handler
        .handle(&EventEnvelope::new(Event::StorageDistanceCreated(StorageDistance {
            id: DistanceId(1),
            storage_id: StorageId(1),
            organisation_id,
            distance: 10,
        })))
        .await
        .unwrap();
    service.recycle(organisation_id).await.unwrap();

    handler.handle(&created).await.unwrap();

    let copies = service.storage_copies().await.unwrap();
    let glass = copies.first().and_then(|copy| copy.capacity.get("Glass").copied());
    assert_eq!(glass.map(|entry| entry.used), Some(10));
}

#[tokio::test]
async fn storage_deleted_removes_copy_and_distances() {
    let (service, handler, organisation_id) = organisation_service().await;
    handler
        .handle(&EventEnvelope::new(Event::StorageCreated {
            id: StorageId(1),
            capacity: WasteCapacity::from([("Glass", (0, 50))]),
        }))
        .await
        .unwrap();
    handler
        .handle(&EventEnvelope::new(Event::StorageDistanceCreated(StorageDistance {
            id: DistanceId(1),
            storage_id: StorageId(1),
            organisation_id,
            distance: 10,
        })))
        .await
        .unwrap();

    let deleted = EventEnvelope::new(Event::StorageDeleted { id: StorageId(1) });
    handler.handle(&deleted).await.unwrap();
    handler.handle(&deleted).await.unwrap();

    assert!(service.storage_copies().await.unwrap().is_empty());
    assert!(service.distances(organisation_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn capacity_update_redelivery_applies_twice() {
    let repository = Arc::new(MemoryRepository::<StorageState>::default());
    let handler = StorageReplicaHandler::new(Arc::clone(&repository) as Arc<dyn Repository<StorageState>>);
    let storages = StorageService::new(
        Arc::clone(&repository) as Arc<dyn Repository<StorageState>>,
        Arc::new(Discard),
    );
    let storage = storages
        .create_storage(NewStorage {
            name: "MNO1".to_owned(),
            location: "Moscow".to_owned(),
            capacity: WasteCapacity::from([("Glass", (0, 50))]),
        })
        .await
        .unwrap();
    let update = EventEnvelope::new(Event::CapacityUpdated {
        storage_id: storage.id,
        updated_capacity: [(WasteType::from("Glass"), 20)].into_iter().collect(),
    });

    handler.handle(&update).await.unwrap();
    handler.handle(&update).await.unwrap();
    let overflow = handler.handle(&update).await.unwrap_err();

    let after = storages.storage(storage.id).await.unwrap();
    assert_eq!(after.capacity.get("Glass").map(|entry| entry.used), Some(40));
    assert_eq!(overflow.kind(), ErrorKind::Validation);
    assert!(!overflow.is_retryable());
}

fn storage_created(id: u64) -> EventEnvelope {
    EventEnvelope::new(Event::StorageCreated {
        id: StorageId(id),
        capacity: WasteCapacity::from([("Glass", (0, 50))]),
    })
}

fn distance_created(id: u64, storage: u64, organisation_id: OrganisationId) -> EventEnvelope {
    EventEnvelope::new(Event::StorageDistanceCreated(StorageDistance {
        id: DistanceId(id),
        storage_id: StorageId(storage),
        organisation_id,
        distance: 10,
    }))
}

#[tokio::test]
async fn storage_deleted_before_its_creation_is_not_resurrected() {
    let (service, handler, organisation_id) = organisation_service().await;

    handler
        .handle(&EventEnvelope::new(Event::StorageDeleted { id: StorageId(1) }))
        .await
        .unwrap();
    handler.handle(&storage_created(1)).await.unwrap();
    handler.handle(&distance_created(1, 1, organisation_id)).await.unwrap();

    assert!(service.storage_copies().await.unwrap().is_empty());
    assert!(service.distances(organisation_id).await.unwrap().is_empty());
    let before = service.organisation(organisation_id).await.unwrap();
    let outcome = service.recycle(organisation_id).await.unwrap();
    assert_eq!(outcome, RecycleOutcome::NoStorageAvailable { reachable: 0 });
    assert_eq!(service.organisation(organisation_id).await.unwrap(), before);
}

#[tokio::test]
async fn organisation_deleted_before_its_creation_is_not_resurrected() {
    let repository: Arc<dyn Repository<StorageState>> = Arc::new(MemoryRepository::<StorageState>::default());
    let handler = StorageReplicaHandler::new(Arc::clone(&repository));
    let storages = StorageService::new(repository, Arc::new(Discard));
    let storage = storages
        .create_storage(NewStorage {
            name: "MNO1".to_owned(),
            location: "Moscow".to_owned(),
            capacity: WasteCapacity::from([("Glass", (0, 50))]),
        })
        .await
        .unwrap();

    handler
        .handle(&EventEnvelope::new(Event::OrganisationDeleted {
            ids: vec![OrganisationId(1)],
        }))
        .await
        .unwrap();
    handler
        .handle(&EventEnvelope::new(Event::OrganisationCreated { id: OrganisationId(1) }))
        .await
        .unwrap();

    assert!(storages.organisation_copies().await.unwrap().is_empty());
    let err = storages
        .register_distance(NewDistance {
            storage_id: storage.id,
            organisation_id: OrganisationId(1),
            distance: 10,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn reregistered_distance_overtaking_the_old_delete_survives() {
    let (service, handler, organisation_id) = organisation_service().await;
    handler.handle(&storage_created(1)).await.unwrap();
    handler.handle(&distance_created(1, 1, organisation_id)).await.unwrap();

    handler.handle(&distance_created(2, 1, organisation_id)).await.unwrap();
    handler
        .handle(&EventEnvelope::new(Event::StorageDistanceDeleted { id: DistanceId(1) }))
        .await
        .unwrap();

    let reachable = service.distances(organisation_id).await.unwrap();
    assert_eq!(reachable.len(), 1);
    assert_eq!(reachable.first().map(|entry| entry.record_id), Some(DistanceId(2)));
    assert_eq!(service.allocate(organisation_id).await.unwrap().total_sent.get("Glass"), Some(&10));
}
