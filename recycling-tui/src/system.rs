use std::sync::Arc;

use anyhow::Result;
use recycling_broker_local::LocalBroker;
use recycling_core::{
    EventHandler, EventPublisher, HandlerRegistry, MemoryRepository, OrganisationReplicaHandler, OrganisationService,
    OrganisationState, RecyclingConfig, Repository, StorageReplicaHandler, StorageService, StorageState,
};
use recycling_store_file::JsonFileRepository;
use tokio::task::JoinHandle;

type Repositories = (Arc<dyn Repository<OrganisationState>>, Arc<dyn Repository<StorageState>>);

/// Both services wired to one broker.
pub(crate) struct System {
    pub organisations: Arc<OrganisationService>,
    pub storages: Arc<StorageService>,
    broker: Arc<LocalBroker>,
    listeners: Vec<JoinHandle<()>>,
}

impl System {
    pub(crate) async fn start(config: &RecyclingConfig) -> Result<Self> {
        let broker = Arc::new(LocalBroker::new(config.broker.clone()));
        let publisher: Arc<dyn EventPublisher> = Arc::clone(&broker) as Arc<dyn EventPublisher>;
        let (organisation_repository, storage_repository) = repositories(config).await?;

        let organisations = OrganisationService::new(Arc::clone(&organisation_repository), Arc::clone(&publisher))
            .with_commit_attempts(config.commit_attempts);
        let storages = StorageService::new(Arc::clone(&storage_repository), publisher)
            .with_commit_attempts(config.commit_attempts);

        let registry = HandlerRegistry::new(vec![
            Arc::new(
                OrganisationReplicaHandler::new(organisation_repository).with_commit_attempts(config.commit_attempts),
            ) as Arc<dyn EventHandler>,
            Arc::new(StorageReplicaHandler::new(storage_repository).with_commit_attempts(config.commit_attempts))
                as Arc<dyn EventHandler>,
        ]);
        let listeners = broker.spawn_listeners(&registry).await;
        tracing::info!(listeners = listeners.len(), "replication listeners started");

        Ok(Self {
            organisations: Arc::new(organisations),
            storages: Arc::new(storages),
            broker,
            listeners,
        })
    }

    /// Close the broker and wait for listeners to drain their queues.
    pub(crate) async fn shutdown(self) {
        self.broker.close().await;
        for listener in self.listeners {
            if let Err(err) = listener.await {
                tracing::warn!(error = %err, "listener task failed");
            }
        }
    }
}

async fn repositories(config: &RecyclingConfig) -> Result<Repositories> {
    match &config.data_dir {
        Some(dir) => {
            let organisations = JsonFileRepository::<OrganisationState>::open_in(dir, "organisations").await?;
            let storages = JsonFileRepository::<StorageState>::open_in(dir, "storages").await?;
            tracing::info!(data_dir = %dir.display(), "using file repositories");
            Ok((Arc::new(organisations), Arc::new(storages)))
        }
        None => {
            tracing::info!("using in-memory repositories");
            Ok((
                Arc::new(MemoryRepository::<OrganisationState>::default()),
                Arc::new(MemoryRepository::<StorageState>::default()),
            ))
        }
    }
}
