//! Fixture data loaded into empty services at startup.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use recycling_core::{
    Distance, ErrorKind, NewDistance, NewOrganisation, NewStorage, OrganisationId, OrganisationService, StorageId,
    StorageService,
};
use serde::Deserialize;

const DEMO: &str = include_str!("../seed/demo.json");

/// How often a distance is retried while its organisation copy is still in flight.
const REGISTER_ATTEMPTS: u32 = 50;
const REGISTER_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Seed {
    pub organisations: Vec<NewOrganisation>,
    pub storages: Vec<NewStorage>,
    #[serde(default)]
    pub distances: Vec<SeedDistance>,
}

/// Distance between a storage and an organisation, both referenced by name.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeedDistance {
    pub storage: String,
    pub organisation: String,
    pub distance: Distance,
}

impl Seed {
    pub(crate) fn demo() -> Result<Self> {
        serde_json::from_str(DEMO).context("built-in demo seed is malformed")
    }

    pub(crate) async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading seed file {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing seed file {}", path.display()))
    }

    /// Load the seed into both services. Does nothing unless both are empty.
    pub(crate) async fn apply(&self, organisations: &OrganisationService, storages: &StorageService) -> Result<bool> {
        if !organisations.organisations().await?.is_empty() || !storages.storages().await?.is_empty() {
            tracing::info!("services already hold data, seed skipped");
            return Ok(false);
        }

        let mut organisation_ids: BTreeMap<&str, OrganisationId> = BTreeMap::new();
        for new in &self.organisations {
            let created = organisations.create_organisation(new.clone()).await?;
            organisation_ids.insert(new.name.trim(), created.id);
        }

        let mut storage_ids: BTreeMap<&str, StorageId> = BTreeMap::new();
        for new in &self.storages {
            let created = storages.create_storage(new.clone()).await?;
            storage_ids.insert(new.name.trim(), created.id);
        }

        for entry in &self.distances {
            let storage_id = *storage_ids
                .get(entry.storage.as_str())
                .ok_or_else(|| anyhow!("seed distance names unknown storage {}", entry.storage))?;
            let organisation_id = *organisation_ids
                .get(entry.organisation.as_str())
                .ok_or_else(|| anyhow!("seed distance names unknown organisation {}", entry.organisation))?;
            register(
                storages,
                NewDistance {
                    storage_id,
                    organisation_id,
                    distance: entry.distance,
                },
            )
            .await?;
        }

        tracing::info!(
            organisations = self.organisations.len(),
            storages = self.storages.len(),
            distances = self.distances.len(),
            "seed applied"
        );
        Ok(true)
    }
}

/// Register a distance, waiting for the organisation copy to replicate first.
async fn register(storages: &StorageService, new: NewDistance) -> Result<()> {
    let mut attempt = 1;
    loop {
        match storages.register_distance(new).await {
            Ok(_) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::UnresolvedReference && attempt < REGISTER_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(REGISTER_BACKOFF).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use recycling_core::{RecycleOutcome, RecyclingConfig};
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::system::System;

    #[test]
    fn demo_seed_parses() {
        let seed = Seed::demo().unwrap();

        assert_eq!(seed.organisations.len(), 2);
        assert_eq!(seed.storages.len(), 8);
        assert_eq!(seed.distances.len(), 11);
    }

    #[tokio::test]
    async fn demo_seed_supports_a_full_recycle() {
        let system = System::start(&RecyclingConfig::default()).await.unwrap();
        let seed = Seed::demo().unwrap();

        assert!(seed.apply(&system.organisations, &system.storages).await.unwrap());
        assert!(!seed.apply(&system.organisations, &system.storages).await.unwrap());

        let organisation = system
            .organisations
            .organisations()
            .await
            .unwrap()
            .into_iter()
            .find(|organisation| organisation.name == "ОО2")
            .unwrap();
        timeout(Duration::from_secs(5), async {
            while system.organisations.distances(organisation.id).await.unwrap().len() < 3 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let outcome = system.organisations.recycle(organisation.id).await.unwrap();

        assert!(matches!(outcome, RecycleOutcome::FullyAllocated { .. }));
        let plan = outcome.plan().unwrap();
        let sent = |storage: u64, waste_type: &str| {
            plan.get(&StorageId(storage))
                .and_then(|amounts| amounts.get(waste_type))
                .copied()
        };
        assert_eq!(sent(3, "Пластик"), Some(10));
        assert_eq!(sent(3, "Биоотходы"), Some(50));
        assert_eq!(sent(6, "Пластик"), Some(50));
        assert_eq!(sent(5, "Стекло"), Some(20));

        system.shutdown().await;
    }
}
