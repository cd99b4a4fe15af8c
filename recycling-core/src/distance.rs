//! Distance registry: storage/organisation proximity records and nearest-first ordering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Distance, DistanceId, NewDistance, OrganisationId, StorageDistance, StorageId, take_next_id};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Ways a registry operation can be rejected.
pub enum RegistryError {
    /// The same storage/organisation pair is already registered at this distance.
    #[error("storage {storage_id} is already registered for organisation {organisation_id} at distance {distance}")]
    Duplicate {
        /// Storage end of the pair.
        storage_id: StorageId,
        /// Organisation end of the pair.
        organisation_id: OrganisationId,
        /// Registered distance.
        distance: Distance,
    },
    /// The storage is not present in this service's view.
    #[error("storage {0} is unknown")]
    UnknownStorage(StorageId),
    /// The organisation is not present in this service's view.
    #[error("organisation {0} is unknown")]
    UnknownOrganisation(OrganisationId),
    /// No record with this identifier.
    #[error("distance {0} not found")]
    NotFound(DistanceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which ends of a distance record exist in the caller's local view.
pub struct References {
    /// The storage (or its shadow copy) exists.
    pub storage_known: bool,
    /// The organisation (or its shadow copy) exists.
    pub organisation_known: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of applying a replicated record.
pub enum Upsert {
    /// The record was new.
    Inserted,
    /// An identical record was already present.
    Unchanged,
    /// A record with the same id but different content was overwritten.
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A storage reachable from an organisation.
pub struct Reachable {
    /// Reachable storage.
    pub storage_id: StorageId,
    /// Stored distance to it.
    pub distance: Distance,
    /// Record the distance comes from.
    pub record_id: DistanceId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Proximity records between storages and organisations.
pub struct DistanceRegistry {
    records: BTreeMap<DistanceId, StorageDistance>,
    next_id: u64,
}

impl DistanceRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new record and assign it an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the exact triple exists, or
    /// [`RegistryError::UnknownStorage`] / [`RegistryError::UnknownOrganisation`]
    /// when an end is missing from the local view.
    pub fn register(&mut self, new: NewDistance, references: References) -> Result<StorageDistance, RegistryError> {
        self.ensure_unique(new)?;
        check_references(new, references)?;

        let id = DistanceId(take_next_id(&mut self.next_id));

        let record = StorageDistance {
            id,
            storage_id: new.storage_id,
            organisation_id: new.organisation_id,
            distance: new.distance,
        };
        self.records.insert(id, record);
        Ok(record)
    }

    /// Apply a record produced by another service, keyed by its identifier.
    ///
    /// The producing service already enforced uniqueness, so a record whose
    /// triple exists under another id is accepted. That happens when a pair
    /// is deleted and registered again and the creation overtakes the delete.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownStorage`] /
    /// [`RegistryError::UnknownOrganisation`] when an end is missing from the
    /// local view; an identical redelivery is not an error.
    pub fn replicate(&mut self, record: StorageDistance, references: References) -> Result<Upsert, RegistryError> {
        if self.records.get(&record.id) == Some(&record) {
            return Ok(Upsert::Unchanged);
        }

        let new = NewDistance {
            storage_id: record.storage_id,
            organisation_id: record.organisation_id,
            distance: record.distance,
        };
        check_references(new, references)?;

        self.next_id = self.next_id.max(record.id.0.saturating_add(1));
        Ok(match self.records.insert(record.id, record) {
            Some(_) => Upsert::Replaced,
            None => Upsert::Inserted,
        })
    }

    fn ensure_unique(&self, new: NewDistance) -> Result<(), RegistryError> {
        let duplicate = self.records.values().any(|existing| {
            existing.storage_id == new.storage_id
                && existing.organisation_id == new.organisation_id
                && existing.distance == new.distance
        });
        if duplicate {
            return Err(RegistryError::Duplicate {
                storage_id: new.storage_id,
                organisation_id: new.organisation_id,
                distance: new.distance,
            });
        }
        Ok(())
    }

    /// Storages reachable from an organisation, nearest first.
    ///
    /// Ties on distance fall back to record id. A storage registered more
    /// than once appears only with its nearest record.
    #[must_use]
    pub fn list_for_organisation(&self, organisation_id: OrganisationId) -> Vec<Reachable> {
        let mut reachable: Vec<Reachable> = self
            .records
            .values()
            .filter(|record| record.organisation_id == organisation_id)
            .map(|record| Reachable {
                storage_id: record.storage_id,
                distance: record.distance,
                record_id: record.id,
            })
            .collect();

        reachable.sort_by_key(|entry| (entry.distance, entry.record_id));

        let mut seen = Vec::with_capacity(reachable.len());
        reachable.retain(|entry| {
            if seen.contains(&entry.storage_id) {
                false
            } else {
                seen.push(entry.storage_id);
                true
            }
        });
        reachable
    }

    /// Look up a record.
    #[must_use]
    pub fn get(&self, id: DistanceId) -> Option<&StorageDistance> {
        self.records.get(&id)
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &StorageDistance> {
        self.records.values()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the id is unknown.
    pub fn delete(&mut self, id: DistanceId) -> Result<StorageDistance, RegistryError> {
        self.records.remove(&id).ok_or(RegistryError::NotFound(id))
    }

    /// Remove every record referencing a storage.
    pub fn remove_for_storage(&mut self, storage_id: StorageId) -> Vec<StorageDistance> {
        self.remove_where(|record| record.storage_id == storage_id)
    }

    /// Remove every record referencing an organisation.
    pub fn remove_for_organisation(&mut self, organisation_id: OrganisationId) -> Vec<StorageDistance> {
        self.remove_where(|record| record.organisation_id == organisation_id)
    }

    fn remove_where<F: Fn(&StorageDistance) -> bool>(&mut self, predicate: F) -> Vec<StorageDistance> {
        let ids: Vec<DistanceId> = self
            .records
            .values()
            .filter(|record| predicate(record))
            .map(|record| record.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.records.remove(&id))
            .collect()
    }
}

fn check_references(new: NewDistance, references: References) -> Result<(), RegistryError> {
    if !references.storage_known {
        return Err(RegistryError::UnknownStorage(new.storage_id));
    }
    if !references.organisation_known {
        return Err(RegistryError::UnknownOrganisation(new.organisation_id));
    }
    Ok(())
}
