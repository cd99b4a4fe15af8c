//! Domain data structures for organisations, storages, distances, and waste capacities.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Volume of waste, in whatever unit the deployment agrees on.
pub type Volume = u64;

/// Distance between a storage and an organisation. Stored, never computed.
pub type Distance = u64;

/// Volumes keyed by waste type. Used for plans, deltas, and leftovers.
pub type WasteAmounts = BTreeMap<WasteType, Volume>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier of an organisation (waste producer).
pub struct OrganisationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier of a storage (disposal facility).
pub struct StorageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifier of a storage/organisation distance record.
pub struct DistanceId(pub u64);

/// Hand out the next identifier from a counter. Identifiers start at 1.
pub(crate) fn take_next_id(counter: &mut u64) -> u64 {
    let id = (*counter).max(1);
    *counter = id + 1;
    id
}

impl fmt::Display for OrganisationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl fmt::Display for DistanceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Name of a waste category such as plastic or glass.
///
/// The set of waste types is open: any string is a valid key, and two
/// entities share a type only when the names match exactly.
pub struct WasteType(pub String);

impl WasteType {
    /// Build a waste type from its name.
    #[must_use]
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    /// Name of the waste type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WasteType {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl Borrow<str> for WasteType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WasteType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "(Volume, Volume)", into = "(Volume, Volume)")]
/// Used and total volume of one waste type. Serialised as `[used, total]`.
pub struct CapacityEntry {
    /// Volume currently held (storage) or generated and not yet recycled (organisation).
    pub used: Volume,
    /// Maximum volume.
    pub total: Volume,
}

impl CapacityEntry {
    /// Construct an entry.
    #[must_use]
    pub const fn new(used: Volume, total: Volume) -> Self {
        Self { used, total }
    }

    /// Free room left, `total - used`, never below zero.
    #[must_use]
    pub const fn remaining(&self) -> Volume {
        self.total.saturating_sub(self.used)
    }
}

impl From<(Volume, Volume)> for CapacityEntry {
    fn from((used, total): (Volume, Volume)) -> Self {
        Self { used, total }
    }
}

impl From<CapacityEntry> for (Volume, Volume) {
    fn from(entry: CapacityEntry) -> Self {
        (entry.used, entry.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
/// Mapping from waste type to `(used, total)` for one entity.
///
/// Iteration follows waste-type name order, so every walk over a capacity
/// map is deterministic.
pub struct WasteCapacity(pub(crate) BTreeMap<WasteType, CapacityEntry>);

impl WasteCapacity {
    /// Empty capacity map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a waste type, if the entity tracks it.
    #[must_use]
    pub fn get(&self, waste_type: &str) -> Option<&CapacityEntry> {
        self.0.get(waste_type)
    }

    /// Whether the entity tracks the waste type at all.
    #[must_use]
    pub fn contains(&self, waste_type: &str) -> bool {
        self.0.contains_key(waste_type)
    }

    /// Insert or replace the entry for a waste type.
    pub fn insert(&mut self, waste_type: WasteType, entry: CapacityEntry) -> Option<CapacityEntry> {
        self.0.insert(waste_type, entry)
    }

    /// Iterate over entries in waste-type order.
    pub fn iter(&self) -> impl Iterator<Item = (&WasteType, &CapacityEntry)> {
        self.0.iter()
    }

    /// Number of tracked waste types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no waste types are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(WasteType, CapacityEntry)> for WasteCapacity {
    fn from_iter<I: IntoIterator<Item = (WasteType, CapacityEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, (Volume, Volume)); N]> for WasteCapacity {
    fn from(entries: [(&str, (Volume, Volume)); N]) -> Self {
        entries
            .into_iter()
            .map(|(name, pair)| (WasteType::from(name), CapacityEntry::from(pair)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A waste producer and the waste it has generated per type.
pub struct Organisation {
    /// Unique identifier.
    pub id: OrganisationId,
    /// Unique display name.
    pub name: String,
    /// Generated volume versus the limit before mandatory recycling.
    pub capacity: WasteCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Request payload for creating an organisation.
pub struct NewOrganisation {
    /// Unique display name.
    pub name: String,
    /// Initial capacity map.
    pub capacity: WasteCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A disposal facility and the waste it holds per type.
pub struct Storage {
    /// Unique identifier.
    pub id: StorageId,
    /// Unique display name.
    pub name: String,
    /// Free-form location label.
    pub location: String,
    /// Held volume versus maximum per waste type.
    pub capacity: WasteCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Request payload for creating a storage.
pub struct NewStorage {
    /// Unique display name.
    pub name: String,
    /// Free-form location label.
    pub location: String,
    /// Initial capacity map.
    pub capacity: WasteCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Organisation-side shadow of a storage, kept in sync by replication events.
pub struct StorageCopy {
    /// Identifier of the authoritative storage.
    pub id: StorageId,
    /// Last known capacity, adjusted locally after each recycle.
    pub capacity: WasteCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Storage-side shadow of an organisation. Only the identity is replicated.
pub struct OrganisationCopy {
    /// Identifier of the authoritative organisation.
    pub id: OrganisationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Distance between one storage and one organisation.
pub struct StorageDistance {
    /// Unique identifier.
    pub id: DistanceId,
    /// Storage end of the pair.
    pub storage_id: StorageId,
    /// Organisation end of the pair.
    pub organisation_id: OrganisationId,
    /// Stored distance scalar.
    pub distance: Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Request payload for registering a distance.
pub struct NewDistance {
    /// Storage end of the pair.
    pub storage_id: StorageId,
    /// Organisation end of the pair.
    pub organisation_id: OrganisationId,
    /// Stored distance scalar.
    pub distance: Distance,
}
