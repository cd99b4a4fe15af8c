//! Capacity ledger: checked bookkeeping of `(used, total)` pairs per entity.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::model::{Organisation, Storage, StorageCopy, Volume, WasteAmounts, WasteCapacity, WasteType};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Ways a capacity mutation can be rejected.
pub enum LedgerError {
    /// `used` would exceed `total` for a waste type.
    #[error("{waste_type}: used volume {used} exceeds total {total}")]
    Overflow {
        /// Offending waste type.
        waste_type: WasteType,
        /// Used volume that was requested or would result.
        used: Volume,
        /// Maximum volume.
        total: Volume,
    },
    /// `used` would drop below zero for a waste type.
    #[error("{waste_type}: cannot release {amount}, only {used} in use")]
    Underflow {
        /// Offending waste type.
        waste_type: WasteType,
        /// Volume currently in use.
        used: Volume,
        /// Volume the delta tried to release.
        amount: Volume,
    },
    /// The delta names a waste type the entity does not track.
    #[error("waste type {0} is not tracked by this entity")]
    UnknownWasteType(WasteType),
    /// The entity is not in the ledger.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of entity looked up.
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Direction of a capacity delta.
pub enum DeltaSign {
    /// The entity takes in waste: `used += amount`.
    Receive,
    /// The entity's outstanding waste shrinks: `used -= amount`.
    Release,
}

/// Check a capacity map before it is committed for the first time.
///
/// # Errors
///
/// Returns [`LedgerError::Overflow`] for the first waste type whose `used`
/// exceeds its `total`.
pub fn validate_initial(capacity: &WasteCapacity) -> Result<(), LedgerError> {
    match capacity.iter().find(|(_, entry)| entry.used > entry.total) {
        Some((waste_type, entry)) => Err(LedgerError::Overflow {
            waste_type: waste_type.clone(),
            used: entry.used,
            total: entry.total,
        }),
        None => Ok(()),
    }
}

impl WasteCapacity {
    /// Apply a delta to the listed waste types, leaving the rest untouched.
    ///
    /// Every amount is checked before anything is written, so a rejected
    /// delta leaves the capacity exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownWasteType`] for a type the entity does
    /// not track, [`LedgerError::Overflow`] when `used` would pass `total`,
    /// and [`LedgerError::Underflow`] when `used` would go negative.
    pub fn apply_delta(&mut self, amounts: &WasteAmounts, sign: DeltaSign) -> Result<(), LedgerError> {
        let mut updates = Vec::with_capacity(amounts.len());

        for (waste_type, &amount) in amounts {
            let entry = self
                .0
                .get(waste_type)
                .ok_or_else(|| LedgerError::UnknownWasteType(waste_type.clone()))?;

            let used = match sign {
                DeltaSign::Receive => entry
                    .used
                    .checked_add(amount)
                    .filter(|used| *used <= entry.total)
                    .ok_or_else(|| LedgerError::Overflow {
                        waste_type: waste_type.clone(),
                        used: entry.used.saturating_add(amount),
                        total: entry.total,
                    })?,
                DeltaSign::Release => {
                    entry
                        .used
                        .checked_sub(amount)
                        .ok_or_else(|| LedgerError::Underflow {
                            waste_type: waste_type.clone(),
                            used: entry.used,
                            amount,
                        })?
                }
            };
            updates.push((waste_type, used));
        }

        for (waste_type, used) in updates {
            if let Some(entry) = self.0.get_mut(waste_type) {
                entry.used = used;
            }
        }
        Ok(())
    }

    /// True when no waste type has anything outstanding (`used == 0` everywhere).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.0.values().all(|entry| entry.used == 0)
    }

    /// Waste types with a non-zero `used` volume.
    #[must_use]
    pub fn outstanding(&self) -> WasteAmounts {
        self.0
            .iter()
            .filter(|(_, entry)| entry.used > 0)
            .map(|(waste_type, entry)| (waste_type.clone(), entry.used))
            .collect()
    }
}

/// Entities whose capacity lives in a [`CapacityLedger`].
pub trait LedgerEntity {
    /// Resource name used in not-found errors.
    const RESOURCE: &'static str;

    /// Current capacity map.
    fn capacity(&self) -> &WasteCapacity;

    /// Mutable capacity map.
    fn capacity_mut(&mut self) -> &mut WasteCapacity;
}

impl LedgerEntity for Organisation {
    const RESOURCE: &'static str = "organisation";

    fn capacity(&self) -> &WasteCapacity {
        &self.capacity
    }

    fn capacity_mut(&mut self) -> &mut WasteCapacity {
        &mut self.capacity
    }
}

impl LedgerEntity for Storage {
    const RESOURCE: &'static str = "storage";

    fn capacity(&self) -> &WasteCapacity {
        &self.capacity
    }

    fn capacity_mut(&mut self) -> &mut WasteCapacity {
        &mut self.capacity
    }
}

impl LedgerEntity for StorageCopy {
    const RESOURCE: &'static str = "storage";

    fn capacity(&self) -> &WasteCapacity {
        &self.capacity
    }

    fn capacity_mut(&mut self) -> &mut WasteCapacity {
        &mut self.capacity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Ord, E: Serialize",
    deserialize = "K: Deserialize<'de> + Ord, E: Deserialize<'de>"
))]
/// Keyed collection of entities carrying a capacity map.
pub struct CapacityLedger<K, E> {
    entries: BTreeMap<K, E>,
}

impl<K: Ord, E> Default for CapacityLedger<K, E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K, E> CapacityLedger<K, E>
where
    K: Ord + Display,
    E: LedgerEntity,
{
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entity.
    pub fn insert(&mut self, id: K, entity: E) -> Option<E> {
        self.entries.insert(id, entity)
    }

    /// Look up an entity.
    #[must_use]
    pub fn get(&self, id: &K) -> Option<&E> {
        self.entries.get(id)
    }

    /// Whether the entity exists.
    #[must_use]
    pub fn contains(&self, id: &K) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove an entity.
    pub fn remove(&mut self, id: &K) -> Option<E> {
        self.entries.remove(id)
    }

    /// Remove every entity, returning them in key order.
    pub fn drain(&mut self) -> Vec<E> {
        mem::take(&mut self.entries).into_values().collect()
    }

    /// Iterate over entities in key order.
    pub fn values(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `sign * amount` to `used` for each listed waste type of one entity.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown entity, or the
    /// capacity error from [`WasteCapacity::apply_delta`].
    pub fn apply_delta(&mut self, id: &K, amounts: &WasteAmounts, sign: DeltaSign) -> Result<&E, LedgerError> {
        let entity = self.entries.get_mut(id).ok_or_else(|| LedgerError::NotFound {
            resource: E::RESOURCE,
            id: id.to_string(),
        })?;
        entity.capacity_mut().apply_delta(amounts, sign)?;
        Ok(entity)
    }

    /// Whether the entity has nothing outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for an unknown entity.
    pub fn is_exhausted(&self, id: &K) -> Result<bool, LedgerError> {
        self.entries
            .get(id)
            .map(|entity| entity.capacity().is_exhausted())
            .ok_or_else(|| LedgerError::NotFound {
                resource: E::RESOURCE,
                id: id.to_string(),
            })
    }
}
