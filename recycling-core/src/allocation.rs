//! Greedy nearest-first distribution of outstanding waste over reachable storages.
//!
//! Each waste type is distributed independently. Storages are walked in the
//! order given (nearest first); every storage that tracks the type and still
//! has room takes as much as it can, until nothing is left or the walk ends.
//! There is no backtracking and no rebalancing between storages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Distance, StorageId, WasteAmounts, WasteCapacity};

/// Per-storage, per-waste-type assignment.
pub type AllocationPlan = BTreeMap<StorageId, WasteAmounts>;

#[derive(Debug, Clone, Copy)]
/// A storage offered to the engine, in walk order.
pub struct Candidate<'a> {
    /// Storage receiving waste.
    pub storage_id: StorageId,
    /// Distance from the organisation.
    pub distance: Distance,
    /// The storage's current capacity map.
    pub capacity: &'a WasteCapacity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Output of one allocation run.
pub struct Allocation {
    /// What goes where.
    pub plan: AllocationPlan,
    /// Sum of the plan per waste type.
    pub total_sent: WasteAmounts,
    /// Waste that found no room among the reachable storages.
    pub remaining: WasteAmounts,
}

impl Allocation {
    /// Whether nothing could be placed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Whether every outstanding volume was placed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Distribute an organisation's outstanding waste over `candidates`.
///
/// The outstanding volume of a waste type is its `used` value. Candidates
/// must already be sorted nearest first; a candidate that does not track a
/// waste type is never used for it, and one with no room left is skipped.
#[must_use]
pub fn allocate(outstanding: &WasteCapacity, candidates: &[Candidate<'_>]) -> Allocation {
    let mut allocation = Allocation::default();

    for (waste_type, entry) in outstanding.iter() {
        let mut remaining = entry.used;
        if remaining == 0 {
            continue;
        }

        for candidate in candidates {
            let Some(slot) = candidate.capacity.get(waste_type.as_str()) else {
                continue;
            };
            let room = slot.remaining();
            if room == 0 {
                continue;
            }

            let amount = remaining.min(room);
            allocation
                .plan
                .entry(candidate.storage_id)
                .or_default()
                .insert(waste_type.clone(), amount);
            *allocation.total_sent.entry(waste_type.clone()).or_default() += amount;
            remaining -= amount;

            if remaining == 0 {
                break;
            }
        }

        if remaining > 0 {
            allocation.remaining.insert(waste_type.clone(), remaining);
        }
    }

    allocation
}
