//! Recycling orchestrator: one recycle request from lookup to emitted capacity updates.
//!
//! The request ends in exactly one [`RecycleOutcome`] (or an error when the
//! organisation does not exist). Planning and the ledger deltas run inside a
//! single optimistic transaction, so either the organisation and every storage
//! copy change together or nothing changes. Capacity updates are published
//! only after that transaction commits.

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::allocation::AllocationPlan;
use crate::error::{Error, ErrorKind, Result};
use crate::events::Event;
use crate::ledger::DeltaSign;
use crate::model::{OrganisationId, WasteAmounts};
use crate::observability::recycle_span;
use crate::organisation::{OrganisationService, OrganisationState};
use crate::ports::{Change, emit, transact};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// Terminal state of a recycle request.
pub enum RecycleOutcome {
    /// Nothing outstanding; no side effects.
    AlreadyProcessed,
    /// No reachable storage could take anything; no side effects.
    ///
    /// Reported as not-found by callers that map outcomes to statuses.
    NoStorageAvailable {
        /// Storages with a distance record and a local copy. Zero means the
        /// organisation has no links at all; otherwise every one was full.
        reachable: usize,
    },
    /// Some waste was placed, the rest found no room.
    PartiallyAllocated {
        /// What went where.
        plan: AllocationPlan,
        /// Waste left with the organisation.
        remaining: WasteAmounts,
    },
    /// Every outstanding volume was placed.
    FullyAllocated {
        /// What went where.
        plan: AllocationPlan,
    },
}

impl RecycleOutcome {
    /// Plan carried out, if any.
    #[must_use]
    pub fn plan(&self) -> Option<&AllocationPlan> {
        match self {
            Self::PartiallyAllocated { plan, .. } | Self::FullyAllocated { plan } => Some(plan),
            Self::AlreadyProcessed | Self::NoStorageAvailable { .. } => None,
        }
    }

    /// Error-style classification for outcomes that callers report as a failure.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::NoStorageAvailable { .. } => Some(ErrorKind::NotFound),
            Self::AlreadyProcessed | Self::PartiallyAllocated { .. } | Self::FullyAllocated { .. } => None,
        }
    }

    /// Fixed human-readable message for the outcome.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::AlreadyProcessed => "All waste has already been recycled".to_owned(),
            Self::NoStorageAvailable { reachable: 0 } => "No storage is reachable from this organisation".to_owned(),
            Self::NoStorageAvailable { .. } => "No storage with free capacity is available".to_owned(),
            Self::PartiallyAllocated { remaining, .. } => {
                let leftovers: Vec<String> = remaining
                    .iter()
                    .map(|(waste_type, amount)| format!("{waste_type}={amount}"))
                    .collect();
                format!("Not all waste could be distributed, remaining: {}", leftovers.join(" "))
            }
            Self::FullyAllocated { .. } => "Waste was distributed across storages".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Response body for a recycle request.
pub struct RecycleResponse {
    /// Per-storage, per-waste-type amounts sent. Empty when nothing moved.
    pub plan: AllocationPlan,
    /// One of the fixed outcome messages.
    pub message: String,
}

impl From<&RecycleOutcome> for RecycleResponse {
    fn from(outcome: &RecycleOutcome) -> Self {
        Self {
            plan: outcome.plan().cloned().unwrap_or_default(),
            message: outcome.message(),
        }
    }
}

impl OrganisationState {
    /// Run the recycle state machine against this state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown organisation, or the ledger
    /// error that aborted the deltas.
    pub(crate) fn recycle(&mut self, id: OrganisationId) -> Result<Change<RecycleOutcome>> {
        let exhausted = self.organisations.is_exhausted(&id)?;
        if exhausted {
            return Ok(Change::Discard(RecycleOutcome::AlreadyProcessed));
        }

        let allocation = self.plan(id)?;
        if allocation.is_empty() {
            let reachable = self.candidates(id).len();
            return Ok(Change::Discard(RecycleOutcome::NoStorageAvailable { reachable }));
        }

        self.organisations
            .apply_delta(&id, &allocation.total_sent, DeltaSign::Release)?;
        for (storage_id, amounts) in &allocation.plan {
            self.storages.apply_delta(storage_id, amounts, DeltaSign::Receive)?;
        }

        let outcome = if allocation.is_complete() {
            RecycleOutcome::FullyAllocated {
                plan: allocation.plan,
            }
        } else {
            RecycleOutcome::PartiallyAllocated {
                plan: allocation.plan,
                remaining: allocation.remaining,
            }
        };
        Ok(Change::Commit(outcome))
    }
}

impl OrganisationService {
    /// Distribute an organisation's outstanding waste over its nearest storages.
    ///
    /// On success one `capacity.updated` event is published per storage in
    /// the plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown organisation, and a
    /// retryable [`Error::Conflict`] when concurrent requests kept winning.
    pub async fn recycle(&self, id: OrganisationId) -> Result<RecycleOutcome> {
        async move {
            let outcome = transact(self.repository(), self.commit_attempts, |state| state.recycle(id))
                .await
                .inspect_err(|err| tracing::warn!(error = %err, "recycle failed"))?;

            if let Some(plan) = outcome.plan() {
                for (storage_id, amounts) in plan {
                    emit(
                        self.publisher(),
                        Event::CapacityUpdated {
                            storage_id: *storage_id,
                            updated_capacity: amounts.clone(),
                        },
                    )
                    .await;
                }
            }

            tracing::info!(outcome = %outcome.message(), storages = outcome.plan().map_or(0, AllocationPlan::len), "recycle finished");
            Ok::<_, Error>(outcome)
        }
        .instrument(recycle_span(id))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StorageId, WasteType};

    #[test]
    fn partial_message_lists_remaining_waste() {
        let outcome = RecycleOutcome::PartiallyAllocated {
            plan: AllocationPlan::new(),
            remaining: [(WasteType::from("Bio"), 40), (WasteType::from("Plastic"), 30)]
                .into_iter()
                .collect(),
        };

        assert_eq!(
            outcome.message(),
            "Not all waste could be distributed, remaining: Bio=40 Plastic=30"
        );
    }

    #[test]
    fn response_carries_plan_and_message() {
        let plan: AllocationPlan = [(StorageId(1), [(WasteType::from("Glass"), 5)].into_iter().collect())]
            .into_iter()
            .collect();
        let outcome = RecycleOutcome::FullyAllocated { plan: plan.clone() };

        let response = RecycleResponse::from(&outcome);

        assert_eq!(response.plan, plan);
        assert_eq!(response.message, "Waste was distributed across storages");
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"plan": {"1": {"Glass": 5}}, "message": "Waste was distributed across storages"})
        );
    }

    #[test]
    fn outcomes_without_side_effects_have_no_plan() {
        assert!(RecycleOutcome::AlreadyProcessed.plan().is_none());
        assert!(
            RecycleResponse::from(&RecycleOutcome::NoStorageAvailable { reachable: 0 })
                .plan
                .is_empty()
        );
    }

    #[test]
    fn missing_storage_is_classified_as_not_found() {
        let unlinked = RecycleOutcome::NoStorageAvailable { reachable: 0 };
        let full = RecycleOutcome::NoStorageAvailable { reachable: 2 };

        assert_eq!(unlinked.error_kind(), Some(ErrorKind::NotFound));
        assert_eq!(full.error_kind(), Some(ErrorKind::NotFound));
        assert_eq!(RecycleOutcome::AlreadyProcessed.error_kind(), None);
        assert_eq!(unlinked.message(), "No storage is reachable from this organisation");
        assert_eq!(full.message(), "No storage with free capacity is available");
        assert_eq!(
            serde_json::to_value(&full).unwrap(),
            serde_json::json!({"outcome": "no_storage_available", "reachable": 2})
        );
    }
}
