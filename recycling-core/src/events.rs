//! Message contracts exchanged between the organisation and storage services.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{DistanceId, OrganisationId, StorageDistance, StorageId, WasteAmounts, WasteCapacity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Named topic a message is published to.
pub enum Topic {
    /// `organisation.created`, organisation → storage.
    OrganisationCreated,
    /// `organisation.deleted`, organisation → storage.
    OrganisationDeleted,
    /// `storage.created`, storage → organisation.
    StorageCreated,
    /// `storage.deleted`, storage → organisation.
    StorageDeleted,
    /// `storage_distance.created`, storage → organisation.
    StorageDistanceCreated,
    /// `storage_distance.deleted`, storage → organisation.
    StorageDistanceDeleted,
    /// `capacity.updated`, organisation → storage.
    CapacityUpdated,
}

impl Topic {
    /// Every topic in the catalogue.
    pub const ALL: [Self; 7] = [
        Self::OrganisationCreated,
        Self::OrganisationDeleted,
        Self::StorageCreated,
        Self::StorageDeleted,
        Self::StorageDistanceCreated,
        Self::StorageDistanceDeleted,
        Self::CapacityUpdated,
    ];

    /// Wire name of the topic.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OrganisationCreated => "organisation.created",
            Self::OrganisationDeleted => "organisation.deleted",
            Self::StorageCreated => "storage.created",
            Self::StorageDeleted => "storage.deleted",
            Self::StorageDistanceCreated => "storage_distance.created",
            Self::StorageDistanceDeleted => "storage_distance.deleted",
            Self::CapacityUpdated => "capacity.updated",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
/// Replication message payloads.
pub enum Event {
    /// A new organisation exists.
    #[serde(rename = "organisation.created")]
    OrganisationCreated {
        /// New organisation.
        id: OrganisationId,
    },
    /// Organisations were deleted.
    #[serde(rename = "organisation.deleted")]
    OrganisationDeleted {
        /// Deleted organisations.
        ids: Vec<OrganisationId>,
    },
    /// A new storage exists.
    #[serde(rename = "storage.created")]
    StorageCreated {
        /// New storage.
        id: StorageId,
        /// Its capacity at creation.
        capacity: WasteCapacity,
    },
    /// A storage was deleted.
    #[serde(rename = "storage.deleted")]
    StorageDeleted {
        /// Deleted storage.
        id: StorageId,
    },
    /// A distance record was registered.
    #[serde(rename = "storage_distance.created")]
    StorageDistanceCreated(StorageDistance),
    /// A distance record was removed.
    #[serde(rename = "storage_distance.deleted")]
    StorageDistanceDeleted {
        /// Removed record.
        id: DistanceId,
    },
    /// A storage received waste from a recycle run.
    #[serde(rename = "capacity.updated")]
    CapacityUpdated {
        /// Receiving storage.
        storage_id: StorageId,
        /// Volume received per waste type, to be added to `used`.
        updated_capacity: WasteAmounts,
    },
}

impl Event {
    /// Topic this event is published on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::OrganisationCreated { .. } => Topic::OrganisationCreated,
            Self::OrganisationDeleted { .. } => Topic::OrganisationDeleted,
            Self::StorageCreated { .. } => Topic::StorageCreated,
            Self::StorageDeleted { .. } => Topic::StorageDeleted,
            Self::StorageDistanceCreated(_) => Topic::StorageDistanceCreated,
            Self::StorageDistanceDeleted { .. } => Topic::StorageDistanceDeleted,
            Self::CapacityUpdated { .. } => Topic::CapacityUpdated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// An event plus delivery metadata.
pub struct EventEnvelope {
    /// Unique per publication; redeliveries keep the same id.
    pub event_id: Uuid,
    /// When the producer emitted the event.
    pub occurred_at: DateTime<Utc>,
    /// Payload.
    pub event: Event,
}

impl EventEnvelope {
    /// Wrap an event with a fresh id and the current time.
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event,
        }
    }

    /// Topic of the wrapped event.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.event.topic()
    }

    /// Encode as JSON bytes for the wire.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] for malformed or unknown messages.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
