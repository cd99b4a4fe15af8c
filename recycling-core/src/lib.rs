//! Core types and service wiring for the waste recycling system.

/// Greedy nearest-first allocation of waste to storages.
pub mod allocation;
/// Environment-driven runtime configuration.
pub mod config;
/// Distance records between storages and organisations.
pub mod distance;
/// Service-level error taxonomy.
pub mod error;
/// Replication message contracts.
pub mod events;
/// Checked capacity bookkeeping.
pub mod ledger;
/// In-memory repository adapter.
pub mod memory;
/// Domain models and identifiers shared by both services.
pub mod model;
/// Logging initialisation and span helpers.
pub mod observability;
/// Organisation service facade.
pub mod organisation;
/// Traits describing persistence and messaging collaborators.
pub mod ports;
/// Recycling orchestrator.
pub mod recycle;
/// Handlers applying replicated events, and their routing table.
pub mod replication;
/// Storage service facade.
pub mod storage;

pub use allocation::{Allocation, AllocationPlan, Candidate, allocate};
pub use config::{BrokerConfig, ConfigError, RecyclingConfig};
pub use distance::{DistanceRegistry, Reachable};
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use events::{Event, EventEnvelope, Topic};
pub use ledger::{CapacityLedger, DeltaSign, LedgerError};
pub use memory::MemoryRepository;
pub use model::*;
pub use observability::{LogFormat, init_logging};
pub use organisation::{OrganisationService, OrganisationState};
pub use ports::*;
pub use recycle::{RecycleOutcome, RecycleResponse};
pub use replication::{HandlerRegistry, OrganisationReplicaHandler, StorageReplicaHandler};
pub use storage::{StorageService, StorageState};
