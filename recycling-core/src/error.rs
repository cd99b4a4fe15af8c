//! Error taxonomy shared by both services.
//!
//! Every failure a caller can see maps onto one [`ErrorKind`], so clients can
//! tell "try again later" apart from "this will never succeed".

use std::result::Result as StdResult;

use crate::distance::RegistryError;
use crate::ledger::LedgerError;
use crate::model::{Distance, OrganisationId, StorageId};
use crate::ports::StoreError;

/// Result alias used across the service layer.
pub type Result<T> = StdResult<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Requests rejected at the boundary because of their content.
pub enum ValidationError {
    /// Names must not be blank.
    #[error("name must not be empty")]
    EmptyName,
    /// Another entity already uses the name.
    #[error("name {0:?} is already taken")]
    DuplicateName(String),
    /// The pair is already registered at this distance.
    #[error("storage {storage_id} is already registered for organisation {organisation_id} at distance {distance}")]
    DuplicateDistance {
        /// Storage end of the pair.
        storage_id: StorageId,
        /// Organisation end of the pair.
        organisation_id: OrganisationId,
        /// Registered distance.
        distance: Distance,
    },
    /// A capacity map or delta broke the `0 <= used <= total` invariant.
    #[error(transparent)]
    Capacity(LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Coarse classification of an [`Error`].
pub enum ErrorKind {
    /// Bad input; retrying will not help.
    Validation,
    /// The addressed entity does not exist.
    NotFound,
    /// A foreign entity has not been replicated yet; retry later.
    UnresolvedReference,
    /// Concurrent writers kept winning; retry later.
    Conflict,
    /// The persistence layer failed.
    Store,
}

#[derive(thiserror::Error, Debug)]
/// Errors surfaced by services and replication handlers.
pub enum Error {
    /// Rejected input.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Missing entity.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of entity.
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
    /// Reference to a shadow copy that has not arrived yet.
    #[error("{resource} {id} is not known here yet")]
    UnresolvedReference {
        /// Kind of entity.
        resource: &'static str,
        /// Identifier that was referenced.
        id: String,
    },
    /// Optimistic commit lost too many times in a row.
    #[error("gave up after {attempts} conflicting commits")]
    Conflict {
        /// Attempts made.
        attempts: u32,
    },
    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// Build a not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Build an unresolved-reference error.
    #[must_use]
    pub fn unresolved(resource: &'static str, id: impl ToString) -> Self {
        Self::UnresolvedReference {
            resource,
            id: id.to_string(),
        }
    }

    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Whether repeating the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnresolvedReference | ErrorKind::Conflict | ErrorKind::Store
        )
    }
}

impl From<LedgerError> for Error {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { resource, id } => Self::NotFound { resource, id },
            other => Self::Validation(ValidationError::Capacity(other)),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Duplicate {
                storage_id,
                organisation_id,
                distance,
            } => Self::Validation(ValidationError::DuplicateDistance {
                storage_id,
                organisation_id,
                distance,
            }),
            RegistryError::UnknownStorage(id) => Self::unresolved("storage", id),
            RegistryError::UnknownOrganisation(id) => Self::unresolved("organisation", id),
            RegistryError::NotFound(id) => Self::not_found("distance", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DistanceId, WasteType};

    #[test]
    fn retryable_kinds() {
        assert!(Error::unresolved("storage", 1).is_retryable());
        assert!(Error::Conflict { attempts: 3 }.is_retryable());
        assert!(!Error::not_found("organisation", 1).is_retryable());
        assert!(!Error::Validation(ValidationError::EmptyName).is_retryable());
    }

    #[test]
    fn ledger_errors_map_to_taxonomy() {
        let missing: Error = LedgerError::NotFound {
            resource: "storage",
            id: "3".to_owned(),
        }
        .into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let overflow: Error = LedgerError::Overflow {
            waste_type: WasteType::from("Glass"),
            used: 11,
            total: 10,
        }
        .into();
        assert_eq!(overflow.kind(), ErrorKind::Validation);
    }

    #[test]
    fn registry_errors_map_to_taxonomy() {
        let unresolved: Error = RegistryError::UnknownStorage(StorageId(2)).into();
        assert_eq!(unresolved.kind(), ErrorKind::UnresolvedReference);
        assert_eq!(unresolved.to_string(), "storage 2 is not known here yet");

        let missing: Error = RegistryError::NotFound(DistanceId(8)).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
