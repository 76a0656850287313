// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Error taxonomy for backend operations

use thiserror::Error;

/// Failure of a backend operation.
///
/// The display text is the human readable message surfaced to clients in
/// the `error` (Go) or `err` (Python) field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No user is logged in.
    #[error("Please log in.")]
    Unauthenticated,

    /// Service lookup failed.
    #[error("Service \"{0}\" does not exist.")]
    ServiceNotFound(String),

    /// Charm lookup failed.
    #[error("Charm not found: {0}")]
    CharmNotFound(String),

    /// Unit lookup failed.
    #[error("Unit \"{0}\" does not exist.")]
    UnitNotFound(String),

    /// Machine lookup failed.
    #[error("machine {0} does not exist")]
    MachineNotFound(String),

    /// No relation matches the given endpoints.
    #[error("Relationship does not exist: {0}")]
    RelationNotFound(String),

    /// Annotation target could not be resolved.
    #[error("Unable to resolve entity: {0}")]
    EntityNotFound(String),

    /// A service with the requested name already exists.
    #[error("A service with this name already exists ({0}).")]
    DuplicateServiceName(String),

    /// A bundle names services that are already deployed.
    #[error("Services already present in the environment: {0}")]
    DuplicateServiceOnImport(String),

    /// The charm id does not follow `[schema:][~owner/][series/]name[-rev]`.
    #[error("Invalid charm id: {0}")]
    InvalidCharmId(String),

    /// A relation endpoint's charm is not in the cache.
    #[error("Charm not loaded: {0}")]
    CharmNotLoaded(String),

    /// The charm store could not deliver the charm.
    #[error("Unable to connect to charm store: could not load {0}")]
    CharmStoreUnavailable(String),

    /// Malformed YAML in a config or bundle document.
    #[error("Error parsing YAML.\n{0}")]
    YamlParse(String),

    /// Invalid unit count for the service kind.
    #[error("Invalid number of units [{count}] for service: {service}")]
    InvalidUnitCount {
        /// Service name
        service: String,
        /// Requested count
        count: i64,
    },

    /// Charm upgrade refused while units are in error.
    #[error("Cannot set charm on a service with units in error without the force flag: {0}")]
    UnitsInErrorState(String),

    /// No provide/require pairing exists between the endpoints.
    #[error("Specified relation is unavailable.")]
    NoCompatibleRelation,

    /// More than one provide/require pairing exists.
    #[error("Ambiguous relationship is not allowed.")]
    AmbiguousRelation,

    /// The two endpoints are already related.
    #[error("Relation {0} already exists.")]
    RelationExists(String),

    /// A bundle holds several fragments and none was selected.
    #[error("Import target ambiguous, pick from {0}")]
    AmbiguousImportTarget(String),

    /// A fragment or one of its ancestors is missing.
    #[error("Unable to resolve bundle inheritance: {0}")]
    UnresolvableInheritance(String),

    /// Destroying a service was aborted because its units could not be removed.
    #[error("{severity} removing units [{units}] of {service}")]
    UnitRemoval {
        /// "Error" or "Warning"
        severity: String,
        /// Service being destroyed
        service: String,
        /// Comma separated unit ids
        units: String,
    },

    /// Some or all machines could not be destroyed.
    #[error("{0}")]
    MachineRemoval(String),

    /// Request parameters are missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),
}

/// Result alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    /// Shorthand for a malformed-request error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
