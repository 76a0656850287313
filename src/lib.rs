// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Juju sandbox library - an in-memory Juju environment
//!
//! This crate simulates a Juju controller: services, units, machines and
//! relations live in memory, charms come from a pluggable charm store, and
//! two sandbox shims speak the historical Go and Python wire protocols so a
//! client can run against the simulation without a live backend.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod bundle;
pub mod changes;
pub mod charm;
pub mod charmstore;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod sandbox;
pub mod store;

/// Core data types shared by the backend, the deployer and the shims
pub mod types {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::BTreeMap;

    /// Service configuration values keyed by option name
    pub type ConfigMap = BTreeMap<String, Value>;

    /// Flat constraint map, e.g. `{"mem": "4G", "arch": "amd64"}`
    pub type ConstraintMap = BTreeMap<String, String>;

    /// Free-form annotations attached to an entity
    pub type Annotations = BTreeMap<String, String>;

    // =========================================================================
    // Charms
    // =========================================================================

    /// A declared charm configuration option
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct CharmOption {
        /// Default value, if the charm declares one
        #[serde(default)]
        pub default: Option<Value>,
        /// Option type: string, int, float or boolean
        #[serde(rename = "type", default = "default_option_type")]
        pub option_type: String,
        /// Human readable description
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub description: Option<String>,
    }

    fn default_option_type() -> String {
        "string".to_string()
    }

    impl CharmOption {
        /// Cast a string value to this option's declared type.
        ///
        /// Values that are not strings, or that do not parse, are returned
        /// unchanged.
        #[must_use]
        pub fn cast(&self, value: Value) -> Value {
            let Value::String(raw) = &value else {
                return value;
            };
            match self.option_type.as_str() {
                "int" => raw.trim().parse::<i64>().map_or(value, Value::from),
                "float" => raw.trim().parse::<f64>().map_or(value, Value::from),
                "boolean" => Value::Bool(raw.trim().eq_ignore_ascii_case("true")),
                _ => value,
            }
        }
    }

    /// A provided or required relation endpoint declared by a charm
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CharmEndpoint {
        /// Interface name, e.g. "mysql" or "http"
        pub interface: String,
        /// Relation scope ("global" or "container"), if declared
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub scope: Option<String>,
    }

    /// A loaded charm; immutable once cached
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Charm {
        /// Charm URL, e.g. `cs:precise/wordpress-15`
        pub id: String,
        /// Package name, used as the default service name
        pub package_name: String,
        /// OS series the charm targets
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub series: Option<String>,
        /// Declared configuration options
        #[serde(default)]
        pub options: BTreeMap<String, CharmOption>,
        /// Provided relation endpoints
        #[serde(default)]
        pub provides: BTreeMap<String, CharmEndpoint>,
        /// Required relation endpoints
        #[serde(default)]
        pub requires: BTreeMap<String, CharmEndpoint>,
        /// Whether the charm is a subordinate
        #[serde(default)]
        pub is_subordinate: bool,
    }

    impl Charm {
        /// Compute the effective configuration for a new service.
        ///
        /// Only declared option keys appear in the result; each takes the
        /// explicit value when given, otherwise the declared default.
        #[must_use]
        pub fn effective_config(&self, explicit: &ConfigMap) -> ConfigMap {
            self.options
                .iter()
                .filter_map(|(key, option)| {
                    let value = explicit
                        .get(key)
                        .filter(|v| !v.is_null())
                        .or(option.default.as_ref())?
                        .clone();
                    Some((key.clone(), option.cast(value)))
                })
                .collect()
        }
    }

    /// Raw charm record as served by a charm catalog
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct CharmData {
        /// Canonical store URL
        #[serde(default)]
        pub store_url: Option<String>,
        /// Alternative URL field used by older catalogs
        #[serde(default)]
        pub url: Option<String>,
        /// Package name
        #[serde(default)]
        pub package_name: Option<String>,
        /// Display name, used when no package name is given
        #[serde(default)]
        pub name: Option<String>,
        /// Series
        #[serde(default)]
        pub series: Option<String>,
        /// Declared options
        #[serde(default)]
        pub options: BTreeMap<String, CharmOption>,
        /// Provided endpoints
        #[serde(default)]
        pub provides: BTreeMap<String, CharmEndpoint>,
        /// Required endpoints
        #[serde(default)]
        pub requires: BTreeMap<String, CharmEndpoint>,
        /// Subordinate flag
        #[serde(default)]
        pub is_subordinate: bool,
    }

    // =========================================================================
    // Services and Units
    // =========================================================================

    /// A deployed service (application)
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Service {
        /// Unique service name, also its id
        pub name: String,
        /// Charm URL the service runs
        pub charm: String,
        /// Effective configuration
        #[serde(default)]
        pub config: ConfigMap,
        /// Normalized constraints
        #[serde(default)]
        pub constraints: ConstraintMap,
        /// Whether the service is exposed
        #[serde(default)]
        pub exposed: bool,
        /// Whether the service is a subordinate
        #[serde(default)]
        pub subordinate: bool,
        /// Service annotations
        #[serde(default)]
        pub annotations: Annotations,
        /// Units, in creation order
        #[serde(default)]
        pub units: Vec<Unit>,
        /// Next unit sequence number; never reset
        #[serde(skip)]
        pub unit_sequence: u64,
    }

    /// A running instance of a service
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Unit {
        /// Unit id: `<service>/<sequence>`
        pub id: String,
        /// Owning service name
        pub service: String,
        /// Hosting machine id
        pub machine: String,
        /// Agent state, e.g. "started" or "error"
        pub agent_state: String,
        /// Public address of the unit
        pub public_address: String,
        /// Whether the unit belongs to a subordinate service
        #[serde(default)]
        pub subordinate: bool,
        /// Unit annotations
        #[serde(default)]
        pub annotations: Annotations,
    }

    impl Unit {
        /// Name of the service owning a unit id
        #[must_use]
        pub fn service_name(unit_id: &str) -> &str {
            unit_id.split('/').next().unwrap_or(unit_id)
        }
    }

    // =========================================================================
    // Machines
    // =========================================================================

    /// Simulated hardware characteristics
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Hardware {
        /// CPU architecture
        pub arch: String,
        /// Number of cores (top-level machines only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub cpu_cores: Option<String>,
        /// CPU power (top-level machines only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub cpu_power: Option<String>,
        /// Memory in MB (top-level machines only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub mem: Option<String>,
        /// Root disk in MB (top-level machines only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub disk: Option<String>,
    }

    impl Hardware {
        /// Characteristics for a new machine honouring its constraints.
        ///
        /// Containers only report an architecture.
        #[must_use]
        pub fn for_machine(is_container: bool, constraints: &ConstraintMap) -> Self {
            let pick = |key: &str, default: &str| {
                constraints
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| default.to_string())
            };
            let arch = pick("arch", "amd64");
            if is_container {
                return Self {
                    arch,
                    cpu_cores: None,
                    cpu_power: None,
                    mem: None,
                    disk: None,
                };
            }
            Self {
                arch,
                cpu_cores: Some(pick("cpu-cores", "1")),
                cpu_power: Some(pick("cpu-power", "100")),
                mem: Some(pick("mem", "1740")),
                disk: Some(pick("disk", "8192")),
            }
        }
    }

    /// A simulated machine or container
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Machine {
        /// Machine id: "3" for machines, "3/lxc/0" for containers
        pub id: String,
        /// Parent machine id for containers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub parent_id: Option<String>,
        /// Container type ("lxc" or "kvm") for containers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub container_type: Option<String>,
        /// Public address: `addr-<id>.example.com`
        pub public_address: String,
        /// Agent state
        pub agent_state: String,
        /// OS series
        pub series: String,
        /// Juju jobs
        #[serde(default)]
        pub jobs: Vec<String>,
        /// Hardware characteristics
        pub hardware: Hardware,
        /// Machine annotations
        #[serde(default)]
        pub annotations: Annotations,
    }

    /// Parameters for adding a machine or container
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct MachineParams {
        /// OS series; the environment default when absent
        #[serde(default)]
        pub series: Option<String>,
        /// Parent machine for a new container
        #[serde(default)]
        pub parent_id: Option<String>,
        /// Container type ("lxc" or "kvm")
        #[serde(default)]
        pub container_type: Option<String>,
        /// Machine constraints
        #[serde(default)]
        pub constraints: Option<Constraints>,
        /// Juju jobs; `JobHostUnits` when absent
        #[serde(default)]
        pub jobs: Option<Vec<String>>,
    }

    /// Outcome of adding one machine
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AddedMachine {
        /// Name of the machine, when it was created
        pub name: Option<String>,
        /// Error message, when it was not
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Endpoint role within a relation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        /// The requiring side
        Client,
        /// The providing side
        Server,
    }

    /// Relation scope
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum RelationScope {
        /// Environment-wide relation
        #[default]
        Global,
        /// Container-scoped (subordinate) relation
        Container,
    }

    impl RelationScope {
        /// Parse a declared scope, treating anything unknown as global
        #[must_use]
        pub fn from_declared(scope: Option<&str>) -> Self {
            match scope {
                Some("container") => Self::Container,
                _ => Self::Global,
            }
        }

        /// Wire name of the scope
        #[must_use]
        pub fn as_str(&self) -> &'static str {
            match self {
                Self::Global => "global",
                Self::Container => "container",
            }
        }
    }

    /// Relation type name and role of one endpoint
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EndpointRole {
        /// Relation type name declared by the charm, e.g. "db"
        pub name: String,
        /// Role of the endpoint
        pub role: Role,
    }

    /// One side of a relation: `[service, {name, role}]`
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RelationEndpoint(pub String, pub EndpointRole);

    /// An established relation between two services
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Relation {
        /// Relation id: `relation-<n>` or `"<req>:<type> <prov>:<type>"`
        pub relation_id: String,
        /// Interface name
        #[serde(rename = "type")]
        pub interface: String,
        /// Endpoints, ordered `[requires, provides]`
        pub endpoints: Vec<RelationEndpoint>,
        /// Relation scope
        pub scope: RelationScope,
        /// Display name
        pub display_name: String,
    }

    impl Relation {
        /// Whether a service takes part in this relation
        #[must_use]
        pub fn involves(&self, service: &str) -> bool {
            self.endpoints.iter().any(|ep| ep.0 == service)
        }
    }

    /// Result of adding a relation.
    ///
    /// Carries both the stored relation (snake case) and the camel case
    /// fields older clients consume.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AddRelationResult {
        /// Relation id
        #[serde(rename = "relationId")]
        pub relation_id: String,
        /// Interface name
        #[serde(rename = "type")]
        pub interface: String,
        /// Endpoints, ordered `[requires, provides]`
        pub endpoints: Vec<RelationEndpoint>,
        /// Relation scope
        pub scope: RelationScope,
        /// Display name
        #[serde(rename = "displayName")]
        pub display_name: String,
        /// The stored relation
        pub relation: Relation,
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Constraints as accepted from callers
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum Constraints {
        /// `"mem=4G,arch=amd64"` or `"mem=4G arch=amd64"`
        RawString(String),
        /// `["mem=4G", "arch=amd64"]`
        Pairs(Vec<String>),
        /// `{"mem": "4G"}`; list values (tags) are joined with commas
        Map(BTreeMap<String, Value>),
    }

    impl Constraints {
        /// Normalize into a flat string map
        #[must_use]
        pub fn normalize(&self) -> ConstraintMap {
            match self {
                Self::RawString(raw) => {
                    let pairs = raw.matches('=').count();
                    let commas: Vec<&str> = raw.split(',').collect();
                    if pairs == commas.len() {
                        split_pairs(commas)
                    } else {
                        split_pairs(raw.split_whitespace())
                    }
                }
                Self::Pairs(items) => split_pairs(items.iter().map(String::as_str)),
                Self::Map(map) => map
                    .iter()
                    .map(|(key, value)| (key.clone(), constraint_value(value)))
                    .collect(),
            }
        }
    }

    fn split_pairs<'a>(items: impl IntoIterator<Item = &'a str>) -> ConstraintMap {
        items
            .into_iter()
            .filter_map(|item| item.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect()
    }

    fn constraint_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(constraint_value)
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        }
    }

    // =========================================================================
    // Deploy
    // =========================================================================

    /// Options accepted by deploy
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct DeployOptions {
        /// Service name; defaults to the charm's package name
        #[serde(default)]
        pub name: Option<String>,
        /// Explicit configuration values
        #[serde(default)]
        pub config: Option<ConfigMap>,
        /// YAML configuration; replaces `config` entirely when present
        #[serde(default)]
        pub config_yaml: Option<String>,
        /// Number of units; 1 for principals and 0 for subordinates by default
        #[serde(default)]
        pub unit_count: Option<i64>,
        /// Constraints in any accepted shape
        #[serde(default)]
        pub constraints: Option<Constraints>,
        /// Initial annotations
        #[serde(default)]
        pub annotations: Option<Annotations>,
    }

    /// Units and machines produced by a placement
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct AddUnitResult {
        /// Newly created units
        pub units: Vec<Unit>,
        /// Machines hosting them, in unit order
        pub machines: Vec<Machine>,
    }

    /// Result of a successful deploy
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DeployResult {
        /// The new service
        pub service: Service,
        /// Initial units
        pub units: Vec<Unit>,
        /// Machines hosting the initial units
        pub machines: Vec<Machine>,
    }

    /// Errors and warnings accumulated while removing units
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct UnitRemoval {
        /// Units that could not be removed
        #[serde(rename = "error", default, skip_serializing_if = "Vec::is_empty")]
        pub errors: Vec<String>,
        /// Units that did not exist
        #[serde(rename = "warning", default, skip_serializing_if = "Vec::is_empty")]
        pub warnings: Vec<String>,
    }

    impl UnitRemoval {
        /// True when neither errors nor warnings were recorded
        #[must_use]
        pub fn is_clean(&self) -> bool {
            self.errors.is_empty() && self.warnings.is_empty()
        }
    }

    /// A service together with the relations it takes part in
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ServiceDetails {
        /// The service
        #[serde(flatten)]
        pub service: Service,
        /// Relations touching the service
        pub rels: Vec<Relation>,
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Kinds of entity that carry annotations
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum EntityKind {
        /// The environment itself
        Environment,
        /// A service
        Service,
        /// A machine or container
        Machine,
        /// A unit
        Unit,
    }

    impl EntityKind {
        /// Annotation set group the entity is recorded under
        #[must_use]
        pub fn annotation_group(&self) -> &'static str {
            match self {
                Self::Environment => "annotations",
                Self::Service => "services",
                Self::Machine => "machines",
                Self::Unit => "units",
            }
        }
    }

    /// A resolved reference to an annotatable entity
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct EntityRef {
        /// Entity kind
        pub kind: EntityKind,
        /// Entity id ("env" for the environment)
        pub id: String,
    }

    // =========================================================================
    // Deployer
    // =========================================================================

    /// Status of a bundle deployment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum DeploymentStatus {
        /// Deploys have been issued
        Started,
        /// Every service and relation was created
        Completed,
        /// A deploy or relation failed
        Failed,
    }

    /// One entry of the deployment status log
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct DeploymentRecord {
        /// Deployment id
        pub deployment_id: u64,
        /// Current status
        pub status: DeploymentStatus,
        /// Time of the last status change
        #[serde(rename = "Time")]
        pub timestamp: DateTime<Utc>,
        /// Failure message, for failed deployments
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::FakeBackend;
    pub use crate::error::{BackendError, BackendResult};
    pub use crate::types::*;
    pub use anyhow::{Context, Result};
}
