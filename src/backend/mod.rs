// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! The fake Juju backend
//!
//! [`FakeBackend`] owns the entity store, the change trackers and the
//! session. Every public operation checks authentication first and returns
//! exactly one of a result or a [`BackendError`]; no operation leaves a
//! half-applied mutation behind.

mod annotations;
mod deployer;
mod placement;
mod relations;
mod session;

pub use deployer::{DeploymentLog, DEPLOYMENT_HISTORY};
pub use relations::{find_endpoint_match, EndpointMatch, EndpointSpec, MatchedEndpoint};
pub use session::Session;

use crate::changes::{AnnotationSet, ChangeSet};
use crate::charm::CharmId;
use crate::charmstore::{fetch_charm, CharmStore};
use crate::config::Config;
use crate::error::{BackendError, BackendResult};
use crate::events::{BackendEvent, EventBus};
use crate::store::Database;
use crate::types::{
    Charm, ConfigMap, Constraints, DeployOptions, DeployResult, Service, ServiceDetails,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// In-memory simulation of a Juju environment
pub struct FakeBackend {
    session: Session,
    db: Database,
    changes: ChangeSet,
    annotations: AnnotationSet,
    charm_store: Arc<dyn CharmStore>,
    default_series: String,
    provider_type: String,
    maas_server: Option<String>,
    charm_load_delay: Duration,
    relation_count: u64,
    machine_sequences: HashMap<String, u64>,
    deployments: DeploymentLog,
    events: EventBus,
}

impl fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeBackend")
            .field("session", &self.session)
            .field("services", &self.db.services.len())
            .field("machines", &self.db.machines.len())
            .field("relations", &self.db.relations.len())
            .field("default_series", &self.default_series)
            .finish_non_exhaustive()
    }
}

impl FakeBackend {
    /// Create an empty, logged-out environment
    #[must_use]
    pub fn new(config: &Config, charm_store: Arc<dyn CharmStore>) -> Self {
        Self {
            session: Session::new(config.users.clone(), config.token.clone()),
            db: Database::new(),
            changes: ChangeSet::default(),
            annotations: AnnotationSet::default(),
            charm_store,
            default_series: config.default_series.clone(),
            provider_type: config.provider_type.clone(),
            maas_server: config.maas_server.clone(),
            charm_load_delay: Duration::from_millis(config.charm_load_delay_ms),
            relation_count: 0,
            machine_sequences: HashMap::new(),
            deployments: DeploymentLog::default(),
            events: EventBus::new(),
        }
    }

    /// Read access to the entity store
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Series used for charm ids that do not name one
    #[must_use]
    pub fn default_series(&self) -> &str {
        &self.default_series
    }

    /// Provider type reported to clients
    #[must_use]
    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    /// MAAS server address, when the sandbox poses as a MAAS model
    #[must_use]
    pub fn maas_server(&self) -> Option<&str> {
        self.maas_server.as_deref()
    }

    /// Subscribe to backend events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Log in with a password; returns whether the session is now authenticated
    pub fn login(&mut self, user: &str, password: &str) -> bool {
        let ok = self.session.login(user, password);
        info!(user, ok, "login");
        self.publish_session();
        ok
    }

    /// Log in with the shared token, returning the credentials used
    pub fn token_login(&mut self, token: &str) -> Option<(String, String)> {
        let credentials = self.session.token_login(token);
        info!(ok = credentials.is_some(), "token login");
        self.publish_session();
        credentials
    }

    /// Log out; idempotent
    pub fn logout(&mut self) {
        if self.session.is_authenticated() {
            self.session.logout();
            self.publish_session();
        }
    }

    /// Whether a user is logged in
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// The logged-in user
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.session.user()
    }

    fn publish_session(&self) {
        self.events.publish(BackendEvent::SessionChanged {
            user: self.session.user().map(str::to_string),
        });
    }

    pub(crate) fn ensure_authenticated(&self) -> BackendResult<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(BackendError::Unauthenticated)
        }
    }

    // =========================================================================
    // Change streams
    // =========================================================================

    /// Drain entity changes recorded since the last call
    pub fn next_changes(&mut self) -> BackendResult<Option<ChangeSet>> {
        self.ensure_authenticated()?;
        Ok(self.changes.drain())
    }

    /// Drain annotation changes recorded since the last call
    pub fn next_annotations(&mut self) -> BackendResult<Option<AnnotationSet>> {
        self.ensure_authenticated()?;
        Ok(self.annotations.drain())
    }

    /// Record the current state of a service in the change set
    pub(crate) fn touch_service(&mut self, name: &str) {
        if let Some(service) = self.db.service(name) {
            self.changes.service(service, true);
        }
    }

    // =========================================================================
    // Charms
    // =========================================================================

    /// Find a cached charm; an id without a revision takes the newest cached one
    fn cached_charm(&self, raw: &str, id: &CharmId) -> Option<&Charm> {
        let url = id.to_string();
        if let Some(charm) = self.db.charms.iter().find(|c| c.id == url || c.id == raw) {
            return Some(charm);
        }
        if id.revision.is_some() {
            return None;
        }
        self.db
            .charms
            .iter()
            .filter_map(|charm| {
                let cached = CharmId::parse(&charm.id, &id.series).ok()?;
                let same = cached.schema == id.schema
                    && cached.owner == id.owner
                    && cached.series == id.series
                    && cached.name == id.name;
                same.then_some((cached.revision, charm))
            })
            .max_by_key(|(revision, _)| *revision)
            .map(|(_, charm)| charm)
    }

    /// Resolve a charm from the cache or the charm store.
    ///
    /// When a concurrent load already cached the same charm, the cached
    /// record wins.
    pub(crate) async fn load_charm(&mut self, charm_id: &str) -> BackendResult<Charm> {
        self.load_charm_in_series(charm_id, None).await
    }

    pub(crate) async fn load_charm_in_series(
        &mut self,
        charm_id: &str,
        series: Option<&str>,
    ) -> BackendResult<Charm> {
        let parsed = CharmId::parse(charm_id, series.unwrap_or(self.default_series.as_str()))?;
        if let Some(charm) = self.cached_charm(charm_id, &parsed) {
            return Ok(charm.clone());
        }
        let charm = fetch_charm(self.charm_store.as_ref(), &parsed).await?;
        Ok(self.db.add_charm(charm).clone())
    }

    /// Load a charm's details, after the configured artificial delay
    pub async fn get_charm(&mut self, charm_id: &str) -> BackendResult<Charm> {
        self.ensure_authenticated()?;
        let charm = self.load_charm(charm_id).await?;
        if !self.charm_load_delay.is_zero() {
            tokio::time::sleep(self.charm_load_delay).await;
        }
        Ok(charm)
    }

    // =========================================================================
    // Deploy
    // =========================================================================

    /// Deploy a charm as a new service and place its initial units
    pub async fn deploy(
        &mut self,
        charm_id: &str,
        options: DeployOptions,
    ) -> BackendResult<DeployResult> {
        self.ensure_authenticated()?;
        let charm = self.load_charm(charm_id).await?;
        self.deploy_from_charm(&charm, options)
    }

    pub(crate) fn deploy_from_charm(
        &mut self,
        charm: &Charm,
        options: DeployOptions,
    ) -> BackendResult<DeployResult> {
        let name = options
            .name
            .unwrap_or_else(|| charm.package_name.clone());
        if self.db.service(&name).is_some() {
            return Err(BackendError::DuplicateServiceName(name));
        }

        let explicit = match options.config_yaml {
            Some(yaml) => parse_config_yaml(&yaml)?,
            None => options.config.unwrap_or_default(),
        };

        let unit_count = options
            .unit_count
            .unwrap_or(if charm.is_subordinate { 0 } else { 1 });
        if unit_count != 0 {
            placement::check_unit_count(&name, charm.is_subordinate, unit_count)?;
        }

        let annotations = options.annotations.unwrap_or_default();
        let service = Service {
            name: name.clone(),
            charm: charm.id.clone(),
            config: charm.effective_config(&explicit),
            constraints: options
                .constraints
                .map(|c| c.normalize())
                .unwrap_or_default(),
            exposed: false,
            subordinate: charm.is_subordinate,
            annotations,
            units: Vec::new(),
            unit_sequence: 0,
        };
        let annotated = !service.annotations.is_empty();
        self.changes.service(&service, true);
        if annotated {
            self.annotations
                .services
                .insert(name.clone(), service.clone());
        }
        self.db.services.push(service);
        info!(service = %name, charm = %charm.id, unit_count, "service deployed");
        self.events
            .publish(BackendEvent::ServiceDeployed { name: name.clone() });

        let placed = if unit_count > 0 {
            let count = usize::try_from(unit_count).unwrap_or_default();
            let machines = self.allocate_machines(count);
            self.place_units(&name, &machines)?
        } else {
            Default::default()
        };

        let service = self
            .db
            .service(&name)
            .cloned()
            .ok_or_else(|| BackendError::ServiceNotFound(name.clone()))?;
        Ok(DeployResult {
            service,
            units: placed.units,
            machines: placed.machines,
        })
    }

    /// Switch a service to another charm.
    ///
    /// Refused while any unit is in an error state unless `force` is set.
    pub async fn set_charm(
        &mut self,
        service: &str,
        charm_id: &str,
        force: bool,
    ) -> BackendResult<()> {
        self.ensure_authenticated()?;
        let existing = self
            .db
            .service(service)
            .ok_or_else(|| BackendError::ServiceNotFound(service.to_string()))?;
        if !force && existing.units.iter().any(|u| u.agent_state.contains("error")) {
            return Err(BackendError::UnitsInErrorState(service.to_string()));
        }

        let charm = self.load_charm(charm_id).await?;
        let svc = self
            .db
            .service_mut(service)
            .ok_or_else(|| BackendError::ServiceNotFound(service.to_string()))?;
        svc.charm = charm.id;
        debug!(service, charm = %svc.charm, "charm updated");
        self.touch_service(service);
        Ok(())
    }

    // =========================================================================
    // Service queries and settings
    // =========================================================================

    /// A service together with the relations it takes part in
    pub fn get_service(&self, name: &str) -> BackendResult<ServiceDetails> {
        self.ensure_authenticated()?;
        let service = self
            .db
            .service(name)
            .ok_or_else(|| BackendError::ServiceNotFound(name.to_string()))?;
        Ok(ServiceDetails {
            service: service.clone(),
            rels: self.db.relations_for(name).into_iter().cloned().collect(),
        })
    }

    /// Expose a service; returns a warning when it already is
    pub fn expose(&mut self, name: &str) -> BackendResult<Option<String>> {
        self.set_exposed(name, true)
    }

    /// Unexpose a service; returns a warning when it is not exposed
    pub fn unexpose(&mut self, name: &str) -> BackendResult<Option<String>> {
        self.set_exposed(name, false)
    }

    fn set_exposed(&mut self, name: &str, exposed: bool) -> BackendResult<Option<String>> {
        self.ensure_authenticated()?;
        let service = self
            .db
            .service_mut(name)
            .ok_or_else(|| BackendError::ServiceNotFound(name.to_string()))?;
        if service.exposed == exposed {
            let state = if exposed { "already exposed" } else { "is not exposed" };
            return Ok(Some(format!("Service \"{name}\" {state}.")));
        }
        service.exposed = exposed;
        self.touch_service(name);
        Ok(None)
    }

    /// Shallow-merge configuration values onto a service.
    ///
    /// Values are not validated against the charm's option types. Returns
    /// the merged configuration.
    pub fn set_config(&mut self, name: &str, config: ConfigMap) -> BackendResult<ConfigMap> {
        self.ensure_authenticated()?;
        let service = self
            .db
            .service_mut(name)
            .ok_or_else(|| BackendError::ServiceNotFound(name.to_string()))?;
        service.config.extend(config);
        let merged = service.config.clone();
        self.touch_service(name);
        Ok(merged)
    }

    /// Shallow-merge constraints onto a service
    pub fn set_constraints(&mut self, name: &str, constraints: &Constraints) -> BackendResult<()> {
        self.ensure_authenticated()?;
        let service = self
            .db
            .service_mut(name)
            .ok_or_else(|| BackendError::ServiceNotFound(name.to_string()))?;
        service.constraints.extend(constraints.normalize());
        self.touch_service(name);
        Ok(())
    }

    /// Mark a unit (or one of its relations) as resolved.
    ///
    /// Nothing is simulated beyond validating the names.
    pub fn resolved(&self, unit: &str, relation: Option<&str>) -> BackendResult<()> {
        self.ensure_authenticated()?;
        let found = self
            .db
            .unit(unit)
            .ok_or_else(|| BackendError::UnitNotFound(unit.to_string()))?;
        if let Some(relation) = relation {
            let known = self
                .db
                .relations_for(&found.service)
                .iter()
                .any(|r| r.endpoints.iter().any(|ep| ep.1.name == relation));
            if !known {
                return Err(BackendError::RelationNotFound(format!("{relation} for {unit}")));
            }
        }
        Ok(())
    }

    /// Export the environment as a deployer bundle named `envExport`
    pub fn export_environment(&self) -> BackendResult<Value> {
        self.ensure_authenticated()?;
        let services: serde_json::Map<String, Value> = self
            .db
            .services
            .iter()
            .map(|s| {
                let num_units = if s.subordinate { 0 } else { s.units.len().max(1) };
                let mut entry = json!({
                    "charm": s.charm,
                    "num_units": num_units,
                });
                if !s.config.is_empty() {
                    entry["options"] = json!(s.config);
                }
                if !s.constraints.is_empty() {
                    entry["constraints"] = json!(s.constraints);
                }
                if !s.annotations.is_empty() {
                    entry["annotations"] = json!(s.annotations);
                }
                if s.exposed {
                    entry["expose"] = Value::Bool(true);
                }
                (s.name.clone(), entry)
            })
            .collect();

        let relations: Vec<Value> = self
            .db
            .relations
            .iter()
            .map(|r| {
                let ends: Vec<String> = r
                    .endpoints
                    .iter()
                    .map(|ep| format!("{}:{}", ep.0, ep.1.name))
                    .collect();
                json!(ends)
            })
            .collect();

        Ok(json!({
            "envExport": {
                "series": self.default_series,
                "services": services,
                "relations": relations,
            }
        }))
    }
}

/// Parse a YAML configuration document into a config map.
///
/// Anything other than a mapping is a parse error.
pub fn parse_config_yaml(yaml: &str) -> BackendResult<ConfigMap> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| BackendError::YamlParse(e.to_string()))?;
    if value.is_null() {
        return Ok(ConfigMap::new());
    }
    serde_yaml::from_value(value).map_err(|e| BackendError::YamlParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charmstore::StaticCharmStore;
    use crate::types::CharmData;
    use serde_json::json;

    fn make_backend() -> FakeBackend {
        let store = StaticCharmStore::new().with_charm(
            "precise/mysql-26",
            CharmData {
                store_url: Some("cs:precise/mysql-26".into()),
                package_name: Some("mysql".into()),
                ..CharmData::default()
            },
        );
        let mut backend = FakeBackend::new(&Config::default(), Arc::new(store));
        assert!(backend.login("admin", "password"));
        backend
    }

    #[tokio::test]
    async fn test_set_charm_refused_with_units_in_error() {
        let mut backend = make_backend();
        backend
            .deploy("cs:precise/mysql-26", DeployOptions::default())
            .await
            .unwrap();
        backend.db.unit_mut("mysql/0").unwrap().agent_state = "install-error".into();

        let err = backend
            .set_charm("mysql", "cs:precise/mysql-26", false)
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::UnitsInErrorState("mysql".into()));
        backend
            .set_charm("mysql", "cs:precise/mysql-26", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_charm_caches() {
        let mut backend = make_backend();
        let charm = backend.get_charm("mysql").await.unwrap();
        assert_eq!(charm.id, "cs:precise/mysql-26");
        assert_eq!(backend.database().charms.len(), 1);
        backend.get_charm("cs:precise/mysql-26").await.unwrap();
        assert_eq!(backend.database().charms.len(), 1);
    }

    #[tokio::test]
    async fn test_unrevisioned_id_uses_newest_cached_charm() {
        let mut backend = make_backend();
        for id in ["cs:precise/mysql-27", "cs:precise/mysql-28", "cs:trusty/mysql-30"] {
            let requested = CharmId::parse(id, "precise").unwrap();
            backend.db.add_charm(Charm::from_data(CharmData::default(), &requested));
        }

        // The store only knows mysql-26; the cache answers first.
        let charm = backend.get_charm("cs:precise/mysql").await.unwrap();
        assert_eq!(charm.id, "cs:precise/mysql-28");
        let charm = backend.get_charm("mysql").await.unwrap();
        assert_eq!(charm.id, "cs:precise/mysql-28");

        // An explicit revision still goes to the store.
        let charm = backend.get_charm("cs:precise/mysql-26").await.unwrap();
        assert_eq!(charm.id, "cs:precise/mysql-26");
        assert_eq!(backend.database().charms.len(), 4);
    }

    #[test]
    fn test_parse_config_yaml() {
        let config = parse_config_yaml("engine: apache\ntuning: optimized\nworkers: 4\n").unwrap();
        assert_eq!(config["engine"], json!("apache"));
        assert_eq!(config["workers"], json!(4));
    }

    #[test]
    fn test_parse_config_yaml_rejects_garbage() {
        assert!(matches!(
            parse_config_yaml("engine: [unclosed"),
            Err(BackendError::YamlParse(_))
        ));
        assert!(matches!(parse_config_yaml("- a\n- b\n"), Err(BackendError::YamlParse(_))));
    }

    #[test]
    fn test_parse_config_yaml_empty_document() {
        assert!(parse_config_yaml("").unwrap().is_empty());
    }
}
