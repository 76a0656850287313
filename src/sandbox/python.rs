// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Python-style (op) protocol shim
//!
//! Requests carry an `op` and are echoed back with either `result` or `err`
//! added. Deltas are pushed unprompted as `{op: "delta", result: [...]}`.

use super::{ClientConnection, Connection, SandboxApi, SandboxError, SharedBackend};
use crate::backend::{parse_config_yaml, FakeBackend};
use crate::changes::{AnnotationSet, ChangeSet};
use crate::error::{BackendError, BackendResult};
use crate::types::{ConfigMap, Constraints, DeployOptions};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Shim speaking the Python-style protocol
#[derive(Debug)]
pub struct PyJujuApi {
    backend: SharedBackend,
    connection: Connection,
}

impl PyJujuApi {
    /// Create a disconnected shim over a backend
    #[must_use]
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            connection: Connection::default(),
        }
    }

    /// The backend this shim drives
    #[must_use]
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }
}

#[async_trait]
impl SandboxApi for PyJujuApi {
    async fn open(&mut self, client: ClientConnection) -> Result<(), SandboxError> {
        if !self.connection.open(client.clone())? {
            return Ok(());
        }
        let greeting = {
            let backend = self.backend.lock().await;
            json!({
                "ready": true,
                "provider_type": backend.provider_type(),
                "default_series": backend.default_series(),
            })
        };
        info!("python sandbox connected");
        client.receive(&greeting)
    }

    fn close(&mut self) {
        self.connection.close();
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    async fn receive(&mut self, frame: &str) -> Result<(), SandboxError> {
        let client = self.connection.client()?.clone();
        let mut data = match serde_json::from_str::<Value>(frame) {
            Ok(Value::Object(data)) => data,
            Ok(_) => return Err(SandboxError::Malformed("expected a JSON object".into())),
            Err(err) => return Err(SandboxError::Malformed(err.to_string())),
        };
        let op = data
            .get("op")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SandboxError::Malformed("missing op".into()))?;
        debug!(op = %op, "python request");

        let outcome = {
            let mut backend = self.backend.lock().await;
            perform(&mut backend, &op, &mut data).await
        };
        match outcome {
            Ok(result) => data.insert("result".into(), result),
            Err(err) => data.insert("err".into(), json!(err.to_string())),
        };
        client.receive(&Value::Object(data))
    }

    async fn send_delta(&mut self) -> Result<bool, SandboxError> {
        let client = self.connection.client()?.clone();
        let deltas = {
            let mut backend = self.backend.lock().await;
            let changes = backend.next_changes().ok().flatten();
            let annotations = backend.next_annotations().ok().flatten();
            build_deltas(changes.as_ref(), annotations.as_ref())
        };
        if deltas.is_empty() {
            return Ok(false);
        }
        debug!(count = deltas.len(), "sending deltas");
        client.receive(&json!({"op": "delta", "result": deltas}))?;
        Ok(true)
    }
}

// =============================================================================
// Operations
// =============================================================================

fn text(data: &Map<String, Value>, key: &str) -> BackendResult<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::invalid(format!("missing field: {key}")))
}

fn optional<T: DeserializeOwned>(data: &Map<String, Value>, key: &str) -> BackendResult<Option<T>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| BackendError::invalid(format!("invalid field {key}: {e}"))),
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

async fn perform(
    backend: &mut FakeBackend,
    op: &str,
    data: &mut Map<String, Value>,
) -> BackendResult<Value> {
    match op {
        "login" => {
            let user = text(data, "user").unwrap_or_default();
            let password = text(data, "password").unwrap_or_default();
            Ok(Value::Bool(backend.login(&user, &password)))
        }
        "token_login" => {
            let token = text(data, "token")?;
            Ok(match backend.token_login(&token) {
                Some((user, password)) => {
                    data.insert("user".into(), json!(user));
                    data.insert("password".into(), json!(password));
                    Value::Bool(true)
                }
                None => Value::Bool(false),
            })
        }
        "deploy" => {
            let charm_url = text(data, "charm_url")?;
            let options = DeployOptions {
                name: optional(data, "service_name")?,
                config: optional::<ConfigMap>(data, "config")?,
                config_yaml: optional::<String>(data, "config_raw")?.filter(|raw| !raw.is_empty()),
                unit_count: optional(data, "num_units")?,
                constraints: optional::<Constraints>(data, "constraints")?,
                annotations: None,
            };
            let deployed = backend.deploy(&charm_url, options).await?;
            Ok(json!(deployed.service.name))
        }
        "add_unit" => {
            let service = text(data, "service_name")?;
            let count = optional(data, "num_units")?;
            let added = backend.add_unit(&service, count, None)?;
            let units: Vec<&str> = added.units.iter().map(|u| u.id.as_str()).collect();
            Ok(json!(units))
        }
        "remove_units" => {
            let names: Vec<String> = optional(data, "unit_names")?.unwrap_or_default();
            let report = backend.remove_units(&names)?;
            if !report.warnings.is_empty() {
                data.insert("warning".into(), json!(report.warnings));
            }
            if report.errors.is_empty() {
                Ok(Value::Null)
            } else {
                Err(BackendError::invalid(report.errors.join("; ")))
            }
        }
        "add_relation" => {
            let a = text(data, "endpoint_a")?;
            let b = text(data, "endpoint_b")?;
            let added = backend.add_relation(&a, &b, true)?;
            let endpoints: Vec<Value> = added
                .endpoints
                .iter()
                .map(|ep| {
                    let mut endpoint = Map::new();
                    endpoint.insert(ep.0.clone(), json!({"name": ep.1.name}));
                    Value::Object(endpoint)
                })
                .collect();
            Ok(json!({
                "endpoints": endpoints,
                "id": added.relation_id,
                "interface": added.interface,
                "scope": added.scope,
            }))
        }
        "remove_relation" => {
            let a = text(data, "endpoint_a")?;
            let b = text(data, "endpoint_b")?;
            backend.remove_relation(&a, &b)?;
            Ok(Value::Null)
        }
        "destroy_service" => {
            let service = text(data, "service_name")?;
            Ok(json!(backend.destroy_service(&service)?))
        }
        "get_service" => {
            let service = text(data, "service_name")?;
            Ok(to_json(&backend.get_service(&service)?))
        }
        "get_charm" => {
            let charm_url = text(data, "charm_url")?;
            let charm = backend.get_charm(&charm_url).await?;
            Ok(json!({
                "url": charm.id,
                "name": charm.package_name,
                "series": charm.series,
                "config": {"options": charm.options},
                "provides": charm.provides,
                "requires": charm.requires,
                "subordinate": charm.is_subordinate,
            }))
        }
        "set_config" => {
            let service = text(data, "service_name")?;
            let config = match optional::<String>(data, "data")?.filter(|raw| !raw.is_empty()) {
                Some(yaml) => parse_config_yaml(&yaml)?,
                None => optional::<ConfigMap>(data, "config")?.unwrap_or_default(),
            };
            Ok(to_json(&backend.set_config(&service, config)?))
        }
        "set_constraints" => {
            let service = text(data, "service_name")?;
            let constraints: Constraints = optional(data, "constraints")?
                .unwrap_or_else(|| Constraints::Pairs(Vec::new()));
            backend.set_constraints(&service, &constraints)?;
            Ok(Value::Null)
        }
        "expose" | "unexpose" => {
            let service = text(data, "service_name")?;
            let warning = if op == "expose" {
                backend.expose(&service)?
            } else {
                backend.unexpose(&service)?
            };
            if let Some(warning) = warning {
                data.insert("warning".into(), json!(warning));
            }
            Ok(Value::Null)
        }
        "update_annotations" => {
            let entity = text(data, "entity")?;
            let values: Map<String, Value> = optional(data, "data")?.unwrap_or_default();
            let annotations = values
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, s),
                    other => (key, other.to_string()),
                })
                .collect();
            Ok(to_json(&backend.update_annotations(&entity, annotations)?))
        }
        "get_annotations" => {
            let entity = text(data, "entity")?;
            Ok(to_json(&backend.get_annotations(&entity)?))
        }
        "remove_annotations" => {
            let entity = text(data, "entity")?;
            let keys: Vec<String> = optional(data, "keys")?.unwrap_or_default();
            let keys = (!keys.is_empty()).then_some(keys.as_slice());
            Ok(to_json(&backend.remove_annotations(&entity, keys)?))
        }
        "resolved" => {
            let unit = text(data, "unit_name")?;
            let relation: Option<String> = optional(data, "relation_name")?;
            backend.resolved(&unit, relation.as_deref())?;
            Ok(Value::Null)
        }
        "import_deployer" => {
            let yaml = text(data, "YAML")?;
            let name: Option<String> = optional(data, "Name")?;
            Ok(match backend.import_deployer(&yaml, name.as_deref()).await {
                Ok(id) => json!({"DeploymentId": id}),
                Err(err) => json!({"Error": err.to_string()}),
            })
        }
        "deployer_status" => Ok(json!({"LastChanges": backend.status_deployer()?})),
        "deployer_watch" => {
            let id: u64 = optional(data, "DeploymentId")?.unwrap_or_default();
            backend.deployer_watch(id)?;
            Ok(json!({"WatcherId": id}))
        }
        "deployer_next" => {
            let id: u64 = optional(data, "WatcherId")?.unwrap_or_default();
            backend.deployer_next(id)?;
            Ok(json!({}))
        }
        "export" => backend.export_environment(),
        other => Err(BackendError::invalid(format!("Unknown operation: {other}"))),
    }
}

// =============================================================================
// Deltas
// =============================================================================

fn attributes<T: Serialize>(entity: &T, id: &str) -> Value {
    let mut value = to_json(entity);
    if let Value::Object(map) = &mut value {
        map.insert("id".into(), json!(id));
        map.remove("units");
    }
    value
}

fn action(present: bool) -> &'static str {
    if present {
        "change"
    } else {
        "remove"
    }
}

fn build_deltas(changes: Option<&ChangeSet>, annotations: Option<&AnnotationSet>) -> Vec<Value> {
    let mut deltas = Vec::new();
    if let Some(changes) = changes {
        for (id, (service, present)) in &changes.services {
            deltas.push(json!(["service", action(*present), attributes(service, id)]));
        }
        for (id, (machine, present)) in &changes.machines {
            deltas.push(json!(["machine", action(*present), attributes(machine, id)]));
        }
        for (id, (unit, present)) in &changes.units {
            deltas.push(json!(["unit", action(*present), attributes(unit, id)]));
        }
        for (id, (relation, present)) in &changes.relations {
            deltas.push(json!(["relation", action(*present), attributes(relation, id)]));
        }
    }
    if let Some(set) = annotations {
        for (id, service) in &set.services {
            deltas.push(json!(["service", "change", attributes(service, id)]));
        }
        for (id, machine) in &set.machines {
            deltas.push(json!(["machine", "change", attributes(machine, id)]));
        }
        for (id, unit) in &set.units {
            deltas.push(json!(["unit", "change", attributes(unit, id)]));
        }
        for (id, data) in &set.annotations {
            deltas.push(json!(["annotations", "change", {"id": id, "annotations": data}]));
        }
    }
    deltas
}
