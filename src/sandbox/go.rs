// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Go-style (facade/request) protocol shim
//!
//! Requests are `{type, request, params, request-id}` and responses
//! `{request-id, response, error?}`. Deltas are only delivered as the answer
//! to a pending `AllWatcher.Next`.

use super::{ClientConnection, Connection, SandboxApi, SandboxError, SharedBackend};
use crate::backend::FakeBackend;
use crate::changes::{AnnotationSet, ChangeSet};
use crate::error::{BackendError, BackendResult};
use crate::types::{
    Annotations, Charm, ConfigMap, Constraints, DeployOptions, EntityKind, Machine,
    MachineParams, Relation, Role, Service, Unit,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Id handed out for the single all-watcher
pub const ALL_WATCHER_ID: u64 = 42;

const CONTROLLER_TAG: &str = "controller-a30e7e3d-7f5b-4f6c-8d24-3c9e1b7a0c11";
const MODEL_TAG: &str = "model-sandbox";

const FACADES: &[(&str, u32)] = &[
    ("AllWatcher", 1),
    ("Annotations", 2),
    ("Application", 1),
    ("Charms", 2),
    ("Client", 1),
    ("Deployer", 1),
    ("GUIToken", 1),
    ("KeyManager", 1),
    ("ModelManager", 2),
    ("Pinger", 1),
    ("Resources", 1),
];

/// Name and uuid of the single sandbox model
pub const MODEL_NAME: &str = "sandbox";

#[derive(Debug, Deserialize)]
struct GoRequest {
    #[serde(rename = "type")]
    facade: String,
    request: String,
    #[serde(default)]
    params: Value,
    #[serde(rename = "request-id")]
    request_id: u64,
}

/// Shim speaking the Go-style protocol
#[derive(Debug)]
pub struct GoJujuApi {
    backend: SharedBackend,
    connection: Connection,
    next_request_id: Option<u64>,
}

impl GoJujuApi {
    /// Create a disconnected shim over a backend
    #[must_use]
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            connection: Connection::default(),
            next_request_id: None,
        }
    }

    /// The backend this shim drives
    #[must_use]
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn respond(&self, request_id: u64, outcome: BackendResult<Value>) -> Result<(), SandboxError> {
        let message = match outcome {
            Ok(response) => json!({"request-id": request_id, "response": response}),
            Err(err) => json!({
                "request-id": request_id,
                "response": {},
                "error": err.to_string(),
            }),
        };
        self.connection.client()?.receive(&message)
    }
}

#[async_trait]
impl SandboxApi for GoJujuApi {
    async fn open(&mut self, client: ClientConnection) -> Result<(), SandboxError> {
        if self.connection.open(client)? {
            info!("go sandbox connected");
        }
        Ok(())
    }

    fn close(&mut self) {
        self.connection.close();
        self.next_request_id = None;
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    async fn receive(&mut self, frame: &str) -> Result<(), SandboxError> {
        self.connection.client()?;
        let request: GoRequest =
            serde_json::from_str(frame).map_err(|e| SandboxError::Malformed(e.to_string()))?;
        debug!(
            facade = %request.facade,
            request = %request.request,
            id = request.request_id,
            "go request"
        );

        match (request.facade.as_str(), request.request.as_str()) {
            ("AllWatcher", "Next") => {
                self.next_request_id = Some(request.request_id);
                Ok(())
            }
            ("AllWatcher", "Stop") => {
                self.next_request_id = None;
                self.respond(request.request_id, Ok(json!({})))
            }
            (facade, name) => {
                let outcome = {
                    let mut backend = self.backend.lock().await;
                    dispatch(&mut backend, facade, name, &request.params).await
                };
                self.respond(request.request_id, outcome)
            }
        }
    }

    async fn send_delta(&mut self) -> Result<bool, SandboxError> {
        let Some(request_id) = self.next_request_id else {
            return Ok(false);
        };
        let client = self.connection.client()?.clone();
        let deltas = {
            let mut backend = self.backend.lock().await;
            let changes = backend.next_changes().ok().flatten();
            let annotations = backend.next_annotations().ok().flatten();
            build_deltas(&backend, changes.as_ref(), annotations.as_ref())
        };
        if deltas.is_empty() {
            return Ok(false);
        }
        debug!(count = deltas.len(), "sending deltas");
        client.receive(&json!({
            "request-id": request_id,
            "response": {"deltas": deltas},
        }))?;
        self.next_request_id = None;
        Ok(true)
    }
}

// =============================================================================
// Dispatch
// =============================================================================

async fn dispatch(
    backend: &mut FakeBackend,
    facade: &str,
    request: &str,
    params: &Value,
) -> BackendResult<Value> {
    match (facade, request) {
        ("Admin", "Login") => login(backend, params),
        ("GUIToken", "Login") => token_login(backend, params),
        ("Pinger", "Ping") => Ok(json!({})),
        ("Client", "WatchAll") => {
            backend.ensure_authenticated()?;
            Ok(json!({"AllWatcherId": ALL_WATCHER_ID}))
        }
        ("Client", "ModelInfo") => Ok(model_info(backend)),
        ("ModelManager", "ModelInfo") => {
            let mut info = model_info(backend);
            info["uuid"] = json!(MODEL_NAME);
            info["life"] = json!("alive");
            Ok(json!({"results": [{"result": info}]}))
        }
        ("Client", "ModelGet") => Ok(json!({"config": {"maas-server": backend.maas_server()}})),
        ("Client", "ModelUserInfo") => model_user_info(backend),
        ("KeyManager", "ListKeys") => Ok(json!({"results": [{"result": ["sandbox SSH key"]}]})),
        // Charms and resources need no upload before a simulated deploy.
        ("Client", "AddCharm" | "AddCharmWithAuthorization") => Ok(json!({})),
        ("Resources", "AddPendingResources") => pending_resources(params),
        ("Application", "Deploy") => deploy(backend, params).await,
        ("Application", "Destroy") => {
            backend.destroy_service(str_param(params, "application")?)?;
            Ok(json!({}))
        }
        ("Application", "DestroyUnits") => destroy_units(backend, params),
        ("Application", "AddUnits") => add_units(backend, params),
        ("Application", "Expose") => {
            backend.expose(str_param(params, "application")?)?;
            Ok(json!({}))
        }
        ("Application", "Unexpose") => {
            backend.unexpose(str_param(params, "application")?)?;
            Ok(json!({}))
        }
        ("Application", "AddRelation") => add_relation(backend, params),
        ("Application", "DestroyRelation") => {
            let (a, b) = endpoint_pair(params)?;
            backend.remove_relation(&a, &b)?;
            Ok(json!({}))
        }
        ("Application", "Get") => get_application(backend, params),
        ("Application", "Update") => update_application(backend, params).await,
        ("Charms", "CharmInfo") => {
            let charm = backend.get_charm(str_param(params, "url")?).await?;
            Ok(charm_info(&charm))
        }
        ("Annotations", "Set") => set_annotations(backend, params),
        ("Annotations", "Get") => get_annotations(backend, params),
        ("Client", "Resolved") => {
            backend.resolved(str_param(params, "unit-name")?, None)?;
            Ok(json!({}))
        }
        ("Client", "AddMachines") => add_machines(backend, params),
        ("Client", "DestroyMachines") => {
            let names: Vec<String> = decode(params, "machine-names")?.unwrap_or_default();
            let force = params.get("force").and_then(Value::as_bool).unwrap_or(false);
            backend.destroy_machines(&names, force)?;
            Ok(json!({}))
        }
        ("Deployer", "Import") => {
            let yaml = str_param(params, "YAML")?;
            let name = params.get("Name").and_then(Value::as_str);
            Ok(match backend.import_deployer(yaml, name).await {
                Ok(id) => json!({"DeploymentId": id}),
                Err(err) => json!({"Error": err.to_string()}),
            })
        }
        ("Deployer", "Status") => Ok(json!({"LastChanges": backend.status_deployer()?})),
        ("Deployer", "Watch") => {
            let id = params.get("DeploymentId").and_then(Value::as_u64).unwrap_or(0);
            backend.deployer_watch(id)?;
            Ok(json!({"WatcherId": id}))
        }
        ("Deployer", "Next") => {
            let id = params.get("WatcherId").and_then(Value::as_u64).unwrap_or(0);
            backend.deployer_next(id)?;
            Ok(json!({}))
        }
        _ => Err(BackendError::invalid(format!(
            "unknown request: {facade}.{request}"
        ))),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> BackendResult<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::invalid(format!("missing parameter: {key}")))
}

fn decode<T: DeserializeOwned>(params: &Value, key: &str) -> BackendResult<Option<T>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| BackendError::invalid(format!("invalid parameter {key}: {e}"))),
    }
}

fn endpoint_pair(params: &Value) -> BackendResult<(String, String)> {
    let endpoints: Vec<String> = decode(params, "endpoints")?.unwrap_or_default();
    match endpoints.as_slice() {
        [a, b] => Ok((a.clone(), b.clone())),
        _ => Err(BackendError::invalid("expected exactly two endpoints")),
    }
}

fn stringify(values: Map<String, Value>) -> Annotations {
    values
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

// =============================================================================
// Handlers
// =============================================================================

fn login_response(user: &str) -> Value {
    let facades: Vec<Value> = FACADES
        .iter()
        .map(|(name, version)| json!({"name": name, "versions": [version]}))
        .collect();
    json!({
        "facades": facades,
        "controller-tag": CONTROLLER_TAG,
        "model-tag": MODEL_TAG,
        "user-info": {
            "display-name": user,
            "identity": format!("user-{user}"),
            "controller-access": "superuser",
            "model-access": "admin",
        },
    })
}

fn login(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let tag = str_param(params, "auth-tag")?;
    let user = tag.strip_prefix("user-").unwrap_or(tag);
    let password = str_param(params, "credentials")?;
    if backend.login(user, password) {
        Ok(login_response(user))
    } else {
        Err(BackendError::invalid("invalid username or password"))
    }
}

fn token_login(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let token = str_param(params, "token")?;
    let (user, password) = backend
        .token_login(token)
        .ok_or_else(|| BackendError::invalid("unknown, fulfilled, or expired token"))?;
    let mut response = login_response(&user);
    response["auth-tag"] = json!(format!("user-{user}"));
    response["password"] = json!(password);
    Ok(response)
}

fn owner_tag(backend: &FakeBackend) -> String {
    format!("user-{}@local", backend.user().unwrap_or("admin"))
}

fn model_info(backend: &FakeBackend) -> Value {
    json!({
        "name": MODEL_NAME,
        "provider-type": backend.provider_type(),
        "default-series": backend.default_series(),
        "owner-tag": owner_tag(backend),
        "cloud-tag": "cloud-demonstration",
        "cloud-region": "demo-west",
    })
}

fn model_user_info(backend: &FakeBackend) -> BackendResult<Value> {
    backend.ensure_authenticated()?;
    let user = backend.user().unwrap_or("admin");
    Ok(json!({"results": [{"result": {
        "user": format!("{user}@{MODEL_NAME}"),
        "last-connection": Utc::now().to_rfc3339(),
        "access": "admin",
    }}]}))
}

fn pending_resources(params: &Value) -> BackendResult<Value> {
    let resources: Vec<Value> = decode(params, "resources")?.unwrap_or_default();
    let ids = resources
        .iter()
        .map(|resource| {
            resource
                .get("name")
                .or_else(|| resource.get("Name"))
                .and_then(Value::as_str)
                .map(|name| format!("{name}-pending-id"))
                .ok_or_else(|| BackendError::invalid("missing parameter: resource name"))
        })
        .collect::<BackendResult<Vec<String>>>()?;
    Ok(json!({"pending-ids": ids}))
}

async fn deploy(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let app = params
        .get("applications")
        .and_then(|apps| apps.get(0))
        .ok_or_else(|| BackendError::invalid("missing parameter: applications"))?;
    let charm_url = str_param(app, "charm-url")?;
    let options = DeployOptions {
        name: app.get("application").and_then(Value::as_str).map(str::to_string),
        config: decode::<ConfigMap>(app, "config")?,
        config_yaml: app
            .get("config-yaml")
            .and_then(Value::as_str)
            .filter(|yaml| !yaml.is_empty())
            .map(str::to_string),
        unit_count: app.get("num-units").and_then(Value::as_i64),
        constraints: decode::<Constraints>(app, "constraints")?,
        annotations: None,
    };
    Ok(match backend.deploy(charm_url, options).await {
        Ok(_) => json!({"results": [{}]}),
        Err(err) => json!({"results": [{"error": {"message": err.to_string()}}]}),
    })
}

fn destroy_units(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let names: Vec<String> = decode(params, "unit-names")?.unwrap_or_default();
    let report = backend.remove_units(&names)?;
    if report.is_clean() {
        Ok(json!({}))
    } else {
        let problems: Vec<String> = report.errors.into_iter().chain(report.warnings).collect();
        Err(BackendError::invalid(problems.join("; ")))
    }
}

fn add_units(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let service = str_param(params, "application")?;
    let count = params.get("num-units").and_then(Value::as_i64);
    let directive = params
        .get("placement")
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("directive"))
        .and_then(Value::as_str);
    let added = backend.add_unit(service, count, directive)?;
    let units: Vec<&str> = added.units.iter().map(|u| u.id.as_str()).collect();
    Ok(json!({"units": units}))
}

fn add_relation(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let (a, b) = endpoint_pair(params)?;
    let added = backend.add_relation(&a, &b, false)?;
    let endpoints: Map<String, Value> = added
        .endpoints
        .iter()
        .map(|ep| {
            (
                ep.0.clone(),
                json!({
                    "name": ep.1.name,
                    "role": role_name(ep.1.role),
                    "scope": added.scope.as_str(),
                    "interface": added.interface,
                }),
            )
        })
        .collect();
    Ok(json!({"endpoints": endpoints}))
}

fn get_application(backend: &FakeBackend, params: &Value) -> BackendResult<Value> {
    let details = backend.get_service(str_param(params, "application")?)?;
    let service = details.service;
    let charm = backend.database().charm(&service.charm);
    let config: Map<String, Value> = charm
        .map(|c| {
            c.options
                .iter()
                .map(|(key, option)| {
                    let mut entry = serde_json::to_value(option).unwrap_or_else(|_| json!({}));
                    entry["value"] = service.config.get(key).cloned().unwrap_or(Value::Null);
                    (key.clone(), entry)
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(json!({
        "application": service.name,
        "charm": charm.map_or(service.charm.as_str(), |c| c.package_name.as_str()),
        "config": config,
        "constraints": constraints_value(&service),
    }))
}

async fn update_application(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let service = str_param(params, "application")?;
    if let Some(settings) = decode::<ConfigMap>(params, "settings")? {
        backend.set_config(service, settings)?;
    }
    if let Some(constraints) = decode::<Constraints>(params, "constraints")? {
        backend.set_constraints(service, &constraints)?;
    }
    if let Some(url) = params.get("charm-url").and_then(Value::as_str) {
        let force = params
            .get("force-charm-url")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        backend.set_charm(service, url, force).await?;
    }
    Ok(json!({}))
}

fn charm_info(charm: &Charm) -> Value {
    json!({
        "config": charm.options,
        "meta": {
            "name": charm.package_name,
            "provides": charm.provides,
            "requires": charm.requires,
            "subordinate": charm.is_subordinate,
        },
        "url": charm.id,
    })
}

fn set_annotations(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let entries: Vec<Value> = decode(params, "annotations")?.unwrap_or_default();
    for entry in &entries {
        let tag = str_param(entry, "entity")?;
        let data: Map<String, Value> = decode(entry, "annotations")?.unwrap_or_default();
        backend.update_annotations(&tag_to_entity(tag), stringify(data))?;
    }
    Ok(json!({}))
}

fn get_annotations(backend: &FakeBackend, params: &Value) -> BackendResult<Value> {
    let entities: Vec<Value> = decode(params, "entities")?.unwrap_or_default();
    let results = entities
        .iter()
        .map(|entity| {
            let tag = str_param(entity, "tag")?;
            let annotations = backend.get_annotations(&tag_to_entity(tag))?;
            Ok(json!({"entity": tag, "annotations": annotations}))
        })
        .collect::<BackendResult<Vec<Value>>>()?;
    Ok(json!({"results": results}))
}

fn add_machines(backend: &mut FakeBackend, params: &Value) -> BackendResult<Value> {
    let requested: Vec<Value> = decode(params, "params")?.unwrap_or_default();
    let machine_params = requested
        .iter()
        .map(|p| {
            Ok(MachineParams {
                series: decode(p, "series")?,
                parent_id: decode(p, "parent-id")?,
                container_type: decode(p, "container-type")?,
                constraints: decode(p, "constraints")?,
                jobs: decode(p, "jobs")?,
            })
        })
        .collect::<BackendResult<Vec<_>>>()?;
    let machines: Vec<Value> = backend
        .add_machines(&machine_params)?
        .into_iter()
        .map(|added| {
            json!({
                "machine": added.name.unwrap_or_default(),
                "error": added.error.map(|message| json!({"code": "", "message": message})),
            })
        })
        .collect();
    Ok(json!({"machines": machines}))
}

// =============================================================================
// Tags
// =============================================================================

/// Translate an entity tag into a backend entity name.
///
/// Unit and machine tags are accepted with either `-` or `/` separators:
/// `unit-wordpress-0`, `unit-wordpress/0`, `machine-0-lxc-1`.
#[must_use]
pub fn tag_to_entity(tag: &str) -> String {
    if let Some(name) = tag
        .strip_prefix("application-")
        .or_else(|| tag.strip_prefix("service-"))
    {
        return name.to_string();
    }
    if let Some(unit) = tag.strip_prefix("unit-") {
        if unit.contains('/') {
            return unit.to_string();
        }
        return match unit.rsplit_once('-') {
            Some((service, number)) => format!("{service}/{number}"),
            None => unit.to_string(),
        };
    }
    if let Some(machine) = tag.strip_prefix("machine-") {
        return machine.replace('-', "/");
    }
    if tag == "model" || tag.starts_with("model-") || tag.starts_with("environment-") {
        return crate::store::ENVIRONMENT_NAME.to_string();
    }
    tag.to_string()
}

/// Tag of an entity as emitted in deltas
#[must_use]
pub fn entity_tag(kind: EntityKind, id: &str) -> String {
    match kind {
        EntityKind::Environment => "model".to_string(),
        EntityKind::Service => format!("application-{id}"),
        EntityKind::Machine => format!("machine-{id}"),
        EntityKind::Unit => format!("unit-{id}"),
    }
}

// =============================================================================
// Deltas
// =============================================================================

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Client => "requirer",
        Role::Server => "provider",
    }
}

fn action(present: bool) -> &'static str {
    if present {
        "change"
    } else {
        "remove"
    }
}

fn number_or_string(raw: &str) -> Value {
    raw.parse::<u64>().map_or_else(|_| json!(raw), Value::from)
}

fn constraints_value(service: &Service) -> Value {
    let map: Map<String, Value> = service
        .constraints
        .iter()
        .map(|(key, value)| {
            let value = if key == "tags" {
                json!(value.split(',').map(str::trim).collect::<Vec<_>>())
            } else {
                number_or_string(value)
            };
            (key.clone(), value)
        })
        .collect();
    Value::Object(map)
}

fn application_delta(service: &Service) -> Value {
    json!({
        "name": service.name,
        "exposed": service.exposed,
        "charm-url": service.charm,
        "life": "alive",
        "constraints": constraints_value(service),
        "config": service.config,
        "subordinate": service.subordinate,
    })
}

fn machine_delta(machine: &Machine) -> Value {
    let hw = &machine.hardware;
    let mut hardware = Map::new();
    hardware.insert("arch".into(), json!(hw.arch));
    for (key, value) in [
        ("cpu-cores", &hw.cpu_cores),
        ("cpu-power", &hw.cpu_power),
        ("mem", &hw.mem),
        ("root-disk", &hw.disk),
    ] {
        if let Some(value) = value {
            hardware.insert(key.into(), number_or_string(value));
        }
    }
    json!({
        "id": machine.id,
        "addresses": [{
            "value": machine.public_address,
            "type": "hostname",
            "scope": "public",
        }],
        "instance-id": format!("fake-instance-{}", machine.id.replace('/', "-")),
        "agent-status": {"current": machine.agent_state, "message": "", "data": {}},
        "hardware-characteristics": hardware,
        "jobs": machine.jobs,
        "life": "alive",
        "series": machine.series,
        "supported-containers": ["lxc", "kvm"],
    })
}

fn unit_delta(backend: &FakeBackend, unit: &Unit) -> Value {
    let db = backend.database();
    let series = db
        .machine(&unit.machine)
        .map_or_else(|| backend.default_series().to_string(), |m| m.series.clone());
    let charm = db
        .service(&unit.service)
        .map(|s| s.charm.clone())
        .unwrap_or_default();
    let idle = json!({"current": "idle", "message": "", "data": {}});
    json!({
        "name": unit.id,
        "application": unit.service,
        "series": series,
        "charm-url": charm,
        "public-address": unit.public_address,
        "machine-id": unit.machine,
        "agent-status": idle,
        "workload-status": idle,
        "subordinate": unit.subordinate,
    })
}

fn relation_delta(relation: &Relation) -> Value {
    let endpoints: Vec<Value> = relation
        .endpoints
        .iter()
        .map(|ep| {
            json!({
                "application-name": ep.0,
                "relation": {
                    "name": ep.1.name,
                    "role": role_name(ep.1.role),
                    "interface": relation.interface,
                    "scope": relation.scope.as_str(),
                },
            })
        })
        .collect();
    json!({"key": relation.relation_id, "endpoints": endpoints})
}

fn build_deltas(
    backend: &FakeBackend,
    changes: Option<&ChangeSet>,
    annotations: Option<&AnnotationSet>,
) -> Vec<Value> {
    let mut deltas = Vec::new();
    if let Some(changes) = changes {
        for (service, present) in changes.services.values() {
            deltas.push(json!(["application", action(*present), application_delta(service)]));
        }
        for (machine, present) in changes.machines.values() {
            deltas.push(json!(["machine", action(*present), machine_delta(machine)]));
        }
        for (unit, present) in changes.units.values() {
            deltas.push(json!(["unit", action(*present), unit_delta(backend, unit)]));
        }
        for (relation, present) in changes.relations.values() {
            deltas.push(json!(["relation", action(*present), relation_delta(relation)]));
        }
    }
    if let Some(set) = annotations {
        let mut annotation = |tag: String, data: &Annotations| {
            deltas.push(json!(["annotation", "change", {"tag": tag, "annotations": data}]));
        };
        for (id, service) in &set.services {
            annotation(entity_tag(EntityKind::Service, id), &service.annotations);
        }
        for (id, machine) in &set.machines {
            annotation(entity_tag(EntityKind::Machine, id), &machine.annotations);
        }
        for (id, unit) in &set.units {
            annotation(entity_tag(EntityKind::Unit, id), &unit.annotations);
        }
        for data in set.annotations.values() {
            annotation(entity_tag(EntityKind::Environment, ""), data);
        }
    }
    deltas
}
