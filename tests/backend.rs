// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Behaviour tests for the fake backend
//!
//! These tests pin down the observable contract:
//! 1. Authentication gates every operation
//! 2. Unit and machine ids are allocated monotonically, reusing free machines
//! 3. Relations match exactly one interface and cascade on destroy
//! 4. Every mutation shows up once in the drained change set

use juju_sandbox::backend::FakeBackend;
use juju_sandbox::charmstore::StaticCharmStore;
use juju_sandbox::config::Config;
use juju_sandbox::events::BackendEvent;
use juju_sandbox::prelude::*;
use serde_json::json;
use std::sync::Arc;

const CATALOG: &str = include_str!("../demos/charms.json");

// =============================================================================
// Test Helpers
// =============================================================================

fn make_backend() -> FakeBackend {
    let store = StaticCharmStore::from_json(CATALOG).unwrap();
    FakeBackend::new(&Config::default(), Arc::new(store))
}

fn logged_in() -> FakeBackend {
    let mut backend = make_backend();
    assert!(backend.login("admin", "password"));
    backend
}

fn with_units(count: i64) -> DeployOptions {
    DeployOptions {
        unit_count: Some(count),
        ..DeployOptions::default()
    }
}

fn annotations(pairs: &[(&str, &str)]) -> Annotations {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

async fn deploy(backend: &mut FakeBackend, charm: &str) -> DeployResult {
    backend.deploy(charm, DeployOptions::default()).await.unwrap()
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_operations_require_login() {
    let mut backend = make_backend();

    let err = backend
        .deploy("cs:precise/wordpress-15", DeployOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::Unauthenticated);
    assert_eq!(err.to_string(), "Please log in.");

    assert_eq!(backend.add_unit("wordpress", None, None).unwrap_err(), BackendError::Unauthenticated);
    assert_eq!(
        backend.add_relation("wordpress", "mysql", true).unwrap_err(),
        BackendError::Unauthenticated
    );
    assert_eq!(
        backend.update_annotations("env", Annotations::new()).unwrap_err(),
        BackendError::Unauthenticated
    );
    assert_eq!(backend.status_deployer().unwrap_err(), BackendError::Unauthenticated);
    assert_eq!(backend.next_changes().unwrap_err(), BackendError::Unauthenticated);

    // Nothing was recorded while logged out.
    assert!(backend.login("admin", "password"));
    assert!(backend.next_changes().unwrap().is_none());
    assert!(backend.next_annotations().unwrap().is_none());
}

#[test]
fn test_login_logout() {
    let mut backend = make_backend();
    assert!(!backend.login("admin", "wrong"));
    assert!(backend.login("admin", "password"));
    backend.logout();
    backend.logout();
    assert!(!backend.is_authenticated());
}

#[test]
fn test_token_login() {
    let mut backend = make_backend();
    assert_eq!(backend.token_login("nope"), None);
    assert!(!backend.is_authenticated());
    assert_eq!(
        backend.token_login("demoToken"),
        Some(("admin".to_string(), "password".to_string()))
    );
    assert!(backend.is_authenticated());
}

// =============================================================================
// Deploy
// =============================================================================

#[tokio::test]
async fn test_deploy_defaults() {
    let mut backend = logged_in();
    let result = deploy(&mut backend, "cs:precise/wordpress-15").await;

    assert_eq!(result.service.name, "wordpress");
    assert_eq!(result.service.charm, "cs:precise/wordpress-15");
    assert_eq!(result.units.len(), 1);
    assert_eq!(result.units[0].id, "wordpress/0");
    assert_eq!(result.units[0].agent_state, "started");
    assert_eq!(result.machines[0].id, "0");
    assert_eq!(result.machines[0].public_address, "addr-0.example.com");
    assert_eq!(result.service.config["engine"], json!("nginx"));
    assert_eq!(result.service.config["workers"], json!(2));
}

#[tokio::test]
async fn test_deploy_resolves_unrevisioned_charm() {
    let mut backend = logged_in();
    let result = deploy(&mut backend, "mysql").await;
    assert_eq!(result.service.charm, "cs:precise/mysql-26");
}

#[tokio::test]
async fn test_deploy_config_defaults_merge() {
    let mut backend = logged_in();
    let mut config = ConfigMap::new();
    config.insert("engine".into(), json!("apache"));
    config.insert("undeclared".into(), json!(1));

    let result = backend
        .deploy(
            "cs:precise/wordpress-15",
            DeployOptions {
                config: Some(config),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.service.config["engine"], json!("apache"));
    assert_eq!(result.service.config["tuning"], json!("single"));
    assert!(!result.service.config.contains_key("undeclared"));
}

#[tokio::test]
async fn test_deploy_config_yaml_replaces_config() {
    let mut backend = logged_in();
    let mut config = ConfigMap::new();
    config.insert("engine".into(), json!("apache"));

    let result = backend
        .deploy(
            "cs:precise/wordpress-15",
            DeployOptions {
                config: Some(config),
                config_yaml: Some("tuning: optimized\nworkers: \"8\"\n".into()),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.service.config["engine"], json!("nginx"));
    assert_eq!(result.service.config["tuning"], json!("optimized"));
    assert_eq!(result.service.config["workers"], json!(8));
}

#[tokio::test]
async fn test_deploy_failures_leave_no_service() {
    let mut backend = logged_in();

    let bad_yaml = backend
        .deploy(
            "cs:precise/wordpress-15",
            DeployOptions {
                config_yaml: Some("engine: [unclosed".into()),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(bad_yaml, BackendError::YamlParse(_)));

    let unknown = backend
        .deploy("cs:precise/ghost-1", DeployOptions::default())
        .await
        .unwrap_err();
    assert_eq!(unknown, BackendError::CharmStoreUnavailable("cs:precise/ghost-1".into()));

    let invalid = backend
        .deploy("bzr:nonsense", DeployOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(invalid, BackendError::InvalidCharmId(_)));

    assert!(backend.database().services.is_empty());
    assert!(backend.next_changes().unwrap().is_none());
}

#[tokio::test]
async fn test_deploy_duplicate_name() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/mysql-26").await;
    let err = backend
        .deploy("cs:precise/mysql-26", DeployOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, BackendError::DuplicateServiceName("mysql".into()));

    let renamed = backend
        .deploy(
            "cs:precise/mysql-26",
            DeployOptions {
                name: Some("mysql-slave".into()),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.units[0].id, "mysql-slave/0");
}

#[tokio::test]
async fn test_deploy_subordinate_unit_counts() {
    let mut backend = logged_in();
    let sub = deploy(&mut backend, "cs:precise/rsyslog-forwarder-4").await;
    assert!(sub.service.subordinate);
    assert!(sub.units.is_empty());

    let err = backend
        .deploy(
            "cs:precise/rsyslog-forwarder-4",
            DeployOptions {
                name: Some("logger".into()),
                unit_count: Some(2),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::InvalidUnitCount {
            service: "logger".into(),
            count: 2
        }
    );
    assert!(backend.database().service("logger").is_none());
}

#[tokio::test]
async fn test_deploy_constraints_normalized() {
    let mut backend = logged_in();
    let result = backend
        .deploy(
            "cs:precise/mysql-26",
            DeployOptions {
                constraints: Some(Constraints::RawString("mem=4G,arch=i386".into())),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.service.constraints.get("mem").map(String::as_str), Some("4G"));
    assert_eq!(result.service.constraints.get("arch").map(String::as_str), Some("i386"));
}

#[tokio::test]
async fn test_deploy_annotations_recorded() {
    let mut backend = logged_in();
    backend
        .deploy(
            "cs:precise/wordpress-15",
            DeployOptions {
                annotations: Some(annotations(&[("gui-x", "10")])),
                ..DeployOptions::default()
            },
        )
        .await
        .unwrap();
    let set = backend.next_annotations().unwrap().unwrap();
    assert_eq!(set.services["wordpress"].annotations["gui-x"], "10");
}

// =============================================================================
// Units and Machines
// =============================================================================

#[tokio::test]
async fn test_unit_ids_never_reused() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;

    let report = backend.remove_units(&["wordpress/0".to_string()]).unwrap();
    assert!(report.is_clean());

    let added = backend.add_unit("wordpress", Some(1), None).unwrap();
    assert_eq!(added.units[0].id, "wordpress/1");
}

#[tokio::test]
async fn test_machine_reuse_before_minting() {
    let mut backend = logged_in();
    let added = backend
        .add_machines(&[MachineParams::default(), MachineParams::default()])
        .unwrap();
    let names: Vec<_> = added.iter().map(|m| m.name.clone().unwrap()).collect();
    assert_eq!(names, vec!["0", "1"]);

    let result = deploy(&mut backend, "cs:precise/mysql-26").await;
    assert_eq!(result.units[0].machine, "0");

    let more = backend.add_unit("mysql", Some(2), None).unwrap();
    let machines: Vec<_> = more.units.iter().map(|u| u.machine.as_str()).collect();
    assert_eq!(machines, vec!["1", "2"]);
    assert_eq!(backend.database().machines.len(), 3);
}

#[tokio::test]
async fn test_add_unit_validation() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;

    assert!(matches!(
        backend.add_unit("wordpress", Some(0), None),
        Err(BackendError::InvalidUnitCount { .. })
    ));
    assert!(matches!(
        backend.add_unit("wordpress", Some(-1), None),
        Err(BackendError::InvalidUnitCount { .. })
    ));
    assert_eq!(
        backend.add_unit("ghost", None, None).unwrap_err(),
        BackendError::ServiceNotFound("ghost".into())
    );
}

#[tokio::test]
async fn test_add_unit_to_machine() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;

    let placed = backend.add_unit("wordpress", Some(1), Some("0")).unwrap();
    assert_eq!(placed.units[0].machine, "0");
    assert_eq!(
        backend.add_unit("wordpress", Some(1), Some("7")).unwrap_err(),
        BackendError::MachineNotFound("7".into())
    );
    assert!(matches!(
        backend.add_unit("wordpress", Some(2), Some("0")),
        Err(BackendError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn test_remove_units_report() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/rsyslog-forwarder-4").await;

    let report = backend
        .remove_units(&["rsyslog-forwarder/0".to_string(), "mysql/9".to_string()])
        .unwrap();
    insta::assert_json_snapshot!(report, @r###"
    {
      "error": [
        "rsyslog-forwarder/0 is a subordinate, cannot remove."
      ],
      "warning": [
        "mysql/9 does not exist, cannot remove."
      ]
    }
    "###);
}

#[test]
fn test_containers() {
    let mut backend = logged_in();
    let added = backend
        .add_machines(&[
            MachineParams::default(),
            MachineParams {
                parent_id: Some("0".into()),
                container_type: Some("lxc".into()),
                ..MachineParams::default()
            },
            MachineParams {
                container_type: Some("kvm".into()),
                ..MachineParams::default()
            },
            MachineParams {
                parent_id: Some("0".into()),
                container_type: Some("docker".into()),
                ..MachineParams::default()
            },
            MachineParams {
                parent_id: Some("9".into()),
                container_type: Some("lxc".into()),
                ..MachineParams::default()
            },
        ])
        .unwrap();

    assert_eq!(added[0].name.as_deref(), Some("0"));
    assert_eq!(added[1].name.as_deref(), Some("0/lxc/0"));
    assert_eq!(added[2].name.as_deref(), Some("1/kvm/0"));
    assert!(added[3].error.as_deref().unwrap().contains("cannot host docker containers"));
    assert!(added[4].error.as_deref().unwrap().contains("machine 9 not found"));

    let container = backend.database().machine("0/lxc/0").unwrap();
    assert_eq!(container.parent_id.as_deref(), Some("0"));
    assert!(container.hardware.mem.is_none());
}

#[tokio::test]
async fn test_destroy_machines() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/mysql-26").await;
    backend
        .add_machines(&[MachineParams {
            parent_id: Some("0".into()),
            container_type: Some("lxc".into()),
            ..MachineParams::default()
        }])
        .unwrap();

    let refused = backend.destroy_machines(&["0".to_string()], false).unwrap_err();
    assert_eq!(
        refused.to_string(),
        "no machines were destroyed: machine 0 is hosting containers 0/lxc/0"
    );

    let partial = backend
        .destroy_machines(&["0/lxc/0".to_string(), "5".to_string()], false)
        .unwrap_err();
    assert_eq!(
        partial.to_string(),
        "some machines were not destroyed: machine 5 does not exist"
    );

    let refused = backend.destroy_machines(&["0".to_string()], false).unwrap_err();
    assert_eq!(
        refused.to_string(),
        "no machines were destroyed: machine 0 has unit(s) mysql/0 assigned"
    );

    backend.next_changes().unwrap();
    backend.destroy_machines(&["0".to_string()], true).unwrap();
    assert!(backend.database().machines.is_empty());
    assert!(backend.database().units().next().is_none());

    let changes = backend.next_changes().unwrap().unwrap();
    assert!(!changes.units["mysql/0"].1);
    assert!(!changes.machines["0"].1);
}

// =============================================================================
// Relations
// =============================================================================

#[tokio::test]
async fn test_relation_end_to_end() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;

    let added = backend.add_relation("wordpress:db", "mysql:db", true).unwrap();
    assert_eq!(added.relation_id, "relation-0");
    assert_eq!(added.scope, RelationScope::Global);
    assert_eq!(added.interface, "mysql");
    assert_eq!(added.display_name, "db");
    assert_eq!(added.endpoints[0].0, "wordpress");
    assert_eq!(added.endpoints[0].1.role, Role::Client);
    assert_eq!(added.endpoints[1].1.role, Role::Server);
    assert_eq!(added.relation, backend.database().relations[0]);

    backend.next_changes().unwrap();
    let removed = backend.remove_relation("wordpress:db", "mysql:db").unwrap();
    assert_eq!(removed.relation_id, "relation-0");
    assert!(backend.database().relations.is_empty());

    let changes = backend.next_changes().unwrap().unwrap();
    assert!(!changes.relations["relation-0"].1);
}

#[tokio::test]
async fn test_relation_serializes_both_forms() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;

    let added = backend.add_relation("wordpress", "mysql", true).unwrap();
    let value = serde_json::to_value(&added).unwrap();
    assert_eq!(value["relationId"], "relation-0");
    assert_eq!(value["displayName"], "db");
    assert_eq!(value["relation"]["relation_id"], "relation-0");
    assert_eq!(value["relation"]["display_name"], "db");
}

#[tokio::test]
async fn test_derived_relation_id() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;

    let added = backend.add_relation("mysql", "wordpress", false).unwrap();
    assert_eq!(added.relation_id, "wordpress:db mysql:db");

    // Removal matches in either order.
    backend.remove_relation("mysql:db", "wordpress:db").unwrap();
}

#[tokio::test]
async fn test_relation_counter_advances_only_on_success() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;
    deploy(&mut backend, "cs:precise/memcached-7").await;

    assert_eq!(
        backend.add_relation("memcached", "mysql", true).unwrap_err(),
        BackendError::NoCompatibleRelation
    );
    let added = backend.add_relation("wordpress", "memcached", true).unwrap();
    assert_eq!(added.relation_id, "relation-0");
    assert_eq!(added.interface, "memcache");
}

#[tokio::test]
async fn test_ambiguous_relation() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/web-monitor-2").await;

    assert_eq!(
        backend.add_relation("web-monitor", "wordpress", true).unwrap_err(),
        BackendError::AmbiguousRelation
    );
    let added = backend.add_relation("web-monitor:primary", "wordpress", true).unwrap();
    assert_eq!(added.interface, "http");
    assert!(backend.next_changes().unwrap().is_some());
}

#[tokio::test]
async fn test_subordinate_relation_has_container_scope() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/rsyslog-forwarder-4").await;

    let added = backend.add_relation("rsyslog-forwarder", "wordpress", true).unwrap();
    assert_eq!(added.interface, "juju-info");
    assert_eq!(added.scope, RelationScope::Container);
    assert_eq!(added.endpoints[0].0, "rsyslog-forwarder");
}

#[tokio::test]
async fn test_relation_errors() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;

    assert_eq!(
        backend.add_relation("wordpress", "ghost", true).unwrap_err(),
        BackendError::ServiceNotFound("ghost".into())
    );
    assert!(matches!(
        backend.remove_relation("wordpress:db", "mysql:db"),
        Err(BackendError::RelationNotFound(_))
    ));
}

#[tokio::test]
async fn test_duplicate_relation_rejected() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;

    let first = backend.add_relation("wordpress:db", "mysql:db", false).unwrap();
    assert_eq!(first.relation_id, "wordpress:db mysql:db");
    assert_eq!(
        backend.add_relation("wordpress:db", "mysql:db", false).unwrap_err(),
        BackendError::RelationExists("wordpress:db mysql:db".into())
    );
    // Endpoint order and id mode do not matter.
    assert!(matches!(
        backend.add_relation("mysql", "wordpress", true),
        Err(BackendError::RelationExists(_))
    ));
    assert_eq!(backend.database().relations.len(), 1);

    let changes = backend.next_changes().unwrap().unwrap();
    assert_eq!(changes.relations.len(), 1);

    // Once removed, the pair can be related again.
    backend.remove_relation("wordpress:db", "mysql:db").unwrap();
    let again = backend.add_relation("wordpress", "mysql", true).unwrap();
    assert_eq!(again.relation_id, "relation-1");
}

// =============================================================================
// Service Destruction
// =============================================================================

#[tokio::test]
async fn test_destroy_service_cascade() {
    let mut backend = logged_in();
    backend
        .deploy("cs:precise/wordpress-15", with_units(2))
        .await
        .unwrap();
    deploy(&mut backend, "cs:precise/mysql-26").await;
    backend.add_relation("wordpress", "mysql", true).unwrap();
    backend.next_changes().unwrap();

    assert_eq!(backend.destroy_service("wordpress").unwrap(), "wordpress");

    let changes = backend.next_changes().unwrap().unwrap();
    assert!(!changes.services["wordpress"].1);
    assert!(!changes.units["wordpress/0"].1);
    assert!(!changes.units["wordpress/1"].1);
    assert!(!changes.relations["relation-0"].1);
    assert!(backend.database().service("wordpress").is_none());
    assert!(backend.database().relations.is_empty());
    assert!(backend.database().service("mysql").is_some());
}

#[tokio::test]
async fn test_destroy_service_without_units() {
    let mut backend = logged_in();
    backend
        .deploy("cs:precise/wordpress-15", with_units(0))
        .await
        .unwrap();
    assert!(backend.destroy_service("wordpress").is_ok());
    assert_eq!(
        backend.destroy_service("wordpress").unwrap_err(),
        BackendError::ServiceNotFound("wordpress".into())
    );
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_set_config_and_constraints_merge() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    backend.next_changes().unwrap();

    let mut update = ConfigMap::new();
    update.insert("engine".into(), json!("apache"));
    update.insert("workers".into(), json!("lots"));
    let merged = backend.set_config("wordpress", update).unwrap();
    assert_eq!(merged["engine"], json!("apache"));
    assert_eq!(merged["workers"], json!("lots"));
    assert_eq!(merged["tuning"], json!("single"));

    backend
        .set_constraints("wordpress", &Constraints::RawString("mem=2G".into()))
        .unwrap();
    backend
        .set_constraints("wordpress", &Constraints::Pairs(vec!["cpu-cores=4".into()]))
        .unwrap();
    let service = backend.database().service("wordpress").unwrap();
    assert_eq!(service.constraints.get("mem").map(String::as_str), Some("2G"));
    assert_eq!(service.constraints.get("cpu-cores").map(String::as_str), Some("4"));

    let changes = backend.next_changes().unwrap().unwrap();
    assert!(changes.services["wordpress"].1);

    assert_eq!(
        backend.set_config("ghost", ConfigMap::new()).unwrap_err(),
        BackendError::ServiceNotFound("ghost".into())
    );
}

#[tokio::test]
async fn test_expose_unexpose() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;

    assert_eq!(backend.expose("wordpress").unwrap(), None);
    assert_eq!(
        backend.expose("wordpress").unwrap().as_deref(),
        Some("Service \"wordpress\" already exposed.")
    );
    assert_eq!(backend.unexpose("wordpress").unwrap(), None);
    assert!(backend.unexpose("wordpress").unwrap().is_some());
}

#[tokio::test]
async fn test_set_charm() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    backend
        .set_charm("wordpress", "cs:precise/haproxy-18", false)
        .await
        .unwrap();
    assert_eq!(
        backend.database().service("wordpress").unwrap().charm,
        "cs:precise/haproxy-18"
    );
}

#[tokio::test]
async fn test_get_service_and_resolved() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;
    deploy(&mut backend, "cs:precise/mysql-26").await;
    backend.add_relation("wordpress", "mysql", true).unwrap();

    let details = backend.get_service("wordpress").unwrap();
    assert_eq!(details.rels.len(), 1);

    assert!(backend.resolved("wordpress/0", None).is_ok());
    assert!(backend.resolved("wordpress/0", Some("db")).is_ok());
    assert!(matches!(
        backend.resolved("wordpress/0", Some("website")),
        Err(BackendError::RelationNotFound(_))
    ));
    assert_eq!(
        backend.resolved("wordpress/5", None).unwrap_err(),
        BackendError::UnitNotFound("wordpress/5".into())
    );
}

// =============================================================================
// Annotations
// =============================================================================

#[tokio::test]
async fn test_annotations_lifecycle() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;

    backend
        .update_annotations("wordpress", annotations(&[("gui-x", "1"), ("gui-y", "2")]))
        .unwrap();
    let merged = backend
        .update_annotations("wordpress", annotations(&[("gui-x", "5")]))
        .unwrap();
    assert_eq!(merged, annotations(&[("gui-x", "5"), ("gui-y", "2")]));

    backend.update_annotations("wordpress/0", annotations(&[("note", "u")])).unwrap();
    backend.update_annotations("0", annotations(&[("rack", "a1")])).unwrap();
    backend.update_annotations("env", annotations(&[("landscape", "on")])).unwrap();

    let set = backend.next_annotations().unwrap().unwrap();
    assert_eq!(set.services["wordpress"].annotations["gui-x"], "5");
    assert_eq!(set.units["wordpress/0"].annotations["note"], "u");
    assert_eq!(set.machines["0"].annotations["rack"], "a1");
    assert_eq!(set.annotations["env"]["landscape"], "on");
    assert!(backend.next_annotations().unwrap().is_none());

    let remaining = backend
        .remove_annotations("wordpress", Some(&["gui-x".to_string()]))
        .unwrap();
    assert_eq!(remaining, annotations(&[("gui-y", "2")]));
    let cleared = backend.remove_annotations("wordpress", None).unwrap();
    assert!(cleared.is_empty());
    assert!(backend.get_annotations("wordpress").unwrap().is_empty());

    // Removal is propagated even when the map ends up empty.
    let set = backend.next_annotations().unwrap().unwrap();
    assert!(set.services["wordpress"].annotations.is_empty());
}

#[test]
fn test_annotations_unknown_entity() {
    let mut backend = logged_in();
    assert_eq!(
        backend.update_annotations("ghost", Annotations::new()).unwrap_err(),
        BackendError::EntityNotFound("ghost".into())
    );
    assert_eq!(
        backend.get_annotations("ghost/0").unwrap_err(),
        BackendError::EntityNotFound("ghost/0".into())
    );
}

// =============================================================================
// Change Stream, Events and Export
// =============================================================================

#[tokio::test]
async fn test_next_changes_drains() {
    let mut backend = logged_in();
    deploy(&mut backend, "cs:precise/wordpress-15").await;

    let changes = backend.next_changes().unwrap().unwrap();
    assert!(changes.services["wordpress"].1);
    assert!(changes.units["wordpress/0"].1);
    assert!(changes.machines["0"].1);
    assert!(backend.next_changes().unwrap().is_none());
}

#[tokio::test]
async fn test_events_published() {
    let mut backend = logged_in();
    let mut events = backend.subscribe();
    deploy(&mut backend, "cs:precise/mysql-26").await;

    assert_eq!(
        events.recv().await.unwrap(),
        BackendEvent::ServiceDeployed { name: "mysql".into() }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        BackendEvent::UnitsAdded { units: vec!["mysql/0".into()] }
    );
}

#[tokio::test]
async fn test_export_reimports() {
    let mut backend = logged_in();
    backend
        .deploy("cs:precise/wordpress-15", with_units(2))
        .await
        .unwrap();
    deploy(&mut backend, "cs:precise/mysql-26").await;
    backend.add_relation("wordpress", "mysql", true).unwrap();
    backend.expose("wordpress").unwrap();

    let export = backend.export_environment().unwrap();
    assert_eq!(export["envExport"]["services"]["wordpress"]["num_units"], json!(2));
    assert_eq!(export["envExport"]["services"]["wordpress"]["expose"], json!(true));
    assert_eq!(export["envExport"]["relations"][0], json!(["wordpress:db", "mysql:db"]));

    let mut fresh = logged_in();
    fresh
        .import_deployer(&export.to_string(), None)
        .await
        .unwrap();
    let db = fresh.database();
    assert_eq!(db.service("wordpress").unwrap().units.len(), 2);
    assert!(db.service("wordpress").unwrap().exposed);
    assert_eq!(db.relations.len(), 1);
}
