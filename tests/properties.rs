// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Property tests for parsing and id allocation

use juju_sandbox::backend::{EndpointSpec, FakeBackend};
use juju_sandbox::charm::CharmId;
use juju_sandbox::charmstore::StaticCharmStore;
use juju_sandbox::config::Config;
use juju_sandbox::prelude::*;
use juju_sandbox::sandbox::{entity_tag, tag_to_entity};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const CATALOG: &str = include_str!("../demos/charms.json");

// =============================================================================
// Test Helpers
// =============================================================================

fn make_backend_with_wordpress() -> FakeBackend {
    let store = StaticCharmStore::from_json(CATALOG).unwrap();
    let mut backend = FakeBackend::new(&Config::default(), Arc::new(store));
    assert!(backend.login("admin", "password"));
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime
        .block_on(backend.deploy("cs:precise/wordpress-15", DeployOptions::default()))
        .unwrap();
    backend
}

fn unit_number(id: &str) -> u64 {
    id.rsplit('/').next().unwrap().parse().unwrap()
}

#[derive(Debug, Clone)]
enum UnitOp {
    Add(i64),
    RemoveOldest,
}

fn unit_op() -> impl Strategy<Value = UnitOp> {
    prop_oneof![(1i64..4).prop_map(UnitOp::Add), Just(UnitOp::RemoveOldest)]
}

fn constraint_map() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z][a-z-]{0,7}", "[A-Za-z0-9]{1,6}", 1..5)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_constraint_strings_normalize_to_their_pairs(map in constraint_map(), use_spaces in any::<bool>()) {
        let separator = if use_spaces { " " } else { "," };
        let raw = map
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(separator);
        prop_assert_eq!(Constraints::RawString(raw).normalize(), map);
    }

    #[test]
    fn prop_charm_id_store_id(name in "[a-z][a-z0-9]{0,10}", revision in proptest::option::of(0u32..500)) {
        let raw = match revision {
            Some(rev) => format!("cs:trusty/{name}-{rev}"),
            None => format!("cs:trusty/{name}"),
        };
        let id = CharmId::parse(&raw, "precise").unwrap();
        prop_assert_eq!(&id.name, &name);
        prop_assert_eq!(id.revision, revision);
        prop_assert_eq!(id.series.as_str(), "trusty");
        prop_assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn prop_endpoint_spec_display_round_trips(service in "[a-z][a-z-]{0,10}", relation in proptest::option::of("[a-z]{1,8}")) {
        let raw = match &relation {
            Some(r) => format!("{service}:{r}"),
            None => service.clone(),
        };
        let spec = EndpointSpec::parse(&raw);
        prop_assert_eq!(&spec.service, &service);
        prop_assert_eq!(&spec.relation, &relation);
        prop_assert_eq!(spec.to_string(), raw);
    }

    #[test]
    fn prop_unit_tags_resolve_back(service in "[a-z][a-z-]{0,10}[a-z]", number in 0u32..1000) {
        let unit = format!("{service}/{number}");
        prop_assert_eq!(tag_to_entity(&entity_tag(EntityKind::Unit, &unit)), unit.clone());
        prop_assert_eq!(tag_to_entity(&format!("unit-{service}-{number}")), unit);
    }

    #[test]
    fn prop_unit_ids_are_never_reused(ops in prop::collection::vec(unit_op(), 1..12)) {
        let mut backend = make_backend_with_wordpress();
        let mut highest = 0;
        for op in ops {
            match op {
                UnitOp::Add(count) => {
                    let added = backend.add_unit("wordpress", Some(count), None).unwrap();
                    for unit in &added.units {
                        let number = unit_number(&unit.id);
                        prop_assert!(number > highest);
                        highest = number;
                    }
                }
                UnitOp::RemoveOldest => {
                    let oldest = backend
                        .database()
                        .service("wordpress")
                        .unwrap()
                        .units
                        .first()
                        .map(|u| u.id.clone());
                    if let Some(id) = oldest {
                        prop_assert!(backend.remove_units(&[id]).unwrap().is_clean());
                    }
                }
            }
        }
        // Every unit sits on its own machine.
        let db = backend.database();
        let mut machines: Vec<&str> = db.units().map(|u| u.machine.as_str()).collect();
        let total = machines.len();
        machines.sort_unstable();
        machines.dedup();
        prop_assert_eq!(machines.len(), total);
    }
}
