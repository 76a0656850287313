// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Benchmarks for relation matching and bundle import

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use juju_sandbox::backend::{find_endpoint_match, EndpointSpec, FakeBackend};
use juju_sandbox::bundle::BundleDocument;
use juju_sandbox::charm::CharmId;
use juju_sandbox::charmstore::{fetch_charm, StaticCharmStore};
use juju_sandbox::config::Config;
use juju_sandbox::types::Charm;
use std::sync::Arc;
use tokio::runtime::Runtime;

const CATALOG: &str = include_str!("../demos/charms.json");
const LAYERED: &str = include_str!("../demos/wordpress-bundle.yaml");

fn load_charm(runtime: &Runtime, store: &StaticCharmStore, raw: &str) -> Charm {
    let id = CharmId::parse(raw, "precise").unwrap();
    runtime.block_on(fetch_charm(store, &id)).unwrap()
}

fn bench_endpoint_match(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let store = StaticCharmStore::from_json(CATALOG).unwrap();
    let wordpress = load_charm(&runtime, &store, "cs:precise/wordpress-15");
    let mysql = load_charm(&runtime, &store, "cs:precise/mysql-26");
    let rsyslog = load_charm(&runtime, &store, "cs:precise/rsyslog-forwarder-4");

    let explicit = (EndpointSpec::parse("wordpress:db"), EndpointSpec::parse("mysql:db"));
    c.bench_function("relations.match.explicit", |b| {
        b.iter(|| {
            find_endpoint_match(
                black_box((&explicit.0, &wordpress)),
                black_box((&explicit.1, &mysql)),
            )
        });
    });

    let implicit = (EndpointSpec::parse("rsyslog"), EndpointSpec::parse("wordpress"));
    c.bench_function("relations.match.juju_info", |b| {
        b.iter(|| {
            find_endpoint_match(
                black_box((&implicit.0, &rsyslog)),
                black_box((&implicit.1, &wordpress)),
            )
        });
    });
}

fn bench_bundle(c: &mut Criterion) {
    let document = BundleDocument::parse(LAYERED).unwrap();
    c.bench_function("bundle.inheritance_chain", |b| {
        b.iter(|| document.inheritance_chain(black_box("production")));
    });
    c.bench_function("bundle.resolve", |b| {
        b.iter(|| document.resolve(black_box(Some("production"))));
    });

    let runtime = Runtime::new().unwrap();
    let store = Arc::new(StaticCharmStore::from_json(CATALOG).unwrap());
    c.bench_function("deployer.import_production", |b| {
        b.to_async(&runtime).iter(|| {
            let store = Arc::clone(&store);
            async move {
                let mut backend = FakeBackend::new(&Config::default(), store);
                backend.login("admin", "password");
                backend.import_deployer(LAYERED, Some("production")).await
            }
        });
    });
}

criterion_group!(benches, bench_endpoint_match, bench_bundle);
criterion_main!(benches);
