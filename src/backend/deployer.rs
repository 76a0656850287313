// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Deployer bundle import
//!
//! An import moves through `Parsed -> Ingested -> Deploying` and ends
//! `Completed` or `Failed`. Charms for every service are fetched
//! concurrently and all of them are awaited before any deploy, expose or
//! relation is applied.

use super::FakeBackend;
use crate::bundle::{Bundle, BundleDocument};
use crate::charm::CharmId;
use crate::charmstore::fetch_charm;
use crate::error::{BackendError, BackendResult};
use crate::events::BackendEvent;
use crate::types::{Charm, DeploymentRecord, DeploymentStatus};
use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

/// Number of deployment records kept for status queries
pub const DEPLOYMENT_HISTORY: usize = 5;

/// Bounded log of recent deployments
#[derive(Debug, Clone, Default)]
pub struct DeploymentLog {
    records: VecDeque<DeploymentRecord>,
    counter: u64,
}

impl DeploymentLog {
    /// Allocate a deployment id and record it as started
    pub fn start(&mut self) -> u64 {
        self.counter += 1;
        self.records.push_back(DeploymentRecord {
            deployment_id: self.counter,
            status: DeploymentStatus::Started,
            timestamp: Utc::now(),
            error: None,
        });
        while self.records.len() > DEPLOYMENT_HISTORY {
            self.records.pop_front();
        }
        self.counter
    }

    /// Record the final status of a deployment still in the log
    pub fn finish(&mut self, deployment_id: u64, status: DeploymentStatus, error: Option<String>) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.deployment_id == deployment_id)
        {
            record.status = status;
            record.timestamp = Utc::now();
            record.error = error;
        }
    }

    /// Recent deployments, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.records.iter().cloned().collect()
    }
}

impl FakeBackend {
    /// Resolve a bundle fragment and check it against the live environment
    pub fn ingest_deployer(
        &self,
        document: &BundleDocument,
        name: Option<&str>,
    ) -> BackendResult<Bundle> {
        self.ensure_authenticated()?;
        let bundle = document.resolve(name)?;
        if let Some(existing) = bundle
            .services
            .keys()
            .find(|service| self.db.service(service).is_some())
        {
            return Err(BackendError::DuplicateServiceOnImport(existing.clone()));
        }
        Ok(bundle)
    }

    /// Import a deployer document, returning the deployment id
    pub async fn import_deployer(&mut self, document: &str, name: Option<&str>) -> BackendResult<u64> {
        self.ensure_authenticated()?;
        let document = BundleDocument::parse(document)?;
        let bundle = self.ingest_deployer(&document, name)?;

        let deployment_id = self.deployments.start();
        self.events.publish(BackendEvent::Deployment {
            deployment_id,
            status: DeploymentStatus::Started,
        });
        info!(deployment_id, services = bundle.services.len(), "deployment started");

        let outcome = self.apply_bundle(&bundle).await;
        let status = if outcome.is_ok() {
            DeploymentStatus::Completed
        } else {
            DeploymentStatus::Failed
        };
        let error = outcome.as_ref().err().map(ToString::to_string);
        if let Some(error) = &error {
            warn!(deployment_id, error = %error, "deployment failed");
        } else {
            info!(deployment_id, "deployment completed");
        }
        self.deployments.finish(deployment_id, status, error);
        self.events
            .publish(BackendEvent::Deployment { deployment_id, status });
        outcome.map(|()| deployment_id)
    }

    async fn apply_bundle(&mut self, bundle: &Bundle) -> BackendResult<()> {
        let series = bundle
            .series
            .clone()
            .unwrap_or_else(|| self.default_series.clone());

        let mut targets = Vec::with_capacity(bundle.services.len());
        for (name, service) in &bundle.services {
            let id = CharmId::parse(&service.charm, &series)?;
            targets.push((name, service, id));
        }

        // Keyed by the requested id, which may lack a revision.
        let mut charms: HashMap<String, Charm> = HashMap::new();
        let mut missing: Vec<&CharmId> = Vec::new();
        for (_, service, id) in &targets {
            if let Some(charm) = self.cached_charm(&service.charm, id) {
                charms.insert(id.to_string(), charm.clone());
            } else if !missing.iter().any(|m| *m == id) {
                missing.push(id);
            }
        }

        // Fetch every uncached charm at once and wait for all of them.
        let store = Arc::clone(&self.charm_store);
        let fetched = join_all(missing.iter().map(|id| fetch_charm(store.as_ref(), id))).await;

        let mut failures: HashMap<String, BackendError> = HashMap::new();
        for (id, result) in missing.iter().zip(fetched) {
            match result {
                Ok(charm) => {
                    let cached = self.db.add_charm(charm).clone();
                    charms.insert(id.to_string(), cached);
                }
                Err(err) => {
                    failures.insert(id.to_string(), err);
                }
            }
        }

        // Every deploy is attempted; the first failure fails the import.
        let mut first_error = None;
        for (name, service, id) in &targets {
            let key = id.to_string();
            let deployed = match charms.get(&key) {
                Some(charm) => self
                    .deploy_from_charm(charm, service.deploy_options(name))
                    .map(|_| ()),
                None => Err(failures
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| BackendError::CharmStoreUnavailable(key.clone()))),
            };
            if let Err(err) = deployed {
                warn!(service = %name, error = %err, "bundle deploy failed");
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        for (name, service) in &bundle.services {
            if service.expose {
                self.expose(name)?;
            }
        }
        for relation in &bundle.relations {
            self.add_relations(&relation.0, &relation.targets(), true)?;
        }
        Ok(())
    }

    /// Status of recent deployments, oldest first
    pub fn status_deployer(&self) -> BackendResult<Vec<DeploymentRecord>> {
        self.ensure_authenticated()?;
        Ok(self.deployments.records())
    }

    /// Watch a deployment; no watcher is simulated
    pub fn deployer_watch(&self, _deployment_id: u64) -> BackendResult<()> {
        self.ensure_authenticated()
    }

    /// Next change of a deployment watcher; no watcher is simulated
    pub fn deployer_next(&self, _watcher_id: u64) -> BackendResult<()> {
        self.ensure_authenticated()
    }
}
