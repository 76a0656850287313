// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Charm catalog access
//!
//! The backend never talks to a catalog directly; it goes through the
//! [`CharmStore`] trait so tests and the CLI can serve charms from memory
//! or from a JSON file, and deployments can use an HTTP store.

use crate::charm::CharmId;
use crate::error::{BackendError, BackendResult};
use crate::types::{Charm, CharmData};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure reported by a charm store
#[derive(Debug, Error)]
pub enum CharmStoreError {
    /// The store has no such charm.
    #[error("charm {0} not found")]
    NotFound(String),
    /// The store could not be reached or answered with an error.
    #[error("transport error: {0}")]
    Transport(String),
    /// The store answered with something that is not a charm record.
    #[error("invalid charm data: {0}")]
    Decode(String),
}

/// An external charm catalog
#[async_trait]
pub trait CharmStore: Send + Sync {
    /// Fetch the raw record for a store id such as `precise/wordpress-15`
    async fn fetch(&self, store_id: &str) -> Result<CharmData, CharmStoreError>;
}

/// Fetch and normalize a charm, hiding transport details from the caller
pub async fn fetch_charm(store: &dyn CharmStore, id: &CharmId) -> BackendResult<Charm> {
    let store_id = id.store_id();
    match store.fetch(&store_id).await {
        Ok(data) => {
            debug!(charm = %id, "charm fetched from store");
            Ok(Charm::from_data(data, id))
        }
        Err(err) => {
            warn!(charm = %id, error = %err, "charm store fetch failed");
            Err(BackendError::CharmStoreUnavailable(id.to_string()))
        }
    }
}

// =============================================================================
// Static store
// =============================================================================

/// In-memory charm catalog keyed by store id
#[derive(Debug, Clone, Default)]
pub struct StaticCharmStore {
    charms: HashMap<String, CharmData>,
}

impl StaticCharmStore {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a charm, builder style
    #[must_use]
    pub fn with_charm(mut self, store_id: &str, data: CharmData) -> Self {
        self.insert(store_id, data);
        self
    }

    /// Add or replace a charm
    pub fn insert(&mut self, store_id: &str, data: CharmData) {
        self.charms.insert(store_id.to_string(), data);
    }

    /// Number of charms in the catalog
    #[must_use]
    pub fn len(&self) -> usize {
        self.charms.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.charms.is_empty()
    }

    /// Parse a catalog from a JSON object of store id to charm record
    pub fn from_json(json: &str) -> Result<Self, CharmStoreError> {
        let charms: HashMap<String, CharmData> =
            serde_json::from_str(json).map_err(|e| CharmStoreError::Decode(e.to_string()))?;
        Ok(Self { charms })
    }

    /// Load a catalog from a JSON file
    pub fn from_path(path: &Path) -> Result<Self, CharmStoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CharmStoreError::Transport(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Find a record: exact id first, then the highest revision of an
    /// unrevisioned request.
    fn lookup(&self, store_id: &str) -> Option<&CharmData> {
        if let Some(data) = self.charms.get(store_id) {
            return Some(data);
        }
        let prefix = format!("{store_id}-");
        self.charms
            .iter()
            .filter_map(|(key, data)| {
                let rev = key.strip_prefix(&prefix)?.parse::<u32>().ok()?;
                Some((rev, data))
            })
            .max_by_key(|(rev, _)| *rev)
            .map(|(_, data)| data)
    }
}

#[async_trait]
impl CharmStore for StaticCharmStore {
    async fn fetch(&self, store_id: &str) -> Result<CharmData, CharmStoreError> {
        self.lookup(store_id)
            .cloned()
            .ok_or_else(|| CharmStoreError::NotFound(store_id.to_string()))
    }
}

// =============================================================================
// HTTP store
// =============================================================================

/// Charm store reached over HTTP at `<base>/charm/<store id>`
#[derive(Debug, Clone)]
pub struct HttpCharmStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCharmStore {
    /// Create a store client for the given base URL
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn charm_url(&self, store_id: &str) -> String {
        format!("{}/charm/{}", self.base_url, store_id)
    }
}

#[async_trait]
impl CharmStore for HttpCharmStore {
    async fn fetch(&self, store_id: &str) -> Result<CharmData, CharmStoreError> {
        let response = self
            .client
            .get(self.charm_url(store_id))
            .send()
            .await
            .map_err(|e| CharmStoreError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CharmStoreError::NotFound(store_id.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| CharmStoreError::Transport(e.to_string()))?;

        response
            .json::<CharmData>()
            .await
            .map_err(|e| CharmStoreError::Decode(e.to_string()))
    }
}
