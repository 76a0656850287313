// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Deployer bundle documents
//!
//! A document maps fragment names to fragments. A fragment may inherit from
//! other fragments through `inherits` (a name or a list of names); the
//! inheritance graph is walked depth first and merged most-base first, so
//! the requested fragment always has the last word.

use crate::error::{BackendError, BackendResult};
use crate::types::{Annotations, ConfigMap, Constraints, DeployOptions};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const INHERITS: &str = "inherits";

/// A parsed, not yet resolved, deployer document
#[derive(Debug, Clone, PartialEq)]
pub struct BundleDocument {
    fragments: Map<String, Value>,
}

impl BundleDocument {
    /// Parse a YAML (or JSON) document
    pub fn parse(raw: &str) -> BackendResult<Self> {
        let value: Value =
            serde_yaml::from_str(raw).map_err(|e| BackendError::YamlParse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Wrap an already decoded document
    pub fn from_value(value: Value) -> BackendResult<Self> {
        match value {
            Value::Object(fragments) => Ok(Self { fragments }),
            other => Err(BackendError::YamlParse(format!(
                "expected a mapping of bundle names, found {other}"
            ))),
        }
    }

    /// Fragment names in document order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// The fragment to import: the named one, or the only one
    pub fn target<'a>(&'a self, name: Option<&'a str>) -> BackendResult<&'a str> {
        match name {
            Some(name) if self.fragments.contains_key(name) => Ok(name),
            Some(name) => Err(BackendError::UnresolvableInheritance(name.to_string())),
            None => {
                let mut names = self.names();
                match (names.next(), names.next()) {
                    (Some(only), None) => Ok(only),
                    (None, _) => Err(BackendError::YamlParse("bundle document is empty".into())),
                    _ => Err(BackendError::AmbiguousImportTarget(
                        self.names().collect::<Vec<_>>().join(", "),
                    )),
                }
            }
        }
    }

    fn parents(&self, name: &str) -> Vec<String> {
        match self.fragments.get(name).and_then(|f| f.get(INHERITS)) {
            Some(Value::String(parent)) => vec![parent.clone()],
            Some(Value::Array(parents)) => parents
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Fragments to merge for `name`, most-base first and `name` last.
    ///
    /// Each ancestor appears once even when inherited along several paths,
    /// and inheritance cycles are cut at the first repeat.
    pub fn inheritance_chain(&self, name: &str) -> BackendResult<Vec<String>> {
        if !self.fragments.contains_key(name) {
            return Err(BackendError::UnresolvableInheritance(name.to_string()));
        }

        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        let root = graph.add_node(name.to_string());
        nodes.insert(name.to_string(), root);

        let mut pending = vec![name.to_string()];
        while let Some(child) = pending.pop() {
            let child_idx = nodes[&child];
            for parent in self.parents(&child) {
                if !self.fragments.contains_key(&parent) {
                    return Err(BackendError::UnresolvableInheritance(parent));
                }
                let parent_idx = match nodes.get(&parent) {
                    Some(idx) => *idx,
                    None => {
                        let idx = graph.add_node(parent.clone());
                        nodes.insert(parent.clone(), idx);
                        pending.push(parent);
                        idx
                    }
                };
                graph.add_edge(child_idx, parent_idx, ());
            }
        }

        // Outgoing edges are visited newest first, so the first listed parent
        // finishes first and later parents override it.
        let mut chain = Vec::with_capacity(graph.node_count());
        let mut dfs = DfsPostOrder::new(&graph, root);
        while let Some(idx) = dfs.next(&graph) {
            chain.push(graph[idx].clone());
        }
        debug!(target = name, chain = ?chain, "inheritance resolved");
        Ok(chain)
    }

    /// Resolve a fragment with everything it inherits into a [`Bundle`]
    pub fn resolve(&self, name: Option<&str>) -> BackendResult<Bundle> {
        let target = self.target(name)?;
        let mut merged = Value::Object(Map::new());
        for fragment in self.inheritance_chain(target)? {
            if let Some(value) = self.fragments.get(&fragment) {
                merge_values(&mut merged, value);
            }
        }
        if let Value::Object(map) = &mut merged {
            map.remove(INHERITS);
        }
        serde_json::from_value(merged)
            .map_err(|e| BackendError::YamlParse(format!("invalid bundle {target}: {e}")))
    }
}

/// Recursively merge `overlay` into `base`; overlay values win
fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// A fully resolved bundle fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Default series for charm ids in this bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Services keyed by name
    #[serde(default)]
    pub services: BTreeMap<String, BundleService>,
    /// Relations to create after every service is deployed
    #[serde(default)]
    pub relations: Vec<BundleRelation>,
}

/// One service entry of a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleService {
    /// Charm id
    pub charm: String,
    /// Unit count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_units: Option<i64>,
    /// Configuration values
    #[serde(default, skip_serializing_if = "ConfigMap::is_empty")]
    pub options: ConfigMap,
    /// Expose after deploying
    #[serde(default)]
    pub expose: bool,
    /// Annotations; non-string values are stringified
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, Value>,
    /// Constraints in any accepted shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

impl BundleService {
    /// Annotations as strings
    #[must_use]
    pub fn string_annotations(&self) -> Annotations {
        self.annotations
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Deploy options for this entry under the given service name
    #[must_use]
    pub fn deploy_options(&self, name: &str) -> DeployOptions {
        let annotations = self.string_annotations();
        DeployOptions {
            name: Some(name.to_string()),
            config: Some(self.options.clone()),
            config_yaml: None,
            unit_count: self.num_units,
            constraints: self.constraints.clone(),
            annotations: (!annotations.is_empty()).then_some(annotations),
        }
    }
}

/// Relation target: one endpoint or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationTarget {
    /// `["wordpress:db", "mysql:db"]`
    One(String),
    /// `["haproxy", ["wordpress", "blog"]]`
    Many(Vec<String>),
}

/// One `relations` entry: an endpoint and what it relates to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRelation(pub String, pub RelationTarget);

impl BundleRelation {
    /// Target endpoints
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        match &self.1 {
            RelationTarget::One(target) => vec![target.clone()],
            RelationTarget::Many(targets) => targets.clone(),
        }
    }
}
