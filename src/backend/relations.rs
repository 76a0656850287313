// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Relation endpoint matching and relation lifecycle

use super::FakeBackend;
use crate::error::{BackendError, BackendResult};
use crate::events::BackendEvent;
use crate::types::{
    AddRelationResult, Charm, CharmEndpoint, EndpointRole, Relation, RelationEndpoint,
    RelationScope, Role,
};
use std::fmt;
use tracing::info;

/// Relation type every charm implicitly provides
pub const JUJU_INFO: &str = "juju-info";

/// A parsed `service[:relation]` endpoint descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Service name
    pub service: String,
    /// Relation type name, when given explicitly
    pub relation: Option<String>,
}

impl EndpointSpec {
    /// Parse `"wordpress:db"` or `"wordpress"`
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((service, relation)) if !relation.is_empty() => Self {
                service: service.to_string(),
                relation: Some(relation.to_string()),
            },
            Some((service, _)) => Self {
                service: service.to_string(),
                relation: None,
            },
            None => Self {
                service: raw.to_string(),
                relation: None,
            },
        }
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}:{relation}", self.service),
            None => f.write_str(&self.service),
        }
    }
}

/// One side of a matched relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedEndpoint {
    /// Service name
    pub name: String,
    /// Resolved relation type name
    pub relation: String,
}

/// The single compatible pairing between two endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMatch {
    /// Shared interface name
    pub interface: String,
    /// Declared scope of the provide side, falling back to the require side
    pub scope: Option<String>,
    /// Providing endpoint
    pub provides: MatchedEndpoint,
    /// Requiring endpoint
    pub requires: MatchedEndpoint,
}

fn juju_info() -> CharmEndpoint {
    CharmEndpoint {
        interface: JUJU_INFO.to_string(),
        scope: Some("container".to_string()),
    }
}

/// Candidate endpoints of one charm side: the explicit type only, or all declared
fn candidates(
    declared: &std::collections::BTreeMap<String, CharmEndpoint>,
    extra: Option<&CharmEndpoint>,
    explicit: Option<&str>,
) -> Vec<(String, CharmEndpoint)> {
    let mut all: Vec<(String, CharmEndpoint)> = declared
        .iter()
        .map(|(name, ep)| (name.clone(), ep.clone()))
        .collect();
    if let Some(extra) = extra {
        if !declared.contains_key(JUJU_INFO) {
            all.push((JUJU_INFO.to_string(), extra.clone()));
        }
    }
    match explicit {
        Some(wanted) => all.into_iter().filter(|(name, _)| name == wanted).collect(),
        None => all,
    }
}

/// Find the one interface two endpoints can relate over.
///
/// Both orderings (A provides to B, B provides to A) are tried. Every charm
/// implicitly provides `juju-info` with container scope. Zero matches fail
/// with [`BackendError::NoCompatibleRelation`], more than one with
/// [`BackendError::AmbiguousRelation`].
pub fn find_endpoint_match(
    a: (&EndpointSpec, &Charm),
    b: (&EndpointSpec, &Charm),
) -> BackendResult<EndpointMatch> {
    let info = juju_info();
    let mut matches = Vec::new();
    for ((prov_spec, prov_charm), (req_spec, req_charm)) in [(a, b), (b, a)] {
        let provides = candidates(&prov_charm.provides, Some(&info), prov_spec.relation.as_deref());
        let requires = candidates(&req_charm.requires, None, req_spec.relation.as_deref());
        for (prov_type, prov_ep) in &provides {
            for (req_type, req_ep) in &requires {
                if prov_ep.interface != req_ep.interface {
                    continue;
                }
                matches.push(EndpointMatch {
                    interface: prov_ep.interface.clone(),
                    scope: prov_ep.scope.clone().or_else(|| req_ep.scope.clone()),
                    provides: MatchedEndpoint {
                        name: prov_spec.service.clone(),
                        relation: prov_type.clone(),
                    },
                    requires: MatchedEndpoint {
                        name: req_spec.service.clone(),
                        relation: req_type.clone(),
                    },
                });
            }
        }
    }

    match matches.len() {
        0 => Err(BackendError::NoCompatibleRelation),
        1 => Ok(matches.remove(0)),
        _ => Err(BackendError::AmbiguousRelation),
    }
}

/// Whether `relation` joins exactly the given `(service, relation)` endpoints
fn connects(relation: &Relation, pair: &[(&str, &str); 2]) -> bool {
    relation.endpoints.len() == pair.len()
        && pair.iter().all(|(service, name)| {
            relation
                .endpoints
                .iter()
                .any(|ep| ep.0 == *service && ep.1.name == *name)
        })
}

impl FakeBackend {
    /// Resolve an endpoint descriptor to its service's cached charm
    fn endpoint_charm(&self, spec: &EndpointSpec) -> BackendResult<Charm> {
        let service = self
            .db
            .service(&spec.service)
            .ok_or_else(|| BackendError::ServiceNotFound(spec.service.clone()))?;
        self.db
            .charm(&service.charm)
            .cloned()
            .ok_or_else(|| BackendError::CharmNotLoaded(service.charm.clone()))
    }

    /// Relate two services.
    ///
    /// With `use_relation_count` the id is `relation-<n>`; otherwise it is
    /// derived from the endpoints as `"<req>:<type> <prov>:<type>"`.
    pub fn add_relation(
        &mut self,
        endpoint_a: &str,
        endpoint_b: &str,
        use_relation_count: bool,
    ) -> BackendResult<AddRelationResult> {
        self.ensure_authenticated()?;
        let spec_a = EndpointSpec::parse(endpoint_a);
        let spec_b = EndpointSpec::parse(endpoint_b);
        let charm_a = self.endpoint_charm(&spec_a)?;
        let charm_b = self.endpoint_charm(&spec_b)?;
        let matched = find_endpoint_match((&spec_a, &charm_a), (&spec_b, &charm_b))?;
        let pair = [
            (matched.requires.name.as_str(), matched.requires.relation.as_str()),
            (matched.provides.name.as_str(), matched.provides.relation.as_str()),
        ];
        if self.db.relations.iter().any(|r| connects(r, &pair)) {
            return Err(BackendError::RelationExists(format!(
                "{}:{} {}:{}",
                pair[0].0, pair[0].1, pair[1].0, pair[1].1
            )));
        }

        let relation_id = if use_relation_count {
            format!("relation-{}", self.relation_count)
        } else {
            format!(
                "{}:{} {}:{}",
                matched.requires.name,
                matched.requires.relation,
                matched.provides.name,
                matched.provides.relation
            )
        };
        self.relation_count += 1;

        let display_name = spec_a.relation.clone().unwrap_or_else(|| {
            if matched.requires.name == spec_a.service {
                matched.requires.relation.clone()
            } else {
                matched.provides.relation.clone()
            }
        });
        let relation = Relation {
            relation_id: relation_id.clone(),
            interface: matched.interface.clone(),
            endpoints: vec![
                RelationEndpoint(
                    matched.requires.name.clone(),
                    EndpointRole {
                        name: matched.requires.relation.clone(),
                        role: Role::Client,
                    },
                ),
                RelationEndpoint(
                    matched.provides.name.clone(),
                    EndpointRole {
                        name: matched.provides.relation.clone(),
                        role: Role::Server,
                    },
                ),
            ],
            scope: RelationScope::from_declared(matched.scope.as_deref()),
            display_name,
        };

        self.changes.relation(&relation, true);
        self.db.relations.push(relation.clone());
        info!(relation = %relation_id, interface = %relation.interface, "relation added");
        self.events.publish(BackendEvent::RelationAdded {
            relation_id: relation_id.clone(),
        });

        Ok(AddRelationResult {
            relation_id,
            interface: relation.interface.clone(),
            endpoints: relation.endpoints.clone(),
            scope: relation.scope,
            display_name: relation.display_name.clone(),
            relation,
        })
    }

    /// Relate one endpoint to several others, stopping at the first failure
    pub fn add_relations(
        &mut self,
        endpoint: &str,
        targets: &[String],
        use_relation_count: bool,
    ) -> BackendResult<Vec<AddRelationResult>> {
        targets
            .iter()
            .map(|target| self.add_relation(endpoint, target, use_relation_count))
            .collect()
    }

    /// Remove the relation between two endpoints, in either order.
    ///
    /// An endpoint without an explicit type matches any relation type.
    pub fn remove_relation(&mut self, endpoint_a: &str, endpoint_b: &str) -> BackendResult<Relation> {
        self.ensure_authenticated()?;
        let spec_a = EndpointSpec::parse(endpoint_a);
        let spec_b = EndpointSpec::parse(endpoint_b);
        self.endpoint_charm(&spec_a)?;
        self.endpoint_charm(&spec_b)?;

        let fits = |ep: &RelationEndpoint, spec: &EndpointSpec| {
            ep.0 == spec.service && spec.relation.as_ref().map_or(true, |r| *r == ep.1.name)
        };
        let idx = self
            .db
            .relations
            .iter()
            .position(|rel| match rel.endpoints.as_slice() {
                [x, y] => (fits(x, &spec_a) && fits(y, &spec_b)) || (fits(x, &spec_b) && fits(y, &spec_a)),
                _ => false,
            })
            .ok_or_else(|| BackendError::RelationNotFound(format!("{spec_a} {spec_b}")))?;

        let relation = self.db.relations.remove(idx);
        self.changes.relation(&relation, false);
        info!(relation = %relation.relation_id, "relation removed");
        self.events.publish(BackendEvent::RelationRemoved {
            relation_id: relation.relation_id.clone(),
        });
        Ok(relation)
    }
}
