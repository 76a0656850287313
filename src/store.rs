// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! In-memory entity store
//!
//! Collections are plain vectors kept in insertion order; units live inside
//! their owning service.

use crate::types::{
    Annotations, Charm, EntityKind, EntityRef, Machine, Relation, Service, Unit,
};
use serde::{Deserialize, Serialize};

/// Name that resolves to the environment entity
pub const ENVIRONMENT_NAME: &str = "env";

/// All simulated entities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    /// Cached charms
    #[serde(default)]
    pub charms: Vec<Charm>,
    /// Deployed services, each owning its units
    #[serde(default)]
    pub services: Vec<Service>,
    /// Machines and containers
    #[serde(default)]
    pub machines: Vec<Machine>,
    /// Relations
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Environment annotations
    #[serde(default)]
    pub environment: Annotations,
}

impl Database {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Charms
    // -------------------------------------------------------------------------

    /// Look up a cached charm by id
    #[must_use]
    pub fn charm(&self, id: &str) -> Option<&Charm> {
        self.charms.iter().find(|c| c.id == id)
    }

    /// Cache a charm unless one with the same id is already present.
    ///
    /// Returns the cached record.
    pub fn add_charm(&mut self, charm: Charm) -> &Charm {
        match self.charms.iter().position(|c| c.id == charm.id) {
            Some(idx) => &self.charms[idx],
            None => {
                self.charms.push(charm);
                &self.charms[self.charms.len() - 1]
            }
        }
    }

    // -------------------------------------------------------------------------
    // Services and units
    // -------------------------------------------------------------------------

    /// Look up a service
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Look up a service mutably
    pub fn service_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.name == name)
    }

    /// Remove a service, returning it
    pub fn remove_service(&mut self, name: &str) -> Option<Service> {
        let idx = self.services.iter().position(|s| s.name == name)?;
        Some(self.services.remove(idx))
    }

    /// Every unit of every service
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.services.iter().flat_map(|s| s.units.iter())
    }

    /// Look up a unit by id
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.service(Unit::service_name(id))?
            .units
            .iter()
            .find(|u| u.id == id)
    }

    /// Look up a unit mutably
    pub fn unit_mut(&mut self, id: &str) -> Option<&mut Unit> {
        self.service_mut(Unit::service_name(id))?
            .units
            .iter_mut()
            .find(|u| u.id == id)
    }

    /// Remove a unit from its service, returning it
    pub fn remove_unit(&mut self, id: &str) -> Option<Unit> {
        let service = self.service_mut(Unit::service_name(id))?;
        let idx = service.units.iter().position(|u| u.id == id)?;
        Some(service.units.remove(idx))
    }

    // -------------------------------------------------------------------------
    // Machines
    // -------------------------------------------------------------------------

    /// Look up a machine
    #[must_use]
    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    /// Remove a machine, returning it
    pub fn remove_machine(&mut self, id: &str) -> Option<Machine> {
        let idx = self.machines.iter().position(|m| m.id == id)?;
        Some(self.machines.remove(idx))
    }

    /// Containers nested anywhere below a machine
    #[must_use]
    pub fn descendants(&self, id: &str) -> Vec<&Machine> {
        let prefix = format!("{id}/");
        self.machines
            .iter()
            .filter(|m| m.id.starts_with(&prefix))
            .collect()
    }

    /// Units placed on a machine
    #[must_use]
    pub fn units_on(&self, machine: &str) -> Vec<&Unit> {
        self.units().filter(|u| u.machine == machine).collect()
    }

    // -------------------------------------------------------------------------
    // Relations
    // -------------------------------------------------------------------------

    /// Look up a relation by id
    #[must_use]
    pub fn relation(&self, id: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.relation_id == id)
    }

    /// Relations a service takes part in
    #[must_use]
    pub fn relations_for(&self, service: &str) -> Vec<&Relation> {
        self.relations.iter().filter(|r| r.involves(service)).collect()
    }

    // -------------------------------------------------------------------------
    // Entity resolution
    // -------------------------------------------------------------------------

    /// Resolve an entity name used by the annotation API.
    ///
    /// `env` names the environment, machine ids (including container paths)
    /// name machines, anything else containing `/` is a unit, and the rest
    /// are services.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<EntityRef> {
        let kind = if name == ENVIRONMENT_NAME {
            EntityKind::Environment
        } else if self.machine(name).is_some() {
            EntityKind::Machine
        } else if name.contains('/') {
            self.unit(name)?;
            EntityKind::Unit
        } else {
            self.service(name)?;
            EntityKind::Service
        };
        Some(EntityRef {
            kind,
            id: name.to_string(),
        })
    }

    /// Annotations of a resolved entity
    #[must_use]
    pub fn annotations(&self, entity: &EntityRef) -> Option<&Annotations> {
        match entity.kind {
            EntityKind::Environment => Some(&self.environment),
            EntityKind::Service => self.service(&entity.id).map(|s| &s.annotations),
            EntityKind::Machine => self.machine(&entity.id).map(|m| &m.annotations),
            EntityKind::Unit => self.unit(&entity.id).map(|u| &u.annotations),
        }
    }

    /// Annotations of a resolved entity, mutably
    pub fn annotations_mut(&mut self, entity: &EntityRef) -> Option<&mut Annotations> {
        match entity.kind {
            EntityKind::Environment => Some(&mut self.environment),
            EntityKind::Service => self.service_mut(&entity.id).map(|s| &mut s.annotations),
            EntityKind::Machine => self
                .machines
                .iter_mut()
                .find(|m| m.id == entity.id)
                .map(|m| &mut m.annotations),
            EntityKind::Unit => self.unit_mut(&entity.id).map(|u| &mut u.annotations),
        }
    }
}
