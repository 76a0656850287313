// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Change tracking for the simulated watcher stream
//!
//! Every mutation records a snapshot of the touched entity together with a
//! presence flag. The shims drain the accumulated set periodically and turn
//! it into delta messages; a drained set starts over empty.

use crate::types::{Annotations, Machine, Relation, Service, Unit};
use serde::Serialize;
use std::collections::BTreeMap;

/// Entity snapshots keyed by id, with `true` for present and `false` for removed
pub type Changes<T> = BTreeMap<String, (T, bool)>;

/// Entity mutations since the last drain
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    /// Service changes
    pub services: Changes<Service>,
    /// Machine changes
    pub machines: Changes<Machine>,
    /// Unit changes
    pub units: Changes<Unit>,
    /// Relation changes
    pub relations: Changes<Relation>,
}

impl ChangeSet {
    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.machines.is_empty()
            && self.units.is_empty()
            && self.relations.is_empty()
    }

    /// Take the recorded changes, leaving the set empty.
    ///
    /// Returns `None` when nothing was recorded.
    pub fn drain(&mut self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(std::mem::take(self))
        }
    }

    /// Record a service
    pub fn service(&mut self, service: &Service, present: bool) {
        self.services
            .insert(service.name.clone(), (service.clone(), present));
    }

    /// Record a machine
    pub fn machine(&mut self, machine: &Machine, present: bool) {
        self.machines
            .insert(machine.id.clone(), (machine.clone(), present));
    }

    /// Record a unit
    pub fn unit(&mut self, unit: &Unit, present: bool) {
        self.units.insert(unit.id.clone(), (unit.clone(), present));
    }

    /// Record a relation
    pub fn relation(&mut self, relation: &Relation, present: bool) {
        self.relations
            .insert(relation.relation_id.clone(), (relation.clone(), present));
    }
}

/// Annotation changes since the last drain; last write wins
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnnotationSet {
    /// Annotated services
    pub services: BTreeMap<String, Service>,
    /// Annotated machines
    pub machines: BTreeMap<String, Machine>,
    /// Annotated units
    pub units: BTreeMap<String, Unit>,
    /// Environment annotations, keyed by "env"
    pub annotations: BTreeMap<String, Annotations>,
}

impl AnnotationSet {
    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.machines.is_empty()
            && self.units.is_empty()
            && self.annotations.is_empty()
    }

    /// Take the recorded annotations, leaving the set empty
    pub fn drain(&mut self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(std::mem::take(self))
        }
    }
}
