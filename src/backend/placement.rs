// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Unit placement, machines and removals

use super::FakeBackend;
use crate::error::{BackendError, BackendResult};
use crate::events::BackendEvent;
use crate::types::{
    AddUnitResult, AddedMachine, ConstraintMap, Hardware, Machine, MachineParams, Unit,
    UnitRemoval,
};
use std::collections::HashSet;
use tracing::{debug, info};

/// Job assigned to machines that host units
const HOST_UNITS_JOB: &str = "JobHostUnits";

/// Reject unit counts that do not fit the service kind.
///
/// Principals need at least one unit, subordinates exactly zero.
pub(crate) fn check_unit_count(service: &str, subordinate: bool, count: i64) -> BackendResult<()> {
    let valid = if subordinate { count == 0 } else { count >= 1 };
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidUnitCount {
            service: service.to_string(),
            count,
        })
    }
}

impl FakeBackend {
    // =========================================================================
    // Units
    // =========================================================================

    /// Add units to a service.
    ///
    /// `num_units` defaults to 1 for principals and 0 for subordinates. With
    /// `to_machine` the single new unit is placed on that machine; otherwise
    /// unused machines are reused before new ones are created.
    pub fn add_unit(
        &mut self,
        service: &str,
        num_units: Option<i64>,
        to_machine: Option<&str>,
    ) -> BackendResult<AddUnitResult> {
        self.ensure_authenticated()?;
        let subordinate = self
            .db
            .service(service)
            .ok_or_else(|| BackendError::ServiceNotFound(service.to_string()))?
            .subordinate;
        let count = num_units.unwrap_or(if subordinate { 0 } else { 1 });
        check_unit_count(service, subordinate, count)?;
        let count = usize::try_from(count).unwrap_or_default();

        let machines = match to_machine {
            Some(target) => {
                if count > 1 {
                    return Err(BackendError::invalid(
                        "When deploying to a specific machine, the number of units requested must be 1.",
                    ));
                }
                if self.db.machine(target).is_none() {
                    return Err(BackendError::MachineNotFound(target.to_string()));
                }
                vec![target.to_string(); count]
            }
            None => self.allocate_machines(count),
        };
        self.place_units(service, &machines)
    }

    /// Machines for `count` new units: unused machines in store order first,
    /// then newly created ones.
    pub(crate) fn allocate_machines(&mut self, count: usize) -> Vec<String> {
        let mut ids: Vec<String> = {
            let used: HashSet<&str> = self.db.units().map(|u| u.machine.as_str()).collect();
            self.db
                .machines
                .iter()
                .filter(|m| !used.contains(m.id.as_str()))
                .map(|m| m.id.clone())
                .take(count)
                .collect()
        };
        let reused = ids.len();
        while ids.len() < count {
            let series = self.default_series.clone();
            let id = self.create_machine(None, None, &series, &ConstraintMap::new(), vec![
                HOST_UNITS_JOB.to_string(),
            ]);
            ids.push(id);
        }
        debug!(count, reused, "machines allocated");
        ids
    }

    /// Create one unit per machine id for a service
    pub(crate) fn place_units(
        &mut self,
        service: &str,
        machines: &[String],
    ) -> BackendResult<AddUnitResult> {
        let mut result = AddUnitResult::default();
        for machine_id in machines {
            let machine = self
                .db
                .machine(machine_id)
                .cloned()
                .ok_or_else(|| BackendError::MachineNotFound(machine_id.clone()))?;
            let svc = self
                .db
                .service_mut(service)
                .ok_or_else(|| BackendError::ServiceNotFound(service.to_string()))?;
            let unit = Unit {
                id: format!("{service}/{}", svc.unit_sequence),
                service: service.to_string(),
                machine: machine.id.clone(),
                agent_state: "started".to_string(),
                public_address: machine.public_address.clone(),
                subordinate: svc.subordinate,
                annotations: Default::default(),
            };
            svc.unit_sequence += 1;
            svc.units.push(unit.clone());

            self.changes.unit(&unit, true);
            self.changes.machine(&machine, true);
            result.units.push(unit);
            result.machines.push(machine);
        }
        if !result.units.is_empty() {
            let units: Vec<String> = result.units.iter().map(|u| u.id.clone()).collect();
            info!(service, units = ?units, "units added");
            self.events.publish(BackendEvent::UnitsAdded { units });
        }
        Ok(result)
    }

    /// Remove units by id.
    ///
    /// Subordinate units are never removed directly and produce an error
    /// entry; unknown units produce a warning entry.
    pub fn remove_units(&mut self, names: &[String]) -> BackendResult<UnitRemoval> {
        self.ensure_authenticated()?;
        let (report, removable) = self.check_unit_removal(names);
        let mut removed = Vec::new();
        for name in removable {
            if let Some(unit) = self.db.remove_unit(&name) {
                self.changes.unit(&unit, false);
                removed.push(unit.id);
            }
        }
        if !removed.is_empty() {
            info!(units = ?removed, "units removed");
            self.events.publish(BackendEvent::UnitsRemoved { units: removed });
        }
        Ok(report)
    }

    /// Classify units for removal without touching the store
    fn check_unit_removal(&self, names: &[String]) -> (UnitRemoval, Vec<String>) {
        let mut report = UnitRemoval::default();
        let mut removable = Vec::new();
        for name in names {
            match self.db.service(Unit::service_name(name)) {
                Some(service) if service.subordinate => {
                    report.errors.push(format!("{name} is a subordinate, cannot remove."));
                }
                Some(_) if self.db.unit(name).is_some() => removable.push(name.clone()),
                _ => report.warnings.push(format!("{name} does not exist, cannot remove.")),
            }
        }
        (report, removable)
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Destroy a service with its relations and units.
    ///
    /// Unit removal is checked up front: when any unit cannot be removed
    /// nothing is changed and a composite error is returned.
    pub fn destroy_service(&mut self, name: &str) -> BackendResult<String> {
        self.ensure_authenticated()?;
        let unit_names: Vec<String> = self
            .db
            .service(name)
            .ok_or_else(|| BackendError::ServiceNotFound(name.to_string()))?
            .units
            .iter()
            .map(|u| u.id.clone())
            .collect();

        let (report, _) = self.check_unit_removal(&unit_names);
        if !report.is_clean() {
            let severity = if report.errors.is_empty() { "Warning" } else { "Error" };
            return Err(BackendError::UnitRemoval {
                severity: severity.to_string(),
                service: name.to_string(),
                units: unit_names.join(", "),
            });
        }

        let (touching, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.db.relations)
            .into_iter()
            .partition(|r| r.involves(name));
        self.db.relations = kept;
        for relation in &touching {
            self.changes.relation(relation, false);
            self.events.publish(BackendEvent::RelationRemoved {
                relation_id: relation.relation_id.clone(),
            });
        }

        self.remove_units(&unit_names)?;

        if let Some(service) = self.db.remove_service(name) {
            self.changes.service(&service, false);
        }
        info!(service = name, relations = touching.len(), "service destroyed");
        self.events
            .publish(BackendEvent::ServiceDestroyed { name: name.to_string() });
        Ok(name.to_string())
    }

    // =========================================================================
    // Machines
    // =========================================================================

    /// Next machine or container name under a parent and container type
    fn next_machine_name(&mut self, parent: Option<&str>, container_type: Option<&str>) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.extend(parent.map(str::to_string));
        parts.extend(container_type.map(str::to_string));
        let sequence = self.machine_sequences.entry(parts.join("/")).or_insert(0);
        let number = *sequence;
        *sequence += 1;
        parts.push(number.to_string());
        parts.join("/")
    }

    /// Create a machine or container and record it
    fn create_machine(
        &mut self,
        parent: Option<&str>,
        container_type: Option<&str>,
        series: &str,
        constraints: &ConstraintMap,
        jobs: Vec<String>,
    ) -> String {
        let id = self.next_machine_name(parent, container_type);
        let machine = Machine {
            id: id.clone(),
            parent_id: parent.map(str::to_string),
            container_type: container_type.map(str::to_string),
            public_address: format!("addr-{id}.example.com"),
            agent_state: "running".to_string(),
            series: series.to_string(),
            jobs,
            hardware: Hardware::for_machine(parent.is_some(), constraints),
            annotations: Default::default(),
        };
        self.changes.machine(&machine, true);
        self.db.machines.push(machine);
        id
    }

    /// Add machines or containers.
    ///
    /// A container without a parent gets a new host machine. Each entry
    /// succeeds or fails independently.
    pub fn add_machines(&mut self, params: &[MachineParams]) -> BackendResult<Vec<AddedMachine>> {
        self.ensure_authenticated()?;
        Ok(params.iter().map(|p| self.add_machine(p)).collect())
    }

    fn add_machine(&mut self, params: &MachineParams) -> AddedMachine {
        let failed = |error: String| AddedMachine {
            name: None,
            error: Some(error),
        };
        let series = params
            .series
            .clone()
            .unwrap_or_else(|| self.default_series.clone());
        let constraints = params
            .constraints
            .as_ref()
            .map(|c| c.normalize())
            .unwrap_or_default();
        let jobs = params
            .jobs
            .clone()
            .unwrap_or_else(|| vec![HOST_UNITS_JOB.to_string()]);
        let container_type = params.container_type.as_deref();

        if let Some(parent) = &params.parent_id {
            if container_type.is_none() {
                return failed("parent machine specified without container type".to_string());
            }
            if self.db.machine(parent).is_none() {
                return failed(format!("cannot add a new machine: machine {parent} not found"));
            }
        }

        let mut parent = params.parent_id.clone();
        if let Some(kind) = container_type {
            if kind != "lxc" && kind != "kvm" {
                let host = parent.as_deref().unwrap_or("new machine");
                return failed(format!(
                    "cannot add a new machine: {host} cannot host {kind} containers"
                ));
            }
            if parent.is_none() {
                let host = self.create_machine(None, None, &series, &ConstraintMap::new(), vec![
                    HOST_UNITS_JOB.to_string(),
                ]);
                parent = Some(host);
            }
        }

        let name = self.create_machine(parent.as_deref(), container_type, &series, &constraints, jobs);
        info!(machine = %name, "machine added");
        AddedMachine {
            name: Some(name),
            error: None,
        }
    }

    /// Destroy machines.
    ///
    /// Machines hosting containers or units are refused unless `force` is
    /// set, in which case the containers and units go too.
    pub fn destroy_machines(&mut self, names: &[String], force: bool) -> BackendResult<()> {
        self.ensure_authenticated()?;
        let mut errors = Vec::new();
        let mut destroyed = false;
        for name in names {
            match self.destroy_machine(name, force) {
                Ok(()) => destroyed = true,
                Err(err) => errors.push(err),
            }
        }
        if errors.is_empty() {
            return Ok(());
        }
        let prefix = if destroyed {
            "some machines were not destroyed"
        } else {
            "no machines were destroyed"
        };
        Err(BackendError::MachineRemoval(format!("{prefix}: {}", errors.join("; "))))
    }

    fn destroy_machine(&mut self, name: &str, force: bool) -> Result<(), String> {
        if self.db.machine(name).is_none() {
            return Err(format!("machine {name} does not exist"));
        }

        let descendants: Vec<String> = self.db.descendants(name).iter().map(|m| m.id.clone()).collect();
        let units: Vec<String> = self.db.units_on(name).iter().map(|u| u.id.clone()).collect();
        if !force {
            if !descendants.is_empty() {
                return Err(format!("machine {name} is hosting containers {}", descendants.join(", ")));
            }
            if !units.is_empty() {
                return Err(format!("machine {name} has unit(s) {} assigned", units.join(", ")));
            }
        }

        let mut doomed = descendants;
        doomed.push(name.to_string());
        for id in &doomed {
            let hosted: Vec<String> = self.db.units_on(id).iter().map(|u| u.id.clone()).collect();
            for unit_id in hosted {
                if let Some(unit) = self.db.remove_unit(&unit_id) {
                    self.changes.unit(&unit, false);
                }
            }
            if let Some(machine) = self.db.remove_machine(id) {
                self.changes.machine(&machine, false);
            }
        }
        info!(machine = name, force, "machine destroyed");
        Ok(())
    }
}
