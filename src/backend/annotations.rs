// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Entity annotations

use super::FakeBackend;
use crate::error::{BackendError, BackendResult};
use crate::events::BackendEvent;
use crate::store::ENVIRONMENT_NAME;
use crate::types::{Annotations, EntityKind, EntityRef};
use tracing::debug;

impl FakeBackend {
    fn resolve_entity(&self, name: &str) -> BackendResult<EntityRef> {
        self.db
            .resolve(name)
            .ok_or_else(|| BackendError::EntityNotFound(name.to_string()))
    }

    /// Merge annotations into an entity's map; new keys win.
    ///
    /// Returns the merged annotations.
    pub fn update_annotations(&mut self, entity: &str, data: Annotations) -> BackendResult<Annotations> {
        self.ensure_authenticated()?;
        let target = self.resolve_entity(entity)?;
        let merged = {
            let annotations = self
                .db
                .annotations_mut(&target)
                .ok_or_else(|| BackendError::EntityNotFound(entity.to_string()))?;
            annotations.extend(data);
            annotations.clone()
        };
        self.record_annotations(&target);
        Ok(merged)
    }

    /// Current annotations of an entity
    pub fn get_annotations(&self, entity: &str) -> BackendResult<Annotations> {
        self.ensure_authenticated()?;
        let target = self.resolve_entity(entity)?;
        self.db
            .annotations(&target)
            .cloned()
            .ok_or_else(|| BackendError::EntityNotFound(entity.to_string()))
    }

    /// Remove the given annotation keys, or all annotations when `keys` is `None`.
    ///
    /// The entity is recorded for delta propagation even when nothing changed.
    pub fn remove_annotations(
        &mut self,
        entity: &str,
        keys: Option<&[String]>,
    ) -> BackendResult<Annotations> {
        self.ensure_authenticated()?;
        let target = self.resolve_entity(entity)?;
        let remaining = {
            let annotations = self
                .db
                .annotations_mut(&target)
                .ok_or_else(|| BackendError::EntityNotFound(entity.to_string()))?;
            match keys {
                Some(keys) => annotations.retain(|k, _| !keys.contains(k)),
                None => annotations.clear(),
            }
            annotations.clone()
        };
        self.record_annotations(&target);
        Ok(remaining)
    }

    /// Record an entity snapshot in its annotation group
    fn record_annotations(&mut self, target: &EntityRef) {
        match target.kind {
            EntityKind::Environment => {
                self.annotations
                    .annotations
                    .insert(ENVIRONMENT_NAME.to_string(), self.db.environment.clone());
            }
            EntityKind::Service => {
                if let Some(service) = self.db.service(&target.id) {
                    self.annotations
                        .services
                        .insert(target.id.clone(), service.clone());
                }
            }
            EntityKind::Machine => {
                if let Some(machine) = self.db.machine(&target.id) {
                    self.annotations
                        .machines
                        .insert(target.id.clone(), machine.clone());
                }
            }
            EntityKind::Unit => {
                if let Some(unit) = self.db.unit(&target.id) {
                    self.annotations.units.insert(target.id.clone(), unit.clone());
                }
            }
        }
        debug!(entity = %target.id, group = target.kind.annotation_group(), "annotations recorded");
        self.events.publish(BackendEvent::AnnotationsChanged {
            entity: target.id.clone(),
        });
    }
}
