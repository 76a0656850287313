// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Backend event bus
//!
//! Observers subscribe to the backend instead of listening for ambient
//! global events. Publishing never blocks and never fails; events sent with
//! no subscriber are dropped.

use crate::types::DeploymentStatus;
use tokio::sync::broadcast;

/// Something observable happened inside the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A user logged in or out.
    SessionChanged {
        /// The authenticated user, if any
        user: Option<String>,
    },
    /// A service was deployed.
    ServiceDeployed {
        /// Service name
        name: String,
    },
    /// A service and everything attached to it was destroyed.
    ServiceDestroyed {
        /// Service name
        name: String,
    },
    /// Units were added to a service.
    UnitsAdded {
        /// Unit ids
        units: Vec<String>,
    },
    /// Units were removed.
    UnitsRemoved {
        /// Unit ids
        units: Vec<String>,
    },
    /// A relation was created.
    RelationAdded {
        /// Relation id
        relation_id: String,
    },
    /// A relation was removed.
    RelationRemoved {
        /// Relation id
        relation_id: String,
    },
    /// Annotations of an entity changed.
    AnnotationsChanged {
        /// Entity name
        entity: String,
    },
    /// A bundle deployment changed status.
    Deployment {
        /// Deployment id
        deployment_id: u64,
        /// New status
        status: DeploymentStatus,
    },
}

/// Broadcast channel of [`BackendEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BackendEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus; slow subscribers skip old events once 256 are queued
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Publish an event to every subscriber
    pub fn publish(&self, event: BackendEvent) {
        tracing::trace!(?event, "backend event");
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            tracing::trace!(?event, "backend event dropped, no subscribers");
        }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(BackendEvent::ServiceDeployed { name: "mysql".into() });
        assert_eq!(
            rx.recv().await.unwrap(),
            BackendEvent::ServiceDeployed { name: "mysql".into() }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(BackendEvent::SessionChanged { user: None });

        // Dropped events are not replayed to later subscribers.
        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
