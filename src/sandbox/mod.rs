// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Sandbox API shims
//!
//! A shim sits between one client and the [`FakeBackend`], translating a
//! historical wire protocol into backend calls and turning drained change
//! sets into delta messages. Two protocols are provided: [`GoJujuApi`] and
//! [`PyJujuApi`].

mod connection;
mod go;
mod python;

pub use connection::{ClientConnection, Connection};
pub use go::{entity_tag, tag_to_entity, GoJujuApi, ALL_WATCHER_ID, MODEL_NAME};
pub use python::PyJujuApi;

use crate::backend::FakeBackend;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Backend handle shared between a shim and its delta pump
pub type SharedBackend = Arc<Mutex<FakeBackend>>;

/// Wrap a backend for use by the shims
#[must_use]
pub fn share(backend: FakeBackend) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}

/// Connection level failures of a shim
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// A different client is already connected.
    #[error("INVALID_STATE_ERR : Connection is open to another client.")]
    AlreadyConnected,
    /// No client is connected.
    #[error("INVALID_STATE_ERR : Connection is closed.")]
    Closed,
    /// A frame could not be decoded as a request.
    #[error("malformed request: {0}")]
    Malformed(String),
}

/// A protocol shim in front of the fake backend
#[async_trait]
pub trait SandboxApi: Send {
    /// Attach a client; reopening with the same client is a no-op
    async fn open(&mut self, client: ClientConnection) -> Result<(), SandboxError>;

    /// Detach the client
    fn close(&mut self);

    /// Whether a client is attached
    fn is_connected(&self) -> bool;

    /// Handle one JSON request frame from the client
    async fn receive(&mut self, frame: &str) -> Result<(), SandboxError>;

    /// Push pending changes to the client; returns whether a message was sent
    async fn send_delta(&mut self) -> Result<bool, SandboxError>;
}

/// Periodically push deltas while the shim stays connected.
///
/// The task ends once the client disconnects or delivery fails.
pub fn spawn_delta_pump<A>(api: Arc<Mutex<A>>, interval: Duration) -> JoinHandle<()>
where
    A: SandboxApi + 'static,
{
    let period = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let mut api = api.lock().await;
            if !api.is_connected() {
                debug!("client disconnected, delta pump stopping");
                break;
            }
            if let Err(err) = api.send_delta().await {
                warn!(error = %err, "delta delivery failed");
                break;
            }
        }
    })
}
