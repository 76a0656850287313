// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Client side of a sandbox connection

use super::SandboxError;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// A client attached to a sandbox shim.
///
/// Messages for the client are serialized to JSON and pushed onto an
/// unbounded channel; the returned receiver plays the part of the
/// websocket's message handler.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    id: u64,
    sender: mpsc::UnboundedSender<String>,
}

impl ClientConnection {
    /// Create a client and the receiver its messages arrive on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, sender }, receiver)
    }

    /// Unique client id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver a message to the client
    pub fn receive(&self, message: &Value) -> Result<(), SandboxError> {
        self.sender
            .send(message.to_string())
            .map_err(|_| SandboxError::Closed)
    }
}

impl PartialEq for ClientConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientConnection {}

/// Single-client connection state held by a shim
#[derive(Debug, Default)]
pub struct Connection {
    client: Option<ClientConnection>,
}

impl Connection {
    /// Attach a client.
    ///
    /// Returns `true` when the connection was newly opened and `false` when
    /// the same client was already attached.
    pub fn open(&mut self, client: ClientConnection) -> Result<bool, SandboxError> {
        match &self.client {
            None => {
                self.client = Some(client);
                Ok(true)
            }
            Some(current) if *current == client => Ok(false),
            Some(_) => Err(SandboxError::AlreadyConnected),
        }
    }

    /// Detach the client; idempotent
    pub fn close(&mut self) {
        self.client = None;
    }

    /// Whether a client is attached
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// The attached client
    pub fn client(&self) -> Result<&ClientConnection, SandboxError> {
        self.client.as_ref().ok_or(SandboxError::Closed)
    }
}
