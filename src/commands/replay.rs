// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Replay command - feeds recorded client requests through a sandbox shim

use super::{build_backend, Output};
use crate::config::Config;
use crate::sandbox::{share, ClientConnection, GoJujuApi, PyJujuApi, SandboxApi};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Wire protocol spoken by the replayed client
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    /// Facade/request protocol with request ids
    Go,
    /// Op-based protocol echoing requests
    Python,
}

/// Run the replay command.
///
/// Each non-empty line of `requests` is one JSON request frame. Every
/// message the shim sends back is printed, followed by a final delta.
pub async fn run(config: &Config, requests: &Path, protocol: Protocol, output: Output) -> Result<()> {
    info!("Replaying {} ({:?})", requests.display(), protocol);

    let content = fs::read_to_string(requests)
        .with_context(|| format!("Failed to read requests {}", requests.display()))?;

    let backend = share(build_backend(config)?);
    let mut api: Box<dyn SandboxApi> = match protocol {
        Protocol::Go => Box::new(GoJujuApi::new(backend)),
        Protocol::Python => Box::new(PyJujuApi::new(backend)),
    };

    let (client, mut inbox) = ClientConnection::new();
    api.open(client).await?;
    let mut replies = drain(&mut inbox);

    for (line_no, frame) in content.lines().enumerate() {
        let frame = frame.trim();
        if frame.is_empty() || frame.starts_with('#') {
            continue;
        }
        debug!(line = line_no + 1, "replaying frame");
        api.receive(frame)
            .await
            .with_context(|| format!("Request on line {} was rejected", line_no + 1))?;
        replies.extend(drain(&mut inbox));
    }

    api.send_delta().await?;
    replies.extend(drain(&mut inbox));
    api.close();

    if output.is_json() {
        return output.print_json(&replies);
    }
    output.heading(&format!("{} messages", replies.len()));
    for reply in &replies {
        println!("{reply}");
    }
    Ok(())
}

fn drain(inbox: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(raw) = inbox.try_recv() {
        messages.push(serde_json::from_str(&raw).unwrap_or(Value::String(raw)));
    }
    messages
}
