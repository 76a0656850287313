// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Import command - deploys a bundle into a fresh sandbox environment

use super::{authenticate, build_backend, Output};
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::info;

/// Run the import command
pub async fn run(config: &Config, bundle: &Path, name: Option<&str>, output: Output) -> Result<()> {
    info!("Importing {}", bundle.display());

    let document = fs::read_to_string(bundle)
        .with_context(|| format!("Failed to read bundle {}", bundle.display()))?;

    let mut backend = build_backend(config)?;
    authenticate(&mut backend, config)?;

    let outcome = backend.import_deployer(&document, name).await;
    let status = backend.status_deployer()?;

    if output.is_json() {
        let export = backend.export_environment()?;
        output.print_json(&json!({
            "deployment": status.last(),
            "error": outcome.as_ref().err().map(ToString::to_string),
            "environment": export["envExport"],
        }))?;
        return outcome
            .map(|_| ())
            .with_context(|| format!("Import of {} failed", bundle.display()));
    }

    let deployment_id = match outcome {
        Ok(id) => id,
        Err(err) => {
            output.failure(&err.to_string());
            anyhow::bail!("Import of {} failed", bundle.display());
        }
    };

    let db = backend.database();
    output.success(&format!(
        "Deployment {} completed: {} services, {} machines, {} relations",
        deployment_id,
        db.services.len(),
        db.machines.len(),
        db.relations.len()
    ));
    println!();

    output.heading("Services:");
    for service in &db.services {
        let units: Vec<&str> = service.units.iter().map(|u| u.id.as_str()).collect();
        let exposed = if service.exposed { " (exposed)" } else { "" };
        println!("  {}{} [{}]", service.name, exposed, service.charm);
        if !units.is_empty() {
            println!("    units: {}", units.join(", "));
        }
    }

    if !db.relations.is_empty() {
        println!();
        output.heading("Relations:");
        for relation in &db.relations {
            let ends: Vec<String> = relation
                .endpoints
                .iter()
                .map(|ep| format!("{}:{}", ep.0, ep.1.name))
                .collect();
            println!("  {} ({}, {})", ends.join(" <-> "), relation.interface, relation.scope.as_str());
        }
    }

    Ok(())
}
