// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Command implementations

pub mod completions;
pub mod config;
pub mod import;
pub mod replay;

use crate::backend::FakeBackend;
use crate::charmstore::{CharmStore, HttpCharmStore, StaticCharmStore};
use crate::config::Config;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Build a logged-out backend with the charm store the configuration names
pub fn build_backend(config: &Config) -> Result<FakeBackend> {
    let store: Arc<dyn CharmStore> = if let Some(url) = &config.charmstore_url {
        info!("Using charm store at {}", url);
        Arc::new(HttpCharmStore::new(url))
    } else if let Some(path) = &config.charm_catalog {
        let catalog = StaticCharmStore::from_path(path)
            .with_context(|| format!("Failed to load charm catalog {}", path.display()))?;
        info!("Loaded {} charms from {}", catalog.len(), path.display());
        Arc::new(catalog)
    } else {
        Arc::new(StaticCharmStore::new())
    };
    Ok(FakeBackend::new(config, store))
}

/// Log in as the first configured user
pub fn authenticate(backend: &mut FakeBackend, config: &Config) -> Result<()> {
    let user = config
        .users
        .first()
        .context("No users configured")?;
    anyhow::ensure!(
        backend.login(&user.user, &user.password),
        "Login failed for {}",
        user.user
    );
    Ok(())
}

/// Terminal output settings shared by the commands
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
    color: bool,
}

impl Output {
    /// Create output settings from the global flags
    #[must_use]
    pub fn new(json: bool, no_color: bool) -> Self {
        Self {
            json,
            color: !no_color,
        }
    }

    /// Whether machine readable output was requested
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print a value as pretty JSON
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a section heading
    pub fn heading(&self, text: &str) {
        if self.color {
            println!("{}", text.bold());
        } else {
            println!("{text}");
        }
    }

    /// Print a success line
    pub fn success(&self, text: &str) {
        if self.color {
            println!("{} {}", "✓".green(), text);
        } else {
            println!("ok: {text}");
        }
    }

    /// Print a failure line
    pub fn failure(&self, text: &str) {
        if self.color {
            eprintln!("{} {}", "✗".red(), text);
        } else {
            eprintln!("error: {text}");
        }
    }
}
