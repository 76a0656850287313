// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "JUJU_SANDBOX";

/// A user allowed to log in to the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Users allowed to log in; the first one is used for token logins
    pub users: Vec<Credentials>,
    /// Token accepted by token login
    pub token: String,
    /// Series used for charm ids that do not name one
    pub default_series: String,
    /// Provider type reported to clients
    pub provider_type: String,
    /// MAAS server address reported in the model config
    pub maas_server: Option<String>,
    /// Interval between delta pushes, in milliseconds
    pub delta_interval_ms: u64,
    /// Artificial delay before charm details are returned, in milliseconds
    pub charm_load_delay_ms: u64,
    /// Base URL of an HTTP charm store
    pub charmstore_url: Option<String>,
    /// JSON charm catalog file served by the static charm store
    pub charm_catalog: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            users: vec![Credentials {
                user: "admin".to_string(),
                password: "password".to_string(),
            }],
            token: "demoToken".to_string(),
            default_series: "precise".to_string(),
            provider_type: "demonstration".to_string(),
            maas_server: None,
            delta_interval_ms: 1000,
            charm_load_delay_ms: 0,
            charmstore_url: None,
            charm_catalog: None,
        }
    }
}

/// Default location of the configuration file
#[must_use]
pub fn default_path() -> PathBuf {
    directories::ProjectDirs::from("com", "hyperpolymath", "juju-sandbox")
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("~/.config/juju-sandbox/config.toml"))
}

/// Load configuration: defaults, then the config file, then environment.
///
/// An explicitly given file must exist; the default location is optional.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let defaults = config::Config::try_from(&Config::default())
        .context("Failed to serialize default configuration")?;

    let file = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::from(default_path()).required(false),
    };

    let settings = config::Config::builder()
        .add_source(defaults)
        .add_source(file)
        .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .context("Failed to load configuration")?;

    let config: Config = settings
        .try_deserialize()
        .context("Invalid configuration")?;
    tracing::debug!(series = %config.default_series, "configuration loaded");
    Ok(config)
}
