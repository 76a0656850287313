// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Config command - shows the effective configuration

use super::Output;
use crate::config::{default_path, Config};
use anyhow::{Context, Result};

/// Print the effective configuration, or only the default file location
pub fn run(config: &Config, path_only: bool, output: Output) -> Result<()> {
    if path_only {
        println!("{}", default_path().display());
        return Ok(());
    }
    if output.is_json() {
        return output.print_json(config);
    }
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
