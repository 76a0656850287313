// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Charm identifiers and charm record normalization

use crate::error::{BackendError, BackendResult};
use crate::types::{Charm, CharmData};
use std::fmt;

/// A parsed charm identifier: `[cs:|local:][~owner/][series/]name[-revision]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharmId {
    /// "cs" or "local"
    pub schema: String,
    /// Owner namespace, without the leading `~`
    pub owner: Option<String>,
    /// OS series
    pub series: String,
    /// Charm name
    pub name: String,
    /// Revision
    pub revision: Option<u32>,
}

impl CharmId {
    /// Parse a charm id, filling in `default_series` when none is given
    pub fn parse(raw: &str, default_series: &str) -> BackendResult<Self> {
        let invalid = || BackendError::InvalidCharmId(raw.to_string());
        let trimmed = raw.trim();

        let (schema, rest) = match trimmed.split_once(':') {
            Some((schema @ ("cs" | "local"), rest)) => (schema.to_string(), rest),
            Some(_) => return Err(invalid()),
            None => ("cs".to_string(), trimmed),
        };

        let mut parts: Vec<&str> = rest.split('/').collect();
        let owner = match parts.first() {
            Some(first) if first.starts_with('~') => {
                let owner = &first[1..];
                if owner.is_empty() {
                    return Err(invalid());
                }
                let owner = owner.to_string();
                parts.remove(0);
                Some(owner)
            }
            _ => None,
        };

        let (series, last) = match parts.as_slice() {
            [last] => (default_series.to_string(), *last),
            [series, last] if is_word(series) => ((*series).to_string(), *last),
            _ => return Err(invalid()),
        };

        let (name, revision) = split_revision(last);
        if !is_name(name) || series.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            schema,
            owner,
            series,
            name: name.to_string(),
            revision,
        })
    }

    /// Path used to look the charm up in a charm store: `[~owner/]series/name[-rev]`
    #[must_use]
    pub fn store_id(&self) -> String {
        let mut id = String::new();
        if let Some(owner) = &self.owner {
            id.push('~');
            id.push_str(owner);
            id.push('/');
        }
        id.push_str(&self.series);
        id.push('/');
        id.push_str(&self.name);
        if let Some(rev) = self.revision {
            id.push('-');
            id.push_str(&rev.to_string());
        }
        id
    }
}

impl fmt::Display for CharmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.schema, self.store_id())
    }
}

fn split_revision(raw: &str) -> (&str, Option<u32>) {
    if let Some((name, rev)) = raw.rsplit_once('-') {
        if !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(rev) = rev.parse() {
                return (name, Some(rev));
            }
        }
    }
    (raw, None)
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_name(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.ends_with('-')
}

impl Charm {
    /// Normalize a catalog record into a charm.
    ///
    /// The id comes from `store_url`, then `url`, then the requested id.
    #[must_use]
    pub fn from_data(data: CharmData, requested: &CharmId) -> Self {
        let id = data
            .store_url
            .or(data.url)
            .unwrap_or_else(|| requested.to_string());
        let package_name = data
            .package_name
            .or(data.name)
            .unwrap_or_else(|| requested.name.clone());
        Self {
            id,
            package_name,
            series: data.series.or_else(|| Some(requested.series.clone())),
            options: data.options,
            provides: data.provides,
            requires: data.requires,
            is_subordinate: data.is_subordinate,
        }
    }
}
