// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file of the `flint` tool.
//!
//! All fields are optional. Command-line flags take precedence.
//!
//! ```toml
//! latency_file = "latency.txt"
//! objective = "worst"
//! replicas = ["us-east-1", "eu-west-1", "ap-northeast-1"]
//! clients = ["us-west-2", "eu-central-1"]
//!
//! [search]
//! replicas = 3
//! clients = 5
//! required_family = "us"
//! first = "swift-paxos"
//! second = "curp"
//! first_fast = true
//! second_fast = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Region;
use crate::distance::{DistanceTable, RegionFamily};
use crate::protocol::{Objective, ProtocolKind};

/// Errors that can occur while loading or validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown region {0:?}")]
    UnknownRegion(String),
}

/// Contents of a `flint.toml` file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Latency table to load instead of fetching it from cloudping.
    pub latency_file: Option<PathBuf>,
    pub objective: Objective,
    /// Replica regions, by full name or identifier.
    pub replicas: Vec<Region>,
    /// Client regions, by full name or identifier.
    pub clients: Vec<Region>,
    pub search: SearchConfig,
}

/// Parameters of a configuration search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub replicas: usize,
    /// Total number of clients, including the co-located ones.
    pub clients: usize,
    /// At least one replica must belong to this family.
    pub required_family: Option<RegionFamily>,
    /// Candidate regions. Empty means all regions of the table.
    pub pool: Vec<Region>,
    /// Protocol that should win.
    pub first: ProtocolKind,
    /// Protocol to beat.
    pub second: ProtocolKind,
    /// Measure the first protocol's fast-path instead of slow-path latency.
    pub first_fast: bool,
    /// Measure the second protocol's fast-path instead of slow-path latency.
    pub second_fast: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            replicas: 3,
            clients: 5,
            required_family: None,
            pool: Vec::new(),
            first: ProtocolKind::SwiftPaxos,
            second: ProtocolKind::Curp,
            first_fast: true,
            second_fast: true,
        }
    }
}

impl Config {
    /// Reads and parses a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses a TOML config.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Replaces all region names by their full names in `table`.
    ///
    /// # Errors
    ///
    /// Fails on the first name that `table` does not know.
    pub fn resolve_regions(&mut self, table: &DistanceTable) -> Result<(), ConfigError> {
        resolve_all(table, &mut self.replicas)?;
        resolve_all(table, &mut self.clients)?;
        resolve_all(table, &mut self.search.pool)
    }
}

/// Replaces every name in `names` by the full region name it refers to.
///
/// # Errors
///
/// Fails on the first name that `table` does not know.
pub fn resolve_all(table: &DistanceTable, names: &mut [Region]) -> Result<(), ConfigError> {
    for name in names {
        let region = table
            .resolve(name)
            .ok_or_else(|| ConfigError::UnknownRegion(name.clone()))?;
        *name = region.clone();
    }
    Ok(())
}
