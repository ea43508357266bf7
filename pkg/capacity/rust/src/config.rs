// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::source::ToolCommand;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CONFIG_PATH: &str = "/etc/gpu-capacity/config.yaml";
pub const CONFIG_PATH_ENV: &str = "GPU_CAPACITY_CONFIG";
pub const DEFAULT_PORT: u16 = 5001;

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_inventory_tool() -> ToolCommand {
    ToolCommand::new("~/go/bin/cloud-admin", &["nodes", "list", "--format", "json"])
}

fn default_metrics_tool() -> ToolCommand {
    ToolCommand::new("crusoe", &[])
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Admin CLI whose stdout is the node inventory feed.
    #[serde(default = "default_inventory_tool")]
    pub inventory_tool: ToolCommand,
    /// Cloud CLI queried for customer VM listings.
    #[serde(default = "default_metrics_tool")]
    pub metrics_tool: ToolCommand,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            port: default_port(),
            inventory_tool: default_inventory_tool(),
            metrics_tool: default_metrics_tool(),
        }
    }
}

/// Where to read the config from, and whether the file must exist.
///
/// A path given on the command line or through `GPU_CAPACITY_CONFIG` is
/// required; the built-in default location is optional.
pub fn config_path(flag: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = flag {
        return (path, true);
    }
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => (PathBuf::from(path), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    }
}

pub fn load_config(path: &Path, required: bool) -> Result<DashboardConfig> {
    if !required && !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(DashboardConfig::default());
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(DashboardConfig::default());
    }
    let config: DashboardConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
