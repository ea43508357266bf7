// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Ports for the two external collaborators and their CLI-backed adapters.

use crate::admin::{AdminNodeRecord, parse_admin_feed};
use crate::error::{CapacityError, Result};
use crate::metrics::{
    CustomerMetricsSnapshot, Instance, Project, VmType, aggregate_customer_metrics,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Admin inventory output: the verbatim stdout plus its parsed records.
#[derive(Debug, Clone, Default)]
pub struct RawInventory {
    pub stdout: String,
    pub records: Vec<AdminNodeRecord>,
}

#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch(&self) -> Result<RawInventory>;
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<CustomerMetricsSnapshot>;
}

/// An external program plus its fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        ToolCommand {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Short name used in logs and errors.
    pub fn name(&self) -> String {
        Path::new(&self.command)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.clone())
    }

    fn program(&self) -> PathBuf {
        match (self.command.strip_prefix("~/"), std::env::var_os("HOME")) {
            (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
            _ => PathBuf::from(&self.command),
        }
    }

    /// Run with `extra` appended to the fixed arguments and return stdout.
    pub async fn run(&self, extra: &[&str]) -> Result<String> {
        let tool = self.name();
        debug!(tool = %tool, args = ?self.args, extra = ?extra, "Running external tool");

        let output = Command::new(self.program())
            .args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CapacityError::tool(&tool, format!("failed to spawn: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            warn!(tool = %tool, exit_code = code, "External tool failed");
            return Err(CapacityError::tool(
                tool,
                format!("exit code {code}: {}", stderr.trim()),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| CapacityError::tool(tool, format!("stdout is not UTF-8: {e}")))
    }

    pub async fn run_json<T: DeserializeOwned>(&self, extra: &[&str]) -> Result<T> {
        let stdout = self.run(extra).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| CapacityError::tool(self.name(), format!("invalid JSON output: {e}")))
    }
}

/// Runs the admin CLI's node listing.
pub struct CommandInventorySource {
    tool: ToolCommand,
}

impl CommandInventorySource {
    pub fn new(tool: ToolCommand) -> Self {
        CommandInventorySource { tool }
    }
}

#[async_trait]
impl InventorySource for CommandInventorySource {
    async fn fetch(&self) -> Result<RawInventory> {
        let stdout = self.tool.run(&[]).await?;
        let records = parse_admin_feed(&stdout).map_err(|e| {
            CapacityError::tool(self.tool.name(), format!("invalid JSON output: {e}"))
        })?;
        info!(tool = %self.tool.name(), records = records.len(), "Fetched node inventory");
        Ok(RawInventory { stdout, records })
    }
}

/// Collects customer VM listings across every project through the cloud CLI.
pub struct CliMetricsSource {
    tool: ToolCommand,
}

impl CliMetricsSource {
    pub fn new(tool: ToolCommand) -> Self {
        CliMetricsSource { tool }
    }
}

#[async_trait]
impl MetricsSource for CliMetricsSource {
    async fn fetch(&self) -> Result<CustomerMetricsSnapshot> {
        let vm_types: Vec<VmType> = self
            .tool
            .run_json(&["compute", "vms", "types", "--json"])
            .await?;
        let projects: Vec<Project> = self.tool.run_json(&["projects", "list", "--json"]).await?;

        let mut instances = Vec::new();
        for project in &projects {
            let listed: Vec<Instance> = self
                .tool
                .run_json(&["compute", "vms", "list", "--project-id", &project.id, "--json"])
                .await?;
            debug!(project = %project.name, instances = listed.len(), "Listed project instances");
            instances.extend(listed);
        }

        let snapshot = aggregate_customer_metrics(&vm_types, &instances);
        info!(
            projects = projects.len(),
            nodes = snapshot.global_summary.total_nodes,
            gpus = snapshot.global_summary.total_gpus,
            "Aggregated customer metrics"
        );
        Ok(snapshot)
    }
}
