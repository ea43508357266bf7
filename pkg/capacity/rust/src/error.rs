// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The persisted JSON documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Document {
    /// Verbatim output of the admin inventory tool.
    RawInventory,
    /// Derived location hierarchy.
    Inventory,
    /// Customer metrics snapshot.
    Metrics,
}

impl Document {
    pub fn file_name(self) -> &'static str {
        match self {
            Document::RawInventory => "admin_nodes_inventory.json",
            Document::Inventory => "datacenter_inventory.json",
            Document::Metrics => "metrics.json",
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::RawInventory => write!(f, "raw inventory"),
            Document::Inventory => write!(f, "inventory"),
            Document::Metrics => write!(f, "metrics"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CapacityError {
    /// A node record lacks a required field; the whole build is rejected.
    #[error("malformed node record #{index} (id {id:?}): missing {field}")]
    MalformedRecord {
        index: usize,
        id: String,
        field: &'static str,
    },

    /// An external CLI exited non-zero, could not be spawned, or printed
    /// something other than the expected JSON.
    #[error("{tool} failed: {reason}")]
    ExternalToolFailure { tool: String, reason: String },

    #[error("refresh already in progress")]
    AlreadyInProgress,

    #[error("no async runtime available to run the refresh")]
    NoRuntime,

    #[error("{0} data not found")]
    NotFound(Document),

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding {document} document: {source}")]
    Encode {
        document: Document,
        #[source]
        source: serde_json::Error,
    },
}

impl CapacityError {
    pub(crate) fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        CapacityError::ExternalToolFailure {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CapacityError>;
