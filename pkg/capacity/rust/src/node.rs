// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use serde::{Deserialize, Serialize};

/// One physical machine as reported by the admin inventory feed.
///
/// `location` and `gpu_count` are optional so that malformed records survive
/// deserialization and can be rejected by the tree builder with a precise error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub rack: Option<String>,
    #[serde(default, alias = "fabric", alias = "ib_network_id")]
    pub ib_fabric: Option<String>,
    #[serde(default = "unknown_gpu_type")]
    pub gpu_type: String,
    #[serde(default, alias = "gpus")]
    pub gpu_count: Option<u32>,
    #[serde(default = "unknown_gpu_type")]
    pub vendor: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub hot_spare: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default)]
    pub available_slices: u32,
    #[serde(default)]
    pub used_slices: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_id: Option<String>,
}

fn unknown_gpu_type() -> String {
    "Unknown".to_string()
}

impl PhysicalNode {
    /// Available and not held by a reservation.
    pub fn is_spare(&self) -> bool {
        self.available && !self.reserved
    }

    /// GPU count treating a missing value as zero. Only meaningful after the
    /// tree builder has validated the record.
    pub fn gpus(&self) -> u64 {
        u64::from(self.gpu_count.unwrap_or(0))
    }
}
