// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Admin inventory feed records and their normalization into [`PhysicalNode`]s.
//!
//! The admin CLI reports one record per hypervisor with a slice type string
//! (`SLICE_TYPE_VCPU_88_MEM_480_H100_SXM_80GB_4_IB`) and a structured host name
//! (`icat-m-m03a-r101-prod-hv-01`). Floor, rack and GPU model are derived from
//! those unless the record carries them explicitly.

use crate::node::PhysicalNode;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;

const STATE_AVAILABLE: &str = "Available";
const MODE_NORMAL: &str = "AGENT_MODE_NORMAL";

/// A GPU model resolved from a slice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuModel {
    pub name: &'static str,
    pub gpus_per_node: u32,
    pub vendor: &'static str,
}

struct CatalogEntry {
    patterns: &'static [&'static str],
    model: GpuModel,
}

const fn model(name: &'static str, gpus_per_node: u32, vendor: &'static str) -> GpuModel {
    GpuModel {
        name,
        gpus_per_node,
        vendor,
    }
}

/// Checked in order: GB200 must match before B200.
const GPU_CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        patterns: &["H200_SXM_141GB", "H200_141GB"],
        model: model("H200-SXM-141GB", 8, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["H100_SXM_80GB"],
        model: model("H100-SXM-80GB", 8, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["GB200_NVL_186GB", "GB200_186GB"],
        model: model("GB200-NVL-186GB", 4, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["B200_SXM_180GB", "B200_180GB"],
        model: model("B200-SXM-180GB", 8, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["L40S_PCIE_48GB", "L40S_48GB"],
        model: model("L40S-48GB", 8, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["A100_SXM_80GB", "A100_80GB_SXM"],
        model: model("A100-SXM-80GB", 8, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["A100_PCIE_80GB", "A100_80GB_PCIE"],
        model: model("A100-PCIe-80GB", 1, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["A100_PCIE_40GB", "A100_40GB_PCIE"],
        model: model("A100-PCIe-40GB", 1, "NVIDIA"),
    },
    CatalogEntry {
        patterns: &["MI300X_192GB"],
        model: model("MI300X-192GB", 8, "AMD"),
    },
    CatalogEntry {
        patterns: &["MI355X_288GB"],
        model: model("MI355X-288GB", 8, "AMD"),
    },
];

const GPU_FAMILIES: &[&str] = &[
    "H100", "H200", "GB200", "B200", "L40S", "A100", "A40", "A6000", "MI300X", "MI355X",
];

pub const CPU_ONLY: GpuModel = model("CPU-Only", 0, "CPU");

/// A GPU family outside the catalog. Contributes no GPUs to capacity.
pub const UNKNOWN_GPU: GpuModel = model("Unknown", 0, "Unknown");

/// Resolve the GPU model for a slice type string.
pub fn classify_slice_type(slice_type: &str) -> GpuModel {
    let upper = slice_type.to_ascii_uppercase();
    if !GPU_FAMILIES.iter().any(|family| upper.contains(family)) {
        return CPU_ONLY;
    }

    GPU_CATALOG
        .iter()
        .find(|e| e.patterns.iter().any(|p| upper.contains(p)))
        .map_or(UNKNOWN_GPU, |entry| entry.model)
}

/// Location components parsed from a hypervisor host name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeName {
    pub location: String,
    pub floor: String,
    pub rack: String,
    pub node_number: String,
}

static DASHED_LOCATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+)-([a-z0-9]+)-([a-z0-9]+)-(r\d+)-prod-hv-(\d+)$")
        .expect("valid host name pattern")
});

static PLAIN_LOCATION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]+)-([a-z0-9]+)-(r\d+)-prod-hv-(\d+)$").expect("valid host name pattern")
});

/// Parse `{location}-{floor}-{rack}-prod-hv-{n}`. Returns `None` for names
/// outside the convention.
pub fn parse_node_name(name: &str) -> Option<NodeName> {
    if let Some(c) = DASHED_LOCATION_NAME.captures(name) {
        return Some(NodeName {
            location: format!("{}-{}", &c[1], &c[2]),
            floor: c[3].to_string(),
            rack: c[4].to_string(),
            node_number: c[5].to_string(),
        });
    }
    PLAIN_LOCATION_NAME.captures(name).map(|c| NodeName {
        location: c[1].to_string(),
        floor: c[2].to_string(),
        rack: c[3].to_string(),
        node_number: c[4].to_string(),
    })
}

/// One record of the admin CLI `nodes list` output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminNodeRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub slice_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub ib_network_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub avail: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub used: Option<u32>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub reserved: Option<bool>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub pod_id: Option<String>,

    // Explicit values take precedence over anything derived above.
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub rack: Option<String>,
    #[serde(default, alias = "ib_fabric")]
    pub fabric: Option<String>,
    #[serde(default)]
    pub gpu_type: Option<String>,
    #[serde(default, alias = "gpu_count", deserialize_with = "lenient_u32")]
    pub gpus: Option<u32>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub available: Option<bool>,
}

impl AdminNodeRecord {
    pub fn into_physical(self) -> PhysicalNode {
        let parsed = self.name.as_deref().and_then(parse_node_name);
        let derived = self.slice_type.as_deref().map(classify_slice_type);

        let location = non_blank(self.location).or_else(|| parsed.as_ref().map(|p| p.location.clone()));
        let floor = non_blank(self.floor).or_else(|| parsed.as_ref().map(|p| p.floor.clone()));
        let rack = non_blank(self.rack).or_else(|| parsed.as_ref().map(|p| p.rack.clone()));
        let ib_fabric = non_blank(self.fabric).or(non_blank(self.ib_network_id));

        let available_slices = self.avail.unwrap_or(0);
        let available = self.available.unwrap_or_else(|| {
            self.state.as_deref() == Some(STATE_AVAILABLE)
                && self.mode.as_deref() == Some(MODE_NORMAL)
                && available_slices > 0
        });

        let note = self.note.unwrap_or_default();
        let note_lower = note.to_lowercase();
        let hot_spare = note_lower.contains("hot spare") || note_lower.contains("hot-spare");

        PhysicalNode {
            id: self.id,
            name: self.name,
            location,
            floor,
            rack,
            ib_fabric,
            gpu_type: non_blank(self.gpu_type)
                .or_else(|| derived.map(|m| m.name.to_string()))
                .unwrap_or_else(|| "Unknown".to_string()),
            gpu_count: self.gpus.or(derived.map(|m| m.gpus_per_node)),
            vendor: non_blank(self.vendor)
                .or_else(|| derived.map(|m| m.vendor.to_string()))
                .unwrap_or_else(|| "Unknown".to_string()),
            available,
            reserved: self.reserved.unwrap_or(false),
            hot_spare,
            state: self.state,
            mode: self.mode,
            available_slices,
            used_slices: self.used.unwrap_or(0),
            note,
            pod_id: non_blank(self.pod_id),
        }
    }
}

/// Parse the admin CLI output: a JSON array, or an object with a `nodes` array.
///
/// Record errors name the offending record's position in the feed.
pub fn parse_admin_feed(stdout: &str) -> Result<Vec<AdminNodeRecord>, serde_json::Error> {
    let records = match serde_json::from_str::<Value>(stdout)? {
        Value::Array(records) => records,
        Value::Object(mut feed) => match feed.remove("nodes") {
            Some(Value::Array(records)) => records,
            _ => return Err(serde_json::Error::custom("expected a `nodes` array")),
        },
        _ => {
            return Err(serde_json::Error::custom(
                "expected an array of node records or an object with `nodes`",
            ));
        }
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            AdminNodeRecord::deserialize(record)
                .map_err(|e| serde_json::Error::custom(format!("node record #{index}: {e}")))
        })
        .collect()
}

pub fn normalize_records(records: Vec<AdminNodeRecord>) -> Vec<PhysicalNode> {
    records.into_iter().map(AdminNodeRecord::into_physical).collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

/// Counts below zero read as zero; values past `u32::MAX` saturate.
fn clamp_count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(clamp_count(n))),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(|n| Some(clamp_count(n)))
            .map_err(|_| D::Error::custom(format!("expected an integer, got {s:?}"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagOrText {
    Flag(bool),
    Text(String),
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlagOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(FlagOrText::Flag(b)) => Ok(Some(b)),
        Some(FlagOrText::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "y" | "yes" | "true" => Ok(Some(true)),
            "n" | "no" | "false" => Ok(Some(false)),
            other => Err(D::Error::custom(format!("expected Y/N, got {other:?}"))),
        },
    }
}
