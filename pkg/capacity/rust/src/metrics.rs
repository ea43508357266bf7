// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Customer deployment metrics aggregated from the cloud CLI's VM listings.
//!
//! This dataset is independent of the physical inventory: it counts what
//! customers are running, not what hardware exists.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Estimated monthly price per GPU, in USD.
const GPU_MONTHLY_PRICE: &[(&str, u64)] = &[
    ("A100-PCIe-40GB", 1000),
    ("A100-PCIe-80GB", 1200),
    ("A100-SXM-80GB", 1500),
    ("L40S-48GB", 800),
    ("H100-80GB", 2500),
    ("H200-141GB", 3000),
    ("MI300X", 2500),
];
const DEFAULT_GPU_MONTHLY_PRICE: u64 = 1000;
const REGION_GPU_MONTHLY_PRICE: u64 = 1500;

const AMD_MODELS: &[&str] = &["MI300X", "MI355X"];

const REGION_NAMES: &[(&str, &str)] = &[
    ("us-southcentral1-a", "dallas"),
    ("us-east1-a", "virginia"),
    ("eu-iceland1-a", "iceland"),
    ("us-west1-a", "us-west"),
];

const RUNNING_STATE: &str = "STATE_RUNNING";

/// One entry of `compute vms types`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmType {
    pub product_name: String,
    pub gpu_type: Option<String>,
    pub num_gpu: u32,
}

/// One entry of `compute vms list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Instance {
    #[serde(rename = "type", deserialize_with = "empty_if_null")]
    pub vm_type: String,
    #[serde(deserialize_with = "unknown_if_null")]
    pub location: String,
    #[serde(deserialize_with = "unknown_if_null")]
    pub state: String,
}

const UNKNOWN: &str = "unknown";

fn empty_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn unknown_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(|| UNKNOWN.to_string()))
}

impl Default for Instance {
    fn default() -> Self {
        Instance {
            vm_type: String::new(),
            location: UNKNOWN.to_string(),
            state: UNKNOWN.to_string(),
        }
    }
}

/// One entry of `projects list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub total_nodes: u64,
    pub total_gpus: u64,
    pub monthly_revenue: u64,
    pub available_nodes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorShare {
    pub gpus: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorSplit {
    pub nvidia: VendorShare,
    pub amd: VendorShare,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    /// Region code the friendly key was derived from.
    pub name: String,
    pub nodes: u64,
    pub gpus: u64,
    pub monthly_revenue: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelShare {
    pub gpus: u64,
    pub percentage: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCount {
    pub nodes: u64,
    pub gpus: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetricsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub global_summary: GlobalSummary,
    pub vendors: VendorSplit,
    pub regions: IndexMap<String, RegionMetrics>,
    pub gpu_models: IndexMap<String, ModelShare>,
    pub states: IndexMap<String, u64>,
    pub raw_location_data: IndexMap<String, DeploymentCount>,
}

impl CustomerMetricsSnapshot {
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }
}

fn monthly_price(model: &str) -> u64 {
    GPU_MONTHLY_PRICE
        .iter()
        .find(|(name, _)| *name == model)
        .map_or(DEFAULT_GPU_MONTHLY_PRICE, |(_, price)| *price)
}

fn region_key(code: &str) -> String {
    REGION_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(code, |(_, friendly)| *friendly)
        .to_string()
}

fn is_amd(model: &str) -> bool {
    AMD_MODELS.iter().any(|m| model.contains(m))
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Aggregate per-instance listings into a metrics snapshot.
///
/// Only instances whose type resolves to a GPU VM type are counted.
pub fn aggregate_customer_metrics(
    vm_types: &[VmType],
    instances: &[Instance],
) -> CustomerMetricsSnapshot {
    let mut gpu_counts: IndexMap<String, u64> = IndexMap::new();
    let mut locations: IndexMap<String, DeploymentCount> = IndexMap::new();
    let mut states: IndexMap<String, u64> = IndexMap::new();
    let mut total_nodes = 0u64;
    let mut total_gpus = 0u64;

    for instance in instances {
        let Some(vm_type) = vm_types
            .iter()
            .find(|t| t.product_name == instance.vm_type)
        else {
            continue;
        };
        let Some(model) = vm_type.gpu_type.as_deref().filter(|m| !m.is_empty()) else {
            continue;
        };
        if vm_type.num_gpu == 0 {
            continue;
        }
        let gpus = u64::from(vm_type.num_gpu);

        *gpu_counts.entry(model.to_string()).or_default() += gpus;
        let location = locations.entry(instance.location.clone()).or_default();
        location.nodes += 1;
        location.gpus += gpus;
        *states.entry(instance.state.clone()).or_default() += 1;
        total_nodes += 1;
        total_gpus += gpus;
    }

    let amd_gpus: u64 = gpu_counts
        .iter()
        .filter(|(model, _)| is_amd(model))
        .map(|(_, gpus)| gpus)
        .sum();
    let nvidia_gpus = total_gpus - amd_gpus;
    let monthly_revenue: u64 = gpu_counts
        .iter()
        .map(|(model, gpus)| gpus * monthly_price(model))
        .sum();

    let regions = locations
        .iter()
        .map(|(code, count)| {
            let region = RegionMetrics {
                name: code.clone(),
                nodes: count.nodes,
                gpus: count.gpus,
                monthly_revenue: count.gpus * REGION_GPU_MONTHLY_PRICE,
            };
            (region_key(code), region)
        })
        .collect();

    let gpu_models = gpu_counts
        .iter()
        .map(|(model, gpus)| {
            let share = ModelShare {
                gpus: *gpus,
                percentage: percentage(*gpus, total_gpus).round() as u64,
            };
            (model.clone(), share)
        })
        .collect();

    let vendor = |gpus: u64| VendorShare {
        gpus,
        percentage: (percentage(gpus, total_gpus) * 10.0).round() / 10.0,
    };

    CustomerMetricsSnapshot {
        last_updated: None,
        global_summary: GlobalSummary {
            total_nodes,
            total_gpus,
            monthly_revenue,
            available_nodes: states.get(RUNNING_STATE).copied().unwrap_or(0),
        },
        vendors: VendorSplit {
            nvidia: vendor(nvidia_gpus),
            amd: vendor(amd_gpus),
        },
        regions,
        gpu_models,
        states,
        raw_location_data: locations,
    }
}
