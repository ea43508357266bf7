// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Location hierarchy built from the flat node list.
//!
//! Location → Floor → Rack → IB fabric → node, each level keyed in first-seen
//! order and carrying a [`Rollup`] of everything beneath it. The tree is built
//! in two passes: nodes are grouped into ordered maps first, then rollups are
//! computed bottom-up from the finished groups. Nothing is updated in place,
//! so rebuilding from the same input always produces the same tree.

use crate::error::{CapacityError, Result};
use crate::node::PhysicalNode;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Bucket key for nodes without a floor, rack or fabric identifier.
pub const UNKNOWN_KEY: &str = "unknown";

/// Display name and region for known location codes.
const LOCATION_NAMES: &[(&str, &str, &str)] = &[
    ("icat-m", "Iceland", "eu-iceland1-a"),
    ("nvrm-bsl", "US West", "us-west1-a"),
    ("oh5c-dh", "US East 2", "us-east2-a"),
    ("txdr-iah", "Dallas", "us-southcentral1-a"),
    ("vaeq-cu", "Virginia", "us-east1-a"),
];

/// Returns `(display name, region)` for a location code; unknown codes map to themselves.
pub fn location_display(code: &str) -> (String, String) {
    LOCATION_NAMES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, name, region)| (name.to_string(), region.to_string()))
        .unwrap_or_else(|| (code.to_string(), code.to_string()))
}

/// Node and GPU counts aggregated over a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollup {
    pub total_nodes: u64,
    pub total_gpus: u64,
    pub available_nodes: u64,
    pub available_gpus: u64,
    pub spare_nodes: u64,
    pub spare_gpus: u64,
    pub hot_spare_nodes: u64,
    pub hot_spare_gpus: u64,
}

impl Rollup {
    pub fn of_nodes<'a>(nodes: impl IntoIterator<Item = &'a PhysicalNode>) -> Self {
        let mut rollup = Rollup::default();
        for node in nodes {
            let gpus = node.gpus();
            rollup.total_nodes += 1;
            rollup.total_gpus += gpus;
            if node.available {
                rollup.available_nodes += 1;
                rollup.available_gpus += gpus;
            }
            if node.is_spare() {
                rollup.spare_nodes += 1;
                rollup.spare_gpus += gpus;
            }
            if node.hot_spare {
                rollup.hot_spare_nodes += 1;
                rollup.hot_spare_gpus += gpus;
            }
        }
        rollup
    }

    pub fn sum<'a>(parts: impl IntoIterator<Item = &'a Rollup>) -> Self {
        let mut total = Rollup::default();
        for part in parts {
            total += *part;
        }
        total
    }
}

impl AddAssign for Rollup {
    fn add_assign(&mut self, rhs: Rollup) {
        self.total_nodes += rhs.total_nodes;
        self.total_gpus += rhs.total_gpus;
        self.available_nodes += rhs.available_nodes;
        self.available_gpus += rhs.available_gpus;
        self.spare_nodes += rhs.spare_nodes;
        self.spare_gpus += rhs.spare_gpus;
        self.hot_spare_nodes += rhs.hot_spare_nodes;
        self.hot_spare_gpus += rhs.hot_spare_gpus;
    }
}

/// GPU counts for one model or vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuCounts {
    pub total: u64,
    pub available: u64,
    pub spare: u64,
    pub hot_spare: u64,
}

impl GpuCounts {
    fn add_node(&mut self, node: &PhysicalNode) {
        let gpus = node.gpus();
        self.total += gpus;
        if node.available {
            self.available += gpus;
        }
        if node.is_spare() {
            self.spare += gpus;
        }
        if node.hot_spare {
            self.hot_spare += gpus;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    #[serde(flatten)]
    pub rollup: Rollup,
    #[serde(default)]
    pub gpu_models: IndexMap<String, GpuCounts>,
    #[serde(default)]
    pub vendors: IndexMap<String, GpuCounts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    #[serde(flatten)]
    pub stats: Rollup,
    pub floors: IndexMap<String, Floor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub name: String,
    #[serde(flatten)]
    pub stats: Rollup,
    pub racks: IndexMap<String, Rack>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rack {
    pub name: String,
    #[serde(flatten)]
    pub stats: Rollup,
    pub ib_fabrics: IndexMap<String, IbFabric>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbFabric {
    pub id: String,
    #[serde(flatten)]
    pub stats: Rollup,
    pub nodes: Vec<PhysicalNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub global_stats: GlobalStats,
    pub locations: IndexMap<String, Location>,
}

impl InventoryTree {
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    /// All leaf nodes in traversal order.
    pub fn nodes(&self) -> impl Iterator<Item = &PhysicalNode> {
        self.locations
            .values()
            .flat_map(|l| l.floors.values())
            .flat_map(|f| f.racks.values())
            .flat_map(|r| r.ib_fabrics.values())
            .flat_map(|fabric| fabric.nodes.iter())
    }
}

type FabricGroups<'a> = IndexMap<&'a str, Vec<&'a PhysicalNode>>;
type RackGroups<'a> = IndexMap<&'a str, FabricGroups<'a>>;
type FloorGroups<'a> = IndexMap<&'a str, RackGroups<'a>>;

/// Build the location hierarchy from a flat node list.
///
/// Fails on the first node without a location code or GPU count; no partial
/// tree is returned.
pub fn build_inventory_tree(nodes: &[PhysicalNode]) -> Result<InventoryTree> {
    let mut grouped: IndexMap<&str, FloorGroups<'_>> = IndexMap::new();

    for (index, node) in nodes.iter().enumerate() {
        let location = node
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| malformed(index, node, "location"))?;
        if node.gpu_count.is_none() {
            return Err(malformed(index, node, "gpu_count"));
        }

        grouped
            .entry(location)
            .or_default()
            .entry(bucket(node.floor.as_deref()))
            .or_default()
            .entry(bucket(node.rack.as_deref()))
            .or_default()
            .entry(bucket(node.ib_fabric.as_deref()))
            .or_default()
            .push(node);
    }

    let locations: IndexMap<String, Location> = grouped
        .into_iter()
        .map(|(code, floors)| (code.to_string(), build_location(code, floors)))
        .collect();

    let mut global_stats = GlobalStats {
        rollup: Rollup::sum(locations.values().map(|l| &l.stats)),
        ..Default::default()
    };

    let mut tree = InventoryTree {
        last_updated: None,
        global_stats: GlobalStats::default(),
        locations,
    };
    for node in tree.nodes() {
        global_stats
            .gpu_models
            .entry(node.gpu_type.clone())
            .or_default()
            .add_node(node);
        global_stats
            .vendors
            .entry(node.vendor.clone())
            .or_default()
            .add_node(node);
    }
    tree.global_stats = global_stats;

    tracing::debug!(
        locations = tree.locations.len(),
        total_nodes = tree.global_stats.rollup.total_nodes,
        total_gpus = tree.global_stats.rollup.total_gpus,
        available_gpus = tree.global_stats.rollup.available_gpus,
        "Built inventory tree"
    );

    Ok(tree)
}

fn build_location(code: &str, floors: FloorGroups<'_>) -> Location {
    let floors: IndexMap<String, Floor> = floors
        .into_iter()
        .map(|(name, racks)| (name.to_string(), build_floor(name, racks)))
        .collect();
    let (name, region) = location_display(code);
    Location {
        name,
        region,
        stats: Rollup::sum(floors.values().map(|f| &f.stats)),
        floors,
    }
}

fn build_floor(name: &str, racks: RackGroups<'_>) -> Floor {
    let racks: IndexMap<String, Rack> = racks
        .into_iter()
        .map(|(rack, fabrics)| (rack.to_string(), build_rack(rack, fabrics)))
        .collect();
    Floor {
        name: name.to_string(),
        stats: Rollup::sum(racks.values().map(|r| &r.stats)),
        racks,
    }
}

fn build_rack(name: &str, fabrics: FabricGroups<'_>) -> Rack {
    let ib_fabrics: IndexMap<String, IbFabric> = fabrics
        .into_iter()
        .map(|(id, nodes)| {
            let fabric = IbFabric {
                id: id.to_string(),
                stats: Rollup::of_nodes(nodes.iter().copied()),
                nodes: nodes.into_iter().cloned().collect(),
            };
            (id.to_string(), fabric)
        })
        .collect();
    Rack {
        name: name.to_string(),
        stats: Rollup::sum(ib_fabrics.values().map(|f| &f.stats)),
        ib_fabrics,
    }
}

fn bucket(key: Option<&str>) -> &str {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or(UNKNOWN_KEY)
}

fn malformed(index: usize, node: &PhysicalNode, field: &'static str) -> CapacityError {
    CapacityError::MalformedRecord {
        index,
        id: node.id.clone(),
        field,
    }
}
