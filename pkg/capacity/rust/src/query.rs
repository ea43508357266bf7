// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Filtered search over an [`InventoryTree`] and summaries of the results.

use crate::inventory::InventoryTree;
use crate::node::PhysicalNode;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Constraints for [`find_available_capacity`]. Omitted fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CapacityFilter {
    #[serde(alias = "gpuType", deserialize_with = "blank_as_none")]
    pub gpu_type: Option<String>,
    /// Location code or display name.
    #[serde(deserialize_with = "blank_as_none")]
    pub location: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub floor: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub rack: Option<String>,
    #[serde(alias = "ibFabric", deserialize_with = "blank_as_none")]
    pub ib_fabric: Option<String>,
    #[serde(alias = "minGpus", deserialize_with = "blank_as_none")]
    pub min_gpus: Option<i64>,
    #[serde(alias = "includeUnavailable", deserialize_with = "blank_as_false")]
    pub include_unavailable: bool,
}

/// A matching node together with where it sits in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedNode {
    pub location: String,
    pub location_name: String,
    pub floor: String,
    pub rack: String,
    pub ib_fabric: String,
    pub node: PhysicalNode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapacityCount {
    pub nodes: u64,
    pub gpus: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FabricCapacity {
    pub nodes: u64,
    pub gpus: u64,
    pub location: String,
    pub floor: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapacitySummary {
    pub total_nodes: u64,
    pub total_gpus: u64,
    pub by_location: IndexMap<String, CapacityCount>,
    pub by_ib_fabric: IndexMap<String, FabricCapacity>,
    pub by_gpu_type: IndexMap<String, CapacityCount>,
}

/// Response body of a capacity query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapacityReport {
    pub nodes: Vec<PlacedNode>,
    pub summary: CapacitySummary,
}

impl CapacityReport {
    pub fn build(tree: &InventoryTree, filter: &CapacityFilter) -> Self {
        let nodes = find_available_capacity(tree, filter);
        let summary = summarize_capacity(&nodes);
        CapacityReport { nodes, summary }
    }
}

fn matches_ci(wanted: Option<&str>, candidates: &[&str]) -> bool {
    match wanted {
        None => true,
        Some(wanted) => candidates.iter().any(|c| c.eq_ignore_ascii_case(wanted)),
    }
}

/// Walk the tree in location → floor → rack → fabric → node order and return
/// every node that satisfies all of the filter's constraints.
pub fn find_available_capacity(tree: &InventoryTree, filter: &CapacityFilter) -> Vec<PlacedNode> {
    let min_gpus = filter.min_gpus.filter(|m| *m > 0);
    let mut found = Vec::new();

    for (code, location) in &tree.locations {
        if !matches_ci(filter.location.as_deref(), &[code.as_str(), location.name.as_str()]) {
            continue;
        }
        for (floor_key, floor) in &location.floors {
            if !matches_ci(filter.floor.as_deref(), &[floor_key.as_str()]) {
                continue;
            }
            for (rack_key, rack) in &floor.racks {
                if !matches_ci(filter.rack.as_deref(), &[rack_key.as_str()]) {
                    continue;
                }
                for (fabric_key, fabric) in &rack.ib_fabrics {
                    if filter.ib_fabric.as_deref().is_some_and(|f| f != fabric_key.as_str()) {
                        continue;
                    }
                    for node in &fabric.nodes {
                        if !filter.include_unavailable && !node.available {
                            continue;
                        }
                        if !matches_ci(filter.gpu_type.as_deref(), &[node.gpu_type.as_str()]) {
                            continue;
                        }
                        if min_gpus.is_some_and(|m| i64::from(node.gpu_count.unwrap_or(0)) < m) {
                            continue;
                        }
                        found.push(PlacedNode {
                            location: code.clone(),
                            location_name: location.name.clone(),
                            floor: floor_key.clone(),
                            rack: rack_key.clone(),
                            ib_fabric: fabric_key.clone(),
                            node: node.clone(),
                        });
                    }
                }
            }
        }
    }

    found
}

pub fn summarize_capacity(nodes: &[PlacedNode]) -> CapacitySummary {
    let mut summary = CapacitySummary::default();
    for placed in nodes {
        let gpus = placed.node.gpus();
        summary.total_nodes += 1;
        summary.total_gpus += gpus;

        let by_location = summary
            .by_location
            .entry(placed.location_name.clone())
            .or_default();
        by_location.nodes += 1;
        by_location.gpus += gpus;

        let by_type = summary
            .by_gpu_type
            .entry(placed.node.gpu_type.clone())
            .or_default();
        by_type.nodes += 1;
        by_type.gpus += gpus;

        let fabric = summary
            .by_ib_fabric
            .entry(placed.ib_fabric.clone())
            .or_default();
        fabric.nodes += 1;
        fabric.gpus += gpus;
        fabric.location.clone_from(&placed.location_name);
        fabric.floor.clone_from(&placed.floor);
    }
    summary
}

/// Treats missing and blank query parameters alike.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(D::Error::custom),
    }
}

fn blank_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagOrText {
        Flag(bool),
        Text(String),
    }

    match Option::<FlagOrText>::deserialize(deserializer)? {
        None => Ok(false),
        Some(FlagOrText::Flag(flag)) => Ok(flag),
        Some(FlagOrText::Text(text)) => match text.trim() {
            "" => Ok(false),
            value => value.parse().map_err(D::Error::custom),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::build_inventory_tree;
    use crate::inventory::tests::fleet;

    fn ids(nodes: &[PlacedNode]) -> Vec<&str> {
        nodes.iter().map(|p| p.node.id.as_str()).collect()
    }

    fn fleet_tree() -> InventoryTree {
        build_inventory_tree(&fleet()).unwrap()
    }

    #[test]
    fn test_no_filters_returns_available_nodes_in_tree_order() {
        let tree = fleet_tree();
        let found = find_available_capacity(&tree, &CapacityFilter::default());
        assert_eq!(ids(&found), vec!["i1", "i3", "i5", "d1", "v1"]);
        let expected: Vec<&str> = tree
            .nodes()
            .filter(|n| n.available)
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids(&found), expected);
    }

    #[test]
    fn test_summary_total_matches_global_available() {
        let tree = fleet_tree();
        let found = find_available_capacity(&tree, &CapacityFilter::default());
        let summary = summarize_capacity(&found);
        assert_eq!(summary.total_gpus, tree.global_stats.rollup.available_gpus);
        assert_eq!(summary.total_nodes, tree.global_stats.rollup.available_nodes);
    }

    #[test]
    fn test_filters_combine() {
        let tree = fleet_tree();
        let filter = CapacityFilter {
            gpu_type: Some("h100-sxm-80gb".into()),
            location: Some("iceland".into()),
            min_gpus: Some(8),
            ..Default::default()
        };
        assert_eq!(ids(&find_available_capacity(&tree, &filter)), vec!["i1", "i3"]);

        let filter = CapacityFilter {
            location: Some("ICAT-M".into()),
            floor: Some("M03A".into()),
            rack: Some("r102".into()),
            ..Default::default()
        };
        assert_eq!(ids(&find_available_capacity(&tree, &filter)), vec!["i3"]);
    }

    #[test]
    fn test_fabric_match_is_exact() {
        let tree = fleet_tree();
        let exact = CapacityFilter {
            ib_fabric: Some("ib-a".into()),
            ..Default::default()
        };
        assert_eq!(ids(&find_available_capacity(&tree, &exact)), vec!["i1", "i3"]);
        let upper = CapacityFilter {
            ib_fabric: Some("IB-A".into()),
            ..Default::default()
        };
        assert!(find_available_capacity(&tree, &upper).is_empty());
    }

    #[test]
    fn test_include_unavailable() {
        let tree = fleet_tree();
        let filter = CapacityFilter {
            include_unavailable: true,
            ..Default::default()
        };
        assert_eq!(find_available_capacity(&tree, &filter).len(), 7);
    }

    #[test]
    fn test_non_positive_min_gpus_is_ignored() {
        let tree = fleet_tree();
        for min in [0, -4] {
            let filter = CapacityFilter {
                min_gpus: Some(min),
                ..Default::default()
            };
            assert_eq!(find_available_capacity(&tree, &filter).len(), 5);
        }
        let filter = CapacityFilter {
            min_gpus: Some(5),
            ..Default::default()
        };
        assert!(!ids(&find_available_capacity(&tree, &filter)).contains(&"i5"));
    }

    #[test]
    fn test_no_match_is_empty() {
        let tree = fleet_tree();
        let filter = CapacityFilter {
            gpu_type: Some("B200-SXM-180GB".into()),
            ..Default::default()
        };
        let found = find_available_capacity(&tree, &filter);
        assert!(found.is_empty());
        assert_eq!(summarize_capacity(&found), CapacitySummary::default());
    }

    #[test]
    fn test_every_filter_set_without_match_is_empty() {
        let tree = fleet_tree();
        let filter = CapacityFilter {
            gpu_type: Some("B200-SXM-180GB".into()),
            location: Some("Atlantis".into()),
            floor: Some("z99".into()),
            rack: Some("r999".into()),
            ib_fabric: Some("ib-none".into()),
            min_gpus: Some(64),
            include_unavailable: true,
        };
        let report = CapacityReport::build(&tree, &filter);
        assert!(report.nodes.is_empty());
        assert_eq!(report.summary, CapacitySummary::default());
    }

    #[test]
    fn test_summary_breakdowns() {
        let tree = fleet_tree();
        let report = CapacityReport::build(&tree, &CapacityFilter::default());
        let summary = &report.summary;

        let locations: Vec<&str> = summary.by_location.keys().map(String::as_str).collect();
        assert_eq!(locations, vec!["Iceland", "Dallas", "Virginia"]);
        assert_eq!(summary.by_location["Iceland"], CapacityCount { nodes: 3, gpus: 20 });

        let fabric = &summary.by_ib_fabric["ib-a"];
        assert_eq!((fabric.nodes, fabric.gpus), (2, 16));
        assert_eq!(fabric.location, "Iceland");
        assert_eq!(fabric.floor, "m03a");

        assert_eq!(summary.by_gpu_type["L40S-48GB"], CapacityCount { nodes: 1, gpus: 8 });
    }

    #[test]
    fn test_placed_node_carries_context() {
        let tree = fleet_tree();
        let found = find_available_capacity(&tree, &CapacityFilter::default());
        let d1 = found.iter().find(|p| p.node.id == "d1").unwrap();
        assert_eq!(d1.location, "txdr-iah");
        assert_eq!(d1.location_name, "Dallas");
        assert_eq!(d1.floor, "iah02a");
        assert_eq!(d1.rack, "r001");
        assert_eq!(d1.ib_fabric, "ib-d");
    }

    #[test]
    fn test_filter_from_query_string() {
        let filter: CapacityFilter = serde_json::from_value(serde_json::json!({
            "gpuType": "H100-SXM-80GB",
            "location": "",
            "min_gpus": "8",
            "include_unavailable": true,
        }))
        .unwrap();
        assert_eq!(filter.gpu_type.as_deref(), Some("H100-SXM-80GB"));
        assert!(filter.location.is_none());
        assert_eq!(filter.min_gpus, Some(8));
        assert!(filter.include_unavailable);
    }

    #[test]
    fn test_blank_include_unavailable_reads_as_false() {
        let filter: CapacityFilter =
            serde_json::from_value(serde_json::json!({ "include_unavailable": "" })).unwrap();
        assert!(!filter.include_unavailable);
        let filter: CapacityFilter =
            serde_json::from_value(serde_json::json!({ "include_unavailable": "true" })).unwrap();
        assert!(filter.include_unavailable);
        assert!(
            serde_json::from_value::<CapacityFilter>(serde_json::json!({ "include_unavailable": "maybe" }))
                .is_err()
        );
    }
}
