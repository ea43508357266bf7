// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use clap::Parser;
use gpu_capacity::config::{config_path, load_config};
use gpu_capacity::query::{CapacitySummary, PlacedNode};
use gpu_capacity::{CapacityFilter, CapacityReport, SnapshotStore};
use std::path::PathBuf;

const TOP_FABRICS: usize = 10;
const FABRIC_ID_WIDTH: usize = 16;

/// Query available GPU capacity from the last persisted inventory
#[derive(Parser, Debug)]
#[command(name = "gpu-capacity-query", version)]
struct Args {
    /// YAML config file used to locate the data directory
    #[arg(short, long, env = "GPU_CAPACITY_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory, overriding the config file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// GPU model, e.g. H100-SXM-80GB
    #[arg(long)]
    gpu_type: Option<String>,

    /// Location code or display name, e.g. icat-m or Iceland
    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    floor: Option<String>,

    #[arg(long)]
    rack: Option<String>,

    /// Exact IB fabric id
    #[arg(long)]
    ib_fabric: Option<String>,

    /// Minimum GPUs per node
    #[arg(long)]
    min_gpus: Option<i64>,

    /// Also list nodes that are not currently available
    #[arg(long)]
    include_unavailable: bool,

    /// Number of nodes to list
    #[arg(long, default_value = "20")]
    limit: usize,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    gpu_capacity::init_tracing(false);

    let data_dir = match args.data_dir {
        Some(dir) => dir,
        None => {
            let (path, required) = config_path(args.config);
            load_config(&path, required)?.data_dir
        }
    };
    let store = SnapshotStore::open(&data_dir)
        .with_context(|| format!("opening data dir {}", data_dir.display()))?;
    let Some(tree) = store.inventory() else {
        bail!(
            "no inventory in {}; trigger a refresh first",
            data_dir.display()
        );
    };

    let filter = CapacityFilter {
        gpu_type: args.gpu_type,
        location: args.location,
        floor: args.floor,
        rack: args.rack,
        ib_fabric: args.ib_fabric,
        min_gpus: args.min_gpus,
        include_unavailable: args.include_unavailable,
    };
    let report = CapacityReport::build(&tree, &filter);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&report.summary);
    print_nodes(&report.nodes, args.limit);
    Ok(())
}

fn rule() {
    println!("{}", "=".repeat(60));
}

fn print_summary(summary: &CapacitySummary) {
    rule();
    println!("AVAILABLE CAPACITY SUMMARY");
    rule();
    println!(
        "\nTotal: {} nodes, {} GPUs",
        summary.total_nodes, summary.total_gpus
    );

    println!("\nBy Location:");
    let mut locations: Vec<_> = summary.by_location.iter().collect();
    locations.sort_by(|a, b| a.0.cmp(b.0));
    for (location, count) in locations {
        println!("  {location}: {} nodes, {} GPUs", count.nodes, count.gpus);
    }

    println!("\nBy GPU Type:");
    let mut types: Vec<_> = summary.by_gpu_type.iter().collect();
    types.sort_by(|a, b| a.0.cmp(b.0));
    for (gpu_type, count) in types {
        println!("  {gpu_type}: {} nodes, {} GPUs", count.nodes, count.gpus);
    }

    println!("\nBy IB Fabric (Top {TOP_FABRICS}):");
    let mut fabrics: Vec<_> = summary.by_ib_fabric.iter().collect();
    fabrics.sort_by(|a, b| b.1.gpus.cmp(&a.1.gpus));
    for (id, fabric) in fabrics.into_iter().take(TOP_FABRICS) {
        println!("  {}", shorten(id));
        println!("    Location: {}, Floor: {}", fabric.location, fabric.floor);
        println!("    Nodes: {}, GPUs: {}", fabric.nodes, fabric.gpus);
    }
}

fn shorten(id: &str) -> String {
    if id.chars().count() > FABRIC_ID_WIDTH {
        let head: String = id.chars().take(FABRIC_ID_WIDTH).collect();
        format!("{head}...")
    } else {
        id.to_string()
    }
}

fn print_nodes(nodes: &[PlacedNode], limit: usize) {
    println!();
    rule();
    println!(
        "NODES (showing {} of {})",
        limit.min(nodes.len()),
        nodes.len()
    );
    rule();
    println!();

    for (i, placed) in nodes.iter().take(limit).enumerate() {
        let node = &placed.node;
        println!("{}. {}", i + 1, node.name.as_deref().unwrap_or(&node.id));
        println!(
            "   Location: {}, Floor: {}, Rack: {}",
            placed.location_name, placed.floor, placed.rack
        );
        println!("   GPU: {} x{}", node.gpu_type, node.gpus());
        println!(
            "   State: {}, Mode: {}",
            node.state.as_deref().unwrap_or("-"),
            node.mode.as_deref().unwrap_or("-")
        );
        println!("   Available Slices: {}", node.available_slices);
        println!();
    }
}
