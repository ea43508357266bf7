// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use gpu_capacity::config::{config_path, load_config};
use gpu_capacity::source::{CliMetricsSource, CommandInventorySource};
use gpu_capacity::{DataService, SnapshotStore, http};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// GPU capacity dashboard server
#[derive(Parser, Debug)]
#[command(name = "gpu-capacity-dashboard", version)]
#[command(about = "Serve datacenter GPU capacity and customer metrics over HTTP")]
struct Args {
    /// YAML config file (defaults to /etc/gpu-capacity/config.yaml when present)
    #[arg(short, long, env = "GPU_CAPACITY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overriding the config file
    #[arg(short, long, env = "GPU_CAPACITY_PORT")]
    port: Option<u16>,

    /// Directory holding the persisted JSON documents
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory with capacity.html and other dashboard assets
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    gpu_capacity::init_tracing(args.log_json);

    let (path, required) = config_path(args.config);
    let mut config = load_config(&path, required)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.static_dir {
        config.static_dir = dir;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        data_dir = %config.data_dir.display(),
        static_dir = %config.static_dir.display(),
        inventory_tool = %config.inventory_tool.command,
        metrics_tool = %config.metrics_tool.command,
        "gpu-capacity-dashboard starting"
    );

    let store = Arc::new(
        SnapshotStore::open(&config.data_dir)
            .with_context(|| format!("opening data dir {}", config.data_dir.display()))?,
    );
    let service = DataService::new(
        store,
        Arc::new(CommandInventorySource::new(config.inventory_tool.clone())),
        Arc::new(CliMetricsSource::new(config.metrics_tool.clone())),
    );

    let app = http::router(service, &config.static_dir);
    http::run_server(app, config.port).await
}
