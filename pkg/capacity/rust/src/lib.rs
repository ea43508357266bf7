// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! GPU capacity dashboard backend.
//!
//! Turns the flat node listing of the datacenter admin CLI into a
//! Location → Floor → Rack → IB fabric hierarchy with capacity rollups, answers
//! filtered "where is free capacity" queries over it, and keeps a separate
//! snapshot of what customers have deployed.
//!
//! ## Architecture
//!
//! 1. **Normalization** (`admin`) - admin feed records to [`PhysicalNode`]s,
//!    deriving GPU model and placement from slice type and hypervisor name.
//! 2. **Transformation** (`inventory`) - two-pass build of the [`InventoryTree`].
//! 3. **Query** (`query`) - filtered traversal and summaries.
//! 4. **Refresh** (`refresh`) - single-flight background job that fetches,
//!    builds and persists through the [`SnapshotStore`], reporting progress.
//! 5. **Serving** (`service`, `http`) - read facade and the axum API.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod inventory;
pub mod metrics;
pub mod node;
pub mod query;
pub mod refresh;
pub mod service;
pub mod source;
pub mod store;

pub use error::{CapacityError, Document, Result};
pub use inventory::{InventoryTree, build_inventory_tree};
pub use node::PhysicalNode;
pub use query::{CapacityFilter, CapacityReport, find_available_capacity, summarize_capacity};
pub use refresh::{RefreshJob, RefreshStatus};
pub use service::DataService;
pub use store::SnapshotStore;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
