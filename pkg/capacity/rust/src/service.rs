// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{CapacityError, Document, Result};
use crate::inventory::InventoryTree;
use crate::metrics::CustomerMetricsSnapshot;
use crate::query::{CapacityFilter, CapacityReport};
use crate::refresh::{RefreshJob, RefreshOrchestrator};
use crate::source::{InventorySource, MetricsSource};
use crate::store::SnapshotStore;
use std::sync::Arc;

/// Read and trigger operations shared by the HTTP handlers and the CLI.
#[derive(Clone)]
pub struct DataService {
    store: Arc<SnapshotStore>,
    refresh: RefreshOrchestrator,
}

impl DataService {
    pub fn new(
        store: Arc<SnapshotStore>,
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        let refresh = RefreshOrchestrator::new(Arc::clone(&store), inventory, metrics);
        DataService { store, refresh }
    }

    pub fn inventory(&self) -> Result<Arc<InventoryTree>> {
        self.store
            .inventory()
            .ok_or(CapacityError::NotFound(Document::Inventory))
    }

    pub fn metrics(&self) -> Result<Arc<CustomerMetricsSnapshot>> {
        self.store
            .metrics()
            .ok_or(CapacityError::NotFound(Document::Metrics))
    }

    pub fn refresh_status(&self) -> RefreshJob {
        self.refresh.status()
    }

    pub fn trigger_refresh(&self) -> Result<RefreshJob> {
        self.refresh.trigger()
    }

    pub fn capacity(&self, filter: &CapacityFilter) -> Result<CapacityReport> {
        let tree = self.inventory()?;
        Ok(CapacityReport::build(&tree, filter))
    }
}
