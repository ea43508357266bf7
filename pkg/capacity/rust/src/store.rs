// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! JSON documents in the data directory, mirrored in memory as `Arc` snapshots.

use crate::error::{CapacityError, Document, Result};
use crate::inventory::InventoryTree;
use crate::metrics::CustomerMetricsSnapshot;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub struct SnapshotStore {
    dir: PathBuf,
    inventory: RwLock<Option<Arc<InventoryTree>>>,
    metrics: RwLock<Option<Arc<CustomerMetricsSnapshot>>>,
}

impl SnapshotStore {
    /// Open (creating if needed) the data directory and load whatever
    /// documents it already holds. Unreadable documents are skipped.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CapacityError::Storage {
            path: dir.clone(),
            source,
        })?;

        let inventory = load_document::<InventoryTree>(&dir, Document::Inventory).map(Arc::new);
        let metrics =
            load_document::<CustomerMetricsSnapshot>(&dir, Document::Metrics).map(Arc::new);
        info!(
            data_dir = %dir.display(),
            inventory = inventory.is_some(),
            metrics = metrics.is_some(),
            "Opened snapshot store"
        );

        Ok(SnapshotStore {
            dir,
            inventory: RwLock::new(inventory),
            metrics: RwLock::new(metrics),
        })
    }

    pub fn path(&self, document: Document) -> PathBuf {
        self.dir.join(document.file_name())
    }

    pub fn inventory(&self) -> Option<Arc<InventoryTree>> {
        self.inventory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn metrics(&self) -> Option<Arc<CustomerMetricsSnapshot>> {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Persist the admin tool's stdout verbatim.
    pub async fn save_raw_inventory(&self, stdout: &str) -> Result<()> {
        write_atomic(&self.path(Document::RawInventory), stdout.as_bytes()).await
    }

    pub async fn save_inventory(&self, tree: InventoryTree) -> Result<Arc<InventoryTree>> {
        let tree = Arc::new(tree);
        self.write_document(Document::Inventory, tree.as_ref()).await?;
        *self
            .inventory
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&tree));
        Ok(tree)
    }

    pub async fn save_metrics(
        &self,
        snapshot: CustomerMetricsSnapshot,
    ) -> Result<Arc<CustomerMetricsSnapshot>> {
        let snapshot = Arc::new(snapshot);
        self.write_document(Document::Metrics, snapshot.as_ref())
            .await?;
        *self
            .metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn write_document<T: Serialize>(&self, document: Document, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|source| CapacityError::Encode { document, source })?;
        write_atomic(&self.path(document), &bytes).await
    }
}

fn load_document<T: DeserializeOwned>(dir: &Path, document: Document) -> Option<T> {
    let path = dir.join(document.file_name());
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read {document} document");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt {document} document");
            None
        }
    }
}

/// Write to a sibling temp file, fsync, then rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let storage = |source: std::io::Error| CapacityError::Storage {
        path: path.to_path_buf(),
        source,
    };
    let tmp_path = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(storage)?;
    file.write_all(bytes).await.map_err(storage)?;
    file.flush().await.map_err(storage)?;
    file.sync_all().await.map_err(storage)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await.map_err(storage)
}
