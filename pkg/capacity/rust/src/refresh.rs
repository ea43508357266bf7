// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Single-flight background refresh with polled progress.
//!
//! The job state lives behind one mutex and every update replaces status,
//! progress and message together, so status readers never see a mix of two
//! steps. Readers always receive a copy.

use crate::admin::normalize_records;
use crate::error::{CapacityError, Result};
use crate::inventory::build_inventory_tree;
use crate::source::{InventorySource, MetricsSource};
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    /// No refresh has run since startup.
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RefreshStatus {
    pub fn is_running(self) -> bool {
        self == RefreshStatus::Running
    }

    pub(crate) fn can_transition_to(self, next: RefreshStatus) -> bool {
        use RefreshStatus::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Succeeded, Running)
                | (Failed, Running)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshStatus::Idle => write!(f, "idle"),
            RefreshStatus::Running => write!(f, "running"),
            RefreshStatus::Succeeded => write!(f, "succeeded"),
            RefreshStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshJob {
    pub status: RefreshStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Completion time of the last successful refresh.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for RefreshJob {
    fn default() -> Self {
        RefreshJob {
            status: RefreshStatus::Idle,
            progress: 0,
            message: String::new(),
            error: None,
            started_at: None,
            finished_at: None,
            last_updated: None,
        }
    }
}

const MSG_STARTED: &str = "Refresh started";
const MSG_FETCHING: &str = "Fetching node inventory...";
const MSG_PROCESSING: &str = "Processing datacenter hierarchy...";
const MSG_METRICS: &str = "Updating customer metrics...";
const MSG_COMPLETE: &str = "Refresh complete!";
const MSG_FAILED: &str = "Refresh failed";

/// Runs fetch → build → persist → metrics on a background task.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    job: Arc<Mutex<RefreshJob>>,
    store: Arc<SnapshotStore>,
    inventory: Arc<dyn InventorySource>,
    metrics: Arc<dyn MetricsSource>,
}

impl RefreshOrchestrator {
    pub fn new(
        store: Arc<SnapshotStore>,
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        RefreshOrchestrator {
            job: Arc::new(Mutex::new(RefreshJob::default())),
            store,
            inventory,
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RefreshJob {
        self.lock().clone()
    }

    /// Start a refresh unless one is already running.
    ///
    /// Returns the job as accepted (Running, progress 0). Outside a tokio
    /// runtime nothing changes and `NoRuntime` is returned.
    pub fn trigger(&self) -> Result<RefreshJob> {
        let runtime = Handle::try_current().map_err(|_| CapacityError::NoRuntime)?;
        let accepted = {
            let mut job = self.lock();
            if !job.status.can_transition_to(RefreshStatus::Running) {
                return Err(CapacityError::AlreadyInProgress);
            }
            let last_updated = job.last_updated;
            *job = RefreshJob {
                status: RefreshStatus::Running,
                progress: 0,
                message: MSG_STARTED.to_string(),
                error: None,
                started_at: Some(Utc::now()),
                finished_at: None,
                last_updated,
            };
            job.clone()
        };

        info!("Refresh accepted");
        let this = self.clone();
        runtime.spawn(async move { this.supervise().await });
        Ok(accepted)
    }

    /// Run the steps on their own task so a panic is observed here as a
    /// join error and recorded like any other failure.
    async fn supervise(self) {
        let steps = tokio::spawn({
            let this = self.clone();
            async move { this.run_steps().await }
        });

        let outcome = match steps.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join) if join.is_panic() => Err(panic_message(join.into_panic())),
            Err(join) => Err(format!("refresh task aborted: {join}")),
        };

        let now = Utc::now();
        let mut job = self.lock();
        match outcome {
            Ok(()) => {
                debug_assert!(job.status.can_transition_to(RefreshStatus::Succeeded));
                job.status = RefreshStatus::Succeeded;
                job.progress = 100;
                job.message = MSG_COMPLETE.to_string();
                job.finished_at = Some(now);
                job.last_updated = Some(now);
                info!("Refresh complete");
            }
            Err(reason) => {
                debug_assert!(job.status.can_transition_to(RefreshStatus::Failed));
                error!(progress = job.progress, error = %reason, "Refresh failed");
                job.status = RefreshStatus::Failed;
                job.message = MSG_FAILED.to_string();
                job.error = Some(reason);
                job.finished_at = Some(now);
            }
        }
    }

    fn advance(&self, progress: u8, message: &str) {
        let mut job = self.lock();
        if !job.status.is_running() {
            warn!(status = %job.status, "Progress update outside a running refresh");
            return;
        }
        job.progress = progress;
        job.message = message.to_string();
    }

    async fn run_steps(&self) -> Result<()> {
        self.advance(10, MSG_FETCHING);
        let raw = self.inventory.fetch().await?;
        self.store.save_raw_inventory(&raw.stdout).await?;
        info!(records = raw.records.len(), "Saved raw node inventory");

        self.advance(50, MSG_PROCESSING);
        let nodes = normalize_records(raw.records);
        let tree = build_inventory_tree(&nodes)?.stamped(Utc::now());
        let tree = self.store.save_inventory(tree).await?;
        info!(
            locations = tree.locations.len(),
            total_gpus = tree.global_stats.rollup.total_gpus,
            available_gpus = tree.global_stats.rollup.available_gpus,
            "Saved datacenter inventory"
        );

        self.advance(80, MSG_METRICS);
        let snapshot = self.metrics.fetch().await?;
        self.store.save_metrics(snapshot.stamped(Utc::now())).await?;
        Ok(())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("refresh task panicked: {detail}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::admin::parse_admin_feed;
    use crate::error::Document;
    use crate::inventory::tests::fleet;
    use crate::metrics::CustomerMetricsSnapshot;
    use crate::source::RawInventory;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    pub(crate) const FEED: &str = r#"[
        {"id":"n1","name":"icat-m-m11a-r102-prod-hv-01","type":"SLICE_TYPE_VCPU_88_MEM_480_H100_SXM_80GB_4_IB",
         "ib_network_id":"f1","state":"Available","mode":"AGENT_MODE_NORMAL","avail":1,"used":0,"reserved":"N"},
        {"id":"n2","name":"icat-m-m11a-r102-prod-hv-02","type":"SLICE_TYPE_VCPU_88_MEM_480_H100_SXM_80GB_4_IB",
         "ib_network_id":"f1","state":"Allocated","mode":"AGENT_MODE_NORMAL","avail":0,"used":1,"reserved":"N"}
    ]"#;

    /// Serves a fixed feed, optionally waiting for a release signal first.
    pub(crate) struct FakeInventory {
        pub(crate) feed: String,
        pub(crate) gate: Option<Arc<Notify>>,
    }

    impl FakeInventory {
        pub(crate) fn ok() -> Self {
            FakeInventory {
                feed: FEED.to_string(),
                gate: None,
            }
        }

        pub(crate) fn gated(gate: Arc<Notify>) -> Self {
            FakeInventory {
                feed: FEED.to_string(),
                gate: Some(gate),
            }
        }
    }

    #[async_trait]
    impl InventorySource for FakeInventory {
        async fn fetch(&self) -> Result<RawInventory> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let records = parse_admin_feed(&self.feed)
                .map_err(|e| CapacityError::tool("fake-admin", e.to_string()))?;
            Ok(RawInventory {
                stdout: self.feed.clone(),
                records,
            })
        }
    }

    pub(crate) struct FailingInventory;

    #[async_trait]
    impl InventorySource for FailingInventory {
        async fn fetch(&self) -> Result<RawInventory> {
            Err(CapacityError::tool("cloud-admin", "exit code 1: unauthorized"))
        }
    }

    pub(crate) struct FakeMetrics;

    #[async_trait]
    impl MetricsSource for FakeMetrics {
        async fn fetch(&self) -> Result<CustomerMetricsSnapshot> {
            Ok(CustomerMetricsSnapshot::default())
        }
    }

    struct PanickingMetrics;

    #[async_trait]
    impl MetricsSource for PanickingMetrics {
        async fn fetch(&self) -> Result<CustomerMetricsSnapshot> {
            panic!("metrics exploded");
        }
    }

    pub(crate) async fn wait_until_finished(orchestrator: &RefreshOrchestrator) -> RefreshJob {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = orchestrator.status();
                if matches!(job.status, RefreshStatus::Succeeded | RefreshStatus::Failed) {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("refresh did not finish in time")
    }

    async fn wait_for_progress(orchestrator: &RefreshOrchestrator, progress: u8) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while orchestrator.status().progress < progress {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("progress not reached in time");
    }

    fn orchestrator(
        dir: &TempDir,
        inventory: impl InventorySource + 'static,
        metrics: impl MetricsSource + 'static,
    ) -> (RefreshOrchestrator, Arc<SnapshotStore>) {
        let store = Arc::new(SnapshotStore::open(dir.path()).unwrap());
        let orchestrator =
            RefreshOrchestrator::new(Arc::clone(&store), Arc::new(inventory), Arc::new(metrics));
        (orchestrator, store)
    }

    #[test]
    fn test_transitions() {
        use RefreshStatus::*;
        assert!(Idle.can_transition_to(Running));
        assert!(Failed.can_transition_to(Running));
        assert!(Succeeded.can_transition_to(Running));
        assert!(!Running.can_transition_to(Running));
        assert!(!Idle.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Failed));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(RefreshJob::default()).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["progress"], 0);
        assert!(json["error"].is_null());
    }

    #[test]
    fn test_trigger_outside_runtime_leaves_job_idle() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _store) = orchestrator(&dir, FakeInventory::ok(), FakeMetrics);

        assert!(matches!(
            orchestrator.trigger(),
            Err(CapacityError::NoRuntime)
        ));
        assert_eq!(orchestrator.status(), RefreshJob::default());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            orchestrator.trigger().unwrap();
            let job = wait_until_finished(&orchestrator).await;
            assert_eq!(job.status, RefreshStatus::Succeeded);
        });
    }

    #[tokio::test]
    async fn test_successful_refresh_persists_documents() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&dir, FakeInventory::ok(), FakeMetrics);
        assert_eq!(orchestrator.status().status, RefreshStatus::Idle);

        let accepted = orchestrator.trigger().unwrap();
        assert_eq!(accepted.status, RefreshStatus::Running);
        assert_eq!(accepted.progress, 0);

        let job = wait_until_finished(&orchestrator).await;
        assert_eq!(job.status, RefreshStatus::Succeeded);
        assert_eq!(job.progress, 100);
        assert_eq!(job.message, "Refresh complete!");
        assert!(job.error.is_none());
        assert!(job.last_updated.is_some());

        let tree = store.inventory().unwrap();
        assert!(tree.last_updated.is_some());
        let location = &tree.locations["icat-m"];
        assert_eq!(location.stats.total_nodes, 2);
        assert_eq!(location.stats.total_gpus, 16);
        assert_eq!(location.stats.available_nodes, 1);
        assert_eq!(location.stats.available_gpus, 8);
        assert!(store.metrics().unwrap().last_updated.is_some());
        assert!(store.path(Document::RawInventory).exists());
    }

    #[tokio::test]
    async fn test_trigger_while_running_is_rejected() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let (orchestrator, _store) =
            orchestrator(&dir, FakeInventory::gated(Arc::clone(&gate)), FakeMetrics);

        orchestrator.trigger().unwrap();
        wait_for_progress(&orchestrator, 10).await;

        let before = orchestrator.status();
        assert!(matches!(
            orchestrator.trigger(),
            Err(CapacityError::AlreadyInProgress)
        ));
        assert_eq!(orchestrator.status(), before);

        gate.notify_one();
        let job = wait_until_finished(&orchestrator).await;
        assert_eq!(job.status, RefreshStatus::Succeeded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simultaneous_triggers_start_one_job() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let (orchestrator, _store) =
            orchestrator(&dir, FakeInventory::gated(Arc::clone(&gate)), FakeMetrics);

        let handle = tokio::runtime::Handle::current();
        let results: Vec<Result<RefreshJob>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        let _guard = handle.enter();
                        orchestrator.trigger()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(CapacityError::AlreadyInProgress)))
                .count(),
            1
        );
        gate.notify_one();
        wait_until_finished(&orchestrator).await;
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_inventory() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&dir, FailingInventory, FakeMetrics);
        let previous = build_inventory_tree(&fleet()).unwrap();
        store.save_inventory(previous.clone()).await.unwrap();
        let bytes_before = std::fs::read(store.path(Document::Inventory)).unwrap();

        orchestrator.trigger().unwrap();
        let job = wait_until_finished(&orchestrator).await;

        assert_eq!(job.status, RefreshStatus::Failed);
        assert_eq!(job.message, "Refresh failed");
        assert_eq!(job.progress, 10);
        assert!(job.error.as_deref().unwrap().contains("unauthorized"));
        assert!(job.last_updated.is_none());
        assert_eq!(
            std::fs::read(store.path(Document::Inventory)).unwrap(),
            bytes_before
        );
        assert_eq!(store.inventory().as_deref(), Some(&previous));
    }

    #[tokio::test]
    async fn test_malformed_feed_fails_build_step() {
        let dir = TempDir::new().unwrap();
        let inventory = FakeInventory {
            feed: r#"[{"id":"x","name":"not-a-hypervisor","type":"SLICE_TYPE_H100_SXM_80GB"}]"#
                .to_string(),
            gate: None,
        };
        let (orchestrator, store) = orchestrator(&dir, inventory, FakeMetrics);

        orchestrator.trigger().unwrap();
        let job = wait_until_finished(&orchestrator).await;
        assert_eq!(job.status, RefreshStatus::Failed);
        assert_eq!(job.progress, 50);
        assert!(job.error.as_deref().unwrap().contains("missing location"));
        assert!(store.inventory().is_none());
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(&dir, FakeInventory::ok(), PanickingMetrics);

        orchestrator.trigger().unwrap();
        let job = wait_until_finished(&orchestrator).await;
        assert_eq!(job.status, RefreshStatus::Failed);
        assert_eq!(job.progress, 80);
        assert!(job.error.as_deref().unwrap().contains("metrics exploded"));
        // Step two completed before the panic.
        assert!(store.inventory().is_some());
        assert!(store.metrics().is_none());
    }

    #[tokio::test]
    async fn test_retrigger_after_finish_resets_progress() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _store) = orchestrator(&dir, FailingInventory, FakeMetrics);

        orchestrator.trigger().unwrap();
        let failed = wait_until_finished(&orchestrator).await;
        assert_eq!(failed.status, RefreshStatus::Failed);

        let again = orchestrator.trigger().unwrap();
        assert_eq!(again.status, RefreshStatus::Running);
        assert_eq!(again.progress, 0);
        assert!(again.error.is_none());
        wait_until_finished(&orchestrator).await;
    }
}
