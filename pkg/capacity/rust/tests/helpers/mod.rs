// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use gpu_capacity::admin::parse_admin_feed;
use gpu_capacity::metrics::{CustomerMetricsSnapshot, Instance, VmType, aggregate_customer_metrics};
use gpu_capacity::source::{InventorySource, MetricsSource, RawInventory};
use gpu_capacity::{CapacityError, DataService, SnapshotStore, http};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

pub const FEED: &str = r#"{"nodes": [
  {"id":"n1","name":"icat-m-m11a-r102-prod-hv-01","type":"SLICE_TYPE_VCPU_88_MEM_480_H100_SXM_80GB_4_IB",
   "location":"icat-m","ib_network_id":"f1","state":"Available","mode":"AGENT_MODE_NORMAL",
   "avail":"1","used":"0","reserved":"N"},
  {"id":"n2","name":"icat-m-m11a-r102-prod-hv-02","type":"SLICE_TYPE_VCPU_88_MEM_480_H100_SXM_80GB_4_IB",
   "location":"icat-m","ib_network_id":"f1","state":"Allocated","mode":"AGENT_MODE_NORMAL",
   "avail":"0","used":"1","reserved":"N"},
  {"id":"d1","name":"txdr-iah02a-r001-prod-hv-07","type":"SLICE_TYPE_L40S_48GB_8_IB",
   "location":"txdr-iah","ib_network_id":"f9","state":"Available","mode":"AGENT_MODE_NORMAL",
   "avail":2,"used":0,"reserved":"N","note":"Hot-spare for f9"}
]}"#;

/// Inventory source that waits on `gate` before answering, when set.
pub struct FakeInventory {
    pub gate: Option<Arc<Notify>>,
    pub fail: bool,
}

#[async_trait]
impl InventorySource for FakeInventory {
    async fn fetch(&self) -> gpu_capacity::Result<RawInventory> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(CapacityError::ExternalToolFailure {
                tool: "cloud-admin".into(),
                reason: "exit code 1: token expired".into(),
            });
        }
        let records = parse_admin_feed(FEED).map_err(|e| CapacityError::ExternalToolFailure {
            tool: "cloud-admin".into(),
            reason: e.to_string(),
        })?;
        Ok(RawInventory {
            stdout: FEED.to_string(),
            records,
        })
    }
}

pub struct FakeMetrics;

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn fetch(&self) -> gpu_capacity::Result<CustomerMetricsSnapshot> {
        let types = vec![VmType {
            product_name: "h100-80gb-sxm-ib.8x".into(),
            gpu_type: Some("H100-80GB".into()),
            num_gpu: 8,
        }];
        let instances = vec![Instance {
            vm_type: "h100-80gb-sxm-ib.8x".into(),
            location: "eu-iceland1-a".into(),
            state: "STATE_RUNNING".into(),
        }];
        Ok(aggregate_customer_metrics(&types, &instances))
    }
}

pub struct TestApp {
    pub router: Router,
    pub gate: Arc<Notify>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new(gated: bool, fail: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("capacity.html"), "<h1>GPU Capacity</h1>").unwrap();
        std::fs::write(static_dir.join("app.js"), "console.log('ok');").unwrap();

        let gate = Arc::new(Notify::new());
        let store = Arc::new(SnapshotStore::open(dir.path().join("data")).unwrap());
        let inventory = FakeInventory {
            gate: gated.then(|| Arc::clone(&gate)),
            fail,
        };
        let service = DataService::new(store, Arc::new(inventory), Arc::new(FakeMetrics));
        let router = http::router(service, static_dir);
        TestApp { router, gate, dir }
    }

    pub async fn send(&self, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.send("GET", uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    pub async fn post_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.send("POST", uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Poll the status endpoint until the refresh leaves the running state.
    pub async fn wait_for_refresh(&self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (_, status) = self.get_json("/api/refresh/status").await;
                if status["in_progress"] == false && status["status"] != "idle" {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("refresh did not finish")
    }
}
