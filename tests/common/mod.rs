//! Shared harness for Lightlog integration tests

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lightlog::api::build_http_router;
use lightlog::clock::ManualClock;
use lightlog::hooks::{CommandRunner, HookOutcome, HookStatus};
use lightlog::ingester::{Ingester, IngesterConfig};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// 2024-03-01T10:00:00Z
pub fn scenario_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

/// Hook runner that records rendered commands instead of executing them
#[derive(Default)]
pub struct RecordingRunner {
    pub commands: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> lightlog::Result<HookOutcome> {
        self.commands.lock().push(command.to_string());
        Ok(HookOutcome {
            status: HookStatus::Success,
            output: String::new(),
        })
    }
}

pub struct TestStore {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub hooks: Arc<RecordingRunner>,
    pub ingester: Arc<Ingester>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut IngesterConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(scenario_start()));
        let hooks = Arc::new(RecordingRunner::default());
        let mut config = IngesterConfig {
            store_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        tweak(&mut config);

        let ingester = Arc::new(
            Ingester::new(config)
                .with_clock(clock.clone())
                .with_command_runner(hooks.clone()),
        );
        Self {
            dir,
            clock,
            hooks,
            ingester,
        }
    }

    /// Serve the API on an ephemeral port, returning its base URL.
    pub async fn serve(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_http_router(self.ingester.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

/// Thin HTTP client for a served store
pub struct StoreClient {
    base: String,
    client: Client,
}

impl StoreClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            client: Client::new(),
        }
    }

    /// Write one sample via query parameters, returning the stored sample
    pub async fn write(&self, thing: &str, pairs: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}/write/{}", self.base, thing))
            .query(pairs)
            .send()
            .await?;
        if resp.status() == StatusCode::OK {
            Ok(resp.json().await?)
        } else {
            Err(anyhow!(
                "Failed to write sample: {} - {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            ))
        }
    }

    /// Fetch one day shard; returns the status and the decoded body
    pub async fn read_day(&self, thing: &str, year: i32, month: u32, day: u32) -> Result<(StatusCode, Value)> {
        let resp = self
            .client
            .get(format!(
                "{}/read/{}/{:04}/{:02}/{:02}.json",
                self.base, thing, year, month, day
            ))
            .send()
            .await?;
        let status = resp.status();
        Ok((status, resp.json().await?))
    }
}
