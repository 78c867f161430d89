//! Queue-depth probing.
//!
//! A probe never fails from the caller's point of view: timeouts, non-2xx
//! replies, transport errors and malformed bodies all collapse into an unknown
//! depth, which the ranker places behind every measured endpoint.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::endpoint::{EndpointDescriptor, EndpointPool};
use crate::protocol::studio_headers;

/// Observed queue depth for one endpoint at one moment. `None` means unknown.
#[derive(Debug, Clone)]
pub struct LoadSample {
    pub endpoint: Arc<EndpointDescriptor>,
    pub depth: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LoadProber {
    http: Client,
    timeout: Duration,
}

impl LoadProber {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// `GET {base}/gradio_api/queue/status`, reading `queue_size`.
    pub async fn probe(&self, endpoint: &EndpointDescriptor) -> Option<u32> {
        let url = endpoint.api_url("queue/status");
        let response = match self
            .http
            .get(&url)
            .headers(studio_headers(&endpoint.studio_token))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("Probe of {} failed: {e}", endpoint.name);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("Probe of {} returned {}", endpoint.name, response.status());
            return None;
        }

        match response.json::<Value>().await {
            Ok(body) => parse_queue_size(&body),
            Err(e) => {
                debug!("Probe of {} returned an unreadable body: {e}", endpoint.name);
                None
            }
        }
    }

    /// Probe every endpoint concurrently. Output order follows the pool.
    pub async fn probe_all(&self, pool: &EndpointPool) -> Vec<LoadSample> {
        let probes = pool.endpoints().iter().map(|endpoint| async move {
            LoadSample {
                endpoint: endpoint.clone(),
                depth: self.probe(endpoint).await,
            }
        });
        join_all(probes).await
    }
}

/// Only a non-negative integer `queue_size` counts as a measurement.
fn parse_queue_size(body: &Value) -> Option<u32> {
    body.get("queue_size")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}
