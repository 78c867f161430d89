use std::{collections::HashSet, fmt, sync::Arc};

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::{RawEndpointRecord, DEFAULT_FN_INDEX, DEFAULT_TRIGGER_ID};
use crate::error::ConfigError;

/// Stable identity of an endpoint: SHA-256 over address, token and protocol
/// indices. Doubles as the pool dedup key and the concurrency gate key, and is
/// safe to log because the token never appears in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn new(base_url: &str, studio_token: &str, fn_index: u32, trigger_id: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{base_url}|{studio_token}|{fn_index}|{trigger_id}").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12])
    }
}

/// One remote Studio worker.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub name: String,
    pub base_url: String,
    pub studio_token: String,
    pub fn_index: u32,
    pub trigger_id: u32,
    key: RoutingKey,
}

// The token stays out of Debug output
impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("studio_token", &"<redacted>")
            .field("fn_index", &self.fn_index)
            .field("trigger_id", &self.trigger_id)
            .finish()
    }
}

impl EndpointDescriptor {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        studio_token: impl Into<String>,
        fn_index: u32,
        trigger_id: u32,
    ) -> Self {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let studio_token = studio_token.into().trim().to_string();
        let key = RoutingKey::new(&base_url, &studio_token, fn_index, trigger_id);
        Self {
            name: name.into(),
            base_url,
            studio_token,
            fn_index,
            trigger_id,
            key,
        }
    }

    pub fn key(&self) -> &RoutingKey {
        &self.key
    }

    /// `{base}/gradio_api/{path}`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/gradio_api/{}", self.base_url, path)
    }
}

/// Validated, non-empty set of endpoints. Read-only after construction.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Vec<Arc<EndpointDescriptor>>,
}

impl EndpointPool {
    /// Admit every record with a base_url, then fail with one aggregated error
    /// if the pool ends up empty or any admitted record is unusable.
    pub fn from_records(records: &[RawEndpointRecord]) -> Result<Self, ConfigError> {
        let mut endpoints: Vec<Arc<EndpointDescriptor>> = Vec::new();
        let mut seen_keys = HashSet::new();
        let mut seen_names = HashSet::new();
        let mut problems = Vec::new();

        for (idx, record) in records.iter().enumerate() {
            let base_url = record.base_url.as_deref().unwrap_or("").trim();
            if base_url.trim_end_matches('/').is_empty() {
                warn!("Skipping endpoint record #{idx}: base_url is empty");
                continue;
            }

            let name = record
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("endpoint-{idx}"));

            let endpoint = EndpointDescriptor::new(
                name,
                base_url,
                record.studio_token.as_deref().unwrap_or(""),
                record.fn_index.unwrap_or(DEFAULT_FN_INDEX),
                record.trigger_id.unwrap_or(DEFAULT_TRIGGER_ID),
            );

            if !seen_keys.insert(endpoint.key().clone()) {
                warn!(
                    "Skipping endpoint {}: same address, token and indices as an earlier entry",
                    endpoint.name
                );
                continue;
            }
            if endpoint.studio_token.is_empty() {
                problems.push(format!("endpoint {}: studio_token is empty", endpoint.name));
            } else if !endpoint.studio_token.chars().all(|c| c.is_ascii_graphic()) {
                problems.push(format!(
                    "endpoint {}: studio_token has characters not allowed in a header",
                    endpoint.name
                ));
            }
            if !seen_names.insert(endpoint.name.clone()) {
                problems.push(format!("endpoint {}: duplicate name", endpoint.name));
            }
            endpoints.push(Arc::new(endpoint));
        }

        if endpoints.is_empty() {
            return Err(ConfigError::EmptyPool);
        }
        if !problems.is_empty() {
            return Err(ConfigError::InvalidPool(problems));
        }
        Ok(Self { endpoints })
    }

    pub fn from_endpoints(endpoints: Vec<EndpointDescriptor>) -> Result<Self, ConfigError> {
        let records: Vec<RawEndpointRecord> = endpoints
            .into_iter()
            .map(|e| RawEndpointRecord {
                name: Some(e.name),
                base_url: Some(e.base_url),
                studio_token: Some(e.studio_token),
                fn_index: Some(e.fn_index),
                trigger_id: Some(e.trigger_id),
            })
            .collect();
        Self::from_records(&records)
    }

    pub fn endpoints(&self) -> &[Arc<EndpointDescriptor>] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
