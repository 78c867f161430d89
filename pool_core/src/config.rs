// Pool configuration: endpoint records, routing policy, per-stage timeouts

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::endpoint::EndpointPool;
use crate::error::ConfigError;
use crate::rank::RankPolicy;
use crate::voice::VoiceSettings;

pub const DEFAULT_FN_INDEX: u32 = 3;
pub const DEFAULT_TRIGGER_ID: u32 = 19;

/// One endpoint entry exactly as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEndpointRecord {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub studio_token: Option<String>,
    pub fn_index: Option<u32>,
    pub trigger_id: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub endpoints: Vec<RawEndpointRecord>,
    pub prefer_idle_endpoint: bool,
    pub busy_queue_threshold: u32,
    pub status_timeout_secs: u64,
    pub join_timeout_secs: u64,
    pub sse_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub remote_split_sentence: bool,
    pub trust_env: bool,
    #[serde(flatten)]
    pub voice: VoiceSettings,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            prefer_idle_endpoint: true,
            busy_queue_threshold: 0,
            status_timeout_secs: 3,
            join_timeout_secs: 30,
            sse_timeout_secs: 300,
            download_timeout_secs: 120,
            upload_timeout_secs: 120,
            remote_split_sentence: true,
            trust_env: false,
            voice: VoiceSettings::default(),
        }
    }
}

/// Independent timeout per protocol stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub status: Duration,
    pub upload: Duration,
    pub join: Duration,
    pub stream: Duration,
    pub download: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        PoolConfig::default().timeouts()
    }
}

impl PoolConfig {
    /// Load from a JSON file such as `config/pool.json`
    pub fn from_file<P: AsRef<Path>>(p: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(p.as_ref()).map_err(|e| ConfigError::Unreadable {
            path: p.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Apply `POOL_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = env_parse("POOL_STATUS_TIMEOUT_SECS") {
            self.status_timeout_secs = v;
        }
        if let Some(v) = env_parse("POOL_JOIN_TIMEOUT_SECS") {
            self.join_timeout_secs = v;
        }
        if let Some(v) = env_parse("POOL_SSE_TIMEOUT_SECS") {
            self.sse_timeout_secs = v;
        }
        if let Some(v) = env_parse("POOL_DOWNLOAD_TIMEOUT_SECS") {
            self.download_timeout_secs = v;
        }
        if let Some(v) = env_parse("POOL_PREFER_IDLE") {
            self.prefer_idle_endpoint = v;
        }
        if let Some(v) = env_parse("POOL_BUSY_THRESHOLD") {
            self.busy_queue_threshold = v;
        }
        self
    }

    pub fn timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            status: Duration::from_secs(self.status_timeout_secs),
            upload: Duration::from_secs(self.upload_timeout_secs),
            join: Duration::from_secs(self.join_timeout_secs),
            stream: Duration::from_secs(self.sse_timeout_secs),
            download: Duration::from_secs(self.download_timeout_secs),
        }
    }

    pub fn rank_policy(&self) -> RankPolicy {
        RankPolicy {
            prefer_idle: self.prefer_idle_endpoint,
            busy_threshold: self.busy_queue_threshold,
        }
    }

    /// Validate the endpoint records into a non-empty pool.
    pub fn build_pool(&self) -> Result<EndpointPool, ConfigError> {
        EndpointPool::from_records(&self.endpoints)
    }
}
