//! Drives one request across the pool: probe, rank, gate, run, fail over.

use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::endpoint::EndpointPool;
use crate::error::{ConfigError, EndpointFailure, PoolError};
use crate::gate::RoutingContext;
use crate::probe::LoadProber;
use crate::protocol::{build_http_client, AudioArtifact, JobClient, SynthesisJob};
use crate::rank::{rank, RankPolicy, RankedEndpoint};

#[derive(Debug, Clone)]
pub struct PoolOrchestrator {
    pool: EndpointPool,
    prober: LoadProber,
    client: JobClient,
    policy: RankPolicy,
    routing: RoutingContext,
}

impl PoolOrchestrator {
    pub fn new(
        pool: EndpointPool,
        prober: LoadProber,
        client: JobClient,
        policy: RankPolicy,
        routing: RoutingContext,
    ) -> Self {
        Self {
            pool,
            prober,
            client,
            policy,
            routing,
        }
    }

    /// Validate the pool and wire up one shared HTTP client for all stages.
    pub fn from_config(config: &PoolConfig, routing: RoutingContext) -> Result<Self, ConfigError> {
        let pool = config.build_pool()?;
        let http = build_http_client(config.trust_env)
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        let timeouts = config.timeouts();
        Ok(Self::new(
            pool,
            LoadProber::new(http.clone(), timeouts.status),
            JobClient::new(http, timeouts),
            config.rank_policy(),
            routing,
        ))
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn routing(&self) -> &RoutingContext {
        &self.routing
    }

    pub fn prober(&self) -> &LoadProber {
        &self.prober
    }

    /// Fresh attempt order for one request. Never cached: load moves.
    pub async fn attempt_order(&self) -> Vec<RankedEndpoint> {
        let samples = self.prober.probe_all(&self.pool).await;
        rank(samples, self.policy)
    }

    /// Try endpoints in ranked order until one returns audio. A held gate
    /// means skip, never wait. Each endpoint gets at most one attempt.
    pub async fn execute(&self, job: &SynthesisJob) -> Result<AudioArtifact, PoolError> {
        let order = self.attempt_order().await;
        let mut failures: Vec<EndpointFailure> = Vec::new();
        let mut skipped = 0usize;

        for candidate in order {
            let endpoint = &candidate.endpoint;
            let Some(gate) = self.routing.acquire_if_free(endpoint.key()) else {
                debug!("Endpoint {} is in use by another request, skipping", endpoint.name);
                skipped += 1;
                continue;
            };

            info!(
                "Using endpoint {} (key={}, queue={:?}, tier={:?}) for {}",
                endpoint.name,
                gate.key(),
                candidate.depth,
                candidate.tier,
                job.voice.label()
            );
            let result = self.client.run(endpoint, job).await;
            drop(gate);
            match result {
                Ok(artifact) => return Ok(artifact),
                Err(error) => {
                    warn!("Endpoint {} failed: {error}", endpoint.name);
                    failures.push(EndpointFailure {
                        endpoint: endpoint.name.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Err(PoolError::AllBusy { skipped })
        } else {
            Err(PoolError::Exhausted { failures })
        }
    }
}
