//! The contract callers program against, and its pool-backed implementation.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tracing::warn;

use crate::config::PoolConfig;
use crate::error::{ConfigError, PoolError};
use crate::gate::RoutingContext;
use crate::orchestrator::PoolOrchestrator;
use crate::protocol::{AudioArtifact, ReferenceAudio, SynthesisJob};
use crate::voice::VoiceSettings;

#[derive(Debug, Clone, Default)]
pub struct SpeechRequest {
    pub text: String,
    /// `character:preset`, `character`, or nothing.
    pub voice: Option<String>,
    pub emotion: Option<String>,
    pub reference: Option<ReferenceAudio>,
}

#[derive(Debug)]
pub struct SpeechOutcome {
    pub success: bool,
    pub message: String,
    /// Resolved `character:preset`.
    pub voice: String,
    pub artifact: Option<AudioArtifact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub name: String,
    pub queue_size: Option<u32>,
    pub in_flight: bool,
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, request: SpeechRequest) -> SpeechOutcome;

    async fn status(&self) -> Vec<EndpointStatus>;
}

/// Voice resolution on top of the orchestrator.
#[derive(Debug, Clone)]
pub struct PoolBackend {
    orchestrator: PoolOrchestrator,
    voice: VoiceSettings,
    split_sentence: bool,
}

impl PoolBackend {
    pub fn new(orchestrator: PoolOrchestrator, voice: VoiceSettings, split_sentence: bool) -> Self {
        Self {
            orchestrator,
            voice,
            split_sentence,
        }
    }

    pub fn from_config(config: &PoolConfig, routing: RoutingContext) -> Result<Self, ConfigError> {
        Ok(Self::new(
            PoolOrchestrator::from_config(config, routing)?,
            config.voice.clone(),
            config.remote_split_sentence,
        ))
    }

    pub fn orchestrator(&self) -> &PoolOrchestrator {
        &self.orchestrator
    }
}

#[async_trait]
impl SpeechBackend for PoolBackend {
    async fn synthesize(&self, request: SpeechRequest) -> SpeechOutcome {
        let voice = self
            .voice
            .resolve(request.voice.as_deref(), request.emotion.as_deref());
        let label = voice.label();

        if request.text.trim().is_empty() {
            return SpeechOutcome {
                success: false,
                message: "text is empty".to_string(),
                voice: label,
                artifact: None,
            };
        }

        let job = SynthesisJob {
            text: request.text,
            voice,
            split_sentence: self.split_sentence,
            reference: request.reference,
        };

        match self.orchestrator.execute(&job).await {
            Ok(artifact) => SpeechOutcome {
                success: true,
                message: format!("synthesized on {} ({label})", artifact.endpoint),
                voice: label,
                artifact: Some(artifact),
            },
            Err(error) => {
                if let PoolError::Exhausted { failures } = &error {
                    warn!("Synthesis failed on all {} attempted endpoints", failures.len());
                }
                SpeechOutcome {
                    success: false,
                    message: error.to_string(),
                    voice: label,
                    artifact: None,
                }
            }
        }
    }

    async fn status(&self) -> Vec<EndpointStatus> {
        let orchestrator = &self.orchestrator;
        let probes = orchestrator.pool().endpoints().iter().map(|endpoint| async move {
            EndpointStatus {
                name: endpoint.name.clone(),
                queue_size: orchestrator.prober().probe(endpoint).await,
                in_flight: orchestrator.routing().is_held(endpoint.key()),
            }
        });
        join_all(probes).await
    }
}
