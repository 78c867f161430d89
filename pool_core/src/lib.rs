//! Text-to-speech over a pool of remote Studio (Gradio queue) endpoints.
//!
//! A request is routed to the least-loaded endpoint this process is not
//! already using, driven through the join / event-stream / download protocol,
//! and failed over to the next endpoint on any error.

pub mod backend;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod probe;
pub mod protocol;
pub mod rank;
pub mod selector;
pub mod sse;
pub mod voice;

pub use backend::{EndpointStatus, PoolBackend, SpeechBackend, SpeechOutcome, SpeechRequest};
pub use config::{PoolConfig, RawEndpointRecord, StageTimeouts};
pub use endpoint::{EndpointDescriptor, EndpointPool, RoutingKey};
pub use error::{AttemptError, ConfigError, EndpointFailure, PoolError};
pub use gate::{GateGuard, RoutingContext};
pub use orchestrator::PoolOrchestrator;
pub use probe::{LoadProber, LoadSample};
pub use protocol::{AudioArtifact, JobClient, ReferenceAudio, SynthesisJob, MIN_AUDIO_SIZE};
pub use rank::{rank, RankPolicy, RankedEndpoint, Tier};
pub use voice::{VoiceSelector, VoiceSettings};
