pub mod config;
pub mod error;
pub mod validation;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, Uri},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use pool_core::{EndpointStatus, SpeechBackend, SpeechRequest};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::validation::{decode_reference, validate_tts_request};

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn SpeechBackend>,
    pub config: ServerConfig,
}

#[derive(Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice: Option<String>,
    pub emotion: Option<String>,
    pub reference_audio_base64: Option<String>,
    pub reference_filename: Option<String>,
    pub reference_text: Option<String>,
}

#[derive(Serialize)]
pub struct TtsResponse {
    pub success: bool,
    pub message: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
}

/// Full application: routes at the root and under `/api`, plus the
/// middleware stack.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    // Global key: every caller shares one budget, which also behaves behind proxies
    let per_minute = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(60_000 / u64::from(per_minute))
            .burst_size(per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit: {per_minute}/min"))?,
    );
    info!("Rate limiting: {} requests per minute", per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/endpoints", get(list_endpoints))
        .route("/tts", post(tts_endpoint));

    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .fallback(not_found)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointStatus>> {
    Json(state.backend.status().await)
}

pub async fn tts_endpoint(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Json<TtsResponse>, ApiError> {
    validate_tts_request(&req.text, req.voice.as_deref(), state.config.max_text_length)?;
    let reference = decode_reference(
        req.reference_audio_base64.as_deref(),
        req.reference_filename.as_deref(),
        req.reference_text.as_deref(),
    )?;

    info!(
        "TTS request: {} chars, voice={:?}, emotion={:?}, reference={}",
        req.text.chars().count(),
        req.voice,
        req.emotion,
        reference.is_some()
    );

    let outcome = state
        .backend
        .synthesize(SpeechRequest {
            text: req.text,
            voice: req.voice,
            emotion: req.emotion,
            reference,
        })
        .await;

    if !outcome.success {
        return Err(ApiError::PoolUnavailable(outcome.message));
    }

    let (audio_base64, audio_url, orig_name) = match outcome.artifact {
        Some(artifact) => (
            Some(general_purpose::STANDARD.encode(&artifact.bytes)),
            Some(artifact.url),
            artifact.orig_name,
        ),
        None => (None, None, None),
    };

    Ok(Json(TtsResponse {
        success: true,
        message: outcome.message,
        voice: outcome.voice,
        audio_base64,
        audio_url,
        orig_name,
    }))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
