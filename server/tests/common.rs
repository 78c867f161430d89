//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use pool_core::{AudioArtifact, EndpointStatus, SpeechBackend, SpeechOutcome, SpeechRequest};
use server::{app, config::ServerConfig, AppState};
use tower::ServiceExt;

/// Canned backend that records what the router hands it.
pub struct StubBackend {
    pub succeed: bool,
    pub requests: Mutex<Vec<SpeechRequest>>,
}

impl StubBackend {
    pub fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            succeed,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SpeechBackend for StubBackend {
    async fn synthesize(&self, request: SpeechRequest) -> SpeechOutcome {
        let voice = request.voice.clone().unwrap_or_else(|| "mika:普通".to_string());
        self.requests.lock().unwrap().push(request);
        if self.succeed {
            SpeechOutcome {
                success: true,
                message: "synthesized on stub".to_string(),
                voice,
                artifact: Some(AudioArtifact {
                    bytes: b"RIFF-audio".to_vec(),
                    url: "http://stub/gradio_api/file=/tmp/gradio/genie_1.wav".to_string(),
                    orig_name: Some("genie_1.wav".to_string()),
                    endpoint: "stub".to_string(),
                }),
            }
        } else {
            SpeechOutcome {
                success: false,
                message: "all endpoints failed: stub: join rejected: HTTP 500".to_string(),
                voice,
                artifact: None,
            }
        }
    }

    async fn status(&self) -> Vec<EndpointStatus> {
        vec![
            EndpointStatus {
                name: "a".to_string(),
                queue_size: Some(0),
                in_flight: false,
            },
            EndpointStatus {
                name: "b".to_string(),
                queue_size: None,
                in_flight: true,
            },
        ]
    }
}

/// Create a test app instance around `backend`
pub fn create_test_app(backend: Arc<StubBackend>) -> Router {
    let state = AppState {
        backend,
        config: ServerConfig::default(),
    };
    app(state).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
