//! Fake Studio endpoints served in-process by axum for end-to-end tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use pool_core::{
    protocol::build_http_client, EndpointDescriptor, EndpointPool, JobClient, LoadProber,
    PoolOrchestrator, RankPolicy, RoutingContext, StageTimeouts,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";

#[derive(Clone, Copy, Debug)]
pub enum StatusMode {
    Depth(u32),
    /// Answers only after the probe timeout has long passed.
    Hang,
    Error,
}

/// How one fake endpoint behaves. `{BASE}` in stream chunks is replaced with
/// the endpoint's own address.
#[derive(Clone, Debug)]
pub struct Behavior {
    pub status: StatusMode,
    pub join_status: u16,
    pub stream_chunks: Vec<String>,
    pub chunk_delay: Duration,
    pub hold_open: bool,
    pub download_status: u16,
    pub audio: Vec<u8>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            status: StatusMode::Depth(0),
            join_status: 200,
            stream_chunks: completed_with(json!([{"url": "{BASE}/audio/genie_out.wav"}])),
            chunk_delay: Duration::ZERO,
            hold_open: false,
            download_status: 200,
            audio: wav_bytes(1024),
        }
    }
}

/// A standard event sequence ending in `process_completed` with `data`.
pub fn completed_with(data: Value) -> Vec<String> {
    vec![
        format!("data: {}\n\n", json!({"msg": "estimation", "rank": 0, "queue_size": 1})),
        format!("data: {}\n\n", json!({"msg": "process_starts"})),
        format!(
            "data: {}\n\n",
            json!({"msg": "process_completed", "success": true, "output": {"data": data}})
        ),
    ]
}

pub fn wav_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
    bytes.resize(len, 7);
    bytes
}

#[derive(Default)]
pub struct Hits {
    pub status: AtomicUsize,
    pub joins: Mutex<Vec<(HashMap<String, String>, Value)>>,
    pub data_sessions: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<(HashMap<String, String>, usize)>>,
    pub tokens_seen: Mutex<Vec<Option<String>>>,
}

impl Hits {
    pub fn join_count(&self) -> usize {
        self.joins.lock().unwrap().len()
    }

    pub fn join_bodies(&self) -> Vec<Value> {
        self.joins.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }

    pub fn join_sessions(&self) -> Vec<String> {
        self.join_bodies()
            .iter()
            .map(|b| b["session_hash"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

struct FakeStudio {
    base: String,
    behavior: Behavior,
    hits: Arc<Hits>,
}

pub struct RunningStudio {
    pub name: String,
    pub base: String,
    pub hits: Arc<Hits>,
}

impl RunningStudio {
    pub fn descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor::new(self.name.clone(), self.base.clone(), TOKEN, 3, 19)
    }
}

pub async fn spawn_studio(name: &str, behavior: Behavior) -> RunningStudio {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let hits = Arc::new(Hits::default());
    let studio = Arc::new(FakeStudio {
        base: base.clone(),
        behavior,
        hits: hits.clone(),
    });

    let app = Router::new()
        .route("/gradio_api/queue/status", get(queue_status))
        .route("/gradio_api/queue/join", post(queue_join))
        .route("/gradio_api/queue/data", get(queue_data))
        .route("/gradio_api/upload", post(upload))
        .fallback(download)
        .with_state(studio);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    RunningStudio {
        name: name.to_string(),
        base,
        hits,
    }
}

fn record_token(studio: &FakeStudio, headers: &HeaderMap) {
    let token = headers
        .get("x-studio-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    studio.hits.tokens_seen.lock().unwrap().push(token);
}

async fn queue_status(State(studio): State<Arc<FakeStudio>>, headers: HeaderMap) -> Response {
    studio.hits.status.fetch_add(1, Ordering::SeqCst);
    record_token(&studio, &headers);
    match studio.behavior.status {
        StatusMode::Depth(n) => Json(json!({"queue_size": n, "queue_eta": 0})).into_response(),
        StatusMode::Hang => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"queue_size": 0})).into_response()
        }
        StatusMode::Error => (StatusCode::BAD_GATEWAY, "upstream down").into_response(),
    }
}

async fn queue_join(
    State(studio): State<Arc<FakeStudio>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_token(&studio, &headers);
    studio.hits.joins.lock().unwrap().push((query, body));
    let status = StatusCode::from_u16(studio.behavior.join_status).unwrap();
    if status.is_success() {
        (status, Json(json!({"event_id": "evt-1"}))).into_response()
    } else {
        (status, "queue is full, internal error").into_response()
    }
}

async fn queue_data(
    State(studio): State<Arc<FakeStudio>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let session = query.get("session_hash").cloned().unwrap_or_default();
    studio.hits.data_sessions.lock().unwrap().push(session);

    let base = studio.base.clone();
    let delay = studio.behavior.chunk_delay;
    let chunks: Vec<String> = studio
        .behavior
        .stream_chunks
        .iter()
        .map(|c| c.replace("{BASE}", &base))
        .collect();

    let body = futures::stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(chunk)
    });
    let body = if studio.behavior.hold_open {
        Body::from_stream(body.chain(futures::stream::pending()))
    } else {
        Body::from_stream(body)
    };

    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn upload(
    State(studio): State<Arc<FakeStudio>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    studio.hits.uploads.lock().unwrap().push((query, body.len()));
    Json(json!(["/tmp/gradio/uploaded/ref.wav"])).into_response()
}

async fn download(State(studio): State<Arc<FakeStudio>>, uri: Uri) -> Response {
    studio.hits.downloads.lock().unwrap().push(uri.path().to_string());
    let status = StatusCode::from_u16(studio.behavior.download_status).unwrap();
    (status, studio.behavior.audio.clone()).into_response()
}

pub fn fast_timeouts() -> StageTimeouts {
    StageTimeouts {
        status: Duration::from_millis(300),
        upload: Duration::from_secs(2),
        join: Duration::from_secs(2),
        stream: Duration::from_secs(2),
        download: Duration::from_secs(2),
    }
}

pub fn orchestrator_for(
    studios: &[&RunningStudio],
    timeouts: StageTimeouts,
    routing: RoutingContext,
) -> PoolOrchestrator {
    let pool = EndpointPool::from_endpoints(studios.iter().map(|s| s.descriptor()).collect()).unwrap();
    let http = build_http_client(false).unwrap();
    PoolOrchestrator::new(
        pool,
        LoadProber::new(http.clone(), timeouts.status),
        JobClient::new(http, timeouts),
        RankPolicy::default(),
        routing,
    )
}
