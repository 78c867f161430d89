//! Client for one Studio endpoint's queue protocol.
//!
//! One attempt runs strictly in order: optional reference upload, `queue/join`,
//! the `queue/data` event stream until `process_completed`, artifact selection,
//! then the download. Each stage has its own timeout and its own error variant.

use std::time::Duration;

use futures::StreamExt;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    multipart::{Form, Part},
    Client, Response,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StageTimeouts;
use crate::endpoint::EndpointDescriptor;
use crate::error::{truncate_diagnostic, AttemptError};
use crate::selector::{resolve_download_url, select_artifact};
use crate::sse::{SseDecoder, StreamEvent};
use crate::voice::VoiceSelector;

/// Anything smaller is not real audio.
pub const MIN_AUDIO_SIZE: usize = 100;

/// Type signature of the `data` tuple the synthesis function expects.
pub const DATA_TYPES: [&str; 7] = [
    "dropdown", "textbox", "checkbox", "radio", "dropdown", "audio", "textbox",
];

const STUDIO_TOKEN_HEADER: &str = "X-Studio-Token";

/// Caller-supplied voice sample for the `upload` reference mode.
#[derive(Clone)]
pub struct ReferenceAudio {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub text: String,
}

impl std::fmt::Debug for ReferenceAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceAudio")
            .field("bytes", &self.bytes.len())
            .field("filename", &self.filename)
            .field("text", &self.text)
            .finish()
    }
}

/// What to synthesize. The session id is minted per attempt, never shared
/// between endpoints.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub text: String,
    pub voice: VoiceSelector,
    pub split_sentence: bool,
    pub reference: Option<ReferenceAudio>,
}

/// Downloaded audio plus where it came from.
#[derive(Clone)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub url: String,
    pub orig_name: Option<String>,
    pub endpoint: String,
}

impl std::fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("bytes", &self.bytes.len())
            .field("url", &self.url)
            .field("orig_name", &self.orig_name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Serialize)]
struct JoinPayload<'a> {
    fn_index: u32,
    trigger_id: u32,
    session_hash: &'a str,
    #[serde(rename = "dataType")]
    data_type: [&'static str; 7],
    data: JoinData<'a>,
}

// character, text, split flag, reference mode, preset, uploaded paths, reference text
type JoinData<'a> = (
    &'a str,
    &'a str,
    bool,
    &'static str,
    &'a str,
    Option<&'a [String]>,
    Option<&'a str>,
);

impl<'a> JoinPayload<'a> {
    fn new(
        endpoint: &EndpointDescriptor,
        job: &'a SynthesisJob,
        session_hash: &'a str,
        uploaded: Option<&'a [String]>,
    ) -> Self {
        let (mode, reference_text) = match (uploaded, &job.reference) {
            (Some(_), Some(reference)) => ("upload", Some(reference.text.as_str())),
            _ => ("preset", None),
        };
        Self {
            fn_index: endpoint.fn_index,
            trigger_id: endpoint.trigger_id,
            session_hash,
            data_type: DATA_TYPES,
            data: (
                job.voice.character.as_str(),
                job.text.as_str(),
                job.split_sentence,
                mode,
                job.voice.preset.as_str(),
                uploaded,
                reference_text,
            ),
        }
    }
}

/// Token header plus the equivalent cookie, sent on every request.
pub(crate) fn studio_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(token) {
        headers.insert(STUDIO_TOKEN_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("studio_token={token}")) {
        headers.insert(header::COOKIE, value);
    }
    headers
}

/// Shared HTTP client. With `trust_env` off, system proxy settings are ignored.
pub fn build_http_client(trust_env: bool) -> reqwest::Result<Client> {
    let builder = Client::builder();
    let builder = if trust_env { builder } else { builder.no_proxy() };
    builder.build()
}

fn new_session_hash() -> String {
    Uuid::new_v4().simple().to_string()[..11].to_string()
}

fn new_upload_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn describe_transport(e: &reqwest::Error, limit: Duration) -> String {
    if e.is_timeout() {
        format!("timed out after {limit:?}")
    } else {
        e.to_string()
    }
}

/// `"{status} {body}"` for a non-2xx response, body truncated.
async fn describe_status(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{status} {}", truncate_diagnostic(&body))
}

pub fn validate_audio(bytes: &[u8]) -> Result<(), AttemptError> {
    if bytes.len() < MIN_AUDIO_SIZE {
        return Err(AttemptError::InvalidArtifact {
            len: bytes.len(),
            min: MIN_AUDIO_SIZE,
        });
    }
    Ok(())
}

fn check_terminal(event: StreamEvent) -> Result<StreamEvent, AttemptError> {
    if !event.succeeded() {
        return Err(AttemptError::JobFailed(truncate_diagnostic(&event.raw.to_string())));
    }
    if event.output_data().is_empty() {
        return Err(AttemptError::EmptyOutput(truncate_diagnostic(&event.raw.to_string())));
    }
    Ok(event)
}

/// Upload replies are a list of server-side handles; the first must be a string.
fn parse_upload_reply(body: &Value) -> Option<Vec<String>> {
    let items = body.as_array()?;
    items.first()?.as_str()?;
    Some(items.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

#[derive(Debug, Clone)]
pub struct JobClient {
    http: Client,
    timeouts: StageTimeouts,
}

impl JobClient {
    pub fn new(http: Client, timeouts: StageTimeouts) -> Self {
        Self { http, timeouts }
    }

    /// Run one complete attempt of `job` against `endpoint`.
    pub async fn run(
        &self,
        endpoint: &EndpointDescriptor,
        job: &SynthesisJob,
    ) -> Result<AudioArtifact, AttemptError> {
        let uploaded = match &job.reference {
            Some(reference) => Some(self.upload_reference(endpoint, reference).await?),
            None => None,
        };

        let session_hash = new_session_hash();
        self.join(endpoint, job, &session_hash, uploaded.as_deref()).await?;
        let event = self.await_completion(endpoint, &session_hash).await?;

        let candidate = select_artifact(event.output_data())
            .ok_or_else(|| AttemptError::EmptyOutput(truncate_diagnostic(&event.raw.to_string())))?;
        let url = resolve_download_url(&candidate, &endpoint.base_url)
            .ok_or_else(|| AttemptError::UnresolvableArtifact(format!("{candidate:?}")))?;
        debug!("Endpoint {} produced artifact {url}", endpoint.name);

        let bytes = self.download(endpoint, &url).await?;
        validate_audio(&bytes)?;
        info!(
            "Endpoint {} returned {} bytes of audio for session {session_hash}",
            endpoint.name,
            bytes.len()
        );

        Ok(AudioArtifact {
            bytes,
            url,
            orig_name: candidate.orig_name().map(str::to_string),
            endpoint: endpoint.name.clone(),
        })
    }

    /// `POST {base}/gradio_api/upload?upload_id=..` with the sample as `files`.
    pub async fn upload_reference(
        &self,
        endpoint: &EndpointDescriptor,
        reference: &ReferenceAudio,
    ) -> Result<Vec<String>, AttemptError> {
        let limit = self.timeouts.upload;
        let part = Part::bytes(reference.bytes.clone()).file_name(reference.filename.clone());
        let upload_id = new_upload_id();
        let response = self
            .http
            .post(endpoint.api_url("upload"))
            .query(&[("upload_id", upload_id.as_str())])
            .headers(studio_headers(&endpoint.studio_token))
            .multipart(Form::new().part("files", part))
            .timeout(limit)
            .send()
            .await
            .map_err(|e| AttemptError::Upload(describe_transport(&e, limit)))?;

        if !response.status().is_success() {
            return Err(AttemptError::Upload(describe_status(response).await));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Upload(describe_transport(&e, limit)))?;
        parse_upload_reply(&body)
            .ok_or_else(|| AttemptError::Upload(format!("unexpected reply {}", truncate_diagnostic(&body.to_string()))))
    }

    async fn join(
        &self,
        endpoint: &EndpointDescriptor,
        job: &SynthesisJob,
        session_hash: &str,
        uploaded: Option<&[String]>,
    ) -> Result<(), AttemptError> {
        let limit = self.timeouts.join;
        let payload = JoinPayload::new(endpoint, job, session_hash, uploaded);
        let t = chrono::Utc::now().timestamp_millis().to_string();
        let response = self
            .http
            .post(endpoint.api_url("queue/join"))
            .query(&[
                ("t", t.as_str()),
                ("__theme", "light"),
                ("backend_url", "/"),
                ("studio_token", endpoint.studio_token.as_str()),
            ])
            .headers(studio_headers(&endpoint.studio_token))
            .header("X-Gradio-User", "app")
            .json(&payload)
            .timeout(limit)
            .send()
            .await
            .map_err(|e| AttemptError::Join(describe_transport(&e, limit)))?;

        if !response.status().is_success() {
            return Err(AttemptError::Join(describe_status(response).await));
        }
        Ok(())
    }

    /// Wait for the terminal event, bounded by the stream timeout.
    async fn await_completion(
        &self,
        endpoint: &EndpointDescriptor,
        session_hash: &str,
    ) -> Result<StreamEvent, AttemptError> {
        let limit = self.timeouts.stream;
        match tokio::time::timeout(limit, self.read_stream(endpoint, session_hash)).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::NoTerminalEvent(format!(
                "stream timed out after {limit:?}"
            ))),
        }
    }

    async fn read_stream(
        &self,
        endpoint: &EndpointDescriptor,
        session_hash: &str,
    ) -> Result<StreamEvent, AttemptError> {
        let response = self
            .http
            .get(endpoint.api_url("queue/data"))
            .query(&[
                ("session_hash", session_hash),
                ("studio_token", endpoint.studio_token.as_str()),
            ])
            .headers(studio_headers(&endpoint.studio_token))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| AttemptError::Stream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AttemptError::Stream(describe_status(response).await));
        }

        let mut decoder = SseDecoder::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| AttemptError::Stream(format!("read failed: {e}")))?;
            for event in decoder.push(&chunk)? {
                if event.is_terminal() {
                    return check_terminal(event);
                }
                debug!("Endpoint {} event {:?}", endpoint.name, event.msg());
            }
        }

        Err(AttemptError::NoTerminalEvent(
            "stream closed before process_completed".to_string(),
        ))
    }

    async fn download(&self, endpoint: &EndpointDescriptor, url: &str) -> Result<Vec<u8>, AttemptError> {
        let limit = self.timeouts.download;
        let response = self
            .http
            .get(url)
            .headers(studio_headers(&endpoint.studio_token))
            .timeout(limit)
            .send()
            .await
            .map_err(|e| AttemptError::Download(describe_transport(&e, limit)))?;

        if !response.status().is_success() {
            return Err(AttemptError::Download(describe_status(response).await));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Download(describe_transport(&e, limit)))?;
        Ok(bytes.to_vec())
    }
}
