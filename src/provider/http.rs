//! Shared HTTP client, SSE decoding, and status mapping.

use std::sync::OnceLock;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};

use crate::error::{AgentError, Result};

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No overall request timeout: streams can legitimately run for minutes.
/// Stalls are caught by the turn runner's idle timeout instead.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Headers for the Anthropic Messages API.
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Payload of an SSE `data:` line, or `None` for other lines and `[DONE]`.
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Reassembles SSE `data:` payloads from arbitrary body chunks.
///
/// Bytes are buffered until a full line arrives, so a multi-byte
/// character split across chunks decodes intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed one chunk and return the payloads of the lines it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(line_end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=line_end).collect();
            if let Some(data) = line_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Payload of a trailing line the body did not terminate.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        line_payload(&rest)
    }
}

fn line_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    parse_sse_data(line).map(str::to_string)
}

/// Split a streaming response body into SSE `data:` payloads.
///
/// Comments, `event:` lines and the `[DONE]` sentinel are skipped. A
/// transport failure is yielded once and ends the stream.
pub fn sse_data_stream(resp: reqwest::Response) -> BoxStream<'static, Result<String>> {
    let byte_stream = resp.bytes_stream();
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::default();
        futures::pin_mut!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(AgentError::Network(e));
                    break;
                }
            };
            for data in decoder.push(&chunk) {
                yield Ok(data);
            }
        }

        if let Some(data) = decoder.finish() {
            yield Ok(data);
        }
    };
    Box::pin(stream)
}

/// Turn a non-success response into an error, reading `Retry-After` first.
pub async fn error_from_response(resp: reqwest::Response) -> AgentError {
    let status = resp.status().as_u16();
    let header_retry = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64);
    let body = resp.text().await.unwrap_or_default();
    match status_to_error(status, &body) {
        AgentError::RateLimited { retry_after_ms } => AgentError::RateLimited {
            retry_after_ms: header_retry.or(retry_after_ms),
        },
        other => other,
    }
}

/// Map an HTTP status and body to an error.
pub fn status_to_error(status: u16, body: &str) -> AgentError {
    match status {
        401 | 403 => AgentError::Authentication(body.to_string()),
        429 => AgentError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => AgentError::api(status, body),
    }
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}
