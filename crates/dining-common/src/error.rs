/// Error type shared by the generative-text HTTP clients.
///
/// Both upstreams (Gemini and OpenAI-compatible hosts) wrap failures in an
/// `{"error": {"message": ...}}` envelope, so one error shape covers both.
/// Service crates wrap `LlmClientError` via `#[from]`.
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },

    #[error("no API key configured for {0}")]
    MissingApiKey(&'static str),

    #[error("upstream returned no completion text")]
    EmptyCompletion,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
}

/// Decode a successful JSON body, or turn a non-success response into an upstream error.
pub(crate) async fn parse_json_response<T: for<'de> Deserialize<'de>>(
    resp: reqwest::Response,
    max_error_body_bytes: usize,
) -> Result<T, LlmClientError> {
    if !resp.status().is_success() {
        return Err(upstream_error(resp, max_error_body_bytes).await);
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) async fn upstream_error(
    resp: reqwest::Response,
    max_error_body_bytes: usize,
) -> LlmClientError {
    let status = resp.status();
    let body = read_limited_text(resp, max_error_body_bytes).await;
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown upstream error".to_string());
        return LlmClientError::Upstream { status, message };
    }
    LlmClientError::UpstreamBody { status, body }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}
