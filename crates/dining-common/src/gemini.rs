/// Client for the Gemini `generateContent` REST endpoint.
///
/// Only the text-in/text-out subset is modelled. The configured model list is
/// ordered by preference; callers decide how to walk it.
use serde::{Deserialize, Serialize};

use crate::error::{parse_json_response, LlmClientError};

const DEFAULT_MODELS: [&str; 4] = [
    "gemini-2.5-flash",
    "gemini-pro-latest",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
];

#[derive(Clone, Debug)]
pub struct GeminiClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub models: Vec<String>,
    pub max_error_body_bytes: usize,
}

impl GeminiClientConfig {
    /// Reads `GEMINI_BASE_URL`, `GEMINI_API_KEY` and `GEMINI_MODELS` (comma separated).
    pub fn from_env() -> Self {
        let base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let models = std::env::var("GEMINI_MODELS")
            .ok()
            .map(|raw| parse_model_list(&raw))
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| DEFAULT_MODELS.iter().map(|m| m.to_string()).collect());

        let max_error_body_bytes = std::env::var("GEMINI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            models,
            max_error_body_bytes,
        }
    }
}

/// Split a comma separated model list, accepting both `gemini-x` and `models/gemini-x`.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|m| m.trim())
        .map(|m| m.strip_prefix("models/").unwrap_or(m))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiClientConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, LlmClientError> {
        let http = reqwest::Client::builder()
            .user_agent("dining-api/gemini")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GeminiClientConfig {
        &self.config
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, LlmClientError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmClientError::MissingApiKey("gemini"))?;
        let model = model.strip_prefix("models/").unwrap_or(model);
        let url = format!("{}/models/{model}:generateContent", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;
        parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    /// Single-turn prompt; returns the concatenated text of the first candidate.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, LlmClientError> {
        let response = self
            .generate_content(model, &GenerateContentRequest::from_prompt(prompt))
            .await?;
        response.text().ok_or(LlmClientError::EmptyCompletion)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(GeminiClientConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            models: vec!["gemini-test".to_string()],
            max_error_body_bytes: 1024,
        })
        .unwrap()
    }

    #[test]
    fn model_list_strips_prefix_and_blanks() {
        assert_eq!(
            parse_model_list("models/gemini-2.5-flash, gemini-2.0-flash,,"),
            vec!["gemini-2.5-flash".to_string(), "gemini-2.0-flash".to_string()]
        );
    }

    #[test]
    fn prompt_request_carries_only_contents() {
        let body = serde_json::to_value(GenerateContentRequest::from_prompt("rank")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"contents": [{"role": "user", "parts": [{"text": "rank"}]}]})
        );
    }

    #[tokio::test]
    async fn joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    {"content": {"role": "model", "parts": [{"text": "[{\"name\":"}, {"text": "\"A\"}]"}]}, "finishReason": "STOP"}
                ]
            })))
            .mount(&server)
            .await;

        let text = client(&server.uri(), Some("g-key"))
            .generate_text("models/gemini-test", "rank")
            .await
            .unwrap();
        assert_eq!(text, "[{\"name\":\"A\"}]");
    }

    #[tokio::test]
    async fn no_candidates_is_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": []
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), Some("g-key"))
            .generate_text("gemini-test", "rank")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmClientError::EmptyCompletion));
    }

    #[tokio::test]
    async fn non_json_error_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), Some("g-key"))
            .generate_text("gemini-test", "rank")
            .await
            .unwrap_err();
        match err {
            LlmClientError::UpstreamBody { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
