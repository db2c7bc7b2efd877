use serde::{Deserialize, Serialize};

use crate::error::{parse_json_response, LlmClientError};

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_error_body_bytes: usize,
}

impl OpenAiClientConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        let max_error_body_bytes = std::env::var("OPENAI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_error_body_bytes,
        }
    }
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
///
/// No retries and no per-request timeout: a failed call is reported to the caller,
/// which decides whether another backend should be tried.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, LlmClientError> {
        let http = reqwest::Client::builder()
            .user_agent("dining-api/openai")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiClientConfig {
        &self.config
    }

    pub async fn chat_completions(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmClientError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmClientError::MissingApiKey("openai"))?;
        let url = format!("{}/chat/completions", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;
        parse_json_response(resp, self.config.max_error_body_bytes).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: Option<ChatCompletionUsage>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if the upstream produced any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: Option<u32>,
    pub message: ChatCompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, api_key: Option<&str>) -> OpenAiClientConfig {
        OpenAiClientConfig {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            model: "gpt-test".to_string(),
            max_error_body_bytes: 1024,
        }
    }

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-test".to_string(),
            messages: vec![Message::user("rank these")],
            temperature: Some(0.7),
            max_tokens: Some(2000),
        }
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cmpl-1",
                "choices": [
                    {"index": 0, "message": {"role": "assistant", "content": "[]"}, "finish_reason": "stop"}
                ]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(&server.uri(), Some("sk-test"))).unwrap();
        let resp = client.chat_completions(&request()).await.unwrap();
        assert_eq!(resp.text(), Some("[]"));
    }

    #[tokio::test]
    async fn surfaces_upstream_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "quota exceeded", "type": "rate_limit"}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(&server.uri(), Some("sk-test"))).unwrap();
        let err = client.chat_completions(&request()).await.unwrap_err();
        match err {
            LlmClientError::Upstream { status, message } => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_without_calling_upstream() {
        let client = OpenAiClient::new(config("http://127.0.0.1:9", None)).unwrap();
        let err = client.chat_completions(&request()).await.unwrap_err();
        assert!(matches!(err, LlmClientError::MissingApiKey("openai")));
    }

    #[test]
    fn blank_content_is_not_text() {
        let resp: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "   "}}]
        }))
        .unwrap();
        assert_eq!(resp.text(), None);
    }
}
