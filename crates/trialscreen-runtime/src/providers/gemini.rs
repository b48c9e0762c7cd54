//! Google Gemini provider.
//!
//! Calls the `generateContent` endpoint with the API key in the
//! `x-goog-api-key` header. System messages become `systemInstruction`;
//! everything else is sent as `contents` with Gemini's `user`/`model` roles.

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    truncate_body, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    TokenUsage,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "Gemini API key",
        ))
    }

    /// Read `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        ApiCredential::from_env(GEMINI_API_KEY_ENV, "Gemini API key").map(Self::with_credential)
    }

    /// `api_key` and `base_url` from config, key falling back to the env.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            GEMINI_API_KEY_ENV,
            "Gemini API key",
        )?;

        let provider = Self::with_credential(credential);
        Ok(match config["base_url"].as_str() {
            Some(url) => provider.with_base_url(url),
            None => provider,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: GEMINI_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Request body for `generateContent`.
    pub fn build_request_body(messages: &[ChatMessage], config: &CompletionConfig) -> JsonValue {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.is_system())
            .map(|m| m.content.as_str())
            .collect();

        let contents: Vec<JsonValue> = messages
            .iter()
            .filter(|m| !m.is_system())
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": config.temperature,
                "maxOutputTokens": config.max_tokens,
            }
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
        }
        body
    }

    /// Concatenate the text parts of the first candidate.
    fn parse_response(
        response: GeminiResponse,
        requested_model: &str,
    ) -> Result<CompletionResponse, ProviderError> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let usage = response.usage_metadata.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
            },
            model: response
                .model_version
                .unwrap_or_else(|| requested_model.to_string()),
            stop_reason: candidate.finish_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = Self::build_request_body(&messages, config);

        tracing::debug!(provider = "gemini", model = %config.model, "Sending generateContent request");

        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", self.credential.expose())
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: truncate_body(&error_body),
            });
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Self::parse_response(parsed, &config.model)
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for [`GeminiProvider`].
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "AIza...",          // Optional, falls back to GEMINI_API_KEY env
///   "base_url": "https://...",     // Optional, custom API root
///   "model": "gemini-2.0-flash"    // Optional, default model
/// }
/// ```
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", GEMINI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Gemini API key required: set 'api_key' in config or {GEMINI_API_KEY_ENV} env"
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        json!({"model": DEFAULT_MODEL})
    }

    fn description(&self) -> &'static str {
        "Google Gemini generateContent provider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_body() {
        let messages = vec![
            ChatMessage::system("Answer in JSON."),
            ChatMessage::user("Screen patient 101"),
        ];
        let config = CompletionConfig::for_model("gemini-2.0-flash");
        let body = GeminiProvider::build_request_body(&messages, &config);

        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Screen patient 101");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Answer in JSON.");
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_build_request_body_without_system() {
        let messages = vec![ChatMessage::user("hi"), ChatMessage::assistant("{}")];
        let body = GeminiProvider::build_request_body(&messages, &CompletionConfig::default());
        assert!(body.get("systemInstruction").is_none());
        assert_eq!(body["contents"][1]["role"], "model");
    }

    #[test]
    fn test_parse_response_joins_text_parts() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"decision\":"}, {"text": "\"ELIGIBLE\"}"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 812, "candidatesTokenCount": 96, "totalTokenCount": 908},
            "modelVersion": "gemini-2.0-flash-001"
        });
        let parsed: GeminiResponse = serde_json::from_value(raw).unwrap();
        let response = GeminiProvider::parse_response(parsed, "gemini-2.0-flash").unwrap();

        assert_eq!(response.content, r#"{"decision":"ELIGIBLE"}"#);
        assert_eq!(response.usage.total(), 908);
        assert_eq!(response.model, "gemini-2.0-flash-001");
        assert_eq!(response.stop_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let parsed: GeminiResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(matches!(
            GeminiProvider::parse_response(parsed, "gemini-2.0-flash"),
            Err(ProviderError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_response_blank_text() {
        let parsed: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "  "}]}, "finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();
        assert!(matches!(
            GeminiProvider::parse_response(parsed, "m"),
            Err(ProviderError::EmptyResponse)
        ));
    }

    #[test]
    fn test_endpoint_and_base_url() {
        let provider = GeminiProvider::new("k").with_base_url("http://localhost:8080/v1beta/");
        assert_eq!(
            provider.endpoint("gemini-2.0-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_factory_create_and_validate() {
        let factory = GeminiProviderFactory;
        assert_eq!(factory.provider_type(), "gemini");
        assert_eq!(factory.default_config()["model"], "gemini-2.0-flash");

        let provider = factory.create(&json!({"api_key": "test-key"})).unwrap();
        assert_eq!(provider.name(), "gemini");

        let bad = json!({"api_key": "test-key", "base_url": "ftp://nope"});
        assert!(factory.validate_config(&bad).is_err());
    }

    #[test]
    fn test_from_config_tracks_source() {
        let provider = GeminiProvider::from_config(&json!({
            "api_key": "config-key",
            "base_url": "https://proxy.example.com/v1beta"
        }))
        .unwrap();
        assert_eq!(provider.credential.source(), CredentialSource::Config);
        assert_eq!(provider.credential.expose(), "config-key");
        assert_eq!(provider.base_url, "https://proxy.example.com/v1beta");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "AIza-super-secret-key-12345";
        let provider = GeminiProvider::new(secret_key);

        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key), "API key was exposed in Debug output!");
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(GeminiProvider::new("key").health_check().await);
        assert!(!GeminiProvider::new("").health_check().await);
    }
}
