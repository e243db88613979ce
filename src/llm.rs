//! OpenAI-compatible chat-completions client.
//!
//! One non-streaming request per call. Groq and OpenAI authenticate with a
//! bearer token; Azure OpenAI routes through a deployment URL and an
//! `api-key` header.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{non_empty_env, LlmConfig};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
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

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Something that can produce a connected [`ChatModel`]. Ingest calls this
/// once per successful index build.
pub trait LlmConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ChatModel>>;
}

impl LlmConnector for LlmConfig {
    fn connect(&self) -> Result<Arc<dyn ChatModel>> {
        create_chat_model(self)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Auth {
    Bearer,
    AzureKey,
}

pub struct HttpChatModel {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    api_key: String,
    model: String,
    /// Azure encodes the model in the deployment URL instead of the body.
    send_model: bool,
    temperature: f32,
}

impl HttpChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = non_empty_env(&config.api_key_env).ok_or_else(|| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;
        let (url, auth) = endpoint_for(config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            send_model: auth == Auth::Bearer,
            auth,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatCompletionRequest {
            model: self.send_model.then_some(self.model.as_str()),
            messages,
            temperature: self.temperature,
        };

        let request = self.client.post(&self.url).json(&body);
        let request = match self.auth {
            Auth::Bearer => request.header("Authorization", format!("Bearer {}", self.api_key)),
            Auth::AzureKey => request.header("api-key", &self.api_key),
        };

        debug!(model = %self.model, messages = messages.len(), "chat completion request");
        let response = request.send().await.context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("LLM API error {}: {}", status, body_text);
        }

        let text = response.text().await?;
        parse_chat_response(&text)
    }
}

/// URL and auth scheme for the configured provider.
fn endpoint_for(config: &LlmConfig) -> Result<(String, Auth)> {
    let base = |default: &str| {
        config
            .base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    };

    match config.provider.as_str() {
        "groq" => Ok((format!("{}/chat/completions", base(GROQ_BASE_URL)), Auth::Bearer)),
        "openai" => Ok((format!("{}/chat/completions", base(OPENAI_BASE_URL)), Auth::Bearer)),
        "azure" => {
            let endpoint = config
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("llm.base_url required for azure"))?
                .trim_end_matches('/');
            let deployment = config
                .deployment
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("llm.deployment required for azure"))?;
            Ok((
                format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    endpoint, deployment, config.api_version
                ),
                Auth::AzureKey,
            ))
        }
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// The first choice's message content.
pub fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).context("Invalid chat completion response")?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: empty choices"))
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(HttpChatModel::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groq_endpoint_default() {
        let (url, auth) = endpoint_for(&LlmConfig::default()).unwrap();
        assert_eq!(url, "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(auth, Auth::Bearer);
    }

    #[test]
    fn base_url_override_trims_slash() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            base_url: Some("http://localhost:1234/v1/".to_string()),
            ..LlmConfig::default()
        };
        let (url, _) = endpoint_for(&config).unwrap();
        assert_eq!(url, "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn azure_endpoint_uses_deployment() {
        let config = LlmConfig {
            provider: "azure".to_string(),
            base_url: Some("https://acme.openai.azure.com".to_string()),
            deployment: Some("gpt4o".to_string()),
            ..LlmConfig::default()
        };
        let (url, auth) = endpoint_for(&config).unwrap();
        assert_eq!(
            url,
            "https://acme.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2023-05-15"
        );
        assert_eq!(auth, Auth::AzureKey);
    }

    #[test]
    fn missing_key_fails_to_connect() {
        let config = LlmConfig {
            api_key_env: "CHX_TEST_UNSET_LLM_KEY".to_string(),
            ..LlmConfig::default()
        };
        let err = config.connect().err().unwrap();
        assert!(err.to_string().contains("CHX_TEST_UNSET_LLM_KEY"));
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"42"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "42");
    }

    #[test]
    fn empty_choices_is_error() {
        assert!(parse_chat_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_chat_response("not json").is_err());
    }

    #[test]
    fn request_omits_model_when_unset() {
        let messages = [ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: None,
            messages: &messages,
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
