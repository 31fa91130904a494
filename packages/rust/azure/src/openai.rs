//! Azure OpenAI REST client: chat completions and embeddings.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use archdoc_core::services::{Embedder, GenerationRequest, TextGenerator};
use archdoc_shared::{ArchDocError, OpenAiConfig, Result};

use crate::http::{api_url, build_client, post_json};

#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    api_version: String,
    chat_deployment: String,
    embedding_deployment: String,
}

impl AzureOpenAiClient {
    pub fn new(config: &OpenAiConfig, api_key: String) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ArchDocError::config("openai.endpoint is not set"))?;
        Ok(Self {
            client: build_client()?,
            endpoint,
            api_key,
            api_version: config.api_version.clone(),
            chat_deployment: config.chat_deployment.clone(),
            embedding_deployment: config.embedding_deployment.clone(),
        })
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> Result<Url> {
        api_url(
            &self.endpoint,
            &format!("openai/deployments/{deployment}/{operation}"),
            &self.api_version,
        )
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Service impls
// ---------------------------------------------------------------------------

impl TextGenerator for AzureOpenAiClient {
    #[instrument(skip_all, fields(label = %request.label, deployment = %self.chat_deployment))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = self.deployment_url(&self.chat_deployment, "chat/completions")?;
        let body = ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response: ChatResponse = post_json(&self.client, url, &self.api_key, &body).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ArchDocError::Generation(format!("{}: completion had no content", request.label))
            })?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

impl Embedder for AzureOpenAiClient {
    #[instrument(skip_all, fields(deployment = %self.embedding_deployment, chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.deployment_url(&self.embedding_deployment, "embeddings")?;
        let response: EmbeddingResponse =
            post_json(&self.client, url, &self.api_key, &EmbeddingRequest { input: text }).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ArchDocError::Embedding("response contained no embedding".into()))?;

        debug!(dimensions = vector.len(), "embedding received");
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> AzureOpenAiClient {
        let config = OpenAiConfig {
            endpoint: Some(Url::parse(&server.uri()).unwrap()),
            ..Default::default()
        };
        AzureOpenAiClient::new(&config, "test-key".into()).unwrap()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            label: "draft:hosting".into(),
            system: "You write architecture documents.".into(),
            user: "Write the hosting section.".into(),
            temperature: 0.4,
            max_tokens: 4000,
        }
    }

    #[tokio::test]
    async fn chat_completion_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4/chat/completions"))
            .and(query_param("api-version", "2024-02-15-preview"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {"role": "system", "content": "You write architecture documents."},
                    {"role": "user", "content": "Write the hosting section."}
                ],
                "max_tokens": 4000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "### 9.a. Hosting"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).generate(&request()).await.unwrap();
        assert_eq!(text, "### 9.a. Hosting");
    }

    #[tokio::test]
    async fn http_error_is_network_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
            .mount(&server)
            .await;

        let err = client(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, ArchDocError::Network(_)));
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("Rate limit exceeded"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_completion_is_generation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, ArchDocError::Generation(_)));
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = client(&server).embed("query").await.unwrap_err();
        assert!(matches!(err, ArchDocError::Parse { .. }));
    }

    #[tokio::test]
    async fn embedding_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/text-embedding-ada-002/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": "rg naming"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.25, -0.5, 1.0], "index": 0}]
            })))
            .mount(&server)
            .await;

        let vector = client(&server).embed("rg naming").await.unwrap();
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn empty_embedding_is_embedding_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let err = client(&server).embed("query").await.unwrap_err();
        assert!(matches!(err, ArchDocError::Embedding(_)));
    }

    #[test]
    fn missing_endpoint_is_config_error() {
        let err = AzureOpenAiClient::new(&OpenAiConfig::default(), "k".into()).unwrap_err();
        assert!(matches!(err, ArchDocError::Config { .. }));
    }
}
