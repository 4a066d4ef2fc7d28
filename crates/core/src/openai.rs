use crate::config::{OpenAiConfig, CHAT_API_VERSION, EMBEDDINGS_API_VERSION};
use crate::error::{ChatError, EmbeddingError};
use crate::models::{ChatTurn, CompletionParams};
use crate::traits::{ChatCompletion, EmbeddingClient};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;

/// Client for the embeddings and chat-completions deployments of one Azure
/// OpenAI resource.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    embedding_deployment: Option<String>,
    chat_deployment: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatTurn],
    #[serde(flatten)]
    params: &'a CompletionParams,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            embedding_deployment: config.embedding_deployment.clone(),
            chat_deployment: config.chat_deployment.clone(),
        }
    }

    fn deployment_url(
        &self,
        deployment: &str,
        operation: &str,
        api_version: &str,
    ) -> Result<Url, url::ParseError> {
        let mut url = self
            .endpoint
            .join(&format!("openai/deployments/{deployment}/{operation}"))?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }
}

#[async_trait]
impl EmbeddingClient for AzureOpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let deployment = self
            .embedding_deployment
            .as_deref()
            .ok_or(EmbeddingError::MissingDeployment)?;
        let url = self.deployment_url(deployment, "embeddings", EMBEDDINGS_API_VERSION)?;

        let response = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: text })
            .send()
            .await?;

        read_embedding(response).await
    }
}

#[async_trait]
impl ChatCompletion for AzureOpenAiClient {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        params: &CompletionParams,
    ) -> Result<String, ChatError> {
        let url =
            self.deployment_url(&self.chat_deployment, "chat/completions", CHAT_API_VERSION)?;

        let response = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .json(&ChatRequest {
                messages: turns,
                params,
            })
            .send()
            .await?;

        read_completion(response).await
    }
}

/// Splits off a non-success response as its status code and body text.
async fn error_status(response: Response) -> Result<Response, (u16, String)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err((status.as_u16(), body))
}

async fn read_embedding(response: Response) -> Result<Vec<f32>, EmbeddingError> {
    let response = error_status(response)
        .await
        .map_err(|(status, body)| EmbeddingError::Status { status, body })?;

    let payload: EmbeddingResponse = response.json().await?;
    payload
        .data
        .into_iter()
        .next()
        .map(|data| data.embedding)
        .ok_or(EmbeddingError::EmptyResponse)
}

async fn read_completion(response: Response) -> Result<String, ChatError> {
    let response = error_status(response)
        .await
        .map_err(|(status, body)| ChatError::Status { status, body })?;

    let payload: ChatResponse = response.json().await?;
    payload
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default().trim().to_string())
        .ok_or(ChatError::NoChoices)
}
