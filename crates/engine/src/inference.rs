//! Hosted model client for embeddings and generation (Gemini REST API).

use crate::{Settings, StartupError};
use async_trait::async_trait;
use docchat_core::{ChatMessage, EmbeddingService, GenerationService, Role, ServiceError};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_BATCH_REQUESTS: usize = 100;
const CONDENSE_TEMPERATURE: f32 = 0.0;
const NO_CONTEXT: &str = "(no matching documentation found)";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    system_prompt: Option<String>,
    temperature: f32,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, StartupError> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            system_prompt: None,
            temperature: 0.5,
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
        Ok(Self::new(settings.api_key.clone())?
            .with_base_url(settings.gemini_base_url.clone())
            .with_models(settings.chat_model.clone(), settings.embed_model.clone())
            .with_system_prompt(settings.system_prompt.clone())
            .with_temperature(settings.temperature)
            .with_timeout(settings.request_timeout)?)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, chat: impl Into<String>, embed: impl Into<String>) -> Self {
        self.chat_model = strip_models_prefix(chat.into());
        self.embed_model = strip_models_prefix(embed.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, StartupError> {
        self.client = Client::builder().timeout(timeout).build()?;
        self.timeout = timeout;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the API answers for the configured chat model
    pub async fn health(&self) -> Result<bool, ServiceError> {
        let url = format!("{}/models/{}", self.base_url, self.chat_model);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(response.status().is_success())
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        check_status(response)
            .await?
            .json::<R>()
            .await
            .map_err(|e| self.transport_error(e))
    }

    async fn complete(
        &self,
        contents: Vec<Content>,
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.chat_model);
        let request = GenerateRequest {
            system_instruction: system_prompt.map(|text| Content {
                role: None,
                parts: vec![Part { text: text.to_string() }],
            }),
            contents,
            generation_config: GenerationConfig { temperature },
        };

        let response: GenerateResponse = self.post_json(&url, &request).await?;
        extract_text(response)
    }

    fn embed_request(&self, text: &str, is_query: bool) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.embed_model),
            content: Content {
                role: None,
                parts: vec![Part { text: text.to_string() }],
            },
            task_type: if is_query {
                "RETRIEVAL_QUERY"
            } else {
                "RETRIEVAL_DOCUMENT"
            },
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else if err.is_decode() {
            ServiceError::ServiceUnavailable(format!("Malformed response: {}", err))
        } else {
            ServiceError::ServiceUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingService for GeminiClient {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str, is_query: bool) -> Result<Vec<f32>, ServiceError> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.embed_model);
        let request = self.embed_request(text, is_query);
        let response: EmbedResponse = self.post_json(&url, &request).await?;
        Ok(response.embedding.values)
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(
        &self,
        texts: &[String],
        is_query: bool,
    ) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.base_url, self.embed_model
        );
        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(MAX_BATCH_REQUESTS) {
            let request = BatchEmbedRequest {
                requests: chunk
                    .iter()
                    .map(|text| self.embed_request(text, is_query))
                    .collect(),
            };
            let response: BatchEmbedResponse = self.post_json(&url, &request).await?;
            if response.embeddings.len() != chunk.len() {
                return Err(ServiceError::InvalidInput(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    response.embeddings.len()
                )));
            }
            results.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        debug!("Embedded {} texts", results.len());
        Ok(results)
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    #[instrument(skip(self, message, history), fields(history = history.len()))]
    async fn condense(&self, message: &str, history: &[ChatMessage]) -> Result<String, ServiceError> {
        let prompt = condense_prompt(message, history);
        let contents = vec![Content::user(prompt)];
        let condensed = self.complete(contents, None, CONDENSE_TEMPERATURE).await?;
        debug!("Condensed question: {}", condensed.trim());
        Ok(condensed.trim().to_string())
    }

    #[instrument(skip(self, query, context, history), fields(context = context.len()))]
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        history: &[ChatMessage],
    ) -> Result<String, ServiceError> {
        let mut turns: Vec<(&'static str, String)> = history
            .iter()
            .skip_while(|m| m.role == Role::Assistant)
            .map(|m| (api_role(m.role), m.content.clone()))
            .collect();
        turns.push(("user", context_prompt(query, context)));

        let contents = merge_turns(turns);
        self.complete(contents, self.system_prompt.as_deref(), self.temperature)
            .await
    }
}

fn strip_models_prefix(model: String) -> String {
    model
        .strip_prefix("models/")
        .map(str::to_string)
        .unwrap_or(model)
}

fn api_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Collapse consecutive same-role turns; the API expects alternating roles.
fn merge_turns(turns: Vec<(&'static str, String)>) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::with_capacity(turns.len());
    for (role, text) in turns {
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => {
                if let Some(part) = last.parts.first_mut() {
                    part.text.push_str("\n\n");
                    part.text.push_str(&text);
                }
            }
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![Part { text }],
            }),
        }
    }
    contents
}

fn condense_prompt(message: &str, history: &[ChatMessage]) -> String {
    let transcript = history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given a conversation (between a user and an assistant) and a follow up message from the user, \
         rewrite the message to be a standalone question that captures all relevant context from the conversation.\n\n\
         <Chat History>\n{}\n\n<Follow Up Message>\n{}\n\n<Standalone question>\n",
        transcript, message
    )
}

fn context_prompt(query: &str, context: &[String]) -> String {
    let context = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context.join("\n\n")
    };
    format!(
        "Context information is below.\n---------------------\n{}\n---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\nAnswer: ",
        context, query
    )
}

async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body);
    let message = format!("{}: {}", status, message);

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => ServiceError::QuotaExceeded(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized(message),
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => ServiceError::InvalidInput(message),
        _ => ServiceError::ServiceUnavailable(message),
    })
}

fn extract_text(response: GenerateResponse) -> Result<String, ServiceError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ServiceError::ContentFiltered(format!("Prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::ServiceUnavailable("Response had no candidates".to_string()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(
            reason,
            "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII" | "RECITATION"
        ) {
            return Err(ServiceError::ContentFiltered(format!(
                "Response stopped: {}",
                reason
            )));
        }
    }

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ServiceError::ServiceUnavailable(
            "Response contained no text".to_string(),
        ));
    }
    Ok(text)
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(text: String) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}
