//! LLM backend implementations
//!
//! Two wire protocols are supported: Ollama's native chat API (NDJSON
//! streaming) and OpenAI-compatible chat completions (SSE streaming). Both
//! retry transient failures with exponential backoff before giving up.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ragchat_config::LlmSettings;
use ragchat_core::ModelProfile;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::Message;
use crate::LlmError;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// API endpoint
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Top-k sampling (ignored by OpenAI-compatible endpoints)
    pub top_k: u32,
    pub stop: Vec<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Retry attempts after the first failure
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_profile(
            &ModelProfile::new("local", "llama3.1:8b", 1024),
            &LlmSettings::default(),
        )
    }
}

impl LlmConfig {
    /// Build the client configuration for one model profile
    pub fn from_profile(profile: &ModelProfile, settings: &LlmSettings) -> Self {
        Self {
            model: profile.model_id.clone(),
            endpoint: profile.endpoint.clone(),
            api_key: profile.api_key.clone(),
            max_tokens: profile.max_output_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            stop: settings.stop_sequences.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Tokens (or stream chunks) generated
    pub tokens: usize,
    /// Time to first token (ms)
    pub time_to_first_token_ms: u64,
    /// Total generation time (ms)
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    /// The receiving side of a stream went away
    Cancelled,
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a complete response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Generate with streaming; every chunk is sent on `tx` as it arrives
    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    /// Check if model is available
    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;

    /// Estimate tokens
    ///
    /// Hangul text averages about two graphemes per token, Latin text
    /// about four.
    fn estimate_tokens(&self, text: &str) -> usize {
        use unicode_segmentation::UnicodeSegmentation;

        let grapheme_count = text.graphemes(true).count();
        if grapheme_count == 0 {
            return 0;
        }

        if ragchat_core::hangul_count(text) > grapheme_count / 3 {
            (grapheme_count / 2).max(1)
        } else {
            (grapheme_count / 4).max(1)
        }
    }
}

fn is_retryable(error: &LlmError) -> bool {
    matches!(error, LlmError::Network(_) | LlmError::Timeout)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out of attempts
pub(crate) async fn with_retry<T, F, Fut>(
    max_retries: u32,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_error = None;
    let mut backoff = initial_backoff;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tracing::warn!(
                "LLM request failed, retrying in {:?} (attempt {}/{})",
                backoff,
                attempt,
                max_retries
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => last_error = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
}

/// Map a non-success HTTP status; 5xx is retryable, 4xx is not
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(LlmError::Network(format!("Server error {}: {}", status, error)))
    } else {
        Err(LlmError::Api(format!("HTTP {}: {}", status, error)))
    }
}

/// Splits a byte stream into lines
///
/// Chunk boundaries can fall inside a multi-byte character, so bytes are
/// held until a full line is available and only complete lines are decoded.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed, trimmed, skipping blanks
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, LlmError> {
        self.bytes.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(line_end) = self.bytes.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.bytes.drain(..=line_end).collect();
            let line = String::from_utf8(raw)
                .map_err(|e| LlmError::InvalidResponse(format!("stream is not UTF-8: {}", e)))?;
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        Ok(lines)
    }
}

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request(&self, messages: &[Message], stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(|m| m.into()).collect(),
            stream,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
                top_p: Some(self.config.top_p),
                top_k: Some(self.config.top_k),
                num_predict: Some(self.config.max_tokens as i32),
                stop: if self.config.stop.is_empty() {
                    None
                } else {
                    Some(self.config.stop.clone())
                },
            }),
        }
    }

    async fn send(&self, request: &OllamaChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self.client.post(self.api_url("/chat")).json(request).send().await?;
        check_status(response).await
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = &self.build_request(messages, false);

        let result: OllamaChatResponse =
            with_retry(self.config.max_retries, self.config.initial_backoff, || async move {
                self.send(request)
                    .await?
                    .json()
                    .await
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            })
            .await?;

        Ok(GenerationResult {
            text: result.message.content,
            tokens: result.eval_count.unwrap_or(0) as usize,
            time_to_first_token_ms: result.prompt_eval_duration.unwrap_or(0) / 1_000_000,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: match result.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let mut first_token_time = None;
        let mut total_tokens = 0;
        let mut full_response = String::new();
        let mut finish_reason = FinishReason::Stop;

        let request = &self.build_request(messages, true);
        let response = with_retry(self.config.max_retries, self.config.initial_backoff, || {
            self.send(request)
        })
        .await?;

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::default();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            for line in buffer.push(&chunk)? {
                let parsed: OllamaStreamChunk = match serde_json::from_str(&line) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping unparseable stream line");
                        continue;
                    }
                };

                let token = parsed.message.content;
                if !token.is_empty() {
                    if first_token_time.is_none() {
                        first_token_time = Some(start.elapsed());
                    }
                    full_response.push_str(&token);
                    total_tokens += 1;

                    if tx.send(token).await.is_err() {
                        finish_reason = FinishReason::Cancelled;
                        break 'outer;
                    }
                }

                if parsed.done {
                    if parsed.done_reason.as_deref() == Some("length") {
                        finish_reason = FinishReason::Length;
                    }
                    break 'outer;
                }
            }
        }

        Ok(GenerationResult {
            text: full_response,
            tokens: total_tokens,
            time_to_first_token_ms: first_token_time.map(|t| t.as_millis() as u64).unwrap_or(0),
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
}

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API endpoint (e.g. https://api.openai.com/v1)
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl From<&LlmConfig> for OpenAIConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            stop: config.stop.clone(),
            timeout: config.timeout,
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
        }
    }
}

fn is_local_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("http://localhost") || endpoint.starts_with("http://127.0.0.1")
}

/// OpenAI-compatible backend
///
/// Works with OpenAI, vLLM and any server exposing `/chat/completions`.
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() && !is_local_endpoint(&config.endpoint) {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_request(&self, messages: &[Message], stream: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            top_p: Some(self.config.top_p),
            stop: if self.config.stop.is_empty() {
                None
            } else {
                Some(self.config.stop.clone())
            },
            stream: Some(stream),
        }
    }

    async fn send(&self, request: &OpenAIChatRequest) -> Result<reqwest::Response, LlmError> {
        let mut builder = self.client.post(self.chat_url()).json(request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }
        check_status(builder.send().await?).await
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let request = &self.build_request(messages, false);

        let response: OpenAIChatResponse =
            with_retry(self.config.max_retries, self.config.initial_backoff, || async move {
                self.send(request)
                    .await?
                    .json()
                    .await
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            })
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let total_time_ms = start.elapsed().as_millis() as u64;

        Ok(GenerationResult {
            text: choice.message.content,
            tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
            time_to_first_token_ms: total_time_ms,
            total_time_ms,
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();
        let mut first_token_time: Option<u64> = None;
        let mut full_text = String::new();
        let mut token_count = 0;
        let mut finish_reason = FinishReason::Stop;

        let request = &self.build_request(messages, true);
        let response = with_retry(self.config.max_retries, self.config.initial_backoff, || {
            self.send(request)
        })
        .await?;

        let mut stream = response.bytes_stream();
        let mut buffer = LineBuffer::default();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            for line in buffer.push(&chunk)? {
                if line == "data: [DONE]" {
                    break 'outer;
                }
                let Some(json_str) = line.strip_prefix("data: ") else {
                    continue;
                };
                let Ok(parsed) = serde_json::from_str::<OpenAIStreamChunk>(json_str) else {
                    continue;
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };

                if choice.finish_reason.as_deref() == Some("length") {
                    finish_reason = FinishReason::Length;
                }

                if let Some(content) = choice.delta.and_then(|d| d.content) {
                    if content.is_empty() {
                        continue;
                    }
                    if first_token_time.is_none() {
                        first_token_time = Some(start.elapsed().as_millis() as u64);
                    }
                    full_text.push_str(&content);
                    token_count += 1;
                    if tx.send(content).await.is_err() {
                        finish_reason = FinishReason::Cancelled;
                        break 'outer;
                    }
                }
            }
        }

        let total_time_ms = start.elapsed().as_millis() as u64;

        Ok(GenerationResult {
            text: full_text,
            tokens: token_count,
            time_to_first_token_ms: first_token_time.unwrap_or(total_time_ms),
            total_time_ms,
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.endpoint.trim_end_matches('/'));
        let mut builder = self.client.get(&url).timeout(Duration::from_secs(5));
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }
        builder
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: Option<OpenAIDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}
