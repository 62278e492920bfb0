// src/adapter/mod.rs
// ============================================================================
// Module: External Reasoning/Communication Adapter
// Description: OpenAI-compatible chat-completions client shared by the
//              Multimodal Clinical Reasoning and Communication stages.
// Purpose: Implement the single external-call contract every stage shares:
//          retry on transient failure, a process-wide circuit breaker,
//          prompt hardening, and tolerant JSON-shape recovery.
// Dependencies: reqwest, serde_json, tokio, tracing, crate::config,
//               crate::adapter::{circuit, retry, prompt}
// ============================================================================

//! ## Overview
//! [`ChatClient::complete`] is the single external entry point both stages
//! call. It never returns a hard failure to its caller in a way that would
//! stop the pipeline: every error variant here is meant to be caught by the
//! calling stage and turned into a deterministic fallback — a strict
//! fallback to deterministic rules on any failure.

/// Process-wide, per-endpoint circuit breaker.
pub mod circuit;
/// Prompt hardening and tolerant JSON-object recovery.
pub mod prompt;
/// Exponential-backoff retry loop restricted to transient failures.
pub mod retry;

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use crate::adapter::retry::RetryClass;
use crate::adapter::retry::RetryConfig;
use crate::config::BackendConfig;
use crate::config::CircuitConfig;

/// One OpenAI-compatible chat message content part.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    /// Plain text content.
    Text {
        /// Text content.
        text: String,
    },
    /// An image referenced by data URI.
    ImageUrl {
        /// Image URL payload.
        image_url: ImageUrlRef,
    },
}

/// The `image_url` object within a vision-capable chat message.
#[derive(Debug, Clone, Serialize)]
struct ImageUrlRef {
    /// Data URI or remote URL.
    url: String,
}

/// One chat message in a completions request.
#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    /// Message role (`system` or `user`).
    role: &'static str,
    /// Message content parts.
    content: Vec<ContentPart>,
}

/// Request body for an OpenAI-compatible `/chat/completions` call.
#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    /// Model name.
    model: String,
    /// Conversation messages.
    messages: Vec<ChatMessage>,
    /// Always `false`; this adapter never streams.
    stream: bool,
    /// Sampling temperature.
    temperature: f64,
    /// Maximum response tokens.
    max_tokens: u32,
}

/// Top-level response body for an OpenAI-compatible `/chat/completions`
/// call.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    /// Ranked completion choices; the first is used.
    choices: Vec<ChatCompletionChoice>,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    /// The assistant's message.
    message: ChatCompletionMessage,
}

/// The assistant message within a completion choice.
#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    /// Text content of the reply.
    #[serde(default)]
    content: String,
}

/// A successful external completion.
#[derive(Debug, Clone)]
pub struct ChatCompletionResult {
    /// Raw text content returned by the model.
    pub content: String,
    /// Number of images actually included in the request.
    pub images_sent: u32,
}

/// Errors an external adapter call can fail with.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The backend is not configured for external use.
    #[error("external backend is not configured")]
    NotConfigured,
    /// The endpoint's circuit breaker is open.
    #[error("circuit open for endpoint")]
    CircuitOpen,
    /// A network-level failure (connect, timeout, transport).
    #[error("network error: {0}")]
    Network(String),
    /// The endpoint returned a non-2xx status.
    #[error("http status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The response body could not be parsed into the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A thin OpenAI-compatible chat-completions client shared by both external
/// adapters.
#[derive(Debug, Clone)]
pub struct ChatClient {
    /// Underlying HTTP client, reused across calls for connection pooling.
    http: reqwest::Client,
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClient {
    /// Builds a client with the default `reqwest` configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Issues a chat-completions request against `config`'s endpoint,
    /// applying prompt hardening to `user_content`, retrying transient
    /// failures per `config`, and gating calls through the endpoint's
    /// process-wide circuit breaker. Each attempt's timeout is clamped to
    /// whatever remains of `deadline`, the caller's overall request
    /// deadline.
    ///
    /// # Errors
    /// Returns [`AdapterError::NotConfigured`] when `config.backend` is not
    /// `external` or `base_url`/`model` is unset; [`AdapterError::CircuitOpen`]
    /// when the endpoint's circuit rejects the call; otherwise the last
    /// attempt's network or HTTP error.
    pub async fn complete(
        &self,
        config: &BackendConfig,
        circuit_config: &CircuitConfig,
        system_prompt: &str,
        user_content: &str,
        image_data_urls: &[String],
        deadline: Instant,
    ) -> Result<ChatCompletionResult, AdapterError> {
        let (base_url, model) = match (&config.base_url, &config.model) {
            (Some(base_url), Some(model)) if !base_url.is_empty() && !model.is_empty() => (base_url, model),
            _ => return Err(AdapterError::NotConfigured),
        };

        if !circuit::try_acquire(base_url, circuit_config) {
            return Err(AdapterError::CircuitOpen);
        }

        let images_sent: u32 = if config.send_images {
            let allowed = image_data_urls.len().min(config.max_images as usize);
            u32::try_from(allowed).unwrap_or(config.max_images)
        } else {
            0
        };
        let request = build_request(config, model, system_prompt, user_content, &image_data_urls[..images_sent as usize]);

        let retry_config = RetryConfig::new(config.max_retries, config.retry_backoff());
        let result = retry::retry_async(
            &retry_config,
            |_attempt| self.send_once(base_url, config, &request, deadline),
            |outcome| classify_outcome(outcome),
        )
        .await;

        circuit::record_call_outcome(base_url, circuit_config, result.is_ok());
        result.map(|content| ChatCompletionResult { content, images_sent })
    }

    /// Sends one request attempt and extracts the first choice's content.
    /// The attempt's timeout is `config.timeout()` clamped to whatever
    /// remains of `deadline`.
    async fn send_once(&self, base_url: &str, config: &BackendConfig, request: &ChatCompletionRequest, deadline: Instant) -> Result<String, AdapterError> {
        let mut builder = self.http.post(base_url).timeout(effective_timeout(config, deadline)).json(request);
        if let Some(api_key) = &config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|err| AdapterError::Network(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(500).collect();
            return Err(AdapterError::HttpStatus {
                status: status.as_u16(),
                body: truncated,
            });
        }

        let parsed: ChatCompletionResponse =
            response.json().await.map_err(|err| AdapterError::InvalidResponse(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AdapterError::InvalidResponse("no choices in response".to_string()))
    }
}

/// Builds the request body, applying prompt hardening to untrusted content
/// and attaching at most `images` image parts.
fn build_request(config: &BackendConfig, model: &str, system_prompt: &str, user_content: &str, images: &[String]) -> ChatCompletionRequest {
    let hardened = prompt::harden_untrusted_text(user_content);
    let mut content = vec![ContentPart::Text { text: hardened }];
    for image in images {
        content.push(ContentPart::ImageUrl {
            image_url: ImageUrlRef { url: image.clone() },
        });
    }
    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: vec![ContentPart::Text { text: system_prompt.to_string() }],
            },
            ChatMessage { role: "user", content },
        ],
        stream: false,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Clamps a backend's configured per-attempt timeout to whatever remains of
/// the caller's overall request `deadline`, so a generous per-attempt
/// timeout can never outlive the request it is serving.
fn effective_timeout(config: &BackendConfig, deadline: Instant) -> Duration {
    config.timeout().min(deadline.saturating_duration_since(Instant::now()))
}

/// Classifies an attempt's outcome for the retry loop: only network errors,
/// 5xx, and 429 are retryable.
fn classify_outcome(outcome: &Result<String, AdapterError>) -> RetryClass {
    match outcome {
        Ok(_) => RetryClass::Terminal,
        Err(AdapterError::Network(_)) => RetryClass::Retryable,
        Err(AdapterError::HttpStatus { status, .. }) if *status >= 500 || *status == 429 => RetryClass::Retryable,
        Err(_) => RetryClass::Terminal,
    }
}

/// Logs an adapter failure at `warn` level without leaking request content.
pub fn log_adapter_failure(stage: &str, error: &AdapterError) {
    warn!(stage, error = %error, "external adapter call failed; falling back to deterministic rules");
}
