//! OpenAI-compatible chat completions backend (Groq by default).

use async_trait::async_trait;
use docchat_core::{ChatMessage, ChatRequest, ConfigError, GenerationError, LanguageModel, TokenStream};
use futures::{Stream, StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Groq's OpenAI-compatible API root.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
/// Default model served through Groq.
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
/// Env var holding the Groq API key.
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat model reached over the `/chat/completions` protocol.
///
/// Cloning shares the HTTP connection pool.
#[derive(Clone)]
pub struct OpenAiCompatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    streaming: bool,
}

impl fmt::Debug for OpenAiCompatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatModel {
    /// Create a streaming model with an explicit API key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            streaming: true,
        })
    }

    /// Create a model whose API key is read from `api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] if the variable is unset or empty.
    pub fn from_env(
        base_url: impl Into<String>,
        api_key_env: &str,
        model: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(api_key_env.to_string()))?;
        Self::new(base_url, api_key, model)
    }

    /// Groq with the default model, keyed from `GROQ_API_KEY`.
    pub fn groq() -> Result<Self, ConfigError> {
        Self::from_env(GROQ_BASE_URL, GROQ_API_KEY_ENV, DEFAULT_MODEL)
    }

    /// Same endpoint and credentials, different model.
    #[must_use]
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Toggle server-sent-event streaming.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
            stream,
        };

        debug!(
            "POST {} (model {}, {} messages, stream {})",
            self.endpoint(),
            self.model,
            request.messages.len(),
            stream
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Request payload for `/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// One streamed completion chunk.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    // Usage-only chunks omit the delta
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// A meaningful server-sent-event line.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Fragment(String),
    Done,
}

/// Parse one SSE line. Blank lines, comments and non-`data` fields yield `None`.
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, GenerationError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| GenerationError::Decode(format!("bad stream chunk: {e}")))?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok(Some(SseEvent::Fragment(text)))
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, GenerationError>>,
    done: bool,
}

impl<S> SseState<S> {
    /// Handle one complete line; returns false once the stream is over.
    fn feed_line(&mut self, line: &[u8]) -> bool {
        match parse_sse_line(&String::from_utf8_lossy(line)) {
            Ok(Some(SseEvent::Fragment(text))) => {
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
                true
            }
            Ok(Some(SseEvent::Done)) => false,
            Ok(None) => true,
            Err(e) => {
                self.pending.push_back(Err(e));
                false
            }
        }
    }
}

/// Turn a byte stream of server-sent events into completion fragments.
///
/// Lines are only decoded once complete, so multi-byte characters split
/// across network chunks survive.
fn sse_fragments<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                        if !state.feed_line(&line) {
                            state.done = true;
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(GenerationError::Request(e.to_string())));
                    state.done = true;
                }
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    if !rest.is_empty() {
                        state.feed_line(&rest);
                    }
                    state.done = true;
                }
            }
        }
    }))
}

#[async_trait]
impl LanguageModel for OpenAiCompatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let response = self.send(request, false).await?;
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::Empty)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<TokenStream, GenerationError> {
        if !self.streaming {
            let text = self.complete(request).await?;
            return Ok(Box::pin(stream::once(async move { Ok(text) })));
        }

        let response = self.send(request, true).await?;
        Ok(sse_fragments(response.bytes_stream()))
    }
}
