//! OpenAI-compatible chat completions client
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! Failures are surfaced as-is: there is no retry and no fallback answer.

use super::{LanguageModel, TextStream};
use crate::config::LlmConfig;
use crate::error::DashboardError;
use crate::models::{ChatTurn, ImageAttachment};
use crate::Result;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(DashboardError::MissingApiKey);
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            timeout: config.timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(request);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            error!("Language model request failed: {}", e);
            DashboardError::external(format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Language model error response ({}): {}", status, error_text);
            return Err(DashboardError::external(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate_narrative(
        &self,
        instructions: &str,
        images: &[ImageAttachment],
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(ContentPart::Text {
            text: instructions.to_string(),
        });
        parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_uri(),
            },
        }));

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(parts),
            }],
            stream: false,
        };

        info!(model = %self.model, images = images.len(), "Calling language model for photo analysis");

        let response = self.send(&request, Some(self.timeout)).await?;
        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse completion: {}", e);
            DashboardError::external(format!("malformed response: {}", e))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DashboardError::external("no choices in response"))?;

        debug!(finish_reason = ?choice.finish_reason, "Completion received");

        choice
            .message
            .content
            .ok_or_else(|| DashboardError::external("empty response"))
    }

    async fn stream_chat(&self, history: &[ChatTurn]) -> Result<TextStream> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: history
                .iter()
                .map(|turn| RequestMessage {
                    role: turn.role.to_string(),
                    content: MessageContent::Text(turn.content.clone()),
                })
                .collect(),
            stream: true,
        };

        info!(model = %self.model, turns = history.len(), "Opening chat stream");

        let response = self.send(&request, None).await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }
}

//
// ================= Server-sent events =================
//

#[derive(Debug, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into `data:` payloads; lines may straddle chunks
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();

            if payload == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !payload.is_empty() {
                events.push(SseEvent::Data(payload.to_string()));
            }
        }
        events
    }
}

struct StreamState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    done: bool,
    finished: bool,
}

/// Turn a raw SSE body into text deltas. A body that ends before
/// `[DONE]` yields a trailing error so callers never commit a partial turn.
fn sse_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = StreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for event in state.decoder.push(chunk.as_ref()) {
                        match event {
                            SseEvent::Done => {
                                state.done = true;
                                state.finished = true;
                                break;
                            }
                            SseEvent::Data(payload) => match parse_delta(&payload) {
                                Ok(Some(text)) => state.pending.push_back(Ok(text)),
                                Ok(None) => {}
                                Err(e) => {
                                    state.pending.push_back(Err(e));
                                    state.finished = true;
                                    break;
                                }
                            },
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("Chat stream broke: {}", e);
                    state
                        .pending
                        .push_back(Err(DashboardError::external(format!("stream error: {}", e))));
                    state.finished = true;
                }
                None => {
                    state.finished = true;
                    if !state.done {
                        state.pending.push_back(Err(DashboardError::external(
                            "stream ended before completion",
                        )));
                    }
                }
            }
        }
    })
    .boxed()
}

fn parse_delta(payload: &str) -> Result<Option<String>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| DashboardError::external(format!("malformed stream chunk: {}", e)))?;

    if let Some(err) = chunk.error {
        return Err(DashboardError::external(err.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatRole;
    use futures::stream;

    fn chunk(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n",
            serde_json::to_string(text).unwrap()
        )
    }

    async fn collect(parts: Vec<String>) -> Vec<Result<String>> {
        let body = stream::iter(
            parts
                .into_iter()
                .map(|p| Ok::<_, std::io::Error>(p.into_bytes())),
        );
        sse_text_stream(body).collect().await
    }

    #[test]
    fn test_vision_request_serialization() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: "Analyse".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/png;base64,AA==".to_string(),
                        },
                    },
                ]),
            }],
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AA=="
        );
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_chat_request_roles() {
        let turn = ChatTurn::new(ChatRole::System, "contexte");
        let request = ChatCompletionRequest {
            model: "m",
            messages: vec![RequestMessage {
                role: turn.role.to_string(),
                content: MessageContent::Text(turn.content),
            }],
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "contexte");
        assert_eq!(json["stream"], true);
    }

    #[tokio::test]
    async fn test_stream_split_across_chunks() {
        let first = chunk("Bon");
        let (head, tail) = first.split_at(12);
        let parts = vec![
            head.to_string(),
            tail.to_string(),
            ": keep-alive\n\n".to_string(),
            chunk("jour"),
            "data: [DONE]\n\n".to_string(),
        ];

        let items = collect(parts).await;
        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Bon".to_string(), "jour".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_without_done_ends_in_error() {
        let items = collect(vec![chunk("partial")]).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(DashboardError::ExternalService(_))));
    }

    #[tokio::test]
    async fn test_stream_error_payload() {
        let items = collect(vec![
            "data: {\"error\":{\"message\":\"quota exceeded\"}}\n\n".to_string(),
        ])
        .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].as_ref().unwrap_err().to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = LlmConfig {
            api_key: String::new(),
            base_url: "http://localhost".to_string(),
            model: "m".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            OpenAiClient::new(config),
            Err(DashboardError::MissingApiKey)
        ));
    }
}
