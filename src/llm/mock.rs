//! Scripted model for tests
//! Keeps the service exercisable without network access

use super::{LanguageModel, TextStream};
use crate::error::DashboardError;
use crate::models::{ChatTurn, ImageAttachment};
use crate::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::Mutex;
use std::time::Duration;

pub struct MockLanguageModel {
    narrative: std::result::Result<String, String>,
    chunks: Vec<String>,
    /// Stream yields an error after this many chunks
    fail_after: Option<usize>,
    /// Pause before each chunk
    chunk_delay: Option<Duration>,
    /// Stream opens but never yields
    stalled: bool,
    recorded_histories: Mutex<Vec<Vec<ChatTurn>>>,
    recorded_image_counts: Mutex<Vec<usize>>,
}

impl MockLanguageModel {
    pub fn new(narrative: impl Into<String>, chunks: &[&str]) -> Self {
        Self {
            narrative: Ok(narrative.into()),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail_after: None,
            chunk_delay: None,
            stalled: false,
            recorded_histories: Mutex::new(Vec::new()),
            recorded_image_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_narrative(mut self, message: impl Into<String>) -> Self {
        self.narrative = Err(message.into());
        self
    }

    pub fn failing_stream_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Every history passed to `stream_chat`, in call order
    pub fn histories(&self) -> Vec<Vec<ChatTurn>> {
        self.recorded_histories
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn image_counts(&self) -> Vec<usize> {
        self.recorded_image_counts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_narrative(
        &self,
        _instructions: &str,
        images: &[ImageAttachment],
    ) -> Result<String> {
        if let Ok(mut counts) = self.recorded_image_counts.lock() {
            counts.push(images.len());
        }
        self.narrative
            .clone()
            .map_err(DashboardError::ExternalService)
    }

    async fn stream_chat(&self, history: &[ChatTurn]) -> Result<TextStream> {
        if let Ok(mut histories) = self.recorded_histories.lock() {
            histories.push(history.to_vec());
        }

        if self.stalled {
            return Ok(Box::pin(stream::pending()));
        }

        let mut items: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
        if let Some(limit) = self.fail_after {
            items.truncate(limit);
            items.push(Err(DashboardError::external("stream interrupted")));
        }

        match self.chunk_delay {
            Some(delay) => Ok(Box::pin(stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            }))),
            None => Ok(Box::pin(stream::iter(items))),
        }
    }
}
