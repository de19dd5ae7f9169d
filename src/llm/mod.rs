//! Language-model collaborator
//!
//! The dashboard only needs two things from a model: a one-shot answer over a
//! set of photos, and a streamed chat completion. Both sit behind
//! [`LanguageModel`] so providers can be swapped and tests stay offline.

use crate::models::{ChatTurn, ImageAttachment};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod mock;
pub mod openai;

pub use mock::MockLanguageModel;
pub use openai::OpenAiClient;

/// Incrementally delivered completion text
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Single non-streaming request: instruction text plus inline images
    async fn generate_narrative(
        &self,
        instructions: &str,
        images: &[ImageAttachment],
    ) -> Result<String>;

    /// Streamed chat completion over an ordered history
    async fn stream_chat(&self, history: &[ChatTurn]) -> Result<TextStream>;
}
