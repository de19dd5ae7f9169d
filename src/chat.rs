//! Chat assistant
//!
//! Keeps the per-session transcript and runs streamed turns against the model.
//! A turn is committed (user prompt then assistant answer) only once the stream
//! has been fully received; any failure leaves the transcript untouched.
//! A stream that stays silent longer than the idle timeout fails the turn.

use std::ops::ControlFlow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::DEFAULT_STREAM_IDLE_TIMEOUT_SECS;
use crate::error::DashboardError;
use crate::financial::format_amount;
use crate::llm::LanguageModel;
use crate::models::{ChatRole, ChatTurn, PropertyInputs};
use crate::Result;

/// Instruction turn sent first on every request; never stored
pub fn context_instruction(inputs: &PropertyInputs) -> String {
    format!(
        "Tu es expert immo. Projet: {}, {}m2, Budget {}€. Loyer {}€. Sois concis.",
        inputs.address,
        inputs.surface_m2,
        format_amount(inputs.renovation_budget),
        format_amount(inputs.monthly_rent_excluding_charges),
    )
}

/// Ordered, append-only transcript of one user session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    turns: Vec<ChatTurn>,
    /// Longest silence tolerated between two stream fragments
    #[serde(skip, default = "default_idle_timeout")]
    idle_timeout: Duration,
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS)
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            updated_at: Utc::now(),
            turns: Vec::new(),
            idle_timeout: default_idle_timeout(),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// History as sent to the model: context, transcript, then the new prompt
    pub fn request_history(&self, inputs: &PropertyInputs, prompt: &str) -> Vec<ChatTurn> {
        let mut history = Vec::with_capacity(self.turns.len() + 2);
        history.push(ChatTurn::new(ChatRole::System, context_instruction(inputs)));
        history.extend(self.turns.iter().cloned());
        history.push(ChatTurn::new(ChatRole::User, prompt));
        history
    }

    /// Run one turn. `on_delta` sees each fragment as it arrives and may
    /// return `Break` to abandon the turn (e.g. the client went away).
    pub async fn send<F>(
        &mut self,
        model: &dyn LanguageModel,
        inputs: &PropertyInputs,
        prompt: &str,
        mut on_delta: F,
    ) -> Result<&ChatTurn>
    where
        F: FnMut(&str) -> ControlFlow<()> + Send,
    {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(DashboardError::invalid_input("chat message cannot be empty"));
        }

        let history = self.request_history(inputs, prompt);
        info!(
            model = model.name(),
            prior_turns = self.turns.len(),
            "Sending chat turn"
        );

        let mut stream = timeout(self.idle_timeout, model.stream_chat(&history))
            .await
            .map_err(|_| self.stalled())??;
        let mut answer = String::new();

        loop {
            let delta = match timeout(self.idle_timeout, stream.next()).await {
                Ok(Some(Ok(delta))) => delta,
                Ok(Some(Err(e))) => {
                    warn!("Chat stream failed, turn discarded: {}", e);
                    return Err(e);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        idle_secs = self.idle_timeout.as_secs_f64(),
                        "Chat stream stalled, turn discarded"
                    );
                    return Err(self.stalled());
                }
            };

            answer.push_str(&delta);
            if on_delta(&delta).is_break() {
                warn!("Chat consumer went away, turn discarded");
                return Err(DashboardError::Cancelled(
                    "client disconnected before the answer completed".to_string(),
                ));
            }
        }

        if answer.trim().is_empty() {
            return Err(DashboardError::external("empty chat answer"));
        }

        self.turns.push(ChatTurn::new(ChatRole::User, prompt));
        self.turns.push(ChatTurn::new(ChatRole::Assistant, answer));
        self.updated_at = Utc::now();

        info!(turns = self.turns.len(), "Chat turn committed");
        Ok(&self.turns[self.turns.len() - 1])
    }

    fn stalled(&self) -> DashboardError {
        DashboardError::external(format!(
            "no chat fragment received within {:?}",
            self.idle_timeout
        ))
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.updated_at = Utc::now();
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
