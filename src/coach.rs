//! Default coaching path — retrieval, generation, and the output filter.
//!
//! The generator is a black box that may be unconfigured or failing; both
//! collapse to a fixed deterministic fallback so the request never crashes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::{ChatTurn, ContextRetriever, TextGenerator};
use crate::prompts::COACH_MASTER_PROMPT;
use crate::response::{ChatResponse, Exercise};
use crate::safety::filter_unsafe_response;

const RETRIEVAL_TOP_K: usize = 4;

/// Deterministic reply used when the generation collaborator is
/// unavailable.
pub fn grounding_fallback() -> ChatResponse {
    ChatResponse {
        exercise: Some(Exercise {
            kind: "5-4-3-2-1 grounding".to_string(),
            steps: vec![
                "Name 5 things you can see.".to_string(),
                "Name 4 things you can feel.".to_string(),
                "Name 3 things you can hear.".to_string(),
                "Name 2 things you can smell.".to_string(),
                "Name 1 thing you can taste.".to_string(),
            ],
            duration_seconds: 90,
        }),
        ..ChatResponse::message(
            "Thanks for sharing. Let us slow things down together. \
             Here is a short grounding exercise to try.",
        )
    }
}

pub struct CoachResponder {
    generator: Arc<dyn TextGenerator>,
    retriever: Arc<dyn ContextRetriever>,
    timeout: Duration,
}

impl CoachResponder {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        retriever: Arc<dyn ContextRetriever>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            retriever,
            timeout,
        }
    }

    /// One coaching turn: retrieve context, generate, post-filter.
    pub async fn respond(&self, message: &str, history: &[ChatTurn]) -> ChatResponse {
        let chunks = match self.retriever.retrieve(message, RETRIEVAL_TOP_K).await {
            Ok(chunks) => chunks,
            Err(e) => {
                // Works fine with zero retrieved context.
                warn!("Context retrieval failed, continuing without: {e}");
                Vec::new()
            }
        };

        let mut context_blocks = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let text = chunk.text.trim();
            if text.is_empty() {
                continue;
            }
            let source = chunk
                .source
                .clone()
                .unwrap_or_else(|| format!("chunk_{}", idx + 1));
            context_blocks.push(format!("[{}] source={source}\n{text}", idx + 1));
        }

        let user_prompt = if context_blocks.is_empty() {
            message.to_string()
        } else {
            format!(
                "Use the retrieved context only when relevant.\n\n\
                 Retrieved context:\n{}\n\nUser message:\n{message}",
                context_blocks.join("\n\n")
            )
        };

        let mut turns: Vec<ChatTurn> = history.to_vec();
        turns.push(ChatTurn::user(user_prompt));

        match self
            .generator
            .generate(&turns, COACH_MASTER_PROMPT, self.timeout)
            .await
        {
            Ok(content) => {
                debug!(chunks = chunks.len(), "Coach reply generated");
                filter_unsafe_response(ChatResponse::message(content))
            }
            Err(e) => {
                warn!("Generator unavailable, using deterministic fallback: {e}");
                grounding_fallback()
            }
        }
    }
}
