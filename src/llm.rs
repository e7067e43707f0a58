//! Text-generation and context-retrieval collaborator interfaces.
//!
//! Provider internals (model serving, embeddings) live outside this crate;
//! the core only consumes these traits and must keep working when neither
//! collaborator is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A single conversation turn passed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A retrieved context chunk, possibly with a source label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Black-box text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply for the given turns under a system prompt.
    ///
    /// Implementations must respect `timeout`; the caller converts any error
    /// into a user-facing fallback and never crashes the request.
    async fn generate(
        &self,
        turns: &[ChatTurn],
        system_prompt: &str,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}

/// Black-box context retrieval. May return an empty list.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, LlmError>;
}

/// Generator used when no provider is configured. Every call fails with
/// `LlmError::NotConfigured`, which the coach maps to its deterministic
/// fallback.
pub struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(
        &self,
        _turns: &[ChatTurn],
        _system_prompt: &str,
        _timeout: Duration,
    ) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }
}

/// Retriever that always returns no context.
pub struct NoRetrieval;

#[async_trait]
impl ContextRetriever for NoRetrieval {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>, LlmError> {
        Ok(Vec::new())
    }
}
