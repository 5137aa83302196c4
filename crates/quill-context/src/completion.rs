//! Text-completion service seam.
//!
//! The network client is outside this crate; implementations receive the
//! fully assembled request and return the model's reply, bounded by the
//! fixed `max_tokens` budget.

use async_trait::async_trait;

use quill_core::error::Result;

/// One fully framed completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Retrieved chunks joined by blank lines.
    pub system_context: String,
    /// The persisted key/value store, serialized as JSON.
    pub store_json: String,
    /// The (substituted) user text.
    pub query: String,
    pub model: String,
    /// Fixed response budget, configured once at startup.
    pub max_tokens: u32,
}

/// Completion collaborator seam.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
