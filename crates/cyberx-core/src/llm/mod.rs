//! LLM integration - OpenAI-compatible API
//!
//! This module provides:
//! - HTTP client for chat completions and embeddings
//! - Request/response types matching the OpenAI-compatible wire format
//! - Mapping of HTTP outcomes onto capability failures

mod client;
mod types;

pub use client::{LlmClient, LlmClientBuilder, strip_code_fence};
pub use types::{
    ChatRequest, ChatResponse, Choice, EmbeddingRequest, EmbeddingResponse, LlmResponse, Message,
    MessageRole, Usage,
};
