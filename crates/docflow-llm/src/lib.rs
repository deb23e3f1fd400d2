//! # Docflow LLM
//!
//! Chat-completion transport (OpenAI-compatible) and the prompt sets used by
//! the extraction ladder. Retry and backoff live in the activity layer, not
//! here; this crate issues single requests.

mod client;
pub mod prompts;

pub use client::{
    ChatClient, CompletionRequest, HttpChatClient, HttpChatClientConfig, LlmError, MockChatClient,
    ScriptedChatClient,
};
