//! Reasoning service client
//!
//! Builds operation-specific prompts and calls an OpenAI-compatible
//! chat-completions endpoint with a bounded timeout and exactly one retry
//! on transient failure. The response text is returned as-is; the core
//! normalizer decides what, if anything, it contains.

pub mod client;
pub mod prompt;

pub use client::{HttpReasoningClient, LlmConfig};
