// Multi-provider LLM support
//
// This module provides an abstraction layer over different LLM providers
// (Claude, OpenAI and compatible endpoints). The optimizer only sees
// `ModelGateway`: text in, text out, dispatched by a provider tag.

use anyhow::Result;
use async_trait::async_trait;

pub mod types;

// Provider implementations
pub mod claude;
pub mod openai;

// Tag → provider registry
pub mod factory;

pub use factory::ProviderRegistry;
pub use types::{Message, ProviderRequest, ProviderResponse};

/// Trait for LLM providers
///
/// Implementations make exactly one HTTP round-trip per call. Retries and
/// backoff live in `RetryingInvoker`, never here.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a message and get a complete response
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Get the provider name (e.g., "claude", "openai")
    fn name(&self) -> &str;

    /// Get the default model for this provider
    fn default_model(&self) -> &str;
}

/// Uniform "send text, receive text, or fail" capability.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn invoke(&self, prompt: &str, provider: &str, model: &str) -> Result<String>;

    /// Whether `provider` can be dispatched to. Checked once at construction
    /// so a misconfigured stage fails before any model call.
    fn has_provider(&self, _provider: &str) -> bool {
        true
    }
}
