// Unified request/response types for multi-provider LLM support
//
// The core only ever sends one user turn and reads back plain text, so these
// stay deliberately flat. Each provider maps them onto its own wire format.

use serde::{Deserialize, Serialize};

use crate::config::constants::DEFAULT_MAX_TOKENS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Unified request format for all LLM providers
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,

    /// Model name (provider-specific); empty means the provider default
    pub model: String,

    pub max_tokens: u32,

    /// Temperature (0.0 to 1.0, optional)
    pub temperature: Option<f32>,
}

impl ProviderRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            model: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    /// Single user turn
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// The model to send, falling back to the provider's default.
    pub fn model_or<'a>(&'a self, default: &'a str) -> &'a str {
        if self.model.is_empty() {
            default
        } else {
            &self.model
        }
    }
}

/// Unified response format
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub id: String,
    pub model: String,
    /// Text blocks in order
    pub content: Vec<String>,
    pub stop_reason: Option<String>,
    /// Which provider produced it ("claude", "openai", ...)
    pub provider: String,
}

impl ProviderResponse {
    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_prompt_builds_single_user_turn() {
        let req = ProviderRequest::from_prompt("Hello").with_model("m");
        assert_eq!(req.messages, vec![Message::user("Hello")]);
        assert_eq!(req.model, "m");
        assert_eq!(req.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_model_or_falls_back_to_default() {
        let req = ProviderRequest::from_prompt("x");
        assert_eq!(req.model_or("default-model"), "default-model");
        let req = req.with_model("explicit");
        assert_eq!(req.model_or("default-model"), "explicit");
    }

    #[test]
    fn test_response_text_joins_blocks() {
        let resp = ProviderResponse {
            id: "1".into(),
            model: "m".into(),
            content: vec!["a".into(), "b".into()],
            stop_reason: None,
            provider: "mock".into(),
        };
        assert_eq!(resp.text(), "a\nb");
    }
}
