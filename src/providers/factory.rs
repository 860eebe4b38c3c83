// Provider factory
//
// Builds the tag → provider registry the optimizer dispatches through.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::claude::ClaudeProvider;
use super::openai::OpenAIProvider;
use super::types::ProviderRequest;
use super::{LlmProvider, ModelGateway};
use crate::config::{ProviderSettings, ProvidersConfig};
use crate::config::constants::DEFAULT_MAX_TOKENS;

const ANTHROPIC_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// Tags that resolve to another registered tag.
const ALIASES: [(&str, &str); 2] = [("gpt", "openai"), ("anthropic", "claude")];

struct Entry {
    provider: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: Option<f32>,
}

/// Registry of providers keyed by lowercase tag.
///
/// Built-ins are registered from `ProvidersConfig`; anything else can be
/// added with [`ProviderRegistry::register`].
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<String, Entry>,
    /// Built-in tags that could not be created, with the reason
    unavailable: HashMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in providers whose API keys resolve.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let mut registry = Self::new();

        match config.claude.resolve_api_key(ANTHROPIC_KEY_VAR) {
            Some(key) => {
                let mut provider = ClaudeProvider::new(key)?;
                if let Some(url) = &config.claude.base_url {
                    provider = provider.with_base_url(url.clone());
                }
                registry.register_with("claude", Arc::new(provider), &config.claude);
            }
            None => {
                registry.unavailable.insert(
                    "claude".to_string(),
                    format!("no API key (set {ANTHROPIC_KEY_VAR} or providers.claude.api_key)"),
                );
            }
        }

        let openai = match (config.openai.resolve_api_key(OPENAI_KEY_VAR), &config.openai.base_url) {
            (Some(key), Some(url)) => Some(OpenAIProvider::new_openai(key)?.with_base_url(url.clone())),
            (Some(key), None) => Some(OpenAIProvider::new_openai(key)?),
            // A custom endpoint without a key is a local compatible server
            (None, Some(url)) => Some(OpenAIProvider::new_compatible(url.clone(), "openai")?),
            (None, None) => None,
        };
        match openai {
            Some(provider) => registry.register_with("openai", Arc::new(provider), &config.openai),
            None => {
                registry.unavailable.insert(
                    "openai".to_string(),
                    format!("no API key (set {OPENAI_KEY_VAR} or providers.openai.api_key)"),
                );
            }
        }

        Ok(registry)
    }

    /// Register (or replace) a provider under `tag` with default request settings.
    pub fn register(&mut self, tag: &str, provider: Arc<dyn LlmProvider>) {
        self.insert(tag, provider, DEFAULT_MAX_TOKENS, None);
    }

    fn register_with(&mut self, tag: &str, provider: Arc<dyn LlmProvider>, settings: &ProviderSettings) {
        self.insert(tag, provider, settings.max_tokens, settings.temperature);
    }

    fn insert(&mut self, tag: &str, provider: Arc<dyn LlmProvider>, max_tokens: u32, temperature: Option<f32>) {
        let tag = tag.to_lowercase();
        tracing::debug!(
            tag = %tag,
            provider = provider.name(),
            default_model = provider.default_model(),
            "Registered provider"
        );
        self.unavailable.remove(&tag);
        self.entries.insert(
            tag,
            Entry {
                provider,
                max_tokens,
                temperature,
            },
        );
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.entries.keys().cloned().collect();
        tags.sort();
        tags
    }

    fn resolve(&self, tag: &str) -> Result<&Entry> {
        let lower = tag.to_lowercase();
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, target)| target.to_string())
            .unwrap_or(lower);

        if let Some(entry) = self.entries.get(&canonical) {
            return Ok(entry);
        }
        if let Some(reason) = self.unavailable.get(&canonical) {
            bail!("Provider '{}' is unavailable: {}", tag, reason);
        }
        bail!(
            "Unknown provider: {}. Registered providers: {}",
            tag,
            self.tags().join(", ")
        )
    }

    /// Explain why `tag` cannot be used, if it cannot.
    pub fn availability_error(&self, tag: &str) -> Option<String> {
        self.resolve(tag).err().map(|e| e.to_string())
    }
}

#[async_trait]
impl ModelGateway for ProviderRegistry {
    async fn invoke(&self, prompt: &str, provider: &str, model: &str) -> Result<String> {
        let entry = self.resolve(provider)?;
        let request = ProviderRequest::from_prompt(prompt)
            .with_model(model)
            .with_max_tokens(entry.max_tokens)
            .with_temperature(entry.temperature);

        let response = entry.provider.send_message(&request).await?;
        Ok(response.text())
    }

    fn has_provider(&self, provider: &str) -> bool {
        self.resolve(provider).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderResponse;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
            Ok(ProviderResponse {
                id: "echo".to_string(),
                model: request.model.clone(),
                content: vec![format!("{}|{}", request.model, request.messages[0].content)],
                stop_reason: None,
                provider: "echo".to_string(),
            })
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn default_model(&self) -> &str {
            "echo-1"
        }
    }

    #[tokio::test]
    async fn test_registered_provider_dispatch() {
        let mut registry = ProviderRegistry::new();
        registry.register("Echo", Arc::new(EchoProvider));

        let out = registry.invoke("hello", "ECHO", "m1").await.unwrap();
        assert_eq!(out, "m1|hello");
        assert!(registry.has_provider("echo"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_an_error() {
        let registry = ProviderRegistry::new();
        let err = registry.invoke("hello", "nope", "m").await.unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
        assert!(!registry.has_provider("nope"));
    }

    #[tokio::test]
    async fn test_alias_resolves_to_openai() {
        let mut registry = ProviderRegistry::new();
        registry.register("openai", Arc::new(EchoProvider));
        assert!(registry.has_provider("gpt"));
        assert_eq!(registry.invoke("x", "GPT", "gpt-4").await.unwrap(), "gpt-4|x");
    }

    #[test]
    fn test_missing_key_is_reported_as_unavailable() {
        let config = ProvidersConfig {
            claude: ProviderSettings {
                api_key: Some("sk-test".into()),
                ..Default::default()
            },
            openai: ProviderSettings {
                api_key: Some(String::new()),
                ..Default::default()
            },
        };
        // A blank configured key shadows the environment variable
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.has_provider("claude"));
        let reason = registry.availability_error("openai").unwrap();
        assert!(reason.contains("no API key"));
    }

    #[test]
    fn test_keyless_base_url_registers_compatible_server() {
        let config = ProvidersConfig {
            openai: ProviderSettings {
                base_url: Some("http://localhost:11434".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.has_provider("openai"));
    }
}
