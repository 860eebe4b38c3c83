// Provider connection settings (API keys, endpoints, sampling)

use serde::{Deserialize, Serialize};

use super::constants::DEFAULT_MAX_TOKENS;

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Connection settings for one built-in provider.
///
/// ```toml
/// [providers.openai]
/// base_url = "http://localhost:11434"
/// temperature = 0.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key; falls back to the provider's environment variable when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom endpoint (proxies, compatible local servers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }
}

impl ProviderSettings {
    /// Configured key, else the named environment variable (empty values ignored).
    pub fn resolve_api_key(&self, env_var: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub claude: ProviderSettings,
    pub openai: ProviderSettings,
}
