// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod provider;
mod settings;

pub use loader::{load_config, load_from_path, parse_config, to_toml_string};
pub use provider::{ProviderSettings, ProvidersConfig};
pub use settings::{
    AdvancedConfig, Config, DataConfig, MatchingConfig, ModelsConfig, OptimizationConfig,
    OutputConfig, PerformanceConfig, ProjectConfig, Stage, StageModel, ValidationConfig,
};
