// Configuration structs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::constants::*;
use super::provider::ProvidersConfig;
use crate::errors::{OptimizerError, Result};

/// A named model role. Each stage resolves to its own provider/model pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InitialPromptGenerator,
    AnswerGenerator,
    /// Local patch from a single failing case
    PromptOptimizer,
    FeedbackCollector,
    /// Global rewrite from a feedback summary
    PromptEvolver,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::InitialPromptGenerator,
        Stage::AnswerGenerator,
        Stage::PromptOptimizer,
        Stage::FeedbackCollector,
        Stage::PromptEvolver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::InitialPromptGenerator => "initial_prompt_generator",
            Stage::AnswerGenerator => "answer_generator",
            Stage::PromptOptimizer => "prompt_optimizer",
            Stage::FeedbackCollector => "feedback_collector",
            Stage::PromptEvolver => "prompt_evolver",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider tag + model id for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageModel {
    pub provider: String,
    pub model: String,
}

impl StageModel {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

fn default_strong_model() -> StageModel {
    StageModel::new(DEFAULT_PROVIDER, DEFAULT_STRONG_MODEL)
}

fn default_fast_model() -> StageModel {
    StageModel::new(DEFAULT_PROVIDER, DEFAULT_FAST_MODEL)
}

/// Per-stage model routing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_strong_model")]
    pub initial_prompt_generator: StageModel,
    #[serde(default = "default_fast_model")]
    pub answer_generator: StageModel,
    #[serde(default = "default_strong_model")]
    pub prompt_optimizer: StageModel,
    #[serde(default = "default_fast_model")]
    pub feedback_collector: StageModel,
    #[serde(default = "default_strong_model")]
    pub prompt_evolver: StageModel,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            initial_prompt_generator: default_strong_model(),
            answer_generator: default_fast_model(),
            prompt_optimizer: default_strong_model(),
            feedback_collector: default_fast_model(),
            prompt_evolver: default_strong_model(),
        }
    }
}

impl ModelsConfig {
    /// Route every stage to the same provider/model (handy for tests and local servers)
    pub fn uniform(provider: &str, model: &str) -> Self {
        let entry = StageModel::new(provider, model);
        Self {
            initial_prompt_generator: entry.clone(),
            answer_generator: entry.clone(),
            prompt_optimizer: entry.clone(),
            feedback_collector: entry.clone(),
            prompt_evolver: entry,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> &StageModel {
        match stage {
            Stage::InitialPromptGenerator => &self.initial_prompt_generator,
            Stage::AnswerGenerator => &self.answer_generator,
            Stage::PromptOptimizer => &self.prompt_optimizer,
            Stage::FeedbackCollector => &self.feedback_collector,
            Stage::PromptEvolver => &self.prompt_evolver,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Task description used to bootstrap the first prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Labeled dataset (input_data / expected_output / reason)
    pub dataset_file: PathBuf,
    /// Unlabeled inputs for `predict`
    pub actual_data_file: PathBuf,
    pub predicted_data_file: PathBuf,
    /// Where golden prompts and run histories are written
    pub output_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_file: PathBuf::from(DEFAULT_DATASET_FILE),
            actual_data_file: PathBuf::from(DEFAULT_ACTUAL_DATA_FILE),
            predicted_data_file: PathBuf::from(DEFAULT_PREDICTED_DATA_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    pub max_iterations: usize,
    /// Success rate (0–100) at which the loop declares convergence
    pub target_success_rate: f64,
    /// Every Nth iteration (after the 2nd) takes the global rewrite path
    pub feedback_frequency: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            target_success_rate: 100.0,
            feedback_frequency: DEFAULT_FEEDBACK_FREQUENCY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enable_parallel: bool,
    pub max_workers: usize,
    pub batch_size: usize,
    /// Seconds; batches are separated by twice this delay
    pub rate_limit_delay: f64,
    pub max_retries: u32,
    /// Base retry delay in seconds
    pub retry_delay: f64,
    pub exponential_backoff: bool,
    /// Per-attempt deadline in seconds (0 disables)
    pub request_timeout_secs: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            max_workers: DEFAULT_MAX_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_delay: 0.5,
            max_retries: 3,
            retry_delay: 1.0,
            exponential_backoff: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl PerformanceConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        seconds(self.rate_limit_delay)
    }

    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_delay)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Negative, NaN and out-of-range values become zero.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub case_sensitive: bool,
    pub strip_whitespace: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strip_whitespace: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Log one line per evaluated case
    pub verbose_logging: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbose_logging: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    /// TOML file overriding the built-in mutation/answer templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompts_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub validate_config: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validate_config: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Check numeric ranges. Section presence is checked by the loader,
    /// provider availability by the optimization loop.
    pub fn validate(&self) -> Result<()> {
        let opt = &self.optimization;
        if opt.max_iterations < 1 {
            return Err(invalid("optimization.max_iterations must be at least 1"));
        }
        if !(0.0..=100.0).contains(&opt.target_success_rate) {
            return Err(invalid(
                "optimization.target_success_rate must be between 0 and 100",
            ));
        }
        if opt.feedback_frequency < 2 {
            return Err(invalid("optimization.feedback_frequency must be at least 2"));
        }

        let perf = &self.performance;
        if perf.max_workers < 1 {
            return Err(invalid("performance.max_workers must be at least 1"));
        }
        if perf.batch_size < 1 {
            return Err(invalid("performance.batch_size must be at least 1"));
        }
        if !perf.rate_limit_delay.is_finite() || perf.rate_limit_delay < 0.0 {
            return Err(invalid("performance.rate_limit_delay must be >= 0"));
        }
        if !perf.retry_delay.is_finite() || perf.retry_delay < 0.0 {
            return Err(invalid("performance.retry_delay must be >= 0"));
        }

        for stage in Stage::ALL {
            let entry = self.models.for_stage(stage);
            if entry.provider.trim().is_empty() || entry.model.trim().is_empty() {
                return Err(invalid(&format!(
                    "models.{stage} needs both a provider and a model"
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> OptimizerError {
    OptimizerError::ConfigValidation(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_stage_names_match_config_keys() {
        let names: Vec<_> = Stage::ALL.iter().map(Stage::as_str).collect();
        assert_eq!(
            names,
            vec![
                "initial_prompt_generator",
                "answer_generator",
                "prompt_optimizer",
                "feedback_collector",
                "prompt_evolver"
            ]
        );
    }

    #[test]
    fn test_models_for_stage_routes_independently() {
        let mut models = ModelsConfig::default();
        models.prompt_evolver = StageModel::new("openai", "gpt-4o");
        assert_eq!(models.for_stage(Stage::PromptEvolver).provider, "openai");
        assert_eq!(models.for_stage(Stage::PromptOptimizer).provider, DEFAULT_PROVIDER);
    }

    #[test]
    fn test_validate_rejects_low_feedback_frequency() {
        let mut config = Config::default();
        config.optimization.feedback_frequency = 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, OptimizerError::ConfigValidation(_)));
    }

    #[test]
    fn test_unrepresentable_delays_become_zero() {
        let mut perf = PerformanceConfig::default();
        perf.rate_limit_delay = f64::INFINITY;
        perf.retry_delay = f64::NAN;
        assert_eq!(perf.rate_limit_delay(), Duration::ZERO);
        assert_eq!(perf.retry_delay(), Duration::ZERO);

        perf.rate_limit_delay = -2.0;
        perf.retry_delay = 1.5;
        assert_eq!(perf.rate_limit_delay(), Duration::ZERO);
        assert_eq!(perf.retry_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn test_validate_rejects_zero_workers_and_batches() {
        let mut config = Config::default();
        config.performance.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.performance.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_target() {
        let mut config = Config::default();
        config.optimization.target_success_rate = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_zero_disables() {
        let mut perf = PerformanceConfig::default();
        perf.request_timeout_secs = 0;
        assert!(perf.request_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [optimization]
            max_iterations = 4

            [models.answer_generator]
            provider = "openai"
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.optimization.max_iterations, 4);
        assert_eq!(config.optimization.feedback_frequency, DEFAULT_FEEDBACK_FREQUENCY);
        assert_eq!(config.models.answer_generator.model, "gpt-4o-mini");
        assert_eq!(config.models.prompt_evolver.model, DEFAULT_STRONG_MODEL);
        assert_eq!(config.performance.batch_size, DEFAULT_BATCH_SIZE);
    }
}
