// Project-wide constants
//
// Centralised here so defaults have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Provider tag used when a stage does not name one.
pub const DEFAULT_PROVIDER: &str = "claude";

/// Model for stages that write prompts (bootstrap, patch, rewrite).
pub const DEFAULT_STRONG_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Model for high-volume stages (answer generation, feedback collection).
pub const DEFAULT_FAST_MODEL: &str = "claude-3-5-sonnet-20241022";

pub const DEFAULT_MAX_ITERATIONS: usize = 15;
pub const DEFAULT_FEEDBACK_FREQUENCY: usize = 3;
pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Datasets at or below this size are always evaluated sequentially.
pub const PARALLEL_THRESHOLD: usize = 3;

/// Failing cases included in a feedback summary.
pub const FEEDBACK_SAMPLE_LIMIT: usize = 5;

/// Default maximum tokens for provider completions.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "golden-prompt.toml";

/// Config directory under $HOME.
pub const HOME_CONFIG_DIR: &str = ".golden-prompt";

pub const DEFAULT_DATASET_FILE: &str = "data/golden_data.csv";
pub const DEFAULT_ACTUAL_DATA_FILE: &str = "data/actual_data.csv";
pub const DEFAULT_PREDICTED_DATA_FILE: &str = "data/predicted_data.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "golden_prompts";
