// Error taxonomy for the optimization core
//
// Per-case model failures are absorbed by the evaluator; everything here that
// reaches the caller aborts the run.

use thiserror::Error;

use crate::config::Stage;

/// Boxed cause carried by model invocation failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Provider/transport failure that survived every retry attempt.
    #[error("model invocation failed at stage '{stage}' after {attempts} attempt(s): {source}")]
    ModelInvocation {
        stage: Stage,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// A template placeholder had no bound value.
    #[error("template '{template}' requires a value for placeholder '{{{key}}}'")]
    TemplateBinding { template: String, key: String },

    #[error("no template named '{0}' is loaded")]
    UnknownTemplate(String),

    #[error("dataset contains no usable test cases")]
    EmptyDataset,

    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("run cancelled")]
    Cancelled,
}

impl OptimizerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OptimizerError::Cancelled)
    }
}

pub type Result<T, E = OptimizerError> = std::result::Result<T, E>;

/// User-facing message for a config file that failed to parse.
pub fn config_parse_error(path: &str, detail: &str) -> String {
    format!(
        "Failed to parse configuration file {path}\n\n{detail}\n\n\
         Run `golden-prompt config` to print a valid configuration to start from."
    )
}

/// User-facing message for a missing input file.
pub fn file_not_found_error(path: &str, what: &str) -> String {
    format!("{what} not found: {path}")
}
