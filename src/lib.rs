// Golden Prompt - iterative prompt optimization against labeled data
// Library exports

pub mod cli;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod logging;
pub mod optimizer;
pub mod persistence;
pub mod predict;
pub mod providers;
pub mod report;

pub use errors::OptimizerError;
pub use optimizer::{OptimizationLoop, OptimizationResult, Outcome, RunContext};
