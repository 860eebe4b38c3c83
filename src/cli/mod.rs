// Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "golden-prompt")]
#[command(version, about = "Iteratively derive a golden prompt from a labeled dataset", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./golden-prompt.toml, then ~/.golden-prompt/config.toml)
    #[arg(short, long, global = true, env = "GOLDEN_PROMPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug-level diagnostics (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the optimization loop and save the golden prompt
    Optimize {
        /// Task description (default: project.use_case from the config)
        #[arg(short, long)]
        use_case: Option<String>,

        /// Labeled dataset (csv, tsv, xlsx, xls, ods)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        #[arg(short, long)]
        max_iterations: Option<usize>,

        /// Evaluate cases one at a time
        #[arg(long)]
        no_parallel: bool,
    },

    /// Score an existing prompt against a dataset
    Evaluate {
        /// Prompt file (metadata header is ignored)
        #[arg(short, long)]
        prompt: PathBuf,

        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Apply a golden prompt to unlabeled inputs
    Predict {
        /// Prompt file (default: latest in the output directory)
        #[arg(short, long)]
        prompt: Option<PathBuf>,

        /// Input file with an input_data column
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_optimize_flags() {
        let cli = Cli::parse_from([
            "golden-prompt",
            "-v",
            "optimize",
            "--dataset",
            "data.csv",
            "--max-iterations",
            "5",
            "--no-parallel",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Optimize {
                dataset,
                max_iterations,
                no_parallel,
                use_case,
            } => {
                assert_eq!(dataset, Some(PathBuf::from("data.csv")));
                assert_eq!(max_iterations, Some(5));
                assert!(no_parallel);
                assert!(use_case.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["golden-prompt", "config", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(cli.command, Commands::Config));
    }
}
