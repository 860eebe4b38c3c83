// Golden Prompt
// Main entry point

use anyhow::Result;
use clap::Parser;

use golden_prompt::cli::{commands, Cli};
use golden_prompt::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    commands::run(cli).await
}
