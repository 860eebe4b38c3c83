// Subcommand handlers

use anyhow::{bail, Context, Result};
use crossterm::style::Stylize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{Cli, Commands};
use crate::config::{load_config, to_toml_string, Config, Stage};
use crate::dataset::{load_dataset, load_inputs};
use crate::errors::{file_not_found_error, OptimizerError};
use crate::optimizer::{
    Dataset, EvalOptions, OptimizationLoop, Outcome, PromptCandidate, QualityScore,
    RetryingInvoker, RunContext, Templates,
};
use crate::persistence::{find_latest_golden_prompt, load_golden_prompt, PromptStore, RunMetadata};
use crate::predict::{write_predictions, Predictor};
use crate::providers::ProviderRegistry;
use crate::report;

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Optimize {
            use_case,
            dataset,
            max_iterations,
            no_parallel,
        } => {
            if let Some(max) = max_iterations {
                config.optimization.max_iterations = max;
            }
            if no_parallel {
                config.performance.enable_parallel = false;
            }
            optimize(config, use_case, dataset).await
        }
        Commands::Evaluate { prompt, dataset } => evaluate(config, &prompt, dataset).await,
        Commands::Predict {
            prompt,
            input,
            output,
        } => predict(config, prompt, input, output).await,
        Commands::Config => show_config(&config),
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            handle.cancel();
        }
    });
    token
}

fn load_cases(config: &Config, dataset: Option<PathBuf>) -> Result<Dataset> {
    let path = dataset.unwrap_or_else(|| config.data.dataset_file.clone());
    println!("📁 Loading test data from {}...", path.display());
    let cases = load_dataset(&path)?;
    if cases.is_empty() {
        return Err(OptimizerError::EmptyDataset)
            .with_context(|| format!("No usable rows in {}", path.display()));
    }
    Ok(cases)
}

fn build_loop(config: Arc<Config>) -> Result<OptimizationLoop> {
    let registry = ProviderRegistry::from_config(&config.providers)?;
    let templates = Templates::load(config.advanced.custom_prompts_file.as_deref())?;
    let runner = OptimizationLoop::new(Arc::new(registry), config, Arc::new(templates))?;
    Ok(runner)
}

async fn optimize(config: Config, use_case: Option<String>, dataset: Option<PathBuf>) -> Result<()> {
    let use_case = use_case
        .or_else(|| config.project.use_case.clone())
        .filter(|u| !u.trim().is_empty())
        .context("No use case given: pass --use-case or set project.use_case in the config")?;

    let dataset = load_cases(&config, dataset)?;
    println!("{}", report::render_settings(&config, dataset.len()));
    println!("📝 Use case: {}\n", use_case);

    let config = Arc::new(config);
    let runner = build_loop(config.clone())?;
    let cancel = cancel_on_ctrl_c();
    let ctx = RunContext::new(use_case, dataset).with_cancel(cancel.clone());

    let result = runner.run(&ctx).await?;
    println!("{}", report::render_summary(&result));

    // Re-validate the winner in a clean sequential pass
    let mut final_score = result.best_score;
    if result.outcome != Outcome::Cancelled {
        println!("🔍 Final validation...");
        let evaluator = runner.evaluator(cancel.clone());
        match evaluator
            .evaluate(&result.best, &ctx.dataset, &EvalOptions::sequential().quiet())
            .await
        {
            Ok(evaluation) => {
                final_score = QualityScore::from_evaluation(&evaluation);
                println!("{}", report::render_validation(&final_score, &evaluation));
            }
            Err(e) if e.is_cancelled() => {
                println!("{} Final validation skipped", "⚠".yellow());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let store = PromptStore::new(&config.data.output_dir)?;
    let meta = RunMetadata {
        use_case: ctx.use_case.clone(),
        case_count: ctx.dataset.len(),
        score: final_score,
    };
    let saved = store.save(&meta, &result)?;
    println!("{}", report::render_saved(&saved));
    Ok(())
}

async fn evaluate(config: Config, prompt_file: &Path, dataset: Option<PathBuf>) -> Result<()> {
    let prompt = PromptCandidate::new(load_golden_prompt(prompt_file)?);
    let dataset = load_cases(&config, dataset)?;

    let config = Arc::new(config);
    let runner = build_loop(config.clone())?;
    let evaluator = runner.evaluator(cancel_on_ctrl_c());

    println!("🔍 Evaluating {} on {} cases...", prompt_file.display(), dataset.len());
    let evaluation = evaluator
        .evaluate(&prompt, &dataset, &EvalOptions::from_config(&config))
        .await?;
    let score = QualityScore::from_evaluation(&evaluation);
    println!("{}", report::render_validation(&score, &evaluation));
    Ok(())
}

async fn predict(
    config: Config,
    prompt_file: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let prompt_file = match prompt_file {
        Some(path) => path,
        None => find_latest_golden_prompt(&config.data.output_dir).with_context(|| {
            format!(
                "No golden prompt found in {}. Run `golden-prompt optimize` first.",
                config.data.output_dir.display()
            )
        })?,
    };
    if !prompt_file.exists() {
        bail!(file_not_found_error(&prompt_file.display().to_string(), "Golden prompt"));
    }
    println!("📄 Using golden prompt: {}", prompt_file.display());
    let prompt = load_golden_prompt(&prompt_file)?;

    let input = input.unwrap_or_else(|| config.data.actual_data_file.clone());
    let output = output.unwrap_or_else(|| config.data.predicted_data_file.clone());
    let inputs = load_inputs(&input)?;

    let registry = ProviderRegistry::from_config(&config.providers)?;
    let answer = config.models.for_stage(Stage::AnswerGenerator);
    if let Some(reason) = registry.availability_error(&answer.provider) {
        bail!(OptimizerError::ConfigValidation(format!(
            "models.{}: {}",
            Stage::AnswerGenerator,
            reason
        )));
    }

    let invoker = RetryingInvoker::from_config(Arc::new(registry), &config).with_cancel(cancel_on_ctrl_c());
    let predictor = Predictor::new(invoker, config.performance.rate_limit_delay());

    println!("🔄 Processing {} records...", inputs.len());
    let predictions = predictor.predict(&prompt, &inputs).await?;
    write_predictions(&output, &predictions)?;

    let errors = predictions
        .iter()
        .filter(|p| p.predicted_output == "ERROR")
        .count();
    println!(
        "\n{} Saved {} predictions to {}",
        "✓".green().bold(),
        predictions.len(),
        output.display()
    );
    if errors > 0 {
        println!("{} {} rows failed and are marked ERROR", "⚠".yellow(), errors);
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    for settings in [&mut shown.providers.claude, &mut shown.providers.openai] {
        if settings.api_key.is_some() {
            settings.api_key = Some("<redacted>".to_string());
        }
    }
    print!("{}", to_toml_string(&shown)?);
    Ok(())
}
