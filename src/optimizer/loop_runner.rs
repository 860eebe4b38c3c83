// Optimization loop runner: evaluate, score, keep the best, mutate, repeat

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::evaluator::{EvalOptions, Evaluator};
use super::invoker::RetryingInvoker;
use super::matching::MatchPolicy;
use super::mutator::Mutator;
use super::templates::Templates;
use super::types::{
    Evaluation, IterationRecord, Mutation, OptimizationResult, Outcome, PromptCandidate,
    QualityScore, RunContext,
};
use crate::config::{Config, Stage};
use crate::errors::{OptimizerError, Result};
use crate::providers::ModelGateway;

/// The golden prompt loop.
///
/// Bootstraps a prompt from the first test case, then iterates until one of
/// the following holds:
/// - every case matches, or the success rate reaches the configured target
/// - the iteration cap is reached
/// - there is no failing case left to patch from
/// - the run is cancelled
pub struct OptimizationLoop {
    gateway: Arc<dyn ModelGateway>,
    config: Arc<Config>,
    templates: Arc<Templates>,
    options: EvalOptions,
}

impl OptimizationLoop {
    /// Check the configuration and that every stage's provider can be
    /// dispatched to, before any model call is made.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        config: Arc<Config>,
        templates: Arc<Templates>,
    ) -> Result<Self> {
        if config.validation.validate_config {
            config.validate()?;
        }
        for stage in Stage::ALL {
            let target = config.models.for_stage(stage);
            if !gateway.has_provider(&target.provider) {
                return Err(OptimizerError::ConfigValidation(format!(
                    "models.{stage}: provider '{}' is not available",
                    target.provider
                )));
            }
        }

        let options = EvalOptions::from_config(&config);
        Ok(Self {
            gateway,
            config,
            templates,
            options,
        })
    }

    /// Override the evaluation options taken from the config.
    pub fn with_eval_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    /// An evaluator wired to the same gateway, models and templates.
    pub fn evaluator(&self, cancel: CancellationToken) -> Evaluator {
        Evaluator::new(
            self.invoker(cancel),
            self.templates.clone(),
            MatchPolicy::from(self.config.matching),
        )
    }

    fn invoker(&self, cancel: CancellationToken) -> RetryingInvoker {
        RetryingInvoker::from_config(self.gateway.clone(), &self.config).with_cancel(cancel)
    }

    /// Run the full loop for `ctx`.
    pub async fn run(&self, ctx: &RunContext) -> Result<OptimizationResult> {
        let dataset = &ctx.dataset;
        let first = dataset.first().ok_or(OptimizerError::EmptyDataset)?;
        let max_iterations = self.config.optimization.max_iterations;

        let evaluator = self.evaluator(ctx.cancel.clone());
        let mutator = Mutator::new(self.invoker(ctx.cancel.clone()), self.templates.clone());

        tracing::info!(
            use_case = %ctx.use_case,
            cases = dataset.len(),
            max_iterations,
            "Starting golden prompt optimization"
        );

        // ── Bootstrapping ───────────────────────────────────────────────────
        let mut current = mutator
            .bootstrap(&ctx.use_case, &first.input, &first.expected_output)
            .await?;
        tracing::info!("Initial prompt created");

        let mut best = current.clone();
        let mut best_score = QualityScore::default();
        let mut history: Vec<IterationRecord> = Vec::new();

        // ── Iterating ───────────────────────────────────────────────────────
        for iteration in 1..=max_iterations {
            if ctx.cancel.is_cancelled() {
                return Ok(finish(best, best_score, history, Outcome::Cancelled));
            }
            tracing::info!("Iteration {}/{}", iteration, max_iterations);

            // 1. Evaluate the current candidate
            let evaluation = match evaluator.evaluate(&current, dataset, &self.options).await {
                Ok(evaluation) => evaluation,
                Err(e) if e.is_cancelled() => {
                    return Ok(finish(best, best_score, history, Outcome::Cancelled))
                }
                Err(e) => return Err(e),
            };

            // 2. Score it from the same evaluation
            let score = QualityScore::from_evaluation(&evaluation);
            tracing::info!(
                "Performance: {}/{} ({:.1}%), quality {:.1}/100",
                evaluation.matches,
                evaluation.total,
                score.success_rate,
                score.overall_quality
            );

            // 3. Keep the best; ties keep the earlier candidate
            if score.overall_quality > best_score.overall_quality {
                best = current.clone();
                best_score = score;
                tracing::info!("New best prompt (quality {:.1})", score.overall_quality);
            }

            history.push(IterationRecord {
                iteration,
                success_rate: score.success_rate,
                quality_score: score.overall_quality,
                prompt: current.text.clone(),
                matches: evaluation.matches,
                total: evaluation.total,
                best_quality: best_score.overall_quality,
                mutation: None,
            });

            // 4. Convergence
            if evaluation.is_perfect()
                || score.success_rate >= self.config.optimization.target_success_rate
            {
                tracing::info!("Converged at iteration {}", iteration);
                return Ok(finish(
                    best,
                    best_score,
                    history,
                    Outcome::Converged { iteration },
                ));
            }

            if iteration == max_iterations {
                break;
            }

            // 5. Mutate
            let Some(kind) = next_mutation(
                iteration,
                self.config.optimization.feedback_frequency,
                !evaluation.failed.is_empty(),
            ) else {
                tracing::warn!("No failing case to learn from; stopping early");
                return Ok(finish(best, best_score, history, Outcome::Exhausted));
            };

            match self
                .mutate(&mutator, kind, iteration, &current, &evaluation, score)
                .await
            {
                Ok(next) => {
                    current = next;
                    if let Some(last) = history.last_mut() {
                        last.mutation = Some(kind);
                    }
                }
                Err(e) if e.is_cancelled() => {
                    return Ok(finish(best, best_score, history, Outcome::Cancelled))
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            "Iteration cap reached; best quality {:.1}/100",
            best_score.overall_quality
        );
        Ok(finish(best, best_score, history, Outcome::Exhausted))
    }

    async fn mutate(
        &self,
        mutator: &Mutator,
        kind: Mutation,
        iteration: usize,
        current: &PromptCandidate,
        evaluation: &Evaluation,
        score: QualityScore,
    ) -> Result<PromptCandidate> {
        match (kind, evaluation.failed.first()) {
            (Mutation::Rewrite, _) => {
                tracing::info!("Collecting feedback for a global rewrite");
                let feedback = mutator
                    .collect_feedback(
                        current,
                        score.success_rate,
                        evaluation.matches,
                        evaluation.total,
                        &evaluation.failed,
                    )
                    .await?;
                mutator
                    .rewrite(current, &feedback, score.success_rate, iteration)
                    .await
            }
            // Always the first failure in dataset order
            (Mutation::Patch, Some(failure)) => {
                tracing::info!("Patching prompt from a failed case");
                mutator
                    .patch(
                        current,
                        &failure.case.input,
                        &failure.actual_output.as_evidence(),
                        &failure.case.expected_output,
                    )
                    .await
            }
            // next_mutation only picks Patch when a failure exists
            (Mutation::Patch, None) => Ok(current.clone()),
        }
    }
}

/// Which mutation follows `iteration`, if any.
fn next_mutation(iteration: usize, feedback_frequency: usize, has_failures: bool) -> Option<Mutation> {
    if feedback_frequency > 0 && iteration % feedback_frequency == 0 && iteration > 2 {
        Some(Mutation::Rewrite)
    } else if has_failures {
        Some(Mutation::Patch)
    } else {
        None
    }
}

fn finish(
    best: PromptCandidate,
    best_score: QualityScore,
    history: Vec<IterationRecord>,
    outcome: Outcome,
) -> OptimizationResult {
    if outcome == Outcome::Cancelled {
        tracing::warn!(
            iterations = history.len(),
            "Optimization cancelled; returning best prompt so far"
        );
    }
    OptimizationResult {
        best,
        best_score,
        history,
        outcome,
    }
}
