// Evaluator - score a candidate prompt against a dataset
//
// Cases run either strictly in order or on a bounded pool of tokio tasks,
// batch by batch. Per-case model failures count as mismatches; only
// cancellation and template errors abort an evaluation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::matching::MatchPolicy;
use super::templates::{Templates, ANSWER_GENERATOR};
use super::types::{CaseOutput, CaseResult, Dataset, Evaluation, PromptCandidate, QualityScore, TestCase};
use super::invoker::RetryingInvoker;
use crate::config::constants::PARALLEL_THRESHOLD;
use crate::config::{Config, Stage};
use crate::errors::{OptimizerError, Result};

/// How to run one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOptions {
    pub parallel: bool,
    /// Concurrent cases across the whole evaluation
    pub max_workers: usize,
    pub batch_size: usize,
    /// Log one line per case
    pub verbose: bool,
    /// Half the pause taken between batches
    pub rate_limit_delay: Duration,
}

impl EvalOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallel: config.performance.enable_parallel,
            max_workers: config.performance.max_workers.max(1),
            batch_size: config.performance.batch_size.max(1),
            verbose: config.output.verbose_logging,
            rate_limit_delay: config.performance.rate_limit_delay(),
        }
    }

    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    fn batch_pause(&self) -> Duration {
        self.rate_limit_delay * 2
    }
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: 4,
            batch_size: 8,
            verbose: false,
            rate_limit_delay: Duration::from_millis(500),
        }
    }
}

/// Why the parallel path did not produce results
enum ParallelError {
    /// A case failed in a way that aborts the evaluation
    Case(OptimizerError),
    /// The worker pool itself broke (panic, abort)
    Pool(String),
}

/// Runs the answer stage for every case and compares outputs.
#[derive(Clone)]
pub struct Evaluator {
    invoker: RetryingInvoker,
    templates: Arc<Templates>,
    policy: MatchPolicy,
}

impl Evaluator {
    pub fn new(invoker: RetryingInvoker, templates: Arc<Templates>, policy: MatchPolicy) -> Self {
        Self {
            invoker,
            templates,
            policy,
        }
    }

    /// Evaluate `prompt` on every case of `dataset`.
    pub async fn evaluate(
        &self,
        prompt: &PromptCandidate,
        dataset: &Dataset,
        options: &EvalOptions,
    ) -> Result<Evaluation> {
        if options.parallel && dataset.len() > PARALLEL_THRESHOLD {
            match self.run_parallel(prompt, dataset, options).await {
                Ok(results) => return Ok(Evaluation::from_results(results)),
                Err(ParallelError::Case(e)) => return Err(e),
                Err(ParallelError::Pool(reason)) => {
                    tracing::warn!(
                        "Parallel evaluation failed ({}), re-running sequentially",
                        reason
                    );
                }
            }
        }

        let results = self.run_sequential(prompt, dataset, options).await?;
        Ok(Evaluation::from_results(results))
    }

    /// Sequential, quiet evaluation reduced to a quality score.
    pub async fn calculate_quality_score(
        &self,
        prompt: &PromptCandidate,
        dataset: &Dataset,
    ) -> Result<QualityScore> {
        let evaluation = self
            .evaluate(prompt, dataset, &EvalOptions::sequential().quiet())
            .await?;
        Ok(QualityScore::from_evaluation(&evaluation))
    }

    async fn run_sequential(
        &self,
        prompt: &PromptCandidate,
        dataset: &Dataset,
        options: &EvalOptions,
    ) -> Result<Vec<CaseResult>> {
        let total = dataset.len();
        let mut results = Vec::with_capacity(total);

        for (index, case) in dataset.iter().enumerate() {
            let result = self.evaluate_case(prompt.as_str(), case).await?;
            if options.verbose {
                log_case(index + 1, total, &result);
            }
            results.push(result);
        }

        Ok(results)
    }

    async fn run_parallel(
        &self,
        prompt: &PromptCandidate,
        dataset: &Dataset,
        options: &EvalOptions,
    ) -> std::result::Result<Vec<CaseResult>, ParallelError> {
        let total = dataset.len();
        let prompt: Arc<str> = Arc::from(prompt.as_str());
        // Options may bypass from_config, so a zero must not reach the pool
        let workers = options.max_workers.max(1);
        let batch_size = options.batch_size.max(1);
        // One pool for the whole evaluation, shared by every batch
        let semaphore = Arc::new(Semaphore::new(workers));
        let batch_count = total.div_ceil(batch_size);
        let mut results = Vec::with_capacity(total);

        tracing::debug!(
            cases = total,
            batches = batch_count,
            workers,
            "Starting parallel evaluation"
        );

        for (batch_no, batch) in dataset.chunks(batch_size).enumerate() {
            let offset = batch_no * batch_size;
            let mut handles: Vec<JoinHandle<Result<CaseResult>>> = Vec::with_capacity(batch.len());

            for case in batch {
                let worker = self.clone();
                let prompt = prompt.clone();
                let case = case.clone();
                let semaphore = semaphore.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| OptimizerError::Cancelled)?;
                    worker.evaluate_case(&prompt, &case).await
                }));
            }

            // Handles are awaited in spawn order, so results stay in case order
            let mut pending = handles.into_iter();
            let mut intra = 0;
            while let Some(handle) = pending.next() {
                let joined = handle.await;
                let outcome = match joined {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(ParallelError::Case(e)),
                    Err(join_err) => Err(ParallelError::Pool(join_err.to_string())),
                };
                match outcome {
                    Ok(result) => {
                        if options.verbose {
                            log_case(offset + intra + 1, total, &result);
                        }
                        results.push(result);
                        intra += 1;
                    }
                    Err(e) => {
                        for rest in pending {
                            rest.abort();
                        }
                        return Err(e);
                    }
                }
            }

            if batch_no + 1 < batch_count {
                let cancel = self.invoker.cancel_token();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ParallelError::Case(OptimizerError::Cancelled)),
                    _ = tokio::time::sleep(options.batch_pause()) => {}
                }
            }
        }

        Ok(results)
    }

    async fn evaluate_case(&self, prompt: &str, case: &TestCase) -> Result<CaseResult> {
        let rendered = self.templates.render(
            ANSWER_GENERATOR,
            &[("prompt", prompt), ("input_data", &case.input)],
        )?;

        let actual_output = match self.invoker.invoke(&rendered, Stage::AnswerGenerator).await {
            Ok(text) => CaseOutput::Text(text),
            Err(e @ OptimizerError::ModelInvocation { .. }) => {
                tracing::warn!("Answer generation failed: {}", e);
                CaseOutput::Error(e.to_string())
            }
            Err(e) => return Err(e),
        };

        let matched = match &actual_output {
            CaseOutput::Text(text) => self.policy.matches(text, &case.expected_output),
            CaseOutput::Error(_) => false,
        };

        Ok(CaseResult {
            case: case.clone(),
            actual_output,
            matched,
        })
    }
}

fn log_case(number: usize, total: usize, result: &CaseResult) {
    if result.matched {
        tracing::info!("Test {}/{}: match", number, total);
    } else {
        tracing::info!(
            "Test {}/{}: mismatch (expected: {:?}, got: {:?})",
            number,
            total,
            preview(&result.case.expected_output, 50),
            preview(&result.actual_output.as_evidence(), 50)
        );
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelsConfig;
    use crate::optimizer::invoker::RetryPolicy;
    use crate::providers::ModelGateway;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    /// Rendered prompt is just the input; answers "ok" for inputs starting
    /// with "good", fails for inputs starting with "fail".
    struct ScriptedGateway {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        panicked: AtomicBool,
        /// (input, start, end) per call
        spans: Mutex<Vec<(String, Instant, Instant)>>,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                panicked: AtomicBool::new(false),
                spans: Mutex::new(Vec::new()),
            }
        }

        fn span(&self, input: &str) -> (Instant, Instant) {
            let spans = self.spans.lock().unwrap();
            let (_, start, end) = spans.iter().find(|(i, _, _)| i == input).unwrap();
            (*start, *end)
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn invoke(&self, prompt: &str, _provider: &str, _model: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = Instant::now();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.spans
                .lock()
                .unwrap()
                .push((prompt.to_string(), start, Instant::now()));

            if prompt.starts_with("boom") && !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("worker blew up");
            }
            if prompt.starts_with("fail") {
                anyhow::bail!("provider unavailable");
            }
            if prompt.starts_with("good") {
                Ok("OK ".to_string())
            } else {
                Ok("nope".to_string())
            }
        }
    }

    fn evaluator(gateway: Arc<ScriptedGateway>, cancel: CancellationToken) -> Evaluator {
        let invoker = RetryingInvoker::new(
            gateway,
            ModelsConfig::uniform("mock", "m"),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                exponential_backoff: true,
            },
        )
        .with_cancel(cancel);
        let templates = Templates::builtin()
            .unwrap()
            .with_template(ANSWER_GENERATOR, "{input_data}");
        Evaluator::new(invoker, Arc::new(templates), MatchPolicy::default())
    }

    fn dataset(inputs: &[&str]) -> Dataset {
        inputs.iter().map(|i| TestCase::new(*i, "ok")).collect()
    }

    fn parallel(max_workers: usize, batch_size: usize) -> EvalOptions {
        EvalOptions {
            parallel: true,
            max_workers,
            batch_size,
            verbose: true,
            rate_limit_delay: Duration::from_millis(100),
        }
    }

    fn failed_inputs(eval: &Evaluation) -> Vec<String> {
        eval.failed.iter().map(|r| r.case.input.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_counts_and_order() {
        let gateway = Arc::new(ScriptedGateway::new());
        let eval = evaluator(gateway, CancellationToken::new())
            .evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["good1", "bad1", "good2", "bad2"]),
                &EvalOptions::sequential(),
            )
            .await
            .unwrap();

        assert_eq!(eval.matches, 2);
        assert_eq!(eval.total, 4);
        assert_eq!(failed_inputs(&eval), vec!["bad1", "bad2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_matches_sequential() {
        let inputs = [
            "good1", "bad1", "fail1", "good2", "bad2", "good3", "good4", "bad3", "fail2", "good5",
            "bad4",
        ];
        let data = dataset(&inputs);
        let prompt = PromptCandidate::new("p");

        let seq = evaluator(Arc::new(ScriptedGateway::new()), CancellationToken::new())
            .evaluate(&prompt, &data, &EvalOptions::sequential())
            .await
            .unwrap();
        let par = evaluator(Arc::new(ScriptedGateway::new()), CancellationToken::new())
            .evaluate(&prompt, &data, &parallel(3, 4))
            .await
            .unwrap();

        assert_eq!(seq.matches, par.matches);
        assert_eq!(seq.total, par.total);
        assert_eq!(failed_inputs(&seq), failed_inputs(&par));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_respects_worker_bound() {
        let gateway = Arc::new(ScriptedGateway::new());
        let inputs: Vec<String> = (0..20).map(|i| format!("good{i}")).collect();
        let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();

        let eval = evaluator(gateway.clone(), CancellationToken::new())
            .evaluate(&PromptCandidate::new("p"), &dataset(&refs), &parallel(3, 8))
            .await
            .unwrap();

        assert_eq!(eval.matches, 20);
        assert!(gateway.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_one_after_another_with_pause() {
        let gateway = Arc::new(ScriptedGateway::new());
        let inputs = ["good0", "good1", "good2", "good3", "good4"];
        let options = EvalOptions {
            rate_limit_delay: Duration::from_secs(1),
            ..parallel(4, 2)
        };

        let eval = evaluator(gateway.clone(), CancellationToken::new())
            .evaluate(&PromptCandidate::new("p"), &dataset(&inputs), &options)
            .await
            .unwrap();
        assert_eq!(eval.matches, 5);

        let batches: Vec<Vec<(Instant, Instant)>> = inputs
            .chunks(2)
            .map(|batch| batch.iter().map(|i| gateway.span(i)).collect())
            .collect();
        for pair in batches.windows(2) {
            let last_end = pair[0].iter().map(|(_, end)| *end).max().unwrap();
            let first_start = pair[1].iter().map(|(start, _)| *start).min().unwrap();
            assert!(first_start >= last_end + Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_batch_size_is_treated_as_one() {
        let gateway = Arc::new(ScriptedGateway::new());
        let eval = evaluator(gateway.clone(), CancellationToken::new())
            .evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["good1", "bad1", "good2", "good3", "good4"]),
                &parallel(3, 0),
            )
            .await
            .unwrap();

        assert_eq!(eval.total, 5);
        assert_eq!(eval.matches, 4);
        // One case per batch
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_workers_still_makes_progress() {
        let gateway = Arc::new(ScriptedGateway::new());
        let eval = tokio::time::timeout(
            Duration::from_secs(30),
            evaluator(gateway.clone(), CancellationToken::new()).evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["good1", "bad1", "good2", "good3", "good4"]),
                &parallel(0, 8),
            ),
        )
        .await
        .expect("evaluation stalled")
        .unwrap();

        assert_eq!(eval.matches, 4);
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_dataset_runs_sequentially() {
        let gateway = Arc::new(ScriptedGateway::new());
        evaluator(gateway.clone(), CancellationToken::new())
            .evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["good1", "good2", "good3"]),
                &parallel(3, 8),
            )
            .await
            .unwrap();
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_failure_is_recorded_as_mismatch() {
        let gateway = Arc::new(ScriptedGateway::new());
        let eval = evaluator(gateway, CancellationToken::new())
            .evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["fail1", "good1"]),
                &EvalOptions::sequential(),
            )
            .await
            .unwrap();

        assert_eq!(eval.matches, 1);
        let failure = &eval.failed[0];
        assert!(failure.actual_output.is_error());
        assert!(failure
            .actual_output
            .as_evidence()
            .contains("provider unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_panic_falls_back_to_sequential() {
        let gateway = Arc::new(ScriptedGateway::new());
        let eval = evaluator(gateway.clone(), CancellationToken::new())
            .evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["good1", "boom", "good2", "good3", "bad1"]),
                &parallel(2, 8),
            )
            .await
            .unwrap();

        assert_eq!(eval.total, 5);
        assert_eq!(eval.matches, 3);
        assert_eq!(failed_inputs(&eval), vec!["boom", "bad1"]);
        assert!(gateway.panicked.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_evaluation_aborts() {
        let gateway = Arc::new(ScriptedGateway::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = evaluator(gateway, token)
            .evaluate(
                &PromptCandidate::new("p"),
                &dataset(&["good1", "good2", "good3", "good4", "good5"]),
                &parallel(2, 2),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quality_score_from_sequential_run() {
        let gateway = Arc::new(ScriptedGateway::new());
        let score = evaluator(gateway, CancellationToken::new())
            .calculate_quality_score(&PromptCandidate::new("p"), &dataset(&["good", "bad"]))
            .await
            .unwrap();
        assert_eq!(score.success_rate, 50.0);
        assert_eq!(score.overall_quality, 50.0);
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("hi", 5), "hi");
    }
}
