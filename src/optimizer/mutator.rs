// Prompt mutation: bootstrap, local patch, feedback-driven rewrite

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::invoker::RetryingInvoker;
use super::templates::{
    Templates, FEEDBACK_COLLECTOR, INITIAL_PROMPT_GENERATOR, PROMPT_EVOLVER, PROMPT_OPTIMIZER,
};
use super::types::{CaseResult, PromptCandidate};
use crate::config::constants::FEEDBACK_SAMPLE_LIMIT;
use crate::config::Stage;
use crate::errors::Result;

static PROMPT_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)START\s*<prompt>\s*(.*?)\s*</prompt>\s*END").unwrap()
});

/// Pull the prompt out of a `START <prompt> ... </prompt> END` block, or
/// return the whole response trimmed when there is none.
pub fn extract_prompt(response: &str) -> String {
    match PROMPT_MARKERS.captures(response).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => response.trim().to_string(),
    }
}

/// Produces new candidates through the model stages.
pub struct Mutator {
    invoker: RetryingInvoker,
    templates: Arc<Templates>,
}

impl Mutator {
    pub fn new(invoker: RetryingInvoker, templates: Arc<Templates>) -> Self {
        Self { invoker, templates }
    }

    /// First candidate, written from the use case and one example.
    pub async fn bootstrap(
        &self,
        use_case: &str,
        example_input: &str,
        example_output: &str,
    ) -> Result<PromptCandidate> {
        let prompt = self.templates.render(
            INITIAL_PROMPT_GENERATOR,
            &[
                ("use_case", use_case),
                ("input_data", example_input),
                ("output_data", example_output),
            ],
        )?;
        self.generate(&prompt, Stage::InitialPromptGenerator).await
    }

    /// Repair `current` against a single failing case.
    pub async fn patch(
        &self,
        current: &PromptCandidate,
        failing_input: &str,
        actual_output: &str,
        expected_output: &str,
    ) -> Result<PromptCandidate> {
        let prompt = self.templates.render(
            PROMPT_OPTIMIZER,
            &[
                ("prompt", current.as_str()),
                ("input_data", failing_input),
                ("actual_output", actual_output),
                ("expected_output", expected_output),
            ],
        )?;
        self.generate(&prompt, Stage::PromptOptimizer).await
    }

    /// Rewrite `current` as a whole from a feedback summary.
    pub async fn rewrite(
        &self,
        current: &PromptCandidate,
        feedback: &str,
        success_rate: f64,
        iteration: usize,
    ) -> Result<PromptCandidate> {
        let rate = format_rate(success_rate);
        let iteration = iteration.to_string();
        let prompt = self.templates.render(
            PROMPT_EVOLVER,
            &[
                ("prompt", current.as_str()),
                ("feedback", feedback),
                ("success_rate", &rate),
                ("iteration", &iteration),
            ],
        )?;
        self.generate(&prompt, Stage::PromptEvolver).await
    }

    /// Ask the feedback stage for a diagnosis of the failures. The reply is
    /// used verbatim.
    pub async fn collect_feedback(
        &self,
        current: &PromptCandidate,
        success_rate: f64,
        matches: usize,
        total: usize,
        failed: &[CaseResult],
    ) -> Result<String> {
        let rate = format_rate(success_rate);
        let matches = matches.to_string();
        let total = total.to_string();
        let failed_cases = format_failures(failed);

        let prompt = self.templates.render(
            FEEDBACK_COLLECTOR,
            &[
                ("prompt", current.as_str()),
                ("success_rate", &rate),
                ("successful_cases", &matches),
                ("total_cases", &total),
                ("failed_cases", &failed_cases),
            ],
        )?;
        self.invoker.invoke(&prompt, Stage::FeedbackCollector).await
    }

    async fn generate(&self, prompt: &str, stage: Stage) -> Result<PromptCandidate> {
        let response = self.invoker.invoke(prompt, stage).await?;
        let text = extract_prompt(&response);
        tracing::debug!(stage = %stage, chars = text.len(), "Extracted candidate prompt");
        Ok(PromptCandidate::new(text))
    }
}

fn format_rate(success_rate: f64) -> String {
    format!("{:.1}", success_rate)
}

/// Up to `FEEDBACK_SAMPLE_LIMIT` failures as Input/Expected/Got blocks.
fn format_failures(failed: &[CaseResult]) -> String {
    failed
        .iter()
        .take(FEEDBACK_SAMPLE_LIMIT)
        .map(|result| {
            let mut block = format!(
                "Input: {}\nExpected: {}\nGot: {}\n",
                result.case.input,
                result.case.expected_output,
                result.actual_output.as_evidence()
            );
            if let Some(reason) = &result.case.reason {
                block.push_str(&format!("Reason: {}\n", reason));
            }
            block.push_str("---");
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}
