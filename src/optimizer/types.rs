// Optimizer data model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use tokio_util::sync::CancellationToken;

/// One labeled example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    /// Optional annotator note explaining the expected output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Ordered, read-only collection of test cases. The first case seeds the
/// bootstrap prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset(Vec<TestCase>);

impl Deref for Dataset {
    type Target = [TestCase];

    fn deref(&self) -> &[TestCase] {
        &self.0
    }
}

impl From<Vec<TestCase>> for Dataset {
    fn from(cases: Vec<TestCase>) -> Self {
        Self(cases)
    }
}

impl FromIterator<TestCase> for Dataset {
    fn from_iter<I: IntoIterator<Item = TestCase>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Prompt text under evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptCandidate {
    pub text: String,
}

impl PromptCandidate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for PromptCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// What the answer stage produced for a case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutput {
    Text(String),
    /// The model call failed after all retries; the message is kept as evidence
    Error(String),
}

impl CaseOutput {
    /// Text shown to the mutator and in reports
    pub fn as_evidence(&self) -> String {
        match self {
            CaseOutput::Text(text) => text.clone(),
            CaseOutput::Error(message) => format!("ERROR: {message}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CaseOutput::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub case: TestCase,
    pub actual_output: CaseOutput,
    pub matched: bool,
}

/// Outcome of running one prompt over a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub matches: usize,
    pub total: usize,
    /// Failing cases in dataset order
    pub failed: Vec<CaseResult>,
}

impl Evaluation {
    /// Aggregate per-case results already ordered by case index.
    pub fn from_results(results: Vec<CaseResult>) -> Self {
        let total = results.len();
        let failed: Vec<CaseResult> = results.into_iter().filter(|r| !r.matched).collect();
        Self {
            matches: total - failed.len(),
            total,
            failed,
        }
    }

    /// Percentage of matching cases; 0 for an empty evaluation
    pub fn success_rate(&self) -> f64 {
        percent(self.matches, self.total)
    }

    pub fn is_perfect(&self) -> bool {
        self.total > 0 && self.matches == self.total
    }
}

/// Composite quality of a prompt, all components on a 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityScore {
    pub success_rate: f64,
    pub consistency_score: f64,
    pub robustness_score: f64,
    pub overall_quality: f64,
}

impl QualityScore {
    /// Baseline scoring: consistency and robustness mirror the success rate.
    ///
    /// This is the one place richer metrics (variance across repeated runs,
    /// perturbed inputs) would plug in.
    pub fn from_counts(matches: usize, total: usize) -> Self {
        Self::from_success_rate(percent(matches, total))
    }

    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        Self::from_success_rate(evaluation.success_rate())
    }

    fn from_success_rate(success_rate: f64) -> Self {
        let consistency_score = success_rate;
        let robustness_score = success_rate;

        Self {
            success_rate,
            consistency_score,
            robustness_score,
            overall_quality: (success_rate + consistency_score + robustness_score) / 3.0,
        }
    }
}

fn percent(matches: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matches as f64 / total as f64 * 100.0
    }
}

/// Which mutation produced the next candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    /// Local patch from the first failing case
    Patch,
    /// Feedback summary followed by a global rewrite
    Rewrite,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Patch => f.write_str("patch"),
            Mutation::Rewrite => f.write_str("rewrite"),
        }
    }
}

/// One row of the run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub success_rate: f64,
    pub quality_score: f64,
    pub prompt: String,
    pub matches: usize,
    pub total: usize,
    /// Best overall quality seen up to and including this iteration
    pub best_quality: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<Mutation>,
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Converged { iteration: usize },
    /// Iteration cap reached, or no failing case left to patch from
    Exhausted,
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Converged { iteration } => write!(f, "converged at iteration {iteration}"),
            Outcome::Exhausted => f.write_str("exhausted"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best: PromptCandidate,
    pub best_score: QualityScore,
    pub history: Vec<IterationRecord>,
    pub outcome: Outcome,
}

impl OptimizationResult {
    /// Success rate of the last evaluated iteration
    pub fn final_success_rate(&self) -> f64 {
        self.history.last().map(|r| r.success_rate).unwrap_or(0.0)
    }

    pub fn iterations(&self) -> usize {
        self.history.len()
    }
}

/// Per-run inputs shared by every stage of the loop.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub use_case: String,
    pub dataset: Dataset,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(use_case: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            use_case: use_case.into(),
            dataset,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
