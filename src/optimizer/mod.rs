// Golden prompt optimization engine
//
// Data flow per iteration:
//   OptimizationLoop → Evaluator → RetryingInvoker → ModelGateway
//   OptimizationLoop → Mutator   → RetryingInvoker → ModelGateway

pub mod evaluator;
pub mod invoker;
pub mod loop_runner;
pub mod matching;
pub mod mutator;
pub mod templates;
pub mod types;

pub use evaluator::{EvalOptions, Evaluator};
pub use invoker::{RetryPolicy, RetryingInvoker};
pub use loop_runner::OptimizationLoop;
pub use matching::{check_match, MatchPolicy};
pub use mutator::{extract_prompt, Mutator};
pub use templates::Templates;
pub use types::{
    CaseOutput, CaseResult, Dataset, Evaluation, IterationRecord, Mutation, OptimizationResult,
    Outcome, PromptCandidate, QualityScore, RunContext, TestCase,
};
