// Shared helpers for integration tests
//
// A scripted in-process gateway stands in for real models. Every stage is
// configured with its own model id so the gateway can route by model.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use golden_prompt::config::{Config, ModelsConfig, StageModel};
use golden_prompt::optimizer::templates::ANSWER_GENERATOR;
use golden_prompt::optimizer::{Dataset, TestCase, Templates};
use golden_prompt::providers::ModelGateway;

pub const INIT: &str = "init-model";
pub const ANSWER: &str = "answer-model";
pub const PATCH: &str = "patch-model";
pub const FEEDBACK: &str = "feedback-model";
pub const EVOLVE: &str = "evolve-model";

/// Separates prompt and input in the test answer template
pub const ANSWER_SEPARATOR: &str = "\n---INPUT---\n";

type Handler = Box<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

/// Routes each call to the handler registered for its model id and keeps a
/// log of `(model, prompt)` pairs.
#[derive(Default)]
pub struct ScriptedGateway {
    handlers: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        model: &str,
        handler: impl Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(model.to_string(), Box::new(handler));
        self
    }

    /// Answer stage handler receiving `(prompt, input)`.
    pub fn on_answer(
        self,
        handler: impl Fn(&str, &str) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.on(ANSWER, move |rendered| {
            let (prompt, input) = split_answer(rendered);
            handler(prompt, input)
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Models called, in order, skipping the answer stage
    pub fn mutation_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(model, _)| model)
            .filter(|model| model != ANSWER)
            .collect()
    }

    pub fn prompts_for(&self, model: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == model)
            .map(|(_, prompt)| prompt)
            .collect()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(&self, prompt: &str, provider: &str, model: &str) -> anyhow::Result<String> {
        assert_eq!(provider, "mock", "tests only configure the mock provider");
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        match self.handlers.get(model) {
            Some(handler) => handler(prompt),
            None => anyhow::bail!("no handler scripted for model {model}"),
        }
    }

    fn has_provider(&self, provider: &str) -> bool {
        provider == "mock"
    }
}

pub fn split_answer(rendered: &str) -> (&str, &str) {
    rendered
        .split_once(ANSWER_SEPARATOR)
        .unwrap_or((rendered, ""))
}

/// Wrap a prompt in the markers the mutator extracts from.
pub fn marked(prompt: &str) -> String {
    format!("Here you go:\nSTART\n<prompt>\n{prompt}\n</prompt>\nEND")
}

/// Fast, deterministic config routed to the scripted gateway.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.models = ModelsConfig {
        initial_prompt_generator: StageModel::new("mock", INIT),
        answer_generator: StageModel::new("mock", ANSWER),
        prompt_optimizer: StageModel::new("mock", PATCH),
        feedback_collector: StageModel::new("mock", FEEDBACK),
        prompt_evolver: StageModel::new("mock", EVOLVE),
    };
    config.performance.max_retries = 0;
    config.performance.retry_delay = 0.0;
    config.performance.rate_limit_delay = 0.0;
    config.performance.enable_parallel = false;
    config.output.verbose_logging = false;
    config
}

pub fn test_templates() -> Arc<Templates> {
    let answer = format!("{{prompt}}{ANSWER_SEPARATOR}{{input_data}}");
    Arc::new(Templates::builtin().unwrap().with_template(ANSWER_GENERATOR, answer))
}

pub fn dataset(pairs: &[(&str, &str)]) -> Dataset {
    pairs
        .iter()
        .map(|(input, expected)| TestCase::new(*input, *expected))
        .collect()
}
