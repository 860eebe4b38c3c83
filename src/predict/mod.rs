// Batch prediction with a finished golden prompt

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::Stage;
use crate::errors::OptimizerError;
use crate::optimizer::RetryingInvoker;

const NO_REASONING: &str = "No specific reasoning provided";

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub input_data: String,
    pub predicted_output: String,
    pub reason: String,
}

/// Applies a golden prompt to unlabeled inputs through the answer stage.
pub struct Predictor {
    invoker: RetryingInvoker,
    rate_limit_delay: Duration,
}

impl Predictor {
    pub fn new(invoker: RetryingInvoker, rate_limit_delay: Duration) -> Self {
        Self {
            invoker,
            rate_limit_delay,
        }
    }

    /// Predict every input in order. Failed rows are recorded as `ERROR`
    /// with the failure text as the reason; only cancellation stops the batch.
    pub async fn predict(&self, prompt: &str, inputs: &[String]) -> Result<Vec<Prediction>, OptimizerError> {
        let total = inputs.len();
        let mut predictions = Vec::with_capacity(total);

        for (index, input) in inputs.iter().enumerate() {
            tracing::info!("Processing {}/{}", index + 1, total);

            let request = prediction_request(prompt, input);
            let (predicted_output, reason) =
                match self.invoker.invoke(&request, Stage::AnswerGenerator).await {
                    Ok(response) => parse_answer(&response),
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::warn!("Error processing input {}: {}", index + 1, e);
                        ("ERROR".to_string(), e.to_string())
                    }
                };

            predictions.push(Prediction {
                input_data: input.clone(),
                predicted_output,
                reason,
            });

            if index + 1 < total && !self.rate_limit_delay.is_zero() {
                let cancel = self.invoker.cancel_token();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(OptimizerError::Cancelled),
                    _ = tokio::time::sleep(self.rate_limit_delay) => {}
                }
            }
        }

        Ok(predictions)
    }
}

fn prediction_request(prompt: &str, input: &str) -> String {
    format!(
        "{prompt}\n\n\
         Input: {input}\n\n\
         Please provide:\n\
         1. Your answer/classification\n\
         2. A brief explanation of your reasoning\n\n\
         Format your response as:\n\
         Answer: [your answer]\n\
         Reasoning: [your explanation]"
    )
}

/// Split a response into (answer, reasoning).
///
/// Looks for `Answer:` and `Reasoning:` lines; reasoning runs to the end of
/// the response. Without an `Answer:` line the first line is the answer and
/// the rest the reasoning.
pub fn parse_answer(response: &str) -> (String, String) {
    let lines: Vec<&str> = response.trim().lines().collect();
    let mut answer = String::new();
    let mut reasoning = String::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = strip_label(line, "answer:") {
            answer = rest.trim().to_string();
        } else if let Some(rest) = strip_label(line, "reasoning:") {
            let mut parts = vec![rest.trim()];
            parts.extend(lines[i + 1..].iter().copied());
            reasoning = parts.join("\n").trim().to_string();
            break;
        }
    }

    if answer.is_empty() && !response.trim().is_empty() {
        let mut parts = response.trim().splitn(2, '\n');
        answer = parts.next().unwrap_or_default().trim().to_string();
        reasoning = parts
            .next()
            .map(|rest| rest.trim().to_string())
            .filter(|rest| !rest.is_empty())
            .unwrap_or_else(|| NO_REASONING.to_string());
    }

    (answer, reasoning)
}

/// Case-insensitive prefix match on `label`
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| &line[label.len()..])
}

/// Write predictions as CSV with an `input_data,predicted_output,reason` header.
pub fn write_predictions(path: &Path, predictions: &[Prediction]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for prediction in predictions {
        writer
            .serialize(prediction)
            .context("Failed to write prediction row")?;
    }
    writer.flush().context("Failed to flush predictions")?;
    Ok(())
}
