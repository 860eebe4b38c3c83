// Retry logic with exponential backoff around model calls
//
// Every model call in the optimizer goes through `RetryingInvoker::invoke`.

use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ModelsConfig, PerformanceConfig, Stage, StageModel};
use crate::errors::{OptimizerError, Result};
use crate::providers::ModelGateway;

/// Retry schedule for a single model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub exponential_backoff: bool,
}

impl RetryPolicy {
    pub fn from_config(performance: &PerformanceConfig) -> Self {
        Self {
            max_retries: performance.max_retries,
            base_delay: performance.retry_delay(),
            exponential_backoff: performance.exponential_backoff,
        }
    }

    /// Sleep before retrying after the failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.base_delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            exponential_backoff: true,
        }
    }
}

/// Stage-aware model caller with bounded retry, per-attempt deadline and
/// cancellation.
#[derive(Clone)]
pub struct RetryingInvoker {
    gateway: Arc<dyn ModelGateway>,
    models: ModelsConfig,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl RetryingInvoker {
    pub fn new(gateway: Arc<dyn ModelGateway>, models: ModelsConfig, policy: RetryPolicy) -> Self {
        Self {
            gateway,
            models,
            policy,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(gateway: Arc<dyn ModelGateway>, config: &Config) -> Self {
        Self::new(
            gateway,
            config.models.clone(),
            RetryPolicy::from_config(&config.performance),
        )
        .with_timeout(config.performance.request_timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send `prompt` to the model configured for `stage`.
    ///
    /// Fails with `ModelInvocation` only after `max_retries + 1` attempts,
    /// or with `Cancelled` as soon as the token fires.
    pub async fn invoke(&self, prompt: &str, stage: Stage) -> Result<String> {
        let target = self.models.for_stage(stage);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(OptimizerError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(OptimizerError::Cancelled),
                outcome = self.attempt(prompt, target) => outcome,
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        stage = %stage,
                        "Model call failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.policy.max_retries + 1,
                        delay,
                        e
                    );

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(OptimizerError::Cancelled),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Err(OptimizerError::ModelInvocation {
                        stage,
                        attempts: attempt + 1,
                        source: e.into(),
                    })
                }
            }
        }
    }

    async fn attempt(&self, prompt: &str, target: &StageModel) -> anyhow::Result<String> {
        let call = self.gateway.invoke(prompt, &target.provider, &target.model);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow!("request timed out after {:?}", limit))?,
            None => call.await,
        }
    }
}
