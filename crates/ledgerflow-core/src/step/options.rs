use std::time::Duration;

use crate::engine::EngineConfig;
use crate::retry::{Backoff, RetryAttempt, RetryPolicy};

/// Opciones declaradas por el autor para un step FUNCTION.
///
/// Los campos no fijados toman el valor de `EngineConfig` al resolverse.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub stage: Option<String>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub backoff: Option<Backoff>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Delay fijo entre intentos.
    pub fn constant(mut self, delay: Duration) -> Self {
        self.backoff = Some(Backoff::Constant(delay));
        self
    }

    /// `seed × intento`.
    pub fn linear(mut self, seed: Duration) -> Self {
        self.backoff = Some(Backoff::Linear { seed });
        self
    }

    pub fn custom<F>(mut self, f: F) -> Self
        where F: Fn(&RetryAttempt<'_>) -> Option<Duration> + Send + Sync + 'static
    {
        self.backoff = Some(Backoff::Custom(crate::retry::CustomBackoff::new(f)));
        self
    }

    pub fn resolve(&self, config: &EngineConfig) -> ResolvedStep {
        let max_retries = self.max_retries.unwrap_or(config.default_max_retries);
        ResolvedStep { stage: self.stage.clone(),
                       policy: RetryPolicy::new(max_retries, self.backoff.clone().unwrap_or_default()),
                       timeout_ms: self.timeout_ms.unwrap_or(config.default_timeout_ms) }
    }
}

/// Opciones efectivas tras aplicar los defaults del motor.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub stage: Option<String>,
    pub policy: RetryPolicy,
    pub timeout_ms: u64,
}
