//! Política de reintentos.
//!
//! Función pura: a partir del número de intentos fallidos y de la política
//! configurada decide "reintentar tras D" o "sin más reintentos". El motor
//! la consulta una sola vez por fallo y nunca duerme el delay: lo convierte
//! en un instante `retry_at` guardado en la fila FAILED, que el dispatcher
//! debe respetar antes de volver a invocar.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::constants::DEFAULT_MAX_RETRIES;

/// Datos que recibe una función de backoff personalizada.
#[derive(Debug, Clone, Copy)]
pub struct RetryAttempt<'a> {
    /// Intentos fallidos hasta ahora, incluyendo el último (1-based).
    pub attempt: u32,
    pub max_retries: u32,
    /// Error del último intento.
    pub error: &'a str,
}

type BackoffFn = dyn Fn(&RetryAttempt<'_>) -> Option<Duration> + Send + Sync;

/// Backoff definido por el autor del flow. Devolver `None` corta los
/// reintentos aunque queden disponibles.
#[derive(Clone)]
pub struct CustomBackoff(Arc<BackoffFn>);

impl CustomBackoff {
    pub fn new<F>(f: F) -> Self
        where F: Fn(&RetryAttempt<'_>) -> Option<Duration> + Send + Sync + 'static
    {
        Self(Arc::new(f))
    }

    fn call(&self, attempt: &RetryAttempt<'_>) -> Option<Duration> {
        (self.0)(attempt)
    }
}

impl fmt::Debug for CustomBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomBackoff(..)")
    }
}

/// Forma del delay entre intentos.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Mismo delay tras cada fallo.
    Constant(Duration),
    /// `seed × attempt`.
    Linear { seed: Duration },
    Custom(CustomBackoff),
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(Duration::ZERO)
    }
}

/// Política completa de un step.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES,
               backoff: Backoff::default() }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self { max_retries, backoff }
    }

    pub fn constant(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries, Backoff::Constant(delay))
    }

    pub fn linear(max_retries: u32, seed: Duration) -> Self {
        Self::new(max_retries, Backoff::Linear { seed })
    }

    pub fn custom<F>(max_retries: u32, f: F) -> Self
        where F: Fn(&RetryAttempt<'_>) -> Option<Duration> + Send + Sync + 'static
    {
        Self::new(max_retries, Backoff::Custom(CustomBackoff::new(f)))
    }

    /// Delay antes del siguiente intento, o `None` si no quedan reintentos.
    ///
    /// `attempt` es la cantidad de intentos fallidos (1-based). Quedan
    /// reintentos mientras `attempt <= max_retries`, de modo que un step
    /// nunca acumula más de `max_retries + 1` filas.
    pub fn next_delay(&self, attempt: u32, error: &str) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        match &self.backoff {
            Backoff::Constant(d) => Some(*d),
            Backoff::Linear { seed } => Some(seed.checked_mul(attempt).unwrap_or(Duration::MAX)),
            Backoff::Custom(f) => f.call(&RetryAttempt { attempt,
                                                         max_retries: self.max_retries,
                                                         error }),
        }
    }

    /// Descripción serializable (para el snapshot `config` del run).
    pub fn describe(&self) -> Value {
        let backoff = match &self.backoff {
            Backoff::Constant(d) => json!({"kind": "constant", "delay_ms": d.as_millis() as u64}),
            Backoff::Linear { seed } => json!({"kind": "linear", "seed_ms": seed.as_millis() as u64}),
            Backoff::Custom(_) => json!({"kind": "custom"}),
        };
        json!({"max_retries": self.max_retries, "backoff": backoff})
    }
}
