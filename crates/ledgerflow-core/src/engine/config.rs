//! Configuración del motor.
//!
//! Defaults de los steps FUNCTION. `from_env` lee:
//! - `LEDGERFLOW_DEFAULT_MAX_RETRIES`
//! - `LEDGERFLOW_DEFAULT_TIMEOUT_MS`
//! tras cargar `.env` una sola vez.

use std::env;
use std::str::FromStr;

use log::warn;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS, ENGINE_VERSION};

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_max_retries: u32,
    pub default_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_max_retries: DEFAULT_MAX_RETRIES,
               default_timeout_ms: DEFAULT_TIMEOUT_MS }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let defaults = Self::default();
        Self { default_max_retries: env_or("LEDGERFLOW_DEFAULT_MAX_RETRIES", defaults.default_max_retries),
               default_timeout_ms: env_or("LEDGERFLOW_DEFAULT_TIMEOUT_MS", defaults.default_timeout_ms) }
    }

    /// Snapshot guardado en `FlowRun.config`.
    pub fn describe(&self) -> Value {
        json!({
            "engine_version": ENGINE_VERSION,
            "default_max_retries": self.default_max_retries,
            "default_timeout_ms": self.default_timeout_ms,
        })
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                                          warn!("{key}={raw:?} no es válido; usando el valor por defecto");
                                          default
                                      }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let c = EngineConfig::default();
        assert_eq!(c.default_max_retries, 5);
        assert_eq!(c.default_timeout_ms, 60_000);
        assert_eq!(c.describe()["engine_version"], ENGINE_VERSION);
    }

    #[test]
    fn env_or_falls_back_on_missing_or_invalid() {
        assert_eq!(env_or("LEDGERFLOW_TEST_SURELY_UNSET", 7u32), 7);
        env::set_var("LEDGERFLOW_TEST_INVALID_NUMBER", "abc");
        assert_eq!(env_or("LEDGERFLOW_TEST_INVALID_NUMBER", 9u64), 9);
        env::set_var("LEDGERFLOW_TEST_VALID_NUMBER", " 42 ");
        assert_eq!(env_or("LEDGERFLOW_TEST_VALID_NUMBER", 9u64), 42);
    }
}
