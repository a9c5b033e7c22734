//! Constantes del motor core.
//!
//! Agrupa los valores por defecto de los steps y los mensajes fijos que el
//! motor deja en `FlowRun.error` / `StepAttempt.error`. Los mensajes forman
//! parte del contrato observable: los consumidores los comparan literalmente.

/// Versión lógica del motor. Se guarda en el snapshot `config` de cada run
/// para poder auditar con qué reglas de replay se ejecutó.
pub const ENGINE_VERSION: &str = "L1.0";

/// Reintentos por defecto de un step FUNCTION (total de intentos = 1 + 5).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Timeout por defecto de un intento de step, en milisegundos.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Error fijo del run cuando un step agota sus reintentos. El error concreto
/// del step queda en la fila del último intento.
pub const EXHAUSTED_RETRIES_ERROR: &str = "flow failed due to exhausted step retries";

/// Mensaje de fallo de un intento que excedió su timeout.
pub fn timeout_error(timeout_ms: u64) -> String {
    format!("Step function timed out after {timeout_ms}ms")
}

/// Mensaje de colisión de nombres dentro de una misma pasada.
pub fn duplicate_step_error(name: &str) -> String {
    format!("Duplicate step name: {name}")
}
