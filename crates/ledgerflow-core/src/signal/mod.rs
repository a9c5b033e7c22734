//! Señales de control ("disrupts").
//!
//! Una señal es un *resultado*, no un error: detiene la pasada actual por el
//! cuerpo del flow en cuanto el progreso necesita un evento externo. Se
//! devuelven como `Err` de `FlowResult` para que el autor pueda propagarlas
//! con `?`, y el motor las traduce exhaustivamente a la respuesta del
//! dispatcher. Los defectos de infraestructura viajan por otro canal
//! (`EngineError`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::duplicate_step_error;

/// Resultado de una pasada (o de una llamada a step dentro de ella).
pub type FlowResult<T> = Result<T, ControlSignal>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlSignal {
    /// Un intento acaba de completarse; re-invocar de inmediato.
    Continue { step: String },
    /// Un intento falló y quedan reintentos; re-invocar desde `resume_at`.
    RetryScheduled {
        step: String,
        /// Número del próximo intento.
        attempt: u32,
        resume_at: DateTime<Utc>,
    },
    /// Un step DELAY espera hasta `resume_at`.
    Delayed { step: String, resume_at: DateTime<Utc> },
    /// Un step UI espera datos externos.
    UiRender {
        step: String,
        step_id: Uuid,
        ui: Value,
        /// Mensaje del validador si la entrega anterior fue rechazada.
        error: Option<String>,
    },
    /// Un step agotó sus reintentos; el run falla.
    ExhaustedRetries { step: String, error: String },
    /// Error del cuerpo del flow o violación de invariante; el run falla.
    Fatal { error: String },
}

impl ControlSignal {
    pub fn fatal(error: impl Into<String>) -> Self {
        ControlSignal::Fatal { error: error.into() }
    }

    pub fn duplicate_step(name: &str) -> Self {
        ControlSignal::Fatal { error: duplicate_step_error(name) }
    }

    /// Instante mínimo de re-invocación, si la señal lo impone.
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ControlSignal::RetryScheduled { resume_at, .. } | ControlSignal::Delayed { resume_at, .. } => Some(*resume_at),
            _ => None,
        }
    }

    /// Step que originó la señal (las `Fatal` no siempre tienen uno).
    pub fn step(&self) -> Option<&str> {
        match self {
            ControlSignal::Continue { step }
            | ControlSignal::RetryScheduled { step, .. }
            | ControlSignal::Delayed { step, .. }
            | ControlSignal::UiRender { step, .. }
            | ControlSignal::ExhaustedRetries { step, .. } => Some(step),
            ControlSignal::Fatal { .. } => None,
        }
    }

    /// Nombre legible de la variante para logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ControlSignal::Continue { .. } => "Continue",
            ControlSignal::RetryScheduled { .. } => "RetryScheduled",
            ControlSignal::Delayed { .. } => "Delayed",
            ControlSignal::UiRender { .. } => "UiRender",
            ControlSignal::ExhaustedRetries { .. } => "ExhaustedRetries",
            ControlSignal::Fatal { .. } => "Fatal",
        }
    }
}

/// Errores de (de)serialización dentro del cuerpo del flow son fatales.
impl From<serde_json::Error> for ControlSignal {
    fn from(err: serde_json::Error) -> Self {
        ControlSignal::fatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_encoding_uses_kind() {
        let s = ControlSignal::Continue { step: "a".into() };
        assert_eq!(serde_json::to_value(&s).unwrap(), json!({"kind": "continue", "step": "a"}));
    }

    #[test]
    fn fatal_signals_carry_no_step() {
        assert_eq!(ControlSignal::Continue { step: "a".into() }.step(), Some("a"));
        assert_eq!(ControlSignal::ExhaustedRetries { step: "a".into(),
                                                     error: "e".into() }.step(),
                   Some("a"));
        assert_eq!(ControlSignal::duplicate_step("a").step(), None);
    }

    #[test]
    fn duplicate_message_is_fixed() {
        assert_eq!(ControlSignal::duplicate_step("charge"),
                   ControlSignal::Fatal { error: "Duplicate step name: charge".into() });
    }

    #[test]
    fn resume_at_only_for_time_based_signals() {
        let now = Utc::now();
        assert_eq!(ControlSignal::Delayed { step: "d".into(),
                                            resume_at: now }.resume_at(),
                   Some(now));
        assert_eq!(ControlSignal::fatal("x").resume_at(), None);
    }
}
