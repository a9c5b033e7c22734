//! Protocolo de steps UI.
//!
//! Un step UI se completa con datos externos. La primera vez que el motor lo
//! encuentra inserta una fila PENDING y emite `UiRender` con el payload
//! descriptivo; una invocación posterior con `ResumeData` cuyo `step_id`
//! coincide con la fila pendiente valida los datos y la completa o la
//! rechaza.
//!
//! Cada rechazo deja la fila FAILED y abre una PENDING nueva, hasta agotar
//! el presupuesto de rechazos (`max_rejections`, guardado como
//! `max_retries` de la fila): un step UI nunca acumula más de
//! `max_rejections + 1` filas.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

type Validator = dyn Fn(&Value) -> Result<(), String> + Send + Sync;

/// Datos externos entregados a un step UI pendiente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeData {
    /// Id de la fila PENDING que se está completando.
    pub step_id: Uuid,
    pub data: Value,
}

impl ResumeData {
    pub fn new(step_id: Uuid, data: Value) -> Self {
        Self { step_id, data }
    }
}

/// Opciones de un step UI.
#[derive(Clone, Default)]
pub struct UiOptions {
    pub stage: Option<String>,
    validator: Option<Arc<Validator>>,
    fail_run_on_rejection: bool,
    max_rejections: Option<u32>,
}

impl UiOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Validador de los datos entregados. `Err(msg)` rechaza la entrega.
    pub fn validate<F>(mut self, f: F) -> Self
        where F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static
    {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Un rechazo falla el run en lugar de volver a pedir los datos.
    pub fn fail_run_on_rejection(mut self) -> Self {
        self.fail_run_on_rejection = true;
        self
    }

    pub fn fails_run_on_rejection(&self) -> bool {
        self.fail_run_on_rejection
    }

    /// Rechazos tolerados antes de fallar el run. Por defecto el
    /// `default_max_retries` del motor.
    pub fn max_rejections(mut self, n: u32) -> Self {
        self.max_rejections = Some(n);
        self
    }

    pub(crate) fn rejection_budget(&self, default: u32) -> u32 {
        self.max_rejections.unwrap_or(default)
    }

    pub(crate) fn check(&self, data: &Value) -> Result<(), String> {
        match &self.validator {
            Some(v) => v(data),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for UiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiOptions")
         .field("stage", &self.stage)
         .field("validator", &self.validator.as_ref().map(|_| ".."))
         .field("fail_run_on_rejection", &self.fail_run_on_rejection)
         .field("max_rejections", &self.max_rejections)
         .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn without_validator_everything_passes() {
        assert!(UiOptions::new().check(&json!(null)).is_ok());
    }

    #[test]
    fn validator_message_is_returned() {
        let opts = UiOptions::new().validate(|v| {
                                       if v["email"].as_str().is_some_and(|s| s.contains('@')) {
                                           Ok(())
                                       } else {
                                           Err("email inválido".into())
                                       }
                                   });
        assert!(opts.check(&json!({"email": "a@b.c"})).is_ok());
        assert_eq!(opts.check(&json!({"email": "nope"})), Err("email inválido".to_string()));
    }

    #[test]
    fn rejection_budget_falls_back_to_engine_default() {
        assert_eq!(UiOptions::new().rejection_budget(5), 5);
        assert_eq!(UiOptions::new().max_rejections(1).rejection_budget(5), 1);
    }

    #[test]
    fn resume_data_uses_camel_case_on_the_wire() {
        let id = Uuid::nil();
        let r = ResumeData::new(id, json!({"x": 1}));
        assert_eq!(serde_json::to_value(&r).unwrap(),
                   json!({"stepId": id.to_string(), "data": {"x": 1}}));
    }
}
