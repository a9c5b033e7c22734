//! Tipos persistidos del ledger: `FlowRun` y `StepAttempt`.
//!
//! Rol en el flujo:
//! - Un `FlowRun` es una instancia lógica de ejecución; su `status` es
//!   monotónico (RUNNING -> COMPLETED | FAILED).
//! - Cada intento de un step deja una fila `StepAttempt`. Las filas terminales
//!   no se modifican; un reintento crea una fila nueva, preservando el
//!   historial de fallos.
//! - Todo el "progreso" de un run vive en estas filas: el motor no guarda
//!   estado entre invocaciones.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Estado de un run. RUNNING es el único estado no terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "COMPLETED" => Some(RunStatus::Completed),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tipo de step registrado en la fila.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Function,
    Ui,
    Delay,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Function => "FUNCTION",
            StepType::Ui => "UI",
            StepType::Delay => "DELAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FUNCTION" => Some(StepType::Function),
            "UI" => Some(StepType::Ui),
            "DELAY" => Some(StepType::Delay),
            _ => None,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado de un intento.
///
/// Transiciones válidas (una sola actualización por fila):
/// - `New` -> `Completed` | `Failed` (FUNCTION)
/// - `Pending` -> `Completed` | `Failed` (UI, DELAY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    New,
    Pending,
    Running,
    Completed,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::New => "NEW",
            AttemptStatus::Pending => "PENDING",
            AttemptStatus::Running => "RUNNING",
            AttemptStatus::Completed => "COMPLETED",
            AttemptStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(AttemptStatus::New),
            "PENDING" => Some(AttemptStatus::Pending),
            "RUNNING" => Some(AttemptStatus::Running),
            "COMPLETED" => Some(AttemptStatus::Completed),
            "FAILED" => Some(AttemptStatus::Failed),
            _ => None,
        }
    }

    /// `true` para NEW/PENDING/RUNNING. A lo sumo una fila abierta por
    /// (run, name).
    pub fn is_open(&self) -> bool {
        matches!(self, AttemptStatus::New | AttemptStatus::Pending | AttemptStatus::Running)
    }

    /// Estados abiertos, en el orden usado por los filtros SQL.
    pub const OPEN: [AttemptStatus; 3] = [AttemptStatus::New, AttemptStatus::Pending, AttemptStatus::Running];
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instancia lógica de ejecución de un flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRun {
    pub id: Uuid,
    pub name: String,
    pub status: RunStatus,
    /// Input inmutable fijado al crear el run.
    pub input: Value,
    /// Output; sólo presente con `status == COMPLETED`.
    pub data: Option<Value>,
    /// Sólo presente con `status == FAILED`.
    pub error: Option<String>,
    pub started_by: Option<String>,
    pub trace_id: Option<String>,
    /// Snapshot de la configuración del motor al crear el run.
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fila de intento de un step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAttempt {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    /// Número de intento (1-based) dentro de (run_id, name).
    pub attempt: u32,
    pub stage: Option<String>,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: AttemptStatus,
    /// Valor serializado; sólo con `status == COMPLETED`.
    pub value: Option<Value>,
    /// Sólo con `status == FAILED`.
    pub error: Option<String>,
    pub max_retries: u32,
    pub timeout_in_ms: u64,
    pub ui: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// En filas FUNCTION FAILED: desde cuándo es elegible el próximo
    /// intento. `None` en una fila FAILED significa reintentos agotados.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

/// Datos para crear un run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: Uuid,
    pub name: String,
    pub input: Value,
    pub started_by: Option<String>,
    pub trace_id: Option<String>,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

impl NewRun {
    /// Materializa el run en estado RUNNING.
    pub fn into_run(self) -> FlowRun {
        FlowRun { id: self.id,
                  name: self.name,
                  status: RunStatus::Running,
                  input: self.input,
                  data: None,
                  error: None,
                  started_by: self.started_by,
                  trace_id: self.trace_id,
                  config: self.config,
                  created_at: self.created_at,
                  updated_at: self.created_at }
    }
}

/// Datos para crear una fila de intento. El número de intento lo asigna el
/// ledger.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub run_id: Uuid,
    pub name: String,
    pub stage: Option<String>,
    pub step_type: StepType,
    pub status: AttemptStatus,
    pub max_retries: u32,
    pub timeout_in_ms: u64,
    pub ui: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl NewAttempt {
    /// Materializa la fila con el número de intento asignado.
    pub fn into_attempt(self, id: Uuid, attempt: u32) -> StepAttempt {
        StepAttempt { id,
                      run_id: self.run_id,
                      name: self.name,
                      attempt,
                      stage: self.stage,
                      step_type: self.step_type,
                      status: self.status,
                      value: None,
                      error: None,
                      max_retries: self.max_retries,
                      timeout_in_ms: self.timeout_in_ms,
                      ui: self.ui,
                      created_at: self.created_at,
                      updated_at: self.created_at,
                      start_time: Some(self.created_at),
                      end_time: None,
                      retry_at: None }
    }
}

/// Cierre terminal de un run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Value),
    Failed(String),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed(_) => RunStatus::Completed,
            RunOutcome::Failed(_) => RunStatus::Failed,
        }
    }

    /// Aplica el cierre sobre un run en memoria.
    pub fn apply(&self, run: &mut FlowRun, at: DateTime<Utc>) {
        run.status = self.status();
        run.updated_at = at;
        match self {
            RunOutcome::Completed(data) => run.data = Some(data.clone()),
            RunOutcome::Failed(error) => run.error = Some(error.clone()),
        }
    }
}

/// Proyección expuesta a los callers: el run más sus intentos ordenados.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRunView {
    #[serde(flatten)]
    pub run: FlowRun,
    pub steps: Vec<StepAttempt>,
}

impl FlowRunView {
    /// Intentos de un step concreto, en orden.
    pub fn attempts_of(&self, name: &str) -> Vec<&StepAttempt> {
        self.steps.iter().filter(|s| s.name == name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_strings_roundtrip() {
        for s in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(s.as_str()), Some(s));
        }
        for s in [AttemptStatus::New,
                  AttemptStatus::Pending,
                  AttemptStatus::Running,
                  AttemptStatus::Completed,
                  AttemptStatus::Failed]
        {
            assert_eq!(AttemptStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(StepType::parse("UI"), Some(StepType::Ui));
        assert_eq!(StepType::parse("ui"), None);
    }

    #[test]
    fn projection_flattens_run_fields_and_renames_type() {
        let now = Utc::now();
        let run = NewRun { id: Uuid::new_v4(),
                           name: "f".into(),
                           input: json!({"a": 1}),
                           started_by: Some("ops".into()),
                           trace_id: None,
                           config: json!({}),
                           created_at: now }.into_run();
        let attempt = NewAttempt { run_id: run.id,
                                   name: "s".into(),
                                   stage: None,
                                   step_type: StepType::Function,
                                   status: AttemptStatus::New,
                                   max_retries: 5,
                                   timeout_in_ms: 60_000,
                                   ui: None,
                                   created_at: now }.into_attempt(Uuid::new_v4(), 1);
        let view = FlowRunView { run, steps: vec![attempt] };
        let v = serde_json::to_value(&view).unwrap();
        assert_eq!(v["status"], "RUNNING");
        assert_eq!(v["input"], json!({"a": 1}));
        assert_eq!(v["steps"][0]["type"], "FUNCTION");
        assert_eq!(v["steps"][0]["status"], "NEW");
    }

    #[test]
    fn outcome_apply_sets_only_matching_field() {
        let now = Utc::now();
        let mut run = NewRun { id: Uuid::new_v4(),
                               name: "f".into(),
                               input: Value::Null,
                               started_by: None,
                               trace_id: None,
                               config: Value::Null,
                               created_at: now }.into_run();
        RunOutcome::Failed("boom".into()).apply(&mut run, now);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("boom"));
        assert!(run.data.is_none());
    }
}
