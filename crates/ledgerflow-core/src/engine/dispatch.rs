//! Contrato con el dispatcher: request, respuesta y listeners de cierre.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::ledger::{FlowRun, RunStatus};
use crate::model::TraceContext;
use crate::ui::ResumeData;

/// Request de una invocación: `{runId, flowName, input, resumeData?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub run_id: Uuid,
    pub flow_name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, rename = "resumeData", skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeData>,
    #[serde(default)]
    pub trace: TraceContext,
}

impl Invocation {
    pub fn new(run_id: Uuid, flow_name: impl Into<String>, input: Value) -> Self {
        Self { run_id,
               flow_name: flow_name.into(),
               input,
               resume: None,
               trace: TraceContext::default() }
    }

    pub fn with_resume(mut self, step_id: Uuid, data: Value) -> Self {
        self.resume = Some(ResumeData::new(step_id, data));
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = trace;
        self
    }
}

/// Respuesta de una invocación.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResponse {
    /// El flow terminó con éxito.
    Completed { data: Value },
    /// El flow terminó con error (fatal o reintentos agotados).
    Failed { error: String },
    /// Queda trabajo: re-invocar ya (`None`) o no antes de `resume_at`.
    Pending { resume_at: Option<DateTime<Utc>> },
    /// Un step UI espera datos externos.
    AwaitingInput { ui: Value, step_id: Uuid, error: Option<String> },
}

impl InvocationResponse {
    /// Respuesta de un run ya cerrado (`None` si sigue RUNNING).
    pub fn for_terminal(run: &FlowRun) -> Option<Self> {
        match run.status {
            RunStatus::Running => None,
            RunStatus::Completed => Some(InvocationResponse::Completed { data: run.data.clone().unwrap_or(Value::Null) }),
            RunStatus::Failed => Some(InvocationResponse::Failed { error: run.error.clone().unwrap_or_default() }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationResponse::Completed { .. } | InvocationResponse::Failed { .. })
    }

    /// `true` si el dispatcher puede re-invocar en `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self {
            InvocationResponse::Pending { resume_at: None } => true,
            InvocationResponse::Pending { resume_at: Some(at) } => *at <= now,
            _ => false,
        }
    }

    /// Codificación JSON de la respuesta.
    pub fn to_wire(&self) -> Value {
        match self {
            InvocationResponse::Completed { data } => json!({"completed": true, "data": data}),
            InvocationResponse::Failed { error } => json!({"completed": true, "error": error}),
            InvocationResponse::Pending { resume_at } => {
                let mut obj = Map::new();
                obj.insert("completed".into(), Value::Bool(false));
                if let Some(at) = resume_at {
                    obj.insert("resumeAt".into(), Value::String(at.to_rfc3339()));
                }
                Value::Object(obj)
            }
            InvocationResponse::AwaitingInput { ui, step_id, error } => {
                let mut obj = json!({"completed": false, "ui": ui, "stepId": step_id});
                if let (Some(e), Some(map)) = (error, obj.as_object_mut()) {
                    map.insert("error".into(), Value::String(e.clone()));
                }
                obj
            }
        }
    }
}

/// Observador de cierres de run (p.ej. la cola de tareas que creó el run).
///
/// Se llama después de confirmar la transacción que cerró el run.
pub trait RunListener: Send + Sync {
    fn on_run_closed(&self, run: &FlowRun);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wire_shapes() {
        assert_eq!(InvocationResponse::Completed { data: json!(3) }.to_wire(),
                   json!({"completed": true, "data": 3}));
        assert_eq!(InvocationResponse::Failed { error: "boom".into() }.to_wire(),
                   json!({"completed": true, "error": "boom"}));
        assert_eq!(InvocationResponse::Pending { resume_at: None }.to_wire(),
                   json!({"completed": false}));
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(InvocationResponse::Pending { resume_at: Some(at) }.to_wire(),
                   json!({"completed": false, "resumeAt": "2024-01-02T03:04:05+00:00"}));
        let id = Uuid::nil();
        assert_eq!(InvocationResponse::AwaitingInput { ui: json!({"f": 1}),
                                                       step_id: id,
                                                       error: Some("bad".into()) }.to_wire(),
                   json!({"completed": false, "ui": {"f": 1}, "stepId": id.to_string(), "error": "bad"}));
    }

    #[test]
    fn invocation_decodes_from_request_json() {
        let id = Uuid::new_v4();
        let step = Uuid::new_v4();
        let inv: Invocation = serde_json::from_value(json!({
            "runId": id,
            "flowName": "signup",
            "input": {"a": 1},
            "resumeData": {"stepId": step, "data": {"ok": true}}
        })).unwrap();
        assert_eq!(inv, Invocation::new(id, "signup", json!({"a": 1})).with_resume(step, json!({"ok": true})));
    }

    #[test]
    fn readiness() {
        let now = Utc::now();
        assert!(InvocationResponse::Pending { resume_at: None }.is_ready(now));
        assert!(InvocationResponse::Pending { resume_at: Some(now) }.is_ready(now));
        assert!(!InvocationResponse::Pending { resume_at: Some(now + chrono::Duration::seconds(1)) }.is_ready(now));
        assert!(!InvocationResponse::Completed { data: json!(null) }.is_ready(now));
    }
}
