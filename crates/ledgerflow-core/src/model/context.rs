use serde::{Deserialize, Serialize};

use crate::ledger::FlowRun;

/// Contexto de auditoría/traza de una invocación.
///
/// Se pasa explícitamente a cada transacción del ledger y a cada cuerpo de
/// step; nunca vive en estado global del proceso.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: Option<String>,
    pub started_by: Option<String>,
}

impl TraceContext {
    pub fn new(trace_id: Option<String>, started_by: Option<String>) -> Self {
        Self { trace_id, started_by }
    }

    /// Contexto derivado de los datos persistidos del run.
    pub fn for_run(run: &FlowRun) -> Self {
        Self { trace_id: run.trace_id.clone(),
               started_by: run.started_by.clone() }
    }

    /// Etiqueta corta para logs.
    pub fn label(&self) -> &str {
        self.trace_id.as_deref().unwrap_or("-")
    }
}
