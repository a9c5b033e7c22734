//! Errores del core.
//!
//! Sólo representan fallos de infraestructura o de uso del motor. Los fallos
//! de un step (error del cuerpo, timeout, validación UI) nunca llegan aquí:
//! se traducen a `ControlSignal` y a filas FAILED del ledger.

use thiserror::Error;
use uuid::Uuid;

/// Errores del ledger (store de intentos).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum LedgerError {
    #[error("run not found: {0}")]
    RunNotFound(Uuid),
    #[error("attempt not found: {0}")]
    AttemptNotFound(Uuid),
    #[error("run {0} already terminal")]
    RunAlreadyTerminal(Uuid),
    #[error("attempt {0} already terminal")]
    AttemptAlreadyTerminal(Uuid),
    #[error("run {0} is leased by another invocation")]
    RunBusy(Uuid),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// Errores devueltos por `ReplayEngine` al dispatcher (nivel transporte).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("unknown flow: {0}")]
    UnknownFlow(String),
    #[error("flow already registered: {0}")]
    DuplicateFlow(String),
    #[error("run {run_id} belongs to flow '{expected}', not '{requested}'")]
    FlowMismatch { run_id: Uuid, expected: String, requested: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_converts_into_engine_error() {
        let id = Uuid::new_v4();
        let err: EngineError = LedgerError::RunBusy(id).into();
        assert_eq!(err.to_string(), format!("run {id} is leased by another invocation"));
    }

    #[test]
    fn flow_mismatch_message_names_both_flows() {
        let id = Uuid::nil();
        let err = EngineError::FlowMismatch { run_id: id,
                                              expected: "a".into(),
                                              requested: "b".into() };
        assert!(err.to_string().contains("'a'"));
        assert!(err.to_string().contains("'b'"));
    }
}
