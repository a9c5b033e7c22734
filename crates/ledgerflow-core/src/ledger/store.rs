use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::model::TraceContext;

use super::{FlowRun, NewAttempt, NewRun, RunOutcome, StepAttempt, StepType};

/// Resultado de ejecutar el cuerpo de un step: valor serializado o mensaje
/// de error.
pub type StepOutcome = Result<Value, String>;

/// Cuerpo de step listo para correr dentro de `LedgerTx::isolated`.
pub type IsolatedBody<'b, C> = Box<dyn FnOnce(&mut C) -> StepOutcome + 'b>;

/// Vista transaccional del ledger durante una invocación.
///
/// Todas las lecturas/escrituras de una invocación, y los efectos de los
/// cuerpos de step sobre el mismo store (`Conn`), ocurren dentro de la misma
/// transacción: "el step corrió" y "el ledger lo registró" se confirman
/// juntos o no se confirman.
pub trait LedgerTx {
    /// Handle del store que ven los cuerpos de step.
    type Conn;

    fn trace(&self) -> &TraceContext;

    fn load_run(&mut self, run_id: Uuid) -> Result<Option<FlowRun>, LedgerError>;

    fn insert_run(&mut self, run: NewRun) -> Result<FlowRun, LedgerError>;

    /// Cierra un run RUNNING. Falla con `RunAlreadyTerminal` si ya estaba
    /// cerrado.
    fn close_run(&mut self, run_id: Uuid, outcome: &RunOutcome, at: DateTime<Utc>) -> Result<FlowRun, LedgerError>;

    /// Último intento (mayor `attempt`) de un step.
    fn latest_attempt(&mut self, run_id: Uuid, name: &str) -> Result<Option<StepAttempt>, LedgerError>;

    /// Cantidad de intentos FAILED de un step con el tipo dado.
    fn count_failed(&mut self, run_id: Uuid, name: &str, step_type: StepType) -> Result<u32, LedgerError>;

    /// Inserta una fila nueva. Falla con `Conflict` si ya existe una fila
    /// abierta para (run_id, name).
    fn create_attempt(&mut self, attempt: NewAttempt) -> Result<StepAttempt, LedgerError>;

    fn complete_attempt(&mut self, id: Uuid, value: &Value, at: DateTime<Utc>) -> Result<(), LedgerError>;

    /// Marca la fila FAILED. `retry_at` guarda la decisión de la política
    /// tomada en ese momento: `Some(t)` habilita el próximo intento desde
    /// `t`, `None` significa sin más reintentos.
    fn fail_attempt(&mut self,
                    id: Uuid,
                    error: &str,
                    retry_at: Option<DateTime<Utc>>,
                    at: DateTime<Utc>)
                    -> Result<(), LedgerError>;

    /// Corre `body` en un savepoint: si devuelve `Err`, sus efectos sobre el
    /// store se revierten y la transacción externa sigue viva.
    ///
    /// Con `timeout_ms > 0` los backends que pueden cortar trabajo en curso
    /// (Postgres: `statement_timeout`) lo acotan a ese plazo.
    fn isolated(&mut self, timeout_ms: u64, body: IsolatedBody<'_, Self::Conn>) -> Result<StepOutcome, LedgerError>;
}

/// Store persistente de intentos.
pub trait Ledger: Send + Sync {
    type Conn;

    /// Abre una transacción sobre un run, tomando su lease exclusivo durante
    /// toda la transacción. Confirma si `f` devuelve `Ok`, revierte si
    /// devuelve `Err`. Una invocación concurrente sobre el mismo run falla
    /// con `LedgerError::RunBusy`.
    fn transact<T, E, F>(&self, run_id: Uuid, trace: &TraceContext, f: F) -> Result<T, E>
        where E: From<LedgerError>,
              F: FnOnce(&mut dyn LedgerTx<Conn = Self::Conn>) -> Result<T, E>;

    /// Lectura no transaccional del run y sus intentos (para proyecciones).
    fn snapshot(&self, run_id: Uuid) -> Result<Option<(FlowRun, Vec<StepAttempt>)>, LedgerError>;
}
