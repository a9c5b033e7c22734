//! Ledger en memoria.
//!
//! Paridad con el backend Postgres:
//! - Transacción por run: se trabaja sobre una copia del registro del run y se
//!   publica sólo si la invocación termina en `Ok`.
//! - Lease por run (mapa de leases): una segunda invocación concurrente falla
//!   con `RunBusy` en lugar de intercalar escrituras.
//! - Una sola fila abierta por (run, name).
//! - `MemoryConn` hace de "store" para los efectos de los cuerpos de step, con
//!   savepoints por intento.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::model::TraceContext;

use super::store::{IsolatedBody, Ledger, LedgerTx, StepOutcome};
use super::{AttemptStatus, FlowRun, NewAttempt, NewRun, RunOutcome, StepAttempt, StepType};

/// Key-value por run expuesto a los cuerpos de step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryConn {
    kv: BTreeMap<String, Value>,
}

impl MemoryConn {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kv.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.kv.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.kv.remove(key)
    }

    pub fn len(&self) -> usize {
        self.kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct RunRecord {
    run: Option<FlowRun>,
    attempts: Vec<StepAttempt>,
    conn: MemoryConn,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<Uuid, RunRecord>,
    leases: DashMap<Uuid, ()>,
}

/// Lease de un run; se libera al salir de la transacción por cualquier camino.
struct Lease<'l> {
    leases: &'l DashMap<Uuid, ()>,
    run_id: Uuid,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.leases.remove(&self.run_id);
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, run_id: Uuid) -> Result<Lease<'_>, LedgerError> {
        match self.leases.entry(run_id) {
            Entry::Occupied(_) => Err(LedgerError::RunBusy(run_id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(Lease { leases: &self.leases,
                           run_id })
            }
        }
    }

    /// `true` mientras una invocación tiene el lease del run.
    pub fn is_leased(&self, run_id: Uuid) -> bool {
        self.leases.contains_key(&run_id)
    }

    /// Copia del store de efectos confirmado para un run.
    pub fn conn_snapshot(&self, run_id: Uuid) -> MemoryConn {
        self.records
            .get(&run_id)
            .map(|r| r.conn.clone())
            .unwrap_or_default()
    }

    /// Intentos confirmados de un run (orden de creación).
    pub fn attempts(&self, run_id: Uuid) -> Vec<StepAttempt> {
        self.records
            .get(&run_id)
            .map(|r| r.attempts.clone())
            .unwrap_or_default()
    }

    pub fn run(&self, run_id: Uuid) -> Option<FlowRun> {
        self.records.get(&run_id).and_then(|r| r.run.clone())
    }
}

impl Ledger for InMemoryLedger {
    type Conn = MemoryConn;

    fn transact<T, E, F>(&self, run_id: Uuid, trace: &TraceContext, f: F) -> Result<T, E>
        where E: From<LedgerError>,
              F: FnOnce(&mut dyn LedgerTx<Conn = MemoryConn>) -> Result<T, E>
    {
        let _lease = self.acquire(run_id)?;
        let mut staged = self.records
                             .get(&run_id)
                             .map(|r| r.value().clone())
                             .unwrap_or_default();
        let result = {
            let mut tx = MemoryTx { run_id,
                                    trace,
                                    record: &mut staged };
            f(&mut tx)
        };
        match result {
            Ok(v) => {
                if staged.run.is_some() {
                    self.records.insert(run_id, staged);
                }
                debug!("memory:commit run_id={run_id} trace={}", trace.label());
                Ok(v)
            }
            Err(e) => {
                debug!("memory:rollback run_id={run_id} trace={}", trace.label());
                Err(e)
            }
        }
    }

    fn snapshot(&self, run_id: Uuid) -> Result<Option<(FlowRun, Vec<StepAttempt>)>, LedgerError> {
        Ok(self.records
               .get(&run_id)
               .and_then(|r| r.run.clone().map(|run| (run, r.attempts.clone()))))
    }
}

struct MemoryTx<'t> {
    run_id: Uuid,
    trace: &'t TraceContext,
    record: &'t mut RunRecord,
}

impl MemoryTx<'_> {
    fn scoped(&self, run_id: Uuid) -> Result<(), LedgerError> {
        if run_id == self.run_id {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!("transaction is scoped to run {}, not {run_id}", self.run_id)))
        }
    }

    fn open_attempt_mut(&mut self, id: Uuid) -> Result<&mut StepAttempt, LedgerError> {
        let attempt = self.record
                          .attempts
                          .iter_mut()
                          .find(|a| a.id == id)
                          .ok_or(LedgerError::AttemptNotFound(id))?;
        if !attempt.status.is_open() {
            return Err(LedgerError::AttemptAlreadyTerminal(id));
        }
        Ok(attempt)
    }
}

impl LedgerTx for MemoryTx<'_> {
    type Conn = MemoryConn;

    fn trace(&self) -> &TraceContext {
        self.trace
    }

    fn load_run(&mut self, run_id: Uuid) -> Result<Option<FlowRun>, LedgerError> {
        self.scoped(run_id)?;
        Ok(self.record.run.clone())
    }

    fn insert_run(&mut self, run: NewRun) -> Result<FlowRun, LedgerError> {
        self.scoped(run.id)?;
        if self.record.run.is_some() {
            return Err(LedgerError::Conflict(format!("run {} already exists", run.id)));
        }
        let run = run.into_run();
        self.record.run = Some(run.clone());
        Ok(run)
    }

    fn close_run(&mut self, run_id: Uuid, outcome: &RunOutcome, at: DateTime<Utc>) -> Result<FlowRun, LedgerError> {
        self.scoped(run_id)?;
        let run = self.record.run.as_mut().ok_or(LedgerError::RunNotFound(run_id))?;
        if run.status.is_terminal() {
            return Err(LedgerError::RunAlreadyTerminal(run_id));
        }
        outcome.apply(run, at);
        Ok(run.clone())
    }

    fn latest_attempt(&mut self, run_id: Uuid, name: &str) -> Result<Option<StepAttempt>, LedgerError> {
        self.scoped(run_id)?;
        Ok(self.record
               .attempts
               .iter()
               .filter(|a| a.name == name)
               .max_by_key(|a| a.attempt)
               .cloned())
    }

    fn count_failed(&mut self, run_id: Uuid, name: &str, step_type: StepType) -> Result<u32, LedgerError> {
        self.scoped(run_id)?;
        let n = self.record
                    .attempts
                    .iter()
                    .filter(|a| a.name == name && a.step_type == step_type && a.status == AttemptStatus::Failed)
                    .count();
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    fn create_attempt(&mut self, attempt: NewAttempt) -> Result<StepAttempt, LedgerError> {
        self.scoped(attempt.run_id)?;
        if self.record.run.is_none() {
            return Err(LedgerError::RunNotFound(attempt.run_id));
        }
        let same_name = self.record.attempts.iter().filter(|a| a.name == attempt.name);
        let mut count = 0u32;
        for existing in same_name {
            if existing.status.is_open() {
                return Err(LedgerError::Conflict(format!("open attempt already exists for step '{}'", attempt.name)));
            }
            count += 1;
        }
        let row = attempt.into_attempt(Uuid::new_v4(), count + 1);
        self.record.attempts.push(row.clone());
        Ok(row)
    }

    fn complete_attempt(&mut self, id: Uuid, value: &Value, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let attempt = self.open_attempt_mut(id)?;
        attempt.status = AttemptStatus::Completed;
        attempt.value = Some(value.clone());
        attempt.updated_at = at;
        attempt.end_time = Some(at);
        Ok(())
    }

    fn fail_attempt(&mut self,
                    id: Uuid,
                    error: &str,
                    retry_at: Option<DateTime<Utc>>,
                    at: DateTime<Utc>)
                    -> Result<(), LedgerError> {
        let attempt = self.open_attempt_mut(id)?;
        attempt.status = AttemptStatus::Failed;
        attempt.error = Some(error.to_string());
        attempt.retry_at = retry_at;
        attempt.updated_at = at;
        attempt.end_time = Some(at);
        Ok(())
    }

    // Sin forma de interrumpir un closure en curso: el plazo lo controla el
    // motor al volver el cuerpo.
    fn isolated(&mut self, _timeout_ms: u64, body: IsolatedBody<'_, MemoryConn>) -> Result<StepOutcome, LedgerError> {
        let mut savepoint = self.record.conn.clone();
        let outcome = body(&mut savepoint);
        if outcome.is_ok() {
            self.record.conn = savepoint;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_run(id: Uuid) -> NewRun {
        NewRun { id,
                 name: "f".into(),
                 input: json!({}),
                 started_by: None,
                 trace_id: None,
                 config: json!({}),
                 created_at: Utc::now() }
    }

    fn new_attempt(run_id: Uuid, name: &str) -> NewAttempt {
        NewAttempt { run_id,
                     name: name.into(),
                     stage: None,
                     step_type: StepType::Function,
                     status: AttemptStatus::New,
                     max_retries: 5,
                     timeout_in_ms: 1_000,
                     ui: None,
                     created_at: Utc::now() }
    }

    #[test]
    fn failed_transaction_is_not_published() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let res: Result<(), LedgerError> = ledger.transact(run_id, &trace, |tx| {
                                                     tx.insert_run(new_run(run_id))?;
                                                     Err(LedgerError::Storage("crash".into()))
                                                 });
        assert!(res.is_err());
        assert!(ledger.run(run_id).is_none());
        assert!(!ledger.is_leased(run_id));
    }

    #[test]
    fn concurrent_transaction_on_same_run_is_busy() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let inner: Result<(), LedgerError> = ledger.transact(run_id, &trace, |_tx| {
                                                       let nested: Result<(), LedgerError> =
                                                           ledger.transact(run_id, &trace, |_| Ok(()));
                                                       assert_eq!(nested, Err(LedgerError::RunBusy(run_id)));
                                                       Ok(())
                                                   });
        assert!(inner.is_ok());
        assert!(!ledger.is_leased(run_id));
    }

    #[test]
    fn attempt_numbers_grow_and_single_open_row_is_enforced() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let res: Result<(), LedgerError> = ledger.transact(run_id, &trace, |tx| {
                                                     tx.insert_run(new_run(run_id))?;
                                                     let first = tx.create_attempt(new_attempt(run_id, "a"))?;
                                                     assert_eq!(first.attempt, 1);
                                                     let dup = tx.create_attempt(new_attempt(run_id, "a"));
                                                     assert!(matches!(dup, Err(LedgerError::Conflict(_))));
                                                     tx.fail_attempt(first.id, "boom", None, Utc::now())?;
                                                     let second = tx.create_attempt(new_attempt(run_id, "a"))?;
                                                     assert_eq!(second.attempt, 2);
                                                     assert_eq!(tx.count_failed(run_id, "a", StepType::Function)?, 1);
                                                     let latest = tx.latest_attempt(run_id, "a")?.unwrap();
                                                     assert_eq!(latest.id, second.id);
                                                     Ok(())
                                                 });
        res.unwrap();
    }

    #[test]
    fn failed_rows_keep_the_retry_decision() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let now = Utc::now();
        let retry_at = now + chrono::Duration::seconds(10);
        let res: Result<(), LedgerError> = ledger.transact(run_id, &trace, |tx| {
                                                     tx.insert_run(new_run(run_id))?;
                                                     let first = tx.create_attempt(new_attempt(run_id, "a"))?;
                                                     tx.fail_attempt(first.id, "boom", Some(retry_at), now)?;
                                                     let second = tx.create_attempt(new_attempt(run_id, "a"))?;
                                                     tx.fail_attempt(second.id, "boom again", None, now)?;
                                                     assert_eq!(tx.count_failed(run_id, "a", StepType::Function)?, 2);
                                                     assert_eq!(tx.count_failed(run_id, "a", StepType::Ui)?, 0);
                                                     Ok(())
                                                 });
        res.unwrap();
        let rows = ledger.attempts(run_id);
        assert_eq!(rows[0].retry_at, Some(retry_at));
        assert_eq!(rows[1].retry_at, None);
        assert_eq!(rows[1].status, AttemptStatus::Failed);
    }

    #[test]
    fn terminal_rows_are_immutable() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let res: Result<(), LedgerError> = ledger.transact(run_id, &trace, |tx| {
                                                     tx.insert_run(new_run(run_id))?;
                                                     let a = tx.create_attempt(new_attempt(run_id, "a"))?;
                                                     tx.complete_attempt(a.id, &json!(1), Utc::now())?;
                                                     assert_eq!(tx.fail_attempt(a.id, "late", None, Utc::now()),
                                                                Err(LedgerError::AttemptAlreadyTerminal(a.id)));
                                                     Ok(())
                                                 });
        res.unwrap();
        let rows = ledger.attempts(run_id);
        assert_eq!(rows[0].status, AttemptStatus::Completed);
        assert_eq!(rows[0].value, Some(json!(1)));
    }

    #[test]
    fn isolated_rolls_back_failed_body() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let res: Result<(), LedgerError> = ledger.transact(run_id, &trace, |tx| {
                                                     tx.insert_run(new_run(run_id))?;
                                                     let ok = tx.isolated(0, Box::new(|c: &mut MemoryConn| -> StepOutcome {
                                                                     c.put("kept", json!(true));
                                                                     Ok(json!(null))
                                                                 }))?;
                                                     assert!(ok.is_ok());
                                                     let failed = tx.isolated(0, Box::new(|c: &mut MemoryConn| -> StepOutcome {
                                                                         c.put("dropped", json!(true));
                                                                         Err("nope".to_string())
                                                                     }))?;
                                                     assert_eq!(failed, Err("nope".to_string()));
                                                     Ok(())
                                                 });
        res.unwrap();
        let conn = ledger.conn_snapshot(run_id);
        assert!(conn.get("kept").is_some());
        assert!(conn.get("dropped").is_none());
    }

    #[test]
    fn closing_twice_is_rejected() {
        let ledger = InMemoryLedger::new();
        let run_id = Uuid::new_v4();
        let trace = TraceContext::default();
        let res: Result<(), LedgerError> = ledger.transact(run_id, &trace, |tx| {
                                                     tx.insert_run(new_run(run_id))?;
                                                     tx.close_run(run_id, &RunOutcome::Completed(json!(1)), Utc::now())?;
                                                     let again = tx.close_run(run_id, &RunOutcome::Failed("x".into()), Utc::now());
                                                     assert_eq!(again, Err(LedgerError::RunAlreadyTerminal(run_id)));
                                                     Ok(())
                                                 });
        res.unwrap();
        assert_eq!(ledger.run(run_id).unwrap().data, Some(json!(1)));
    }
}
