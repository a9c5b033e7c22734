//! Contexto de una pasada por el cuerpo de un flow.
//!
//! `FlowCtx` es la única vía del autor hacia el ledger. Cada llamada a
//! `step`, `ui_step` o `sleep` consulta la última fila del nombre dado y
//! decide entre:
//! - devolver el valor ya COMPLETED (replay, sin re-ejecutar),
//! - ejecutar un intento nuevo (a lo sumo una unidad de trabajo por pasada),
//! - emitir una señal que corta la pasada.
//!
//! La primera señal emitida queda registrada: las llamadas posteriores en la
//! misma pasada la devuelven sin tocar el ledger, y el motor la respeta aunque
//! el cuerpo del flow la haya descartado.

use std::fmt;
use std::time::Duration;

use indexmap::IndexSet;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::constants::timeout_error;
use crate::engine::EngineConfig;
use crate::errors::LedgerError;
use crate::ledger::{AttemptStatus, FlowRun, IsolatedBody, LedgerTx, NewAttempt, StepAttempt, StepOutcome, StepType};
use crate::model::{add_duration, Clock, TraceContext};
use crate::signal::{ControlSignal, FlowResult};
use crate::step::{ResolvedStep, StepOptions, StepScope};
use crate::ui::{ResumeData, UiOptions};

/// Resultado de una pasada ya interpretado.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Settlement {
    Completed(Value),
    Signal(ControlSignal),
}

pub struct FlowCtx<'a, C> {
    tx: &'a mut dyn LedgerTx<Conn = C>,
    run: &'a FlowRun,
    trace: TraceContext,
    clock: &'a dyn Clock,
    config: &'a EngineConfig,
    resume: Option<ResumeData>,
    visited: IndexSet<String>,
    signal: Option<ControlSignal>,
    fault: Option<LedgerError>,
}

impl<'a, C> FlowCtx<'a, C> {
    pub(crate) fn new(tx: &'a mut dyn LedgerTx<Conn = C>,
                      run: &'a FlowRun,
                      trace: TraceContext,
                      clock: &'a dyn Clock,
                      config: &'a EngineConfig,
                      resume: Option<ResumeData>)
                      -> Self {
        Self { tx,
               run,
               trace,
               clock,
               config,
               resume,
               visited: IndexSet::new(),
               signal: None,
               fault: None }
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn run(&self) -> &FlowRun {
        self.run
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Nombres de step visitados en esta pasada, en orden.
    pub fn visited(&self) -> impl Iterator<Item = &str> {
        self.visited.iter().map(String::as_str)
    }

    /// Señal ya emitida en esta pasada, si la hay.
    pub fn signal(&self) -> Option<&ControlSignal> {
        self.signal.as_ref()
    }

    /// Step FUNCTION con las opciones por defecto del motor.
    pub fn step<T, E, F>(&mut self, name: &str, body: F) -> FlowResult<T>
        where T: Serialize + DeserializeOwned,
              E: fmt::Display,
              F: FnOnce(&mut StepScope<'_, C>) -> Result<T, E>
    {
        self.step_with(name, StepOptions::default(), body)
    }

    /// Step FUNCTION.
    ///
    /// Devuelve el valor almacenado si ya hay un intento COMPLETED; si no,
    /// ejecuta `body` (salvo que un reintento aún no sea elegible) y corta la
    /// pasada con `Continue`, `RetryScheduled` o `ExhaustedRetries`.
    pub fn step_with<T, E, F>(&mut self, name: &str, opts: StepOptions, body: F) -> FlowResult<T>
        where T: Serialize + DeserializeOwned,
              E: fmt::Display,
              F: FnOnce(&mut StepScope<'_, C>) -> Result<T, E>
    {
        self.enter(name)?;
        let resolved = opts.resolve(self.config);
        let run_id = self.run.id;
        let open = match self.ledger(|tx| tx.latest_attempt(run_id, name))? {
            None => None,
            Some(row) => {
                self.check_type(&row, StepType::Function)?;
                match row.status {
                    AttemptStatus::Completed => {
                        debug!("replay step={name} attempt={} run_id={run_id}", row.attempt);
                        return self.decode(name, row.value);
                    }
                    AttemptStatus::Failed => {
                        self.retry_gate(name, &row)?;
                        None
                    }
                    _ => Some(row),
                }
            }
        };
        self.execute(name, &resolved, open, body)
    }

    /// Step UI: pide datos externos y los devuelve una vez aceptados.
    pub fn ui_step<T>(&mut self, name: &str, ui: Value, opts: UiOptions) -> FlowResult<T>
        where T: DeserializeOwned
    {
        self.enter(name)?;
        let run_id = self.run.id;
        let pending = match self.ledger(|tx| tx.latest_attempt(run_id, name))? {
            None => {
                let fresh = self.create_ui_attempt(name, &ui, &opts)?;
                return Err(self.render(name, &fresh, ui, None));
            }
            Some(row) => {
                self.check_type(&row, StepType::Ui)?;
                match row.status {
                    AttemptStatus::Completed => return self.decode(name, row.value),
                    AttemptStatus::Failed => {
                        return self.reopen_ui(name, ui, &opts, row.error.unwrap_or_default());
                    }
                    _ => row,
                }
            }
        };

        let Some(resume) = self.take_resume(pending.id) else {
            return Err(self.render(name, &pending, ui, None));
        };
        let at = self.clock.now();
        match check_submission::<T>(&opts, &resume.data) {
            Ok(()) => {
                self.ledger(|tx| tx.complete_attempt(pending.id, &resume.data, at))?;
                info!("ui step accepted step={name} run_id={run_id}");
                Err(self.emit(ControlSignal::Continue { step: name.to_string() }))
            }
            Err(msg) => {
                self.ledger(|tx| tx.fail_attempt(pending.id, &msg, None, at))?;
                warn!("ui step rejected step={name} run_id={run_id}: {msg}");
                if opts.fails_run_on_rejection() {
                    return Err(self.emit(ControlSignal::fatal(msg)));
                }
                self.reopen_ui(name, ui, &opts, msg)
            }
        }
    }

    /// Step DELAY: corta la pasada hasta que pase `duration` desde la
    /// primera vez que se alcanzó.
    pub fn sleep(&mut self, name: &str, duration: Duration) -> FlowResult<()> {
        self.enter(name)?;
        let run_id = self.run.id;
        let latest = self.ledger(|tx| tx.latest_attempt(run_id, name))?;
        let row = match latest {
            Some(row) if row.status == AttemptStatus::Completed => {
                self.check_type(&row, StepType::Delay)?;
                return Ok(());
            }
            Some(row) if row.status.is_open() => {
                self.check_type(&row, StepType::Delay)?;
                row
            }
            other => {
                if let Some(row) = &other {
                    self.check_type(row, StepType::Delay)?;
                }
                let new = NewAttempt { run_id,
                                       name: name.to_string(),
                                       stage: None,
                                       step_type: StepType::Delay,
                                       status: AttemptStatus::Pending,
                                       max_retries: 0,
                                       timeout_in_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                                       ui: None,
                                       created_at: self.clock.now() };
                self.ledger(|tx| tx.create_attempt(new))?
            }
        };

        let started = row.start_time.unwrap_or(row.created_at);
        let resume_at = add_duration(started, Duration::from_millis(row.timeout_in_ms));
        let now = self.clock.now();
        if now >= resume_at {
            self.ledger(|tx| tx.complete_attempt(row.id, &Value::Null, now))?;
            debug!("delay elapsed step={name} run_id={run_id}");
            Err(self.emit(ControlSignal::Continue { step: name.to_string() }))
        } else {
            Err(self.emit(ControlSignal::Delayed { step: name.to_string(),
                                                   resume_at }))
        }
    }

    /// Cierra la pasada: un fallo de infraestructura gana, luego la señal
    /// registrada, luego lo que devolvió el cuerpo.
    pub(crate) fn finish(self, result: FlowResult<Value>) -> Result<Settlement, LedgerError> {
        if let Some(err) = self.fault {
            return Err(err);
        }
        if let Some(resume) = &self.resume {
            warn!("resume data for step_id={} ignored run_id={}", resume.step_id, self.run.id);
        }
        Ok(match (self.signal, result) {
            (Some(signal), _) => Settlement::Signal(signal),
            (None, Ok(data)) => Settlement::Completed(data),
            (None, Err(signal)) => Settlement::Signal(signal),
        })
    }

    fn enter(&mut self, name: &str) -> FlowResult<()> {
        if let Some(signal) = &self.signal {
            return Err(signal.clone());
        }
        if !self.visited.insert(name.to_string()) {
            warn!("duplicate step name '{name}' run_id={}", self.run.id);
            return Err(self.emit(ControlSignal::duplicate_step(name)));
        }
        Ok(())
    }

    fn emit(&mut self, signal: ControlSignal) -> ControlSignal {
        self.signal.get_or_insert(signal).clone()
    }

    fn infra(&mut self, err: LedgerError) -> ControlSignal {
        error!("ledger failure run_id={}: {err}", self.run.id);
        let signal = self.emit(ControlSignal::fatal(err.to_string()));
        self.fault.get_or_insert(err);
        signal
    }

    fn ledger<T>(&mut self, op: impl FnOnce(&mut dyn LedgerTx<Conn = C>) -> Result<T, LedgerError>) -> FlowResult<T> {
        match op(&mut *self.tx) {
            Ok(v) => Ok(v),
            Err(e) => Err(self.infra(e)),
        }
    }

    fn check_type(&mut self, row: &StepAttempt, expected: StepType) -> FlowResult<()> {
        if row.step_type == expected {
            return Ok(());
        }
        Err(self.emit(ControlSignal::fatal(format!("Step '{}' was recorded as {} but replayed as {}",
                                                   row.name, row.step_type, expected))))
    }

    fn decode<T: DeserializeOwned>(&mut self, name: &str, value: Option<Value>) -> FlowResult<T> {
        serde_json::from_value(value.unwrap_or(Value::Null))
            .map_err(|e| self.emit(ControlSignal::fatal(format!("Step '{name}' value cannot be decoded: {e}"))))
    }

    /// Decide si un step cuyo último intento falló puede reintentarse ya.
    ///
    /// Lee la decisión guardada en la fila FAILED al fallar: la política no
    /// se vuelve a consultar.
    fn retry_gate(&mut self, name: &str, last: &StepAttempt) -> FlowResult<()> {
        match last.retry_at {
            None => {
                let error = last.error.clone().unwrap_or_default();
                Err(self.emit(ControlSignal::ExhaustedRetries { step: name.to_string(),
                                                                error }))
            }
            Some(resume_at) if self.clock.now() < resume_at => {
                debug!("retry not yet due step={name} resume_at={resume_at}");
                Err(self.emit(ControlSignal::RetryScheduled { step: name.to_string(),
                                                              attempt: last.attempt.saturating_add(1),
                                                              resume_at }))
            }
            Some(_) => Ok(()),
        }
    }

    fn execute<T, E, F>(&mut self, name: &str, resolved: &ResolvedStep, open: Option<StepAttempt>, body: F) -> FlowResult<T>
        where T: Serialize + DeserializeOwned,
              E: fmt::Display,
              F: FnOnce(&mut StepScope<'_, C>) -> Result<T, E>
    {
        let run_id = self.run.id;
        let row = match open {
            Some(row) => row,
            None => {
                let new = NewAttempt { run_id,
                                       name: name.to_string(),
                                       stage: resolved.stage.clone(),
                                       step_type: StepType::Function,
                                       status: AttemptStatus::New,
                                       max_retries: resolved.policy.max_retries,
                                       timeout_in_ms: resolved.timeout_ms,
                                       ui: None,
                                       created_at: self.clock.now() };
                self.ledger(|tx| tx.create_attempt(new))?
            }
        };
        debug!("execute step={name} attempt={} run_id={run_id} trace={}", row.attempt, self.trace.label());

        let timeout_ms = row.timeout_in_ms;
        let deadline = add_duration(self.clock.now(), Duration::from_millis(timeout_ms));
        let attempt = row.attempt;
        let clock = self.clock;
        let trace = &self.trace;
        let isolated: IsolatedBody<'_, C> = Box::new(move |conn: &mut C| -> StepOutcome {
            let mut scope = StepScope::new(conn, run_id, name, attempt, trace, deadline, clock);
            let result = body(&mut scope);
            if clock.now() > deadline {
                return Err(timeout_error(timeout_ms));
            }
            match result {
                Ok(v) => serde_json::to_value(&v).map_err(|e| format!("step result is not serializable: {e}")),
                Err(e) => Err(e.to_string()),
            }
        });
        let outcome = match self.tx.isolated(timeout_ms, isolated) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.infra(e)),
        };

        let at = self.clock.now();
        match outcome {
            Ok(value) => {
                self.ledger(|tx| tx.complete_attempt(row.id, &value, at))?;
                debug!("step completed step={name} attempt={attempt} run_id={run_id}");
                Err(self.emit(ControlSignal::Continue { step: name.to_string() }))
            }
            Err(error) => {
                let failed = self.ledger(|tx| tx.count_failed(run_id, name, StepType::Function))?
                                 .saturating_add(1);
                let retry_at = resolved.policy
                                       .next_delay(failed, &error)
                                       .map(|delay| add_duration(at, delay));
                self.ledger(|tx| tx.fail_attempt(row.id, &error, retry_at, at))?;
                match retry_at {
                    Some(resume_at) => {
                        debug!("step failed step={name} attempt={attempt}, retry at {resume_at}: {error}");
                        Err(self.emit(ControlSignal::RetryScheduled { step: name.to_string(),
                                                                      attempt: failed.saturating_add(1),
                                                                      resume_at }))
                    }
                    None => {
                        warn!("step exhausted retries step={name} attempts={failed} run_id={run_id}: {error}");
                        Err(self.emit(ControlSignal::ExhaustedRetries { step: name.to_string(),
                                                                        error }))
                    }
                }
            }
        }
    }

    /// Tras un rechazo: vuelve a pedir los datos con una fila nueva, o falla
    /// el step si ya se agotó el presupuesto de rechazos.
    fn reopen_ui<T>(&mut self, name: &str, ui: Value, opts: &UiOptions, error: String) -> FlowResult<T> {
        let run_id = self.run.id;
        let budget = opts.rejection_budget(self.config.default_max_retries);
        let rejected = self.ledger(|tx| tx.count_failed(run_id, name, StepType::Ui))?;
        if rejected > budget {
            warn!("ui step exhausted rejections step={name} rejected={rejected} run_id={run_id}");
            return Err(self.emit(ControlSignal::ExhaustedRetries { step: name.to_string(),
                                                                   error }));
        }
        let fresh = self.create_ui_attempt(name, &ui, opts)?;
        Err(self.render(name, &fresh, ui, Some(error)))
    }

    fn create_ui_attempt(&mut self, name: &str, ui: &Value, opts: &UiOptions) -> FlowResult<StepAttempt> {
        let new = NewAttempt { run_id: self.run.id,
                               name: name.to_string(),
                               stage: opts.stage.clone(),
                               step_type: StepType::Ui,
                               status: AttemptStatus::Pending,
                               max_retries: opts.rejection_budget(self.config.default_max_retries),
                               timeout_in_ms: 0,
                               ui: Some(ui.clone()),
                               created_at: self.clock.now() };
        self.ledger(|tx| tx.create_attempt(new))
    }

    fn render(&mut self, name: &str, row: &StepAttempt, ui: Value, error: Option<String>) -> ControlSignal {
        debug!("ui render step={name} step_id={} run_id={}", row.id, self.run.id);
        self.emit(ControlSignal::UiRender { step: name.to_string(),
                                            step_id: row.id,
                                            ui,
                                            error })
    }

    fn take_resume(&mut self, step_id: Uuid) -> Option<ResumeData> {
        if self.resume.as_ref().is_some_and(|r| r.step_id == step_id) {
            self.resume.take()
        } else {
            None
        }
    }
}

/// Los datos entregados deben decodificar al tipo del step y pasar el
/// validador del autor.
fn check_submission<T: DeserializeOwned>(opts: &UiOptions, data: &Value) -> Result<(), String> {
    serde_json::from_value::<T>(data.clone()).map_err(|e| format!("invalid submission: {e}"))?;
    opts.check(data)
}
