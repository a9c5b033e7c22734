//! Core ReplayEngine implementation

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::EXHAUSTED_RETRIES_ERROR;
use crate::engine::flow_ctx::Settlement;
use crate::engine::{EngineBuilder, EngineConfig, FlowCtx, FlowRegistry, Invocation, InvocationResponse, RunListener};
use crate::errors::{EngineError, LedgerError};
use crate::ledger::{FlowRun, FlowRunView, Ledger, LedgerTx, NewRun, RunOutcome};
use crate::model::{Clock, TraceContext};
use crate::signal::ControlSignal;

/// Motor de replay por pasos.
///
/// Sin estado entre invocaciones: todo el progreso de un run vive en el
/// ledger. Cada `invoke` abre una transacción (con el lease del run),
/// re-interpreta el cuerpo del flow desde el principio, ejecuta a lo sumo una
/// unidad de trabajo nueva y traduce el resultado a una `InvocationResponse`.
pub struct ReplayEngine<L: Ledger> {
    pub(crate) ledger: L,
    pub(crate) registry: FlowRegistry<L::Conn>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
    pub(crate) listeners: Vec<Arc<dyn RunListener>>,
}

impl<L: Ledger> ReplayEngine<L> {
    /// Crea un builder para configurar el engine
    #[inline]
    pub fn builder(ledger: L) -> EngineBuilder<L> {
        EngineBuilder::new(ledger)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FlowRegistry<L::Conn> {
        &self.registry
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Crea un run RUNNING para `flow_name` y devuelve su id. Punto de
    /// entrada del colaborador externo (p.ej. la cola de tareas).
    pub fn start_run(&self,
                     flow_name: &str,
                     input: Value,
                     started_by: Option<String>,
                     trace_id: Option<String>)
                     -> Result<Uuid, EngineError> {
        if self.registry.get(flow_name).is_none() {
            return Err(EngineError::UnknownFlow(flow_name.to_string()));
        }
        let run_id = Uuid::new_v4();
        let trace = TraceContext::new(trace_id, started_by);
        let new = self.new_run(run_id, flow_name, input, &trace);
        self.ledger
            .transact(run_id, &trace, |tx| -> Result<FlowRun, EngineError> { Ok(tx.insert_run(new)?) })?;
        info!("run created run_id={run_id} flow={flow_name} trace={}", trace.label());
        Ok(run_id)
    }

    /// Una invocación: una pasada completa por el cuerpo del flow.
    ///
    /// Los fallos de step nunca salen como `Err`; sólo los fallos de
    /// infraestructura (ledger inaccesible, lease ocupado, ...) y los errores
    /// de uso (flow desconocido, run de otro flow).
    pub fn invoke(&self, invocation: Invocation) -> Result<InvocationResponse, EngineError> {
        let Invocation { run_id,
                         flow_name,
                         input,
                         resume,
                         trace } = invocation;
        let flow = self.registry
                       .get(&flow_name)
                       .ok_or_else(|| EngineError::UnknownFlow(flow_name.clone()))?;

        let (response, closed) = self.ledger.transact(run_id, &trace, |tx| -> Result<_, EngineError> {
            let run = match tx.load_run(run_id)? {
                Some(run) => run,
                None => {
                    let run = tx.insert_run(self.new_run(run_id, &flow_name, input, &trace))?;
                    info!("run created on first invocation run_id={run_id} flow={flow_name}");
                    run
                }
            };
            if run.name != flow_name {
                return Err(EngineError::FlowMismatch { run_id,
                                                       expected: run.name,
                                                       requested: flow_name.clone() });
            }
            if let Some(terminal) = InvocationResponse::for_terminal(&run) {
                warn!("stale invocation for terminal run run_id={run_id} status={}", run.status);
                return Ok((terminal, None));
            }

            let pass_trace = if trace == TraceContext::default() { TraceContext::for_run(&run) } else { trace.clone() };
            debug!("pass start run_id={run_id} flow={flow_name} trace={}", pass_trace.label());
            let mut ctx = FlowCtx::new(&mut *tx, &run, pass_trace, self.clock.as_ref(), &self.config, resume);
            let result = flow.run(&mut ctx, &run.input);
            let settlement = ctx.finish(result)?;
            self.settle(tx, &run, settlement)
        })?;

        if let Some(run) = closed {
            for listener in &self.listeners {
                listener.on_run_closed(&run);
            }
        }
        Ok(response)
    }

    /// Re-invoca mientras la respuesta sea "pendiente y elegible ya", hasta
    /// `max_passes` pasadas. Conveniencia local para tests y demos; no es un
    /// scheduler.
    pub fn run_until_blocked(&self, invocation: Invocation, max_passes: usize) -> Result<InvocationResponse, EngineError> {
        let next = Invocation { resume: None,
                                ..invocation.clone() };
        let mut response = self.invoke(invocation)?;
        let mut passes = 1;
        while passes < max_passes && response.is_ready(self.clock.now()) {
            response = self.invoke(next.clone())?;
            passes += 1;
        }
        debug!("run_until_blocked run_id={} passes={passes}", next.run_id);
        Ok(response)
    }

    /// Proyección del run con sus intentos ordenados.
    pub fn run_view(&self, run_id: Uuid) -> Result<FlowRunView, EngineError> {
        let (run, steps) = self.ledger
                               .snapshot(run_id)?
                               .ok_or(LedgerError::RunNotFound(run_id))?;
        Ok(FlowRunView { run, steps })
    }

    fn new_run(&self, run_id: Uuid, flow_name: &str, input: Value, trace: &TraceContext) -> NewRun {
        NewRun { id: run_id,
                 name: flow_name.to_string(),
                 input,
                 started_by: trace.started_by.clone(),
                 trace_id: trace.trace_id.clone(),
                 config: self.config.describe(),
                 created_at: self.clock.now() }
    }

    /// Traduce el resultado de la pasada; cierra el run si es terminal.
    fn settle(&self,
              tx: &mut dyn LedgerTx<Conn = L::Conn>,
              run: &FlowRun,
              settlement: Settlement)
              -> Result<(InvocationResponse, Option<FlowRun>), EngineError> {
        let signal = match settlement {
            Settlement::Completed(data) => {
                let closed = tx.close_run(run.id, &RunOutcome::Completed(data.clone()), self.clock.now())?;
                info!("run completed run_id={}", run.id);
                return Ok((InvocationResponse::Completed { data }, Some(closed)));
            }
            Settlement::Signal(signal) => signal,
        };
        debug!("pass end run_id={} signal={} step={}",
               run.id,
               signal.kind_name(),
               signal.step().unwrap_or("-"));
        let resume_at = signal.resume_at();
        match signal {
            ControlSignal::Continue { .. } | ControlSignal::RetryScheduled { .. } | ControlSignal::Delayed { .. } => {
                Ok((InvocationResponse::Pending { resume_at }, None))
            }
            ControlSignal::UiRender { step_id, ui, error, .. } => {
                Ok((InvocationResponse::AwaitingInput { ui, step_id, error }, None))
            }
            ControlSignal::ExhaustedRetries { step, .. } => {
                warn!("run failed, step '{step}' exhausted retries run_id={}", run.id);
                self.fail_run(tx, run, EXHAUSTED_RETRIES_ERROR.to_string())
            }
            ControlSignal::Fatal { error } => {
                warn!("run failed run_id={}: {error}", run.id);
                self.fail_run(tx, run, error)
            }
        }
    }

    fn fail_run(&self,
                tx: &mut dyn LedgerTx<Conn = L::Conn>,
                run: &FlowRun,
                error: String)
                -> Result<(InvocationResponse, Option<FlowRun>), EngineError> {
        let closed = tx.close_run(run.id, &RunOutcome::Failed(error.clone()), self.clock.now())?;
        Ok((InvocationResponse::Failed { error }, Some(closed)))
    }
}
