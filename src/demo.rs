//! Flow de demostración y dispatcher local.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use ledgerflow_core::{flow_fn, Clock, ControlSignal, EngineConfig, EngineError, Flow, FlowCtx, Invocation,
                      InvocationResponse, Ledger, ManualClock, ReplayEngine, RunListener, StepOptions, StepScope,
                      UiOptions};

use crate::errors::AppError;

pub const ORDER_FLOW: &str = "order_fulfillment";

/// Pedidos por encima de esta cantidad requieren aprobación manual.
pub const LARGE_ORDER: u64 = 10;
pub const UNIT_PRICE_CENTS: u64 = 250;
pub const COOLING_OFF: Duration = Duration::from_secs(30);

/// Datos del formulario de aprobación.
#[derive(Debug, Deserialize)]
pub struct Approval {
    pub approved: bool,
    pub reviewer: String,
}

/// Pedido: reserva de stock (falla el primer intento, backoff lineal),
/// aprobación manual para pedidos grandes, período de enfriamiento y cobro.
///
/// Input: `{"sku": "...", "qty": n}`.
pub fn order_fulfillment<C: 'static>() -> impl Flow<C> {
    flow_fn(ORDER_FLOW, |ctx: &mut FlowCtx<'_, C>, input: &Value| {
        let sku = input["sku"].as_str().unwrap_or("unknown").to_string();
        let qty = input["qty"].as_u64().unwrap_or(1);

        let reserve = StepOptions::new().stage("inventory")
                                        .max_retries(3)
                                        .linear(Duration::from_secs(2));
        let reservation: String = ctx.step_with("reserve_stock", reserve, |s: &mut StepScope<'_, C>| {
                                         if s.attempt() == 1 {
                                             Err(format!("warehouse busy for {sku}"))
                                         } else {
                                             Ok(format!("{sku}x{qty}"))
                                         }
                                     })?;

        let reviewer = if qty > LARGE_ORDER {
            let opts = UiOptions::new().stage("review").validate(|v| {
                                                           match v.get("reviewer").and_then(Value::as_str) {
                                                               Some(r) if !r.trim().is_empty() => Ok(()),
                                                               _ => Err("reviewer is required".to_string()),
                                                           }
                                                       });
            let approval: Approval =
                ctx.ui_step("manager_approval", json!({"form": "approve_order", "sku": sku, "qty": qty}), opts)?;
            if !approval.approved {
                return Err(ControlSignal::fatal(format!("order rejected by {}", approval.reviewer)));
            }
            Some(approval.reviewer)
        } else {
            None
        };

        ctx.sleep("cooling_off", COOLING_OFF)?;

        let charge = StepOptions::new().stage("billing").timeout_ms(5_000);
        let total: u64 = ctx.step_with("charge", charge, |_s: &mut StepScope<'_, C>| {
                                Ok::<_, String>(qty * UNIT_PRICE_CENTS)
                            })?;
        Ok(json!({
            "reservation": reservation,
            "reviewer": reviewer,
            "total_cents": total,
        }))
    })
}

/// Engine con el flow de pedidos registrado sobre `ledger`.
pub fn order_engine<L>(ledger: L,
                       clock: Arc<ManualClock>,
                       config: EngineConfig,
                       listeners: Vec<Arc<dyn RunListener>>)
                       -> Result<ReplayEngine<L>, EngineError>
    where L: Ledger,
          L::Conn: 'static
{
    let mut builder = ReplayEngine::builder(ledger).clock(clock)
                                                   .config(config)
                                                   .flow(order_fulfillment::<L::Conn>())?;
    for listener in listeners {
        builder = builder.listener(listener);
    }
    Ok(builder.build())
}

/// Dispatcher local: re-invoca el run hasta un estado terminal, adelantando
/// el reloj manual hasta cada `resume_at` y respondiendo los pedidos de UI
/// con `answer(ui, error_previo)`.
pub fn drive<L, A>(engine: &ReplayEngine<L>,
                   clock: &ManualClock,
                   invocation: Invocation,
                   mut answer: A,
                   max_invocations: usize)
                   -> Result<InvocationResponse, AppError>
    where L: Ledger,
          A: FnMut(&Value, Option<&str>) -> Value
{
    let run_id = invocation.run_id;
    let mut next = invocation;
    for _ in 0..max_invocations {
        let response = engine.invoke(next.clone())?;
        next.resume = None;
        match &response {
            InvocationResponse::Completed { .. } | InvocationResponse::Failed { .. } => return Ok(response),
            InvocationResponse::Pending { resume_at: Some(at) } => {
                if *at > clock.now() {
                    debug!("drive: advancing clock to {at} run_id={run_id}");
                    clock.set(*at);
                }
            }
            InvocationResponse::Pending { resume_at: None } => {}
            InvocationResponse::AwaitingInput { ui, step_id, error } => {
                let data = answer(ui, error.as_deref());
                next = next.with_resume(*step_id, data);
            }
        }
    }
    Err(AppError::Stalled(run_id, max_invocations))
}
