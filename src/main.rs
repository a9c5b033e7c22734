use std::sync::Arc;

use chrono::Utc;
use ledgerflow::demo::{drive, order_engine, ORDER_FLOW};
use ledgerflow::engine::{EngineConfig, FlowRun, Invocation, Ledger, ManualClock, ReplayEngine, RunListener};
use ledgerflow::AppError;
use serde_json::{json, to_string_pretty, Value};
use uuid::Uuid;

/// Listener de demo: imprime cada run que termina.
struct PrintListener;

impl RunListener for PrintListener {
    fn on_run_closed(&self, run: &FlowRun) {
        println!("[listener] run {} cerrado con estado {}", run.id, run.status);
    }
}

/// Respuestas de UI: la primera sin revisor (rechazada por el validador),
/// luego una aprobación válida.
fn approver(ui: &Value, error: Option<&str>) -> Value {
    println!("[ui] formulario {} error previo={:?}", ui, error);
    match error {
        None => json!({"approved": true, "reviewer": ""}),
        Some(_) => json!({"approved": true, "reviewer": "marta"}),
    }
}

fn run_orders<L: Ledger>(engine: &ReplayEngine<L>, clock: &ManualClock) -> Result<(), AppError> {
    let orders = [json!({"sku": "BOLT-8", "qty": 4}), json!({"sku": "PANEL-2", "qty": 24})];
    for input in orders {
        let run_id = engine.start_run(ORDER_FLOW, input.clone(), Some("demo".into()), Some(Uuid::new_v4().to_string()))?;
        let response = drive(engine, clock, Invocation::new(run_id, ORDER_FLOW, input), approver, 50)?;
        println!("[demo] run {run_id}: {}", response.to_wire());
        let view = engine.run_view(run_id)?;
        println!("{}", to_string_pretty(&view).unwrap_or_default());
    }
    Ok(())
}

fn listeners() -> Vec<Arc<dyn RunListener>> {
    vec![Arc::new(PrintListener)]
}

#[cfg(not(feature = "pg_demo"))]
fn main() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = order_engine(ledgerflow::engine::InMemoryLedger::new(),
                              clock.clone(),
                              EngineConfig::from_env(),
                              listeners())?;
    println!("--- ledgerflow demo (ledger en memoria) ---");
    run_orders(&engine, &clock)
}

#[cfg(feature = "pg_demo")]
fn main() -> Result<(), AppError> {
    use ledgerflow::persistence::{build_dev_pool_from_env, PgLedger};

    let _ = dotenvy::dotenv();
    let pool = build_dev_pool_from_env()?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = order_engine(PgLedger::from_pool(pool), clock.clone(), EngineConfig::from_env(), listeners())?;
    println!("--- ledgerflow demo (Postgres) ---");
    run_orders(&engine, &clock)
}
