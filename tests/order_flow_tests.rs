use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use ledgerflow::demo::{drive, order_engine, COOLING_OFF, ORDER_FLOW};
use ledgerflow::engine::{AttemptStatus, Clock, EngineConfig, FlowRun, InMemoryLedger, Invocation, InvocationResponse,
                         ManualClock, ReplayEngine, RunListener, RunStatus, StepType};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Default)]
struct Closed(Mutex<Vec<(Uuid, RunStatus)>>);

impl RunListener for Closed {
    fn on_run_closed(&self, run: &FlowRun) {
        self.0.lock().unwrap().push((run.id, run.status));
    }
}

fn setup() -> (Arc<ManualClock>, Arc<Closed>, ReplayEngine<InMemoryLedger>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()));
    let closed = Arc::new(Closed::default());
    let engine = order_engine(InMemoryLedger::new(),
                              clock.clone(),
                              EngineConfig::default(),
                              vec![closed.clone() as Arc<dyn RunListener>]).unwrap();
    (clock, closed, engine)
}

#[test]
fn large_order_waits_for_a_valid_approval() {
    let (clock, closed, engine) = setup();
    let start = clock.now();
    let run_id = engine.start_run(ORDER_FLOW, json!({"sku": "PANEL-2", "qty": 24}), Some("ops".into()), None)
                       .unwrap();
    let mut forms: Vec<(Value, Option<String>)> = Vec::new();
    let resp = drive(&engine,
                     &clock,
                     Invocation::new(run_id, ORDER_FLOW, json!({})),
                     |ui, error| {
                         forms.push((ui.clone(), error.map(str::to_string)));
                         if error.is_none() {
                             json!({"approved": true, "reviewer": " "})
                         } else {
                             json!({"approved": true, "reviewer": "marta"})
                         }
                     },
                     50).unwrap();
    assert_eq!(resp,
               InvocationResponse::Completed { data: json!({"reservation": "PANEL-2x24", "reviewer": "marta", "total_cents": 6000}) });

    // primer envío sin revisor: rechazado y vuelto a pedir con el mensaje
    assert_eq!(forms.len(), 2);
    assert_eq!(forms[0].0, json!({"form": "approve_order", "sku": "PANEL-2", "qty": 24}));
    assert_eq!(forms[0].1, None);
    assert_eq!(forms[1].1.as_deref(), Some("reviewer is required"));

    let view = engine.run_view(run_id).unwrap();
    assert_eq!(view.run.status, RunStatus::Completed);
    assert_eq!(view.run.started_by.as_deref(), Some("ops"));
    let approvals: Vec<AttemptStatus> = view.attempts_of("manager_approval").iter().map(|a| a.status).collect();
    assert_eq!(approvals, vec![AttemptStatus::Failed, AttemptStatus::Completed]);
    let delay = view.attempts_of("cooling_off")[0];
    assert_eq!(delay.step_type, StepType::Delay);
    assert_eq!(delay.timeout_in_ms, COOLING_OFF.as_millis() as u64);

    // backoff lineal de 2s tras el primer fallo de reserva
    let reserve = view.attempts_of("reserve_stock");
    assert_eq!(reserve[1].start_time.unwrap() - start, ChronoDuration::seconds(2));

    assert_eq!(closed.0.lock().unwrap().as_slice(), &[(run_id, RunStatus::Completed)]);

    // re-entrega tardía: misma respuesta terminal, sin listener ni filas nuevas
    let rows = engine.ledger().attempts(run_id).len();
    assert_eq!(engine.invoke(Invocation::new(run_id, ORDER_FLOW, json!({}))).unwrap(), resp);
    assert_eq!(engine.ledger().attempts(run_id).len(), rows);
    assert_eq!(closed.0.lock().unwrap().len(), 1);
}

#[test]
fn denied_order_fails_the_run() {
    let (clock, closed, engine) = setup();
    let run_id = Uuid::new_v4();
    let resp = drive(&engine,
                     &clock,
                     Invocation::new(run_id, ORDER_FLOW, json!({"sku": "X", "qty": 50})),
                     |_, _| json!({"approved": false, "reviewer": "luis"}),
                     50).unwrap();
    assert_eq!(resp, InvocationResponse::Failed { error: "order rejected by luis".into() });
    assert_eq!(resp.to_wire(), json!({"completed": true, "error": "order rejected by luis"}));
    let view = engine.run_view(run_id).unwrap();
    assert_eq!(view.run.status, RunStatus::Failed);
    assert!(view.attempts_of("charge").is_empty());
    assert_eq!(closed.0.lock().unwrap().as_slice(), &[(run_id, RunStatus::Failed)]);
}

#[test]
fn each_invocation_does_at_most_one_unit_of_work() {
    let (clock, _closed, engine) = setup();
    let run_id = Uuid::new_v4();
    let inv = Invocation::new(run_id, ORDER_FLOW, json!({"sku": "S", "qty": 1}));

    let first = engine.invoke(inv.clone()).unwrap();
    assert_eq!(first, InvocationResponse::Pending { resume_at: Some(clock.now() + ChronoDuration::seconds(2)) });
    assert_eq!(engine.ledger().attempts(run_id).len(), 1);

    clock.advance(std::time::Duration::from_secs(2));
    assert_eq!(engine.invoke(inv.clone()).unwrap(), InvocationResponse::Pending { resume_at: None });
    assert_eq!(engine.ledger().attempts(run_id).len(), 2);

    let waiting = engine.invoke(inv).unwrap();
    assert_eq!(waiting,
               InvocationResponse::Pending { resume_at: Some(clock.now() + ChronoDuration::seconds(30)) });
    assert_eq!(engine.ledger().run(run_id).unwrap().status, RunStatus::Running);
}
