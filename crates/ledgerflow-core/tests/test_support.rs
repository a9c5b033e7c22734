#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use ledgerflow_core::{AttemptStatus, EngineBuilder, FlowCtx, FlowRun, InMemoryLedger, ManualClock, MemoryConn,
                      ReplayEngine, RunListener};
use uuid::Uuid;

pub type Ctx<'a> = FlowCtx<'a, MemoryConn>;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(t0()))
}

pub fn builder(clock: &Arc<ManualClock>) -> EngineBuilder<InMemoryLedger> {
    ReplayEngine::builder(InMemoryLedger::new()).clock(clock.clone())
}

/// Estados de los intentos de un step, en orden.
pub fn statuses(engine: &ReplayEngine<InMemoryLedger>, run_id: Uuid, name: &str) -> Vec<AttemptStatus> {
    engine.ledger()
          .attempts(run_id)
          .into_iter()
          .filter(|a| a.name == name)
          .map(|a| a.status)
          .collect()
}

/// Listener que recuerda los runs cerrados.
#[derive(Default)]
pub struct RecordingListener {
    pub closed: Mutex<Vec<FlowRun>>,
}

impl RunListener for RecordingListener {
    fn on_run_closed(&self, run: &FlowRun) {
        self.closed.lock().unwrap().push(run.clone());
    }
}
