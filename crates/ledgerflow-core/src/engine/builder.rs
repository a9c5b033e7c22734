//! Builder para `ReplayEngine`.
//!
//! ```ignore
//! let engine = ReplayEngine::builder(InMemoryLedger::new())
//!     .clock(Arc::new(ManualClock::default()))
//!     .flow(flow_fn("signup", signup))?
//!     .listener(Arc::new(TaskQueueHook))
//!     .build();
//! ```

use std::sync::Arc;

use crate::engine::{EngineConfig, Flow, FlowRegistry, ReplayEngine, RunListener};
use crate::errors::EngineError;
use crate::ledger::Ledger;
use crate::model::{Clock, SystemClock};

pub struct EngineBuilder<L: Ledger> {
    ledger: L,
    registry: FlowRegistry<L::Conn>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    listeners: Vec<Arc<dyn RunListener>>,
}

impl<L: Ledger> EngineBuilder<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger,
               registry: FlowRegistry::new(),
               clock: Arc::new(SystemClock),
               config: EngineConfig::default(),
               listeners: Vec::new() }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Registra un flow. Falla con `DuplicateFlow` si el nombre ya existe.
    pub fn flow<F>(mut self, flow: F) -> Result<Self, EngineError>
        where F: Flow<L::Conn> + 'static
    {
        self.registry.register(flow)?;
        Ok(self)
    }

    pub fn listener(mut self, listener: Arc<dyn RunListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> ReplayEngine<L> {
        ReplayEngine { ledger: self.ledger,
                       registry: self.registry,
                       clock: self.clock,
                       config: self.config,
                       listeners: self.listeners }
    }
}
