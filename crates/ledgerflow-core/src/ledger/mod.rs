//! Ledger de intentos: tipos persistidos, contrato transaccional y backend
//! en memoria.

mod memory;
mod store;
mod types;

pub use memory::{InMemoryLedger, MemoryConn};
pub use store::{IsolatedBody, Ledger, LedgerTx, StepOutcome};
pub use types::{AttemptStatus, FlowRun, FlowRunView, NewAttempt, NewRun, RunOutcome, RunStatus, StepAttempt, StepType};
