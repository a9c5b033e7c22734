//! ledgerflow-core: motor de replay por pasos (flows durables).
//!
//! Un flow es un cuerpo de código ordinario que llama a steps con nombre a
//! través de `FlowCtx`. Cada invocación re-ejecuta el cuerpo desde el
//! principio; los steps ya completados se sirven desde el ledger y a lo sumo
//! una unidad de trabajo nueva se ejecuta antes de devolver el control al
//! dispatcher mediante una `ControlSignal`.
pub mod constants;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod model;
pub mod retry;
pub mod signal;
pub mod step;
pub mod ui;

pub use engine::{flow_fn, EngineBuilder, EngineConfig, Flow, FlowCtx, FlowRegistry, Invocation, InvocationResponse,
                 ReplayEngine, RunListener};
pub use errors::{EngineError, LedgerError};
pub use ledger::{AttemptStatus, FlowRun, FlowRunView, InMemoryLedger, Ledger, LedgerTx, MemoryConn, RunStatus,
                 StepAttempt, StepType};
pub use model::{Clock, ManualClock, SystemClock, TraceContext};
pub use retry::{Backoff, RetryAttempt, RetryPolicy};
pub use signal::{ControlSignal, FlowResult};
pub use step::{StepOptions, StepScope};
pub use ui::{ResumeData, UiOptions};
