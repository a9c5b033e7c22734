//! Steps: unidades con nombre cuyo resultado se persiste en el ledger.
//!
//! - `StepOptions`: stage, reintentos, timeout y backoff de un step FUNCTION.
//! - `StepScope`: lo que ve el cuerpo del step mientras corre (conexión del
//!   store dentro del savepoint, traza, deadline).

mod options;
mod scope;

pub use options::{ResolvedStep, StepOptions};
pub use scope::StepScope;
