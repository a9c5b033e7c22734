//! ledgerflow
//!
//! Fachada del workspace:
//! - Re-exporta `ledgerflow_core` (motor de replay, ledger en memoria) y
//!   `ledgerflow_persistence` (ledger Postgres).
//! - `demo`: flow de ejemplo (pedido con reintento, aprobación y espera) y un
//!   dispatcher local que lo conduce hasta un estado terminal.
//! - `errors`: errores de la aplicación.

pub mod demo;
pub mod errors;

pub use ledgerflow_core as engine;
pub use ledgerflow_persistence as persistence;

pub use errors::AppError;
