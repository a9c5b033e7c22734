//! ledgerflow-persistence
//!
//! Backend Postgres (Diesel) del ledger de intentos de `ledgerflow-core`,
//! más utilidades de conexión y migraciones.
//!
//! Módulos:
//! - `pg`: `PgLedger` (transacción por invocación, lease por advisory lock,
//!   savepoint por step).
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema; // mantenido a mano

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgLedger, PgPool, PoolProvider};
