//! Implementación Postgres (Diesel) del ledger del core.
//!
//! Objetivo general del módulo:
//! - Proveer un ledger durable con paridad 1:1 respecto al backend en memoria
//!   (`InMemoryLedger`).
//! - Una invocación = una transacción `read_write`. Las lecturas/escrituras
//!   del ledger y los efectos de los cuerpos de step sobre la misma conexión
//!   se confirman juntos.
//! - Lease por run con `pg_try_advisory_xact_lock`: una invocación
//!   concurrente sobre el mismo run falla en el acto con `RunBusy`; el lock se
//!   libera solo al terminar la transacción.
//! - Cada cuerpo de step corre en un savepoint (transacción anidada de
//!   Diesel): si falla o excede su timeout, sus escrituras se revierten y la
//!   fila FAILED del ledger se conserva. Dentro del savepoint rige
//!   `statement_timeout = timeout_in_ms`, así el servidor corta una consulta
//!   colgada en lugar de retener el lease del run indefinidamente.
//! - Aislar el mapeo dominio ↔ filas de DB fuera de `ledgerflow-core`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{BigInt, Bool, Text};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use ledgerflow_core::errors::LedgerError;
use ledgerflow_core::ledger::{AttemptStatus, FlowRun, IsolatedBody, Ledger, LedgerTx, NewAttempt, NewRun, RunOutcome,
                              RunStatus, StepAttempt, StepOutcome, StepType};
use ledgerflow_core::model::TraceContext;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{flow_runs, step_attempts};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Notas operativas:
/// - El pool se construye con `min_idle` (mínimo de conexiones inactivas) y
///   `max_size` (límite superior total).
/// - Al construirlo, se corre automáticamente el set de migraciones pendientes
///   (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Este trait permite:
/// - Inyectar un pool real (producción/tests de integración).
/// - Simular/factorear en tests unitarios sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila de `flow_runs`.
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = flow_runs, check_for_backend(diesel::pg::Pg))]
pub struct RunRow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub input: Value,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub started_by: Option<String>,
    pub trace_id: Option<String>,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for FlowRun {
    type Error = PersistenceError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status = RunStatus::parse(&row.status).ok_or_else(|| {
                                                      PersistenceError::CorruptRow(format!("run {} status '{}'", row.id, row.status))
                                                  })?;
        Ok(FlowRun { id: row.id,
                     name: row.name,
                     status,
                     input: row.input,
                     data: row.data,
                     error: row.error,
                     started_by: row.started_by,
                     trace_id: row.trace_id,
                     config: row.config,
                     created_at: row.created_at,
                     updated_at: row.updated_at })
    }
}

/// Fila para insertar en `flow_runs`.
#[derive(Insertable, Debug)]
#[diesel(table_name = flow_runs)]
pub struct NewRunRow<'a> {
    pub id: Uuid,
    pub name: &'a str,
    pub status: &'a str,
    pub input: &'a Value,
    pub started_by: Option<&'a str>,
    pub trace_id: Option<&'a str>,
    pub config: &'a Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fila de `step_attempts` (sin `seq`, que sólo ordena).
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = step_attempts, check_for_backend(diesel::pg::Pg))]
pub struct StepRow {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: String,
    pub attempt: i32,
    pub stage: Option<String>,
    pub step_type: String,
    pub status: String,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub max_retries: i32,
    pub timeout_in_ms: i64,
    pub ui: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub retry_at: Option<DateTime<Utc>>,
}

impl TryFrom<StepRow> for StepAttempt {
    type Error = PersistenceError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, v: &str| PersistenceError::CorruptRow(format!("attempt {} {what} '{v}'", row.id));
        let step_type = StepType::parse(&row.step_type).ok_or_else(|| corrupt("type", &row.step_type))?;
        let status = AttemptStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?;
        Ok(StepAttempt { id: row.id,
                         run_id: row.run_id,
                         name: row.name,
                         attempt: u32::try_from(row.attempt).unwrap_or_default(),
                         stage: row.stage,
                         step_type,
                         status,
                         value: row.value,
                         error: row.error,
                         max_retries: u32::try_from(row.max_retries).unwrap_or_default(),
                         timeout_in_ms: u64::try_from(row.timeout_in_ms).unwrap_or_default(),
                         ui: row.ui,
                         created_at: row.created_at,
                         updated_at: row.updated_at,
                         start_time: row.start_time,
                         end_time: row.end_time,
                         retry_at: row.retry_at })
    }
}

/// Fila para insertar en `step_attempts`.
#[derive(Insertable, Debug)]
#[diesel(table_name = step_attempts)]
pub struct NewStepRow<'a> {
    pub id: Uuid,
    pub run_id: Uuid,
    pub name: &'a str,
    pub attempt: i32,
    pub stage: Option<&'a str>,
    pub step_type: &'a str,
    pub status: &'a str,
    pub max_retries: i32,
    pub timeout_in_ms: i64,
    pub ui: Option<&'a Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(QueryableByName)]
struct LockRow {
    #[diesel(sql_type = Bool)]
    locked: bool,
}

#[derive(QueryableByName)]
struct SettingRow {
    #[diesel(sql_type = Text)]
    value: String,
}

/// Retry simple con backoff lineal muy pequeño (hasta 3 reintentos).
///
/// Sólo se usa para obtener conexiones y para lecturas fuera de transacción:
/// nunca repite una invocación del motor (los cuerpos de step no son
/// necesariamente idempotentes).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Clave del advisory lock de un run: primeros 8 bytes del UUID.
fn lease_key(run_id: Uuid) -> i64 {
    let bytes = run_id.as_bytes();
    let mut key = [0u8; 8];
    key.copy_from_slice(&bytes[..8]);
    i64::from_be_bytes(key)
}

fn acquire_lease(conn: &mut PgConnection, run_id: Uuid) -> Result<(), TxAbort<PersistenceError>> {
    let row: LockRow = diesel::sql_query("SELECT pg_try_advisory_xact_lock($1) AS locked").bind::<BigInt, _>(lease_key(run_id))
                                                                                        .get_result(conn)?;
    if row.locked {
        Ok(())
    } else {
        Err(TxAbort::Caller(PersistenceError::LockNotAvailable(run_id)))
    }
}

/// Motivo de rollback de una transacción Diesel: error de DB o error del
/// caller.
enum TxAbort<E> {
    Db(diesel::result::Error),
    Caller(E),
}

impl<E> From<diesel::result::Error> for TxAbort<E> {
    fn from(err: diesel::result::Error) -> Self {
        TxAbort::Db(err)
    }
}

/// Implementación Postgres de `Ledger`.
pub struct PgLedger<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgLedger<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl PgLedger<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> Ledger for PgLedger<P> {
    type Conn = PgConnection;

    fn transact<T, E, F>(&self, run_id: Uuid, trace: &TraceContext, f: F) -> Result<T, E>
        where E: From<LedgerError>,
              F: FnOnce(&mut dyn LedgerTx<Conn = PgConnection>) -> Result<T, E>
    {
        debug!("transact:start run_id={run_id} trace={}", trace.label());
        let mut conn = with_retry(|| self.provider.connection()).map_err(|e| E::from(LedgerError::from(e)))?;
        let result = conn.build_transaction().read_write().run(|tx_conn| {
                                                              acquire_lease(tx_conn, run_id).map_err(|abort| match abort {
                                                                  TxAbort::Db(e) => TxAbort::Db(e),
                                                                  TxAbort::Caller(e) => TxAbort::Caller(E::from(LedgerError::from(e))),
                                                              })?;
                                                              let mut tx = PgTx { conn: tx_conn,
                                                                                  run_id,
                                                                                  trace };
                                                              f(&mut tx).map_err(TxAbort::Caller)
                                                          });
        match result {
            Ok(v) => {
                debug!("transact:commit run_id={run_id}");
                Ok(v)
            }
            Err(TxAbort::Caller(e)) => {
                debug!("transact:rollback run_id={run_id}");
                Err(e)
            }
            Err(TxAbort::Db(e)) => {
                let err = PersistenceError::from(e);
                warn!("transact:db error run_id={run_id}: {err}");
                Err(E::from(LedgerError::from(err)))
            }
        }
    }

    fn snapshot(&self, run_id: Uuid) -> Result<Option<(FlowRun, Vec<StepAttempt>)>, LedgerError> {
        debug!("snapshot:start run_id={run_id}");
        let loaded = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let run = flow_runs::table.find(run_id)
                                      .select(RunRow::as_select())
                                      .first(&mut conn)
                                      .optional()?;
            let Some(run) = run else {
                return Ok(None);
            };
            let steps = load_attempts(&mut conn, run_id)?;
            Ok(Some((FlowRun::try_from(run)?, steps)))
        })?;
        Ok(loaded)
    }
}

fn load_attempts(conn: &mut PgConnection, run_id: Uuid) -> Result<Vec<StepAttempt>, PersistenceError> {
    let rows: Vec<StepRow> = step_attempts::table.filter(step_attempts::run_id.eq(run_id))
                                                 .order(step_attempts::seq.asc())
                                                 .select(StepRow::as_select())
                                                 .load(conn)?;
    rows.into_iter().map(StepAttempt::try_from).collect()
}

fn statement_timeout(conn: &mut PgConnection) -> Result<String, diesel::result::Error> {
    let row: SettingRow = diesel::sql_query("SELECT current_setting('statement_timeout') AS value").get_result(conn)?;
    Ok(row.value)
}

/// `statement_timeout` local a la transacción; al revertir el savepoint
/// vuelve solo al valor anterior.
fn set_statement_timeout(conn: &mut PgConnection, value: &str) -> Result<(), diesel::result::Error> {
    diesel::sql_query("SELECT set_config('statement_timeout', $1, true)").bind::<Text, _>(value)
                                                                          .execute(conn)?;
    Ok(())
}

fn open_statuses() -> Vec<&'static str> {
    AttemptStatus::OPEN.iter().map(|s| s.as_str()).collect()
}

/// Motivo de rollback de un savepoint de step.
enum SavepointAbort {
    Step(String),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for SavepointAbort {
    fn from(err: diesel::result::Error) -> Self {
        SavepointAbort::Db(err)
    }
}

/// Vista transaccional sobre una conexión con la transacción (y el lease)
/// abiertos.
struct PgTx<'c> {
    conn: &'c mut PgConnection,
    run_id: Uuid,
    trace: &'c TraceContext,
}

impl PgTx<'_> {
    fn scoped(&self, run_id: Uuid) -> Result<(), LedgerError> {
        if run_id == self.run_id {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!("transaction is scoped to run {}, not {run_id}", self.run_id)))
        }
    }

    /// Cierra una fila abierta; distingue "no existe" de "ya terminal".
    fn finish_attempt(&mut self,
                      id: Uuid,
                      status: AttemptStatus,
                      value: Option<&Value>,
                      error: Option<&str>,
                      retry_at: Option<DateTime<Utc>>,
                      at: DateTime<Utc>)
                      -> Result<(), LedgerError> {
        let target = step_attempts::table.filter(step_attempts::id.eq(id))
                                         .filter(step_attempts::run_id.eq(self.run_id))
                                         .filter(step_attempts::status.eq_any(open_statuses()));
        let updated = diesel::update(target).set((step_attempts::status.eq(status.as_str()),
                                                  step_attempts::value.eq(value),
                                                  step_attempts::error.eq(error),
                                                  step_attempts::retry_at.eq(retry_at),
                                                  step_attempts::updated_at.eq(at),
                                                  step_attempts::end_time.eq(Some(at))))
                                            .execute(self.conn)
                                            .map_err(PersistenceError::from)?;
        if updated == 1 {
            debug!("attempt {id} -> {status}");
            return Ok(());
        }
        let exists = step_attempts::table.find(id)
                                         .select(step_attempts::status)
                                         .first::<String>(self.conn)
                                         .optional()
                                         .map_err(PersistenceError::from)?;
        match exists {
            Some(_) => Err(LedgerError::AttemptAlreadyTerminal(id)),
            None => Err(LedgerError::AttemptNotFound(id)),
        }
    }
}

impl LedgerTx for PgTx<'_> {
    type Conn = PgConnection;

    fn trace(&self) -> &TraceContext {
        self.trace
    }

    fn load_run(&mut self, run_id: Uuid) -> Result<Option<FlowRun>, LedgerError> {
        self.scoped(run_id)?;
        let row = flow_runs::table.find(run_id)
                                  .select(RunRow::as_select())
                                  .first(self.conn)
                                  .optional()
                                  .map_err(PersistenceError::from)?;
        Ok(row.map(FlowRun::try_from).transpose()?)
    }

    fn insert_run(&mut self, run: NewRun) -> Result<FlowRun, LedgerError> {
        self.scoped(run.id)?;
        let row = NewRunRow { id: run.id,
                              name: &run.name,
                              status: RunStatus::Running.as_str(),
                              input: &run.input,
                              started_by: run.started_by.as_deref(),
                              trace_id: run.trace_id.as_deref(),
                              config: &run.config,
                              created_at: run.created_at,
                              updated_at: run.created_at };
        let inserted = diesel::insert_into(flow_runs::table).values(&row)
                                                            .returning(RunRow::as_returning())
                                                            .get_result(self.conn)
                                                            .map_err(|e| match PersistenceError::from(e) {
                                                                PersistenceError::UniqueViolation(_) => {
                                                                    LedgerError::Conflict(format!("run {} already exists", run.id))
                                                                }
                                                                other => other.into(),
                                                            })?;
        debug!("insert_run run_id={} trace={}", run.id, self.trace.label());
        Ok(FlowRun::try_from(inserted)?)
    }

    fn close_run(&mut self, run_id: Uuid, outcome: &RunOutcome, at: DateTime<Utc>) -> Result<FlowRun, LedgerError> {
        self.scoped(run_id)?;
        let (data, error) = match outcome {
            RunOutcome::Completed(data) => (Some(data), None),
            RunOutcome::Failed(error) => (None, Some(error.as_str())),
        };
        let target = flow_runs::table.filter(flow_runs::id.eq(run_id))
                                     .filter(flow_runs::status.eq(RunStatus::Running.as_str()));
        let updated = diesel::update(target).set((flow_runs::status.eq(outcome.status().as_str()),
                                                  flow_runs::data.eq(data),
                                                  flow_runs::error.eq(error),
                                                  flow_runs::updated_at.eq(at)))
                                            .returning(RunRow::as_returning())
                                            .get_result(self.conn)
                                            .optional()
                                            .map_err(PersistenceError::from)?;
        match updated {
            Some(row) => {
                debug!("close_run run_id={run_id} status={}", row.status);
                Ok(FlowRun::try_from(row)?)
            }
            None => match self.load_run(run_id)? {
                Some(_) => Err(LedgerError::RunAlreadyTerminal(run_id)),
                None => Err(LedgerError::RunNotFound(run_id)),
            },
        }
    }

    fn latest_attempt(&mut self, run_id: Uuid, name: &str) -> Result<Option<StepAttempt>, LedgerError> {
        self.scoped(run_id)?;
        let row = step_attempts::table.filter(step_attempts::run_id.eq(run_id))
                                      .filter(step_attempts::name.eq(name))
                                      .order(step_attempts::attempt.desc())
                                      .select(StepRow::as_select())
                                      .first(self.conn)
                                      .optional()
                                      .map_err(PersistenceError::from)?;
        Ok(row.map(StepAttempt::try_from).transpose()?)
    }

    fn count_failed(&mut self, run_id: Uuid, name: &str, step_type: StepType) -> Result<u32, LedgerError> {
        self.scoped(run_id)?;
        let n: i64 = step_attempts::table.filter(step_attempts::run_id.eq(run_id))
                                         .filter(step_attempts::name.eq(name))
                                         .filter(step_attempts::step_type.eq(step_type.as_str()))
                                         .filter(step_attempts::status.eq(AttemptStatus::Failed.as_str()))
                                         .count()
                                         .get_result(self.conn)
                                         .map_err(PersistenceError::from)?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    fn create_attempt(&mut self, attempt: NewAttempt) -> Result<StepAttempt, LedgerError> {
        self.scoped(attempt.run_id)?;
        let last: Option<i32> = step_attempts::table.filter(step_attempts::run_id.eq(attempt.run_id))
                                                    .filter(step_attempts::name.eq(&attempt.name))
                                                    .select(diesel::dsl::max(step_attempts::attempt))
                                                    .first(self.conn)
                                                    .map_err(PersistenceError::from)?;
        let row = NewStepRow { id: Uuid::new_v4(),
                               run_id: attempt.run_id,
                               name: &attempt.name,
                               attempt: last.unwrap_or(0) + 1,
                               stage: attempt.stage.as_deref(),
                               step_type: attempt.step_type.as_str(),
                               status: attempt.status.as_str(),
                               max_retries: i32::try_from(attempt.max_retries).unwrap_or(i32::MAX),
                               timeout_in_ms: i64::try_from(attempt.timeout_in_ms).unwrap_or(i64::MAX),
                               ui: attempt.ui.as_ref(),
                               created_at: attempt.created_at,
                               updated_at: attempt.created_at,
                               start_time: Some(attempt.created_at) };
        let inserted = diesel::insert_into(step_attempts::table).values(&row)
                                                                .returning(StepRow::as_returning())
                                                                .get_result(self.conn)
                                                                .map_err(|e| match PersistenceError::from(e) {
                                                                    PersistenceError::UniqueViolation(_) => {
                                                                        LedgerError::Conflict(format!("open attempt already exists for step '{}'",
                                                                                                      attempt.name))
                                                                    }
                                                                    PersistenceError::ForeignKeyViolation(_) => {
                                                                        LedgerError::RunNotFound(attempt.run_id)
                                                                    }
                                                                    other => other.into(),
                                                                })?;
        debug!("create_attempt step={} attempt={} type={} run_id={}",
               attempt.name, inserted.attempt, attempt.step_type, attempt.run_id);
        Ok(StepAttempt::try_from(inserted)?)
    }

    fn complete_attempt(&mut self, id: Uuid, value: &Value, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.finish_attempt(id, AttemptStatus::Completed, Some(value), None, None, at)
    }

    fn fail_attempt(&mut self,
                    id: Uuid,
                    error: &str,
                    retry_at: Option<DateTime<Utc>>,
                    at: DateTime<Utc>)
                    -> Result<(), LedgerError> {
        self.finish_attempt(id, AttemptStatus::Failed, None, Some(error), retry_at, at)
    }

    fn isolated(&mut self, timeout_ms: u64, body: IsolatedBody<'_, PgConnection>) -> Result<StepOutcome, LedgerError> {
        // transacción anidada = SAVEPOINT / ROLLBACK TO SAVEPOINT
        let result = self.conn.transaction(|sp| {
                                  let previous = if timeout_ms > 0 {
                                      let previous = statement_timeout(sp)?;
                                      let bound = i32::try_from(timeout_ms).unwrap_or(i32::MAX);
                                      set_statement_timeout(sp, &bound.to_string())?;
                                      Some(previous)
                                  } else {
                                      None
                                  };
                                  match body(sp) {
                                      Ok(value) => {
                                          // el resto de la invocación no hereda el plazo del step
                                          if let Some(previous) = previous {
                                              set_statement_timeout(sp, &previous)?;
                                          }
                                          Ok(value)
                                      }
                                      Err(msg) => Err(SavepointAbort::Step(msg)),
                                  }
                              });
        match result {
            Ok(value) => Ok(Ok(value)),
            Err(SavepointAbort::Step(msg)) => Ok(Err(msg)),
            Err(SavepointAbort::Db(e)) => Err(PersistenceError::from(e).into()),
        }
    }
}

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// Comportamiento:
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min_size =
///   max_size`).
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
/// - Devuelve `PersistenceError::TransientIo` ante errores del pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    // Ejecutar migraciones una sola vez al construir (primer connection checkout).
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
