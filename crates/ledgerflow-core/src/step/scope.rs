use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Clock, TraceContext};

/// Vista del cuerpo de un step durante un intento.
///
/// `conn()` da acceso al store dentro del savepoint del intento: si el
/// intento falla o excede su timeout, lo escrito por esa vía se revierte.
pub struct StepScope<'s, C> {
    conn: &'s mut C,
    run_id: Uuid,
    name: &'s str,
    attempt: u32,
    trace: &'s TraceContext,
    deadline: DateTime<Utc>,
    clock: &'s dyn Clock,
}

impl<'s, C> StepScope<'s, C> {
    pub(crate) fn new(conn: &'s mut C,
                      run_id: Uuid,
                      name: &'s str,
                      attempt: u32,
                      trace: &'s TraceContext,
                      deadline: DateTime<Utc>,
                      clock: &'s dyn Clock)
                      -> Self {
        Self { conn,
               run_id,
               name,
               attempt,
               trace,
               deadline,
               clock }
    }

    pub fn conn(&mut self) -> &mut C {
        &mut *self.conn
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Número de intento en curso (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn trace(&self) -> &TraceContext {
        self.trace
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Tiempo restante antes del timeout (cero si ya expiró).
    pub fn remaining(&self) -> Duration {
        (self.deadline - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self) -> bool {
        self.clock.now() > self.deadline
    }
}
