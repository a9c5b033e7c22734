use thiserror::Error;
use uuid::Uuid;

use ledgerflow_core::EngineError;
use ledgerflow_persistence::PersistenceError;

/// Errores de la aplicación de demo.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error del motor: {0}")]
    Engine(#[from] EngineError),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("El run {0} no terminó tras {1} invocaciones")]
    Stalled(Uuid, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_variant_wraps_message() {
        let err: AppError = EngineError::UnknownFlow("x".into()).into();
        assert_eq!(err.to_string(), "Error del motor: unknown flow: x");
    }

    #[test]
    fn stalled_variant_format() {
        let err = AppError::Stalled(Uuid::nil(), 3);
        assert_eq!(err.to_string(),
                   "El run 00000000-0000-0000-0000-000000000000 no terminó tras 3 invocaciones");
    }
}
