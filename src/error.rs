//! Error taxonomy surfaced by the public operations.
//!
//! Row-level problems (wrong field count, non-numeric fields, short groups)
//! never reach this type; the parser absorbs them and counts them in
//! [`ParseStats`](crate::frames::ParseStats). Partial allocation is not an
//! error either.

use std::path::PathBuf;

use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Operation referenced a subject, history entry, alert or dataset that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Dataset file missing, unreadable, or the read timed out.
    #[error("dataset source {} unavailable: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Storage(anyhow::Error),
}

/// Storage closures raise `CoreError` through `anyhow`; unwrap it again here
/// so a `NotFound` from inside a transaction keeps its variant.
impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CoreError>() {
            Ok(core) => core,
            Err(other) => CoreError::Storage(other),
        }
    }
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}
