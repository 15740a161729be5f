//! Error types for the escalation core.

use sled::transaction::TransactionError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for storage-backed escalation operations.
pub type EscalationResult<T> = Result<T, EscalationError>;

/// Failures surfaced by the ledger, queue, profile store and orchestrator.
///
/// Absent consent, an active cooldown and an ambiguous classification are outcomes,
/// not errors, and never appear here.
#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("escalation case {case_id} not found")]
    NotFound { case_id: Uuid },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt record under key {key}")]
    Corrupt { key: String },
}

impl EscalationError {
    /// True for the unknown-case condition (distinct from an already-terminal case).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<TransactionError<EscalationError>> for EscalationError {
    fn from(err: TransactionError<EscalationError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => EscalationError::Storage(e),
        }
    }
}
