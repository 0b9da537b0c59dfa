//! Error handling module
//!
//! Centralized error taxonomy for the transfer engine and classification of
//! store-reported failures.

use crate::config::ConfigError;
use crate::domain::AmountError;

/// Crate-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error kinds exposed to callers so they can map failures to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Transient,
    Transaction,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    /// Stable error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient_conflict",
            ErrorKind::Transaction => "transaction_error",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Rejected before a transaction is opened
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Insufficient funds: account {account_id} balance would become {balance}")]
    InsufficientFunds { account_id: i64, balance: i64 },

    // Store-classified
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient conflict: {0}")]
    Transient(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // Transaction boundary failures
    #[error("Commit failed: {0}")]
    CommitFailed(#[source] Box<LedgerError>),

    #[error("tx err: {cause}, rb err: {rollback}")]
    RollbackFailed {
        #[source]
        cause: Box<LedgerError>,
        rollback: Box<LedgerError>,
    },

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LedgerError {
    /// Wrap a commit failure
    pub fn commit_failed(err: LedgerError) -> Self {
        Self::CommitFailed(Box::new(err))
    }

    /// Keep both the unit-of-work failure and the rollback failure
    pub fn rollback_failed(cause: LedgerError, rollback: LedgerError) -> Self {
        Self::RollbackFailed {
            cause: Box::new(cause),
            rollback: Box::new(rollback),
        }
    }

    /// Build an error of the given kind with a message
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::Transient => Self::Transient(message),
            ErrorKind::Transaction => {
                Self::commit_failed(Self::Database(sqlx::Error::Protocol(message)))
            }
            ErrorKind::StoreUnavailable => Self::StoreUnavailable(message),
            ErrorKind::Internal => Self::Database(sqlx::Error::Protocol(message)),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InsufficientFunds { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transient(_) => ErrorKind::Transient,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::CommitFailed(_) | Self::RollbackFailed { .. } => ErrorKind::Transaction,
            Self::Database(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// Check if the caller may retry the whole transfer
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            // serializable commits report conflicts at commit time
            Self::CommitFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        classify(&err).unwrap_or(Self::Database(err))
    }
}

/// Map a store error onto the taxonomy, `None` if it stays unclassified
fn classify(err: &sqlx::Error) -> Option<LedgerError> {
    match err {
        sqlx::Error::RowNotFound => Some(LedgerError::NotFound("record not found".to_string())),
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => Some(LedgerError::Transient(message)),
                // foreign_key_violation: the referenced account is absent
                Some("23503") => Some(LedgerError::NotFound(message)),
                // unique_violation, check_violation, numeric_value_out_of_range
                Some("23505") | Some("23514") | Some("22003") => {
                    Some(LedgerError::Conflict(message))
                }
                _ => None,
            }
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => Some(LedgerError::StoreUnavailable(err.to_string())),
        _ => None,
    }
}
