//! Error types for the graph client

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Type coercion not supported: {0}")]
    TypeCoercion(String),

    #[error("Metadata resolution failed: {0}")]
    MetadataResolution(String),

    #[error("Transaction failed: {0}")]
    Transaction(TransactionFailure),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server-reported commit failure, mapped from the wire status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionFailure {
    #[error("transaction already in progress")]
    AlreadyInProgress,
    #[error("client disconnected")]
    ClientDisconnected,
    #[error("malformed transaction")]
    MalFormed,
    #[error("general transaction error")]
    GeneralError,
    #[error("transaction verification failed")]
    VerificationError,
    #[error("transaction in bad state")]
    InBadState,
    #[error("unique constraint violation")]
    UniqueConstraintViolation,
    #[error("optimistic lock failed")]
    OptimisticLockFailed,
    #[error("resource exceeded")]
    ResourceExceeded,
    #[error("current thread not in transaction")]
    CurrentThreadNotInTransaction,
    #[error("unique index key attribute is null")]
    UniqueIndexKeyAttributeNull,
    #[error("unknown transaction status {0}")]
    Unknown(i32),
}

impl TransactionFailure {
    /// Map a nonzero commit-response status code to a failure kind.
    pub fn from_status(status: i32) -> Self {
        match status {
            8001 => TransactionFailure::AlreadyInProgress,
            8002 => TransactionFailure::ClientDisconnected,
            8003 => TransactionFailure::MalFormed,
            8004 => TransactionFailure::GeneralError,
            8005 => TransactionFailure::VerificationError,
            8006 => TransactionFailure::InBadState,
            8007 => TransactionFailure::UniqueConstraintViolation,
            8008 => TransactionFailure::OptimisticLockFailed,
            8009 => TransactionFailure::ResourceExceeded,
            8010 => TransactionFailure::CurrentThreadNotInTransaction,
            8011 => TransactionFailure::UniqueIndexKeyAttributeNull,
            other => TransactionFailure::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_failure_kinds() {
        assert_eq!(
            TransactionFailure::from_status(8007),
            TransactionFailure::UniqueConstraintViolation
        );
        assert_eq!(
            TransactionFailure::from_status(8008),
            TransactionFailure::OptimisticLockFailed
        );
        assert_eq!(
            TransactionFailure::from_status(42),
            TransactionFailure::Unknown(42)
        );
    }
}
