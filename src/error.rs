use redis::{ErrorKind, RedisError};
use thiserror::Error;

use crate::family::{EntityFamily, SequenceKey};

#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("type code `{type_code}` is not valid for the {family} family")]
    InvalidTypeCode {
        family: EntityFamily,
        type_code: String,
    },

    /// The counter no longer fits the fixed-width field of its key. The value
    /// has already been consumed in the store.
    #[error("counter {counter} exceeds the numbering space of {key}")]
    CounterOverflow { key: SequenceKey, counter: u64 },

    #[error("malformed identifier `{0}`")]
    MalformedIdentifier(String),

    /// The store could not be reached. Retrying may succeed.
    #[error("sequence store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was reached but refused the operation, e.g. a key holding a
    /// value that is not an integer. Retrying does not help.
    #[error("sequence store rejected the operation: {0}")]
    StoreRejected(String),
}

impl IdentifierError {
    /// Stable label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IdentifierError::InvalidTypeCode { .. } => "invalid_type_code",
            IdentifierError::CounterOverflow { .. } => "counter_overflow",
            IdentifierError::MalformedIdentifier(_) => "malformed_identifier",
            IdentifierError::StoreUnavailable(_) => "store_unavailable",
            IdentifierError::StoreRejected(_) => "store_rejected",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, IdentifierError::StoreUnavailable(_))
    }
}

impl From<RedisError> for IdentifierError {
    fn from(err: RedisError) -> Self {
        let unreachable = err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || matches!(err.kind(), ErrorKind::IoError | ErrorKind::BusyLoadingError);
        if unreachable {
            IdentifierError::StoreUnavailable(format!("Redis error: {}", err))
        } else {
            IdentifierError::StoreRejected(format!("Redis error: {}", err))
        }
    }
}
