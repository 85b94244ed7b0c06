use thiserror::Error;

use tenderd_core::errors::DomainError;
use tenderd_db::connection::ConnectionError;
use tenderd_db::repositories::RepositoryError;

/// Failures surfaced by the lifecycle service and the award coordinator.
/// Domain outcomes keep their own codes; infrastructure failures collapse
/// into the connection and transaction categories.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("database connection unavailable: {0}")]
    ConnectionUnavailable(ConnectionError),
    #[error("transaction failed and was rolled back: {0}")]
    TransactionFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Stable machine-readable code, mirrored into structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(inner) => inner.code(),
            Self::ConnectionUnavailable(_) => "connection_unavailable",
            Self::TransactionFailed(_) => "transaction_failed",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<ConnectionError> for EngineError {
    fn from(error: ConnectionError) -> Self {
        match error {
            ConnectionError::TransactionFailed(inner) => {
                Self::TransactionFailed(inner.to_string())
            }
            ConnectionError::TransactionTimeout(elapsed) => {
                Self::TransactionFailed(format!("timed out after {elapsed:?}"))
            }
            other => Self::ConnectionUnavailable(other),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(inner) => Self::Domain(inner),
            RepositoryError::Connection(inner) => Self::from(inner),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tenderd_core::domain::bid::BidId;
    use tenderd_core::errors::DomainError;
    use tenderd_db::connection::ConnectionError;
    use tenderd_db::repositories::RepositoryError;

    use super::EngineError;

    #[test]
    fn domain_codes_pass_through() {
        let error = EngineError::from(DomainError::BidNotFound(BidId(4)));
        assert_eq!(error.code(), "not_found");
    }

    #[test]
    fn connection_states_map_to_unavailable() {
        let error = EngineError::from(RepositoryError::Connection(ConnectionError::Down));
        assert_eq!(error.code(), "connection_unavailable");
    }

    #[test]
    fn timeouts_count_as_failed_transactions() {
        let error =
            EngineError::from(ConnectionError::TransactionTimeout(std::time::Duration::from_secs(5)));
        assert_eq!(error.code(), "transaction_failed");
    }
}
