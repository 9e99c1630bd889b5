use thiserror::Error;

/// Failure reported by a [`MessageRepository`](crate::db::repository::MessageRepository).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(diesel::result::Error),

    #[error("database unavailable: {0}")]
    Pool(diesel_async::pooled_connection::deadpool::PoolError),

    #[error("{0}")]
    Unavailable(String),

    /// A key or reference constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),
}

impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::Database(err)
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for RepositoryError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::Pool(err)
    }
}

/// Read or write failure on a single client connection.
///
/// Always fatal to that connection's loop and never to anything else.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out")]
    Timeout,

    #[error("socket error: {0}")]
    Socket(String),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::Socket(err.to_string())
    }
}
