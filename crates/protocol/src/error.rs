use thiserror::Error;

/// Sealed taxonomy of failure kinds shared by the hub and the gateway.
///
/// Everything downstream of a `tonic::Status` mapping treats these as opaque
/// causes; nothing tries to recover a `CoreError` variant from a `Status`
/// once it has crossed the wire.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("connection pool failed to establish a connection: {0}")]
    PoolConnFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("connection operation timed out")]
    ConnTimeout,

    #[error("connection is closed")]
    ConnClosed,

    #[error("connection is write-only")]
    WriteOnly,

    #[error("connection is read-only")]
    ReadOnly,

    #[error("codec error: {0}")]
    Codec(#[source] serde_json::Error),

    #[error("domain object not found: {0}")]
    DomainNotFound(String),

    #[error("persistence error: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CoreError {
    #[must_use]
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(source))
    }

    #[must_use]
    pub fn pool_conn_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PoolConnFailed(Box::new(source))
    }

    #[must_use]
    pub fn persistence(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Box::new(source))
    }
}

impl From<CoreError> for tonic::Status {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthFailed(msg) => tonic::Status::unauthenticated(msg),
            CoreError::ConfigInvalid(msg) => tonic::Status::invalid_argument(msg),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
