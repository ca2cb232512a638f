use thiserror::Error;

/// Every failure the shim can surface, either to the peer (as the ERROR
/// message of a transaction) or to the embedding process.
#[derive(Debug, Error)]
pub enum Error {
    /// A malformed or out-of-state message. Fatal to the channel.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The stream to the peer closed or failed. Every pending request on the
    /// channel is rejected with this error.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Local validation failed; nothing was sent to the peer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The peer answered a state request with an ERROR message.
    #[error("{0}")]
    PeerRejected(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("{0}")]
    UnknownFunction(String),

    /// Two contracts claim the same namespace, default flag, or function.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("iterator has been closed")]
    IteratorClosed,

    /// The transaction finished while this request was still queued.
    #[error("transaction {0} completed before the request was answered")]
    TransactionCompleted(String),

    /// Failure raised by application code inside a transaction function.
    #[error("{0}")]
    Transaction(String),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("grpc status: {0}")]
    Status(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Convenience for contract code: `Err(Error::transaction("asset exists"))`.
    pub fn transaction<S: Into<String>>(message: S) -> Self {
        Error::Transaction(message.into())
    }

    /// Errors that take the whole channel down rather than one transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation(_) | Error::ConnectionLost(_) | Error::Status(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
