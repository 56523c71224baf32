use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
    #[error("connection refused by {endpoint}")]
    Refused { endpoint: String },
    #[error("transport link closed")]
    Closed,
}
