use thiserror::Error;

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Upstream API answered with a non-2xx status.
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Request never produced a usable response (DNS, TLS, timeout, bad JSON).
    #[error("{service} request failed: {detail}")]
    Transport {
        service: &'static str,
        detail: String,
    },

    /// Malformed inbound payload or rejected request field.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or inconsistent configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
