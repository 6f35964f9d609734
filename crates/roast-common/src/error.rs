use thiserror::Error;

/// Error taxonomy for the roast gateway, covering configuration, transport,
/// session, and observer-delivery failures.
#[derive(Debug, Error)]
pub enum RoastError {
    /// A catalog entry, command template, or register config is malformed.
    #[error("configuration error: {0}")]
    ConfigFault(String),

    /// The transport failed to establish a connection.
    #[error("transport connect failed: {0}")]
    TransportConnect(String),

    /// A single read or write failed but the link may still be usable.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Consecutive transient failures exceeded the configured threshold.
    #[error("persistent I/O failure: {0}")]
    PersistentIo(String),

    /// A client sent a frame that could not be interpreted.
    #[error("invalid client frame: {0}")]
    InvalidFrame(String),

    /// A session or driver operation was attempted from an invalid state.
    #[error("invalid state transition from {from} to {to}")]
    StateViolation {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Delivery to an observer failed; the observer is dropped, never the call site.
    #[error("observer send failed: {0}")]
    ObserverSend(String),

    /// The simulator's thermal step failed.
    #[error("simulator thermal step failed: {0}")]
    SimulatorStep(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias for gateway operations.
pub type RoastResult<T> = Result<T, RoastError>;
