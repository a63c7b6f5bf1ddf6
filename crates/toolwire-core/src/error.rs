use thiserror::Error;

/// A convenience `Result` alias using [`ToolwireError`].
pub type ToolwireResult<T> = Result<T, ToolwireError>;

/// Top-level error type for the toolwire crates.
///
/// Each variant corresponds to a stage of server discovery that can fail.
#[derive(Error, Debug)]
pub enum ToolwireError {
    /// A server configuration has no usable transport, or an ad-hoc command
    /// could not be parsed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Spawning a server process or reaching a remote endpoint failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Listing tools or prompts from a connected server failed.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A connected server exposed nothing usable after filtering.
    #[error("No enabled tools or prompts: {0}")]
    NoCapabilities(String),

    /// The server answered with a JSON-RPC error or a malformed message.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An operation did not finish within its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// An operation was abandoned because discovery was cancelled.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// An ad-hoc request against a connected server failed.
    #[error("Request error: {0}")]
    Request(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolwireError {
    /// Whether this error means the server was reachable but had nothing to offer.
    pub fn is_empty_discovery(&self) -> bool {
        matches!(self, ToolwireError::NoCapabilities(_))
    }
}
