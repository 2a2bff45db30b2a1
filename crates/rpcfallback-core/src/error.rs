//! Error types: per-attempt failures, configuration errors and the
//! terminal dispatch errors a caller can observe.

use thiserror::Error;

use crate::endpoint::Endpoint;
use crate::request::JsonRpcError;

/// A single attempt against one endpoint failed.
///
/// The dispatcher treats every variant the same way: the attempt failed and
/// is retried or fallen through. Variants only exist for diagnostics.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed (connection refused, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The attempt did not settle within the caller-supplied timeout.
    #[error("attempt timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The request could not be built for this endpoint.
    #[error("request construction failed: {0}")]
    Request(String),

    /// Response could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Invalid dispatcher setup. Always surfaced before any attempt is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("endpoint list is empty")]
    NoEndpoints,

    #[error("delay growth factor must be finite and >= 1.0, got {0}")]
    InvalidGrowth(f64),

    #[error("attempt timeout must be greater than zero")]
    ZeroTimeout,

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal failure of a dispatch or fan-out call.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Every attempt on every endpoint failed.
    #[error("all {} attempt(s) failed, last error: {last_error}", .attempted.len())]
    Exhausted {
        last_error: ClientError,
        /// One entry per attempt, in the order the attempts were made.
        attempted: Vec<Endpoint>,
    },

    /// Race-first fan-out settled on a failed attempt.
    #[error("first settled attempt on {endpoint} failed: {error}")]
    RaceLost { endpoint: Endpoint, error: ClientError },

    /// The caller cancelled the dispatch before it completed.
    #[error("dispatch cancelled after {} attempt(s)", .attempted.len())]
    Cancelled { attempted: Vec<Endpoint> },
}

impl DispatchError {
    /// Endpoints attempted before the dispatch gave up, if known.
    pub fn attempted(&self) -> &[Endpoint] {
        match self {
            Self::Exhausted { attempted, .. } | Self::Cancelled { attempted } => attempted.as_slice(),
            Self::RaceLost { endpoint, .. } => std::slice::from_ref(endpoint),
            Self::Configuration(_) => &[],
        }
    }

    /// Returns `true` if the caller cancelled the dispatch.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
