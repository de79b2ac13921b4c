//! Error types for metadata harvesting.

use thiserror::Error;

/// Ways a single metadata request can fail.
///
/// Every transport failure is folded into one of these kinds. None of them is
/// fatal: they end the current probe attempt or leaf fetch and get logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No route to the metadata host.
    #[error("host unreachable")]
    HostUnreachable,

    /// The local network is down or has no route.
    #[error("network unreachable")]
    NetworkUnreachable,

    /// Nothing is listening on the metadata port.
    #[error("connection refused")]
    Refused,

    /// The peer reset the connection.
    #[error("connection reset")]
    Reset,

    /// The connection or transfer was aborted.
    #[error("connection aborted")]
    Aborted,

    /// The request did not complete before its deadline.
    #[error("request timed out")]
    TimedOut,

    /// The server answered with a non-success status.
    #[error("http {0}")]
    Http(u16),
}

/// Errors surfaced by the harvesting engine.
///
/// Only configuration and client construction errors ever leave
/// [`Harvester::harvest`](crate::Harvester::harvest); the connection and parse
/// variants carry a failed pass up to the orchestrator, which logs them.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// A required option has no value.
    #[error("a value is required for option `{0}`")]
    MissingOption(&'static str),

    /// An option has a value that can never work.
    #[error("invalid value for option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: &'static str,
    },

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    /// A metadata request failed.
    #[error("metadata request to {uri} failed: {source}")]
    Connection {
        uri: String,
        #[source]
        source: ConnectionError,
    },

    /// The metadata document was not valid JSON.
    #[error("malformed metadata document: {0}")]
    Parse(#[from] serde_json::Error),
}

impl HarvestError {
    /// Whether this error points at programmer error rather than the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarvestError::MissingOption(_)
                | HarvestError::InvalidOption { .. }
                | HarvestError::Client(_)
        )
    }
}
