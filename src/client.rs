//! HTTP transport for metadata requests.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use crate::error::ConnectionError;
use crate::provider::CloudProvider;

/// Default timeout for harvest requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single blocking read of a metadata URI.
///
/// Implementations do not retry; retry policy belongs to the prober.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read the body at `uri`.
    async fn read(&self, uri: &str) -> Result<String, ConnectionError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn read(&self, uri: &str) -> Result<String, ConnectionError> {
        (**self).read(uri).await
    }
}

/// HTTP client wrapper for metadata service requests.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    inner: Client,
}

impl MetadataClient {
    /// Create a new metadata client that sends `headers` with every request.
    pub fn new(timeout: Duration, headers: HeaderMap) -> Result<Self, reqwest::Error> {
        let inner = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(false)
            .build()?;
        Ok(Self { inner })
    }

    /// Create a client carrying the request headers `provider` requires.
    pub fn for_provider(provider: CloudProvider, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        for &(name, value) in provider.request_headers() {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        Self::new(timeout, headers)
    }
}

#[async_trait]
impl Transport for MetadataClient {
    async fn read(&self, uri: &str) -> Result<String, ConnectionError> {
        let response = self
            .inner
            .get(uri)
            .send()
            .await
            .map_err(|e| classify(&e))?;
        let response = response.error_for_status().map_err(|e| classify(&e))?;
        response.text().await.map_err(|e| classify(&e))
    }
}

/// Fold a reqwest failure into one of the connection error kinds.
pub(crate) fn classify(err: &reqwest::Error) -> ConnectionError {
    if err.is_timeout() {
        return ConnectionError::TimedOut;
    }
    if let Some(status) = err.status() {
        return ConnectionError::Http(status.as_u16());
    }
    if let Some(kind) = io_error_kind(err) {
        match kind {
            io::ErrorKind::ConnectionRefused => return ConnectionError::Refused,
            io::ErrorKind::ConnectionReset => return ConnectionError::Reset,
            io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
                return ConnectionError::Aborted
            }
            io::ErrorKind::TimedOut => return ConnectionError::TimedOut,
            io::ErrorKind::HostUnreachable => return ConnectionError::HostUnreachable,
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::NetworkDown => {
                return ConnectionError::NetworkUnreachable
            }
            _ => {}
        }
    }
    // Unresolvable names land here too.
    if err.is_connect() {
        return ConnectionError::HostUnreachable;
    }
    ConnectionError::Aborted
}

fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = current.source();
    }
    None
}
