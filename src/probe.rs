//! Reachability probing of metadata services.

use std::fmt;
use std::time::Duration;

use crate::client::Transport;
use crate::error::ConnectionError;
use crate::facts::FactRegistry;

/// Log target for probing
const LOG_TARGET: &str = "cloud_facts::probe";

/// Result of a single timed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Reachable,
    TimedOut,
    Failed(ConnectionError),
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Reachable => write!(f, "reachable"),
            Attempt::TimedOut => write!(f, "timed out"),
            Attempt::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// Decides whether a metadata service answers, retrying a bounded number of
/// times.
#[derive(Debug)]
pub struct Prober<'a, T: ?Sized> {
    transport: &'a T,
    timeout: Duration,
    retry_limit: u32,
}

impl<'a, T: Transport + ?Sized> Prober<'a, T> {
    /// Each attempt gets `timeout`; at most `retry_limit` attempts are made.
    pub fn new(transport: &'a T, timeout: Duration, retry_limit: u32) -> Self {
        Self {
            transport,
            timeout,
            retry_limit,
        }
    }

    /// Probe `uri` unless the host's `fact` differs from `value`.
    ///
    /// A mismatching platform returns `false` without any request.
    pub async fn probe<R>(&self, facts: &R, uri: &str, fact: &str, value: &str) -> bool
    where
        R: FactRegistry + ?Sized,
    {
        if !platform_matches(facts, fact, value) {
            log::debug!(target: LOG_TARGET, "Fact '{fact}' is not '{value}', skipping {uri}");
            return false;
        }
        self.wait_for_server(uri).await
    }

    /// Attempt to read `uri` until it answers or the retry limit is spent.
    ///
    /// Failed attempts are retried immediately.
    pub async fn wait_for_server(&self, uri: &str) -> bool {
        let mut last = None;
        for number in 1..=self.retry_limit {
            let attempt = self.attempt(uri).await;
            if attempt == Attempt::Reachable {
                log::debug!(target: LOG_TARGET, "Metadata server at {uri} answered on attempt {number}");
                return true;
            }
            log::debug!(target: LOG_TARGET, "Attempt {number}/{} against {uri}: {attempt}", self.retry_limit);
            last = Some(attempt);
        }

        match last {
            Some(Attempt::TimedOut) => log::warn!(
                target: LOG_TARGET,
                "Timeout exceeded trying to communicate with {uri}, metadata server facts will be undefined"
            ),
            Some(Attempt::Failed(ConnectionError::Http(status))) => log::warn!(
                target: LOG_TARGET,
                "Metadata server at {uri} responded with http {status}, metadata server facts will be undefined"
            ),
            Some(attempt) => log::warn!(
                target: LOG_TARGET,
                "No metadata server available at {uri} ({attempt}), metadata server facts will be undefined"
            ),
            None => {}
        }
        false
    }

    /// One read of `uri` under the attempt deadline.
    pub async fn attempt(&self, uri: &str) -> Attempt {
        match tokio::time::timeout(self.timeout, self.transport.read(uri)).await {
            Ok(Ok(_)) => Attempt::Reachable,
            Ok(Err(ConnectionError::TimedOut)) | Err(_) => Attempt::TimedOut,
            Ok(Err(err)) => Attempt::Failed(err),
        }
    }
}

/// Whether the registry's `fact` currently equals `value`.
pub fn platform_matches<R>(facts: &R, fact: &str, value: &str) -> bool
where
    R: FactRegistry + ?Sized,
{
    facts
        .value(fact)
        .is_some_and(|actual| actual.to_string() == value)
}
