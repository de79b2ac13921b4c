//! Harvest configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::HarvestError;

/// Default deadline of one reachability attempt, in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 100;

/// Default number of reachability attempts.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default name of the virtualization platform fact.
pub const DEFAULT_PLATFORM_FACT: &str = "virtual";

/// Default timeout for each metadata read during a harvest, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Options for a probe or harvest pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HarvestOptions {
    /// Deadline of one reachability attempt.
    pub timeout_ms: u64,
    /// Maximum number of reachability attempts.
    pub retry_limit: u32,
    /// Fact naming the virtualization platform.
    pub fact: Option<String>,
    /// Platform value that marks the host as a candidate. When unset the
    /// provider's own value (or host heuristics) apply.
    pub value: Option<String>,
    /// Timeout of each metadata read once the service is known reachable.
    pub request_timeout_ms: u64,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            retry_limit: DEFAULT_RETRY_LIMIT,
            fact: Some(DEFAULT_PLATFORM_FACT.to_string()),
            value: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl HarvestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Check `fact` for `value` before touching the network.
    pub fn with_platform(mut self, fact: impl Into<String>, value: impl Into<String>) -> Self {
        self.fact = Some(fact.into());
        self.value = Some(value.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject options no pass could run with.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.retry_limit == 0 {
            return Err(HarvestError::InvalidOption {
                option: "retry_limit",
                reason: "must be at least 1",
            });
        }
        if self.timeout_ms == 0 {
            return Err(HarvestError::InvalidOption {
                option: "timeout_ms",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// The fact/value pair to gate on, falling back to `default_value`.
    ///
    /// `Ok(None)` means there is no fact gate at all.
    pub(crate) fn platform_check<'a>(
        &'a self,
        default_value: Option<&'a str>,
    ) -> Result<Option<(&'a str, &'a str)>, HarvestError> {
        let Some(value) = self.value.as_deref().or(default_value) else {
            return Ok(None);
        };
        let fact = self
            .fact
            .as_deref()
            .ok_or(HarvestError::MissingOption("fact"))?;
        Ok(Some((fact, value)))
    }
}
