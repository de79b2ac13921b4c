//! Harvester and its one-shot run guard.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::{MetadataClient, Transport};
use crate::error::HarvestError;
use crate::facts::{FactName, FactRegistry, FactValue};
use crate::options::HarvestOptions;
use crate::probe::Prober;
use crate::provider::CloudProvider;
use crate::providers::ec2::{self, ArpTable, SystemArp};
use crate::providers::gce;

/// Log target for harvesting
const LOG_TARGET: &str = "cloud_facts::harvest";

/// Records whether a harvest already ran.
///
/// Share one guard between harvesters through an `Arc` to make them run once
/// between them.
#[derive(Debug, Default)]
pub struct HarvestRun {
    done: AtomicBool,
}

impl HarvestRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Mark the run done, returning whether it already was.
    pub fn mark_done(&self) -> bool {
        self.done.swap(true, Ordering::AcqRel)
    }

    pub fn reset(&self) {
        self.done.store(false, Ordering::Release);
    }
}

/// What a call to [`Harvester::harvest`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// An earlier pass already ran; nothing was done.
    Skipped,
    /// The host is not on this provider or the metadata service did not answer.
    Unavailable,
    /// Every reachable fact was registered.
    Complete { facts: usize },
    /// The pass stopped early; the facts registered before that stay.
    Partial { facts: usize },
}

/// Harvests a provider's instance metadata into a fact registry.
///
/// # Example
///
/// ```ignore
/// use cloud_facts::{Facts, Harvester};
///
/// #[tokio::main]
/// async fn main() -> Result<(), cloud_facts::HarvestError> {
///     let mut facts = Facts::new().with("virtual", "gce");
///     Harvester::gce()?.harvest(&mut facts, false).await?;
///     for (name, value) in facts.iter() {
///         println!("{name} => {value}");
///     }
///     Ok(())
/// }
/// ```
pub struct Harvester<T = MetadataClient> {
    provider: CloudProvider,
    transport: T,
    base_url: String,
    options: HarvestOptions,
    run: Arc<HarvestRun>,
    arp: Arc<dyn ArpTable>,
}

impl Harvester<MetadataClient> {
    /// Create a harvester for EC2.
    pub fn ec2() -> Result<Self, HarvestError> {
        Self::from_options(CloudProvider::Ec2, None, HarvestOptions::default())
    }

    /// Create a harvester for EC2 with a custom base URL.
    pub fn ec2_with_base_url(base_url: &str) -> Result<Self, HarvestError> {
        Self::from_options(CloudProvider::Ec2, Some(base_url), HarvestOptions::default())
    }

    /// Create a harvester for GCE.
    pub fn gce() -> Result<Self, HarvestError> {
        Self::from_options(CloudProvider::Gce, None, HarvestOptions::default())
    }

    /// Create a harvester for GCE with a custom base URL.
    pub fn gce_with_base_url(base_url: &str) -> Result<Self, HarvestError> {
        Self::from_options(CloudProvider::Gce, Some(base_url), HarvestOptions::default())
    }

    /// Create a harvester with an HTTP client built from `options`.
    ///
    /// `base_url` defaults to the provider's link-local metadata address.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::InvalidOption`] if `base_url` is not an
    /// absolute HTTP(S) URL.
    pub fn from_options(
        provider: CloudProvider,
        base_url: Option<&str>,
        options: HarvestOptions,
    ) -> Result<Self, HarvestError> {
        let base_url = base_url.unwrap_or(provider.default_base_url());
        match reqwest::Url::parse(base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => {
                return Err(HarvestError::InvalidOption {
                    option: "base_url",
                    reason: "must be an absolute http or https URL",
                })
            }
        }
        let client = MetadataClient::for_provider(provider, options.request_timeout())?;
        Ok(Self::with_transport(provider, client, base_url).with_options(options))
    }
}

impl<T: Transport> Harvester<T> {
    /// Create a harvester that reads through `transport`.
    pub fn with_transport(provider: CloudProvider, transport: T, base_url: &str) -> Self {
        Self {
            provider,
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            options: HarvestOptions::default(),
            run: Arc::new(HarvestRun::new()),
            arp: Arc::new(SystemArp),
        }
    }

    pub fn with_options(mut self, options: HarvestOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `run` as the one-shot guard instead of a private one.
    pub fn with_run_guard(mut self, run: Arc<HarvestRun>) -> Self {
        self.run = run;
        self
    }

    /// Read the ARP table from `arp` when checking for an EC2 host.
    pub fn with_arp_table(mut self, arp: impl ArpTable + 'static) -> Self {
        self.arp = Arc::new(arp);
        self
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn run_guard(&self) -> &Arc<HarvestRun> {
        &self.run
    }

    /// Whether this host is on the provider and its metadata service answers.
    ///
    /// Hosts that are not candidates get no request at all.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid options.
    pub async fn probe<R>(&self, facts: &R) -> Result<bool, HarvestError>
    where
        R: FactRegistry + ?Sized,
    {
        self.options.validate()?;
        let prober = Prober::new(
            &self.transport,
            self.options.timeout(),
            self.options.retry_limit,
        );
        let uri = self.probe_url();

        match self.options.platform_check(self.provider.platform_value())? {
            Some((fact, value)) => Ok(prober.probe(facts, &uri, fact, value).await),
            None => {
                if !ec2::is_candidate(facts, self.arp.as_ref()).await {
                    log::debug!(target: LOG_TARGET, "Not an {} host", self.provider);
                    return Ok(false);
                }
                Ok(prober.wait_for_server(&uri).await)
            }
        }
    }

    /// Run a harvest pass, registering every discovered fact into `facts`.
    ///
    /// Only the first call does any work unless `force` is set. Network and
    /// parse failures are logged, never returned; facts registered before a
    /// failure are kept.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid options.
    pub async fn harvest<R>(&self, facts: &mut R, force: bool) -> Result<HarvestOutcome, HarvestError>
    where
        R: FactRegistry + ?Sized,
    {
        self.options.validate()?;
        self.options.platform_check(self.provider.platform_value())?;

        let already = self.run.mark_done();
        if already && !force {
            log::debug!(target: LOG_TARGET, "{} facts already harvested", self.provider);
            return Ok(HarvestOutcome::Skipped);
        }

        if !self.probe(&*facts).await? {
            return Ok(HarvestOutcome::Unavailable);
        }

        let mut count = 0usize;
        let mut emit = |name: FactName, value: FactValue| {
            facts.register(name, value);
            count += 1;
        };
        let result = match self.provider {
            CloudProvider::Ec2 => {
                let walked = ec2::collect_metadata(&self.transport, &self.base_url, &mut emit).await;
                if walked.is_ok() {
                    ec2::collect_user_data(&self.transport, &self.base_url, &mut emit).await;
                }
                walked
            }
            CloudProvider::Gce => {
                gce::collect_metadata(&self.transport, &self.base_url, &mut emit).await
            }
        };

        match result {
            Ok(()) => {
                log::info!(target: LOG_TARGET, "Collected {count} {} facts", self.provider);
                Ok(HarvestOutcome::Complete { facts: count })
            }
            Err(err) => {
                log::warn!(target: LOG_TARGET, "Could not retrieve {} metadata: {err}", self.provider);
                Ok(HarvestOutcome::Partial { facts: count })
            }
        }
    }

    fn probe_url(&self) -> String {
        match self.provider {
            CloudProvider::Ec2 => ec2::probe_url(&self.base_url),
            CloudProvider::Gce => gce::probe_url(&self.base_url),
        }
    }
}

impl<T> fmt::Debug for Harvester<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harvester")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .field("run", &self.run)
            .finish_non_exhaustive()
    }
}
