//! Chooses between the DNS record and the URL and produces the final keys.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dns::TxtLookup;
use crate::error::{AkdError, ConfigError, Result};
use crate::fetch::KeyFetcher;
use crate::record::select_candidate;
use crate::signature::DetachedVerifier;
use crate::trust::{TrustOutcome, TrustPolicy};
use crate::validation::validate_authorized_keys;

/// Where the final key text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Dns,
    Url,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Dns => write!(f, "DNS"),
            KeySource::Url => write!(f, "URL"),
        }
    }
}

/// Validated authorized_keys text and how far it is trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeys {
    /// Exactly the bytes that were validated
    pub text: Vec<u8>,
    pub source: KeySource,
    pub trust: TrustOutcome,
    /// Number of key entries, blank and comment lines excluded
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SourcePlan {
    Dns {
        record_name: String,
        fallback: Option<UrlFallback>,
    },
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlFallback {
    url: String,
    allowed: bool,
}

pub struct KeyResolver {
    plan: SourcePlan,
    policy: TrustPolicy,
    verifier: Option<Box<dyn DetachedVerifier>>,
    lookup: Box<dyn TxtLookup>,
    fetcher: Box<dyn KeyFetcher>,
    clock: Option<DateTime<Utc>>,
}

impl KeyResolver {
    /// Build a resolver from a loaded config. The signing key is parsed here.
    pub fn new(
        config: &Config,
        lookup: Box<dyn TxtLookup>,
        fetcher: Box<dyn KeyFetcher>,
    ) -> std::result::Result<Self, ConfigError> {
        let plan = match (&config.record_name, &config.url) {
            (Some(record_name), url) => SourcePlan::Dns {
                record_name: record_name.clone(),
                fallback: url.as_ref().map(|url| UrlFallback {
                    url: url.clone(),
                    allowed: config.allow_url_fallback,
                }),
            },
            (None, Some(url)) => SourcePlan::Url(url.clone()),
            (None, None) => return Err(ConfigError::MissingSource),
        };

        let verifier = config
            .signing_key()?
            .map(|key| Box::new(key) as Box<dyn DetachedVerifier>);

        Ok(Self {
            plan,
            policy: TrustPolicy::new(config.accept_unverified),
            verifier,
            lookup,
            fetcher,
            clock: None,
        })
    }

    /// Replace the signature backend
    pub fn with_verifier(mut self, verifier: Box<dyn DetachedVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Evaluate signatures at a fixed time instead of the wall clock
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    /// Produce one validated key text, or the error that ended the run.
    pub async fn resolve(&self) -> Result<ResolvedKeys> {
        let (record_name, fallback) = match &self.plan {
            SourcePlan::Url(url) => return self.resolve_url(url).await,
            SourcePlan::Dns {
                record_name,
                fallback,
            } => (record_name, fallback),
        };

        let dns_error = match self.resolve_dns(record_name).await {
            Ok(keys) => return Ok(keys),
            Err(e) => e,
        };

        match fallback {
            Some(UrlFallback { url, allowed: true }) => {
                warn!("DNS path failed ({}), falling back to {}", dns_error, url);
                self.resolve_url(url).await
            }
            Some(UrlFallback { allowed: false, .. }) => {
                error!("DNS path failed and URL fallback is not allowed: {}", dns_error);
                Err(AkdError::FallbackNotPermitted(Box::new(dns_error)))
            }
            None => Err(dns_error),
        }
    }

    async fn resolve_dns(&self, record_name: &str) -> Result<ResolvedKeys> {
        let records = self.lookup.lookup_txt(record_name).await;
        debug!("Found {} TXT records for {}", records.len(), record_name);

        let record = select_candidate(&records)?;
        let trusted = self
            .policy
            .evaluate(&record, self.verifier.as_deref(), self.now())?;
        let entries = validate_authorized_keys(&trusted.key_bytes)?;

        info!(
            "Resolved {} keys from {} record at {}",
            entries, trusted.kind, record_name
        );
        Ok(ResolvedKeys {
            text: trusted.key_bytes,
            source: KeySource::Dns,
            trust: trusted.outcome,
            entries,
        })
    }

    /// The URL path has no signature, so its text is never better than unverified
    async fn resolve_url(&self, url: &str) -> Result<ResolvedKeys> {
        let body = self.fetcher.fetch(url).await?;
        let entries = validate_authorized_keys(&body)?;

        info!("Resolved {} keys from {}", entries, url);
        Ok(ResolvedKeys {
            text: body,
            source: KeySource::Url,
            trust: TrustOutcome::AcceptedUnverified,
            entries,
        })
    }
}
