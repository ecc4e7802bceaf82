#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use akd_client::AkdError;
use akd_client::dns::TxtLookup;
use akd_client::fetch::KeyFetcher;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, TimeZone, Utc};

pub const SIGNER: &str = include_str!("../fixtures/signer.asc");
pub const OTHER: &str = include_str!("../fixtures/other.asc");
pub const AUTHORIZED_KEYS: &str = include_str!("../fixtures/authorized_keys");
/// Detached signature over `AUTHORIZED_KEYS` by `SIGNER`
pub const AUTHORIZED_KEYS_SIG: &str = include_str!("../fixtures/authorized_keys.sig.b64");
/// Detached signature over `ssh-ed25519 AAAA` by `SIGNER`
pub const SHORT_KEY_SIG: &str = include_str!("../fixtures/short_key.sig.b64");

/// A time after the fixture signatures were made
pub fn after_signing() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

pub fn akds_record(keys: &str, sig_b64: &str) -> String {
    format!("v=akds;k={};s={};", BASE64.encode(keys), sig_b64.trim())
}

pub fn akd_record(keys: &str) -> String {
    format!("v=akd;k={};", BASE64.encode(keys))
}

/// In-memory TXT record set
pub struct StaticLookup {
    records: Vec<String>,
}

impl StaticLookup {
    pub fn new<S: Into<String>>(records: impl IntoIterator<Item = S>) -> Self {
        Self {
            records: records.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

#[async_trait]
impl TxtLookup for StaticLookup {
    async fn lookup_txt(&self, _name: &str) -> Vec<String> {
        self.records.clone()
    }
}

/// Fetcher that records how often it was called
#[derive(Clone)]
pub struct CountingFetcher {
    body: Result<String, AkdError>,
    calls: Arc<AtomicUsize>,
}

impl CountingFetcher {
    pub fn ok(body: &str) -> Self {
        Self {
            body: Ok(body.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            body: Err(AkdError::Fetch(reason.to_string())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, AkdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body.clone().map(String::into_bytes)
    }
}
