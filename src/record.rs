//! AKD/AKDS TXT record parsing and candidate selection.
//!
//! A record value carries, in any order, a version header (`v=akd;` or
//! `v=akds;`), a base64 key blob (`k=...;`) and, for AKDS, a base64 detached
//! signature over the decoded key blob (`s=...;`).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{AkdError, Result};

/// Token patterns of the AKD/AKDS micro-format.
///
/// Each token starts the value or follows a `;`, so a `k=` or `s=` inside a
/// base64 blob is never taken for a token of its own.
struct RecordPatterns {
    header: Regex,
    key: Regex,
    signature: Regex,
}

impl RecordPatterns {
    fn new() -> Self {
        Self {
            header: Regex::new(r"(?:^|;)\s*v=(akds?);").expect("header pattern is valid"),
            key: Regex::new(r"(?:^|;)\s*k=([A-Za-z0-9+/=]+);").expect("key pattern is valid"),
            signature: Regex::new(r"(?:^|;)\s*s=([A-Za-z0-9+/=]+);")
                .expect("signature pattern is valid"),
        }
    }

    /// Extract the first capture group of `pattern`, or an empty string
    fn capture<'a>(pattern: &Regex, record: &'a str) -> &'a str {
        pattern
            .captures(record)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or_default()
    }
}

static PATTERNS: LazyLock<RecordPatterns> = LazyLock::new(RecordPatterns::new);

/// Declared record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Unsigned key list
    Akd,
    /// Key list with a detached signature
    Akds,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Akd => write!(f, "AKD"),
            RecordKind::Akds => write!(f, "AKDS"),
        }
    }
}

/// A structurally well-formed AKD/AKDS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub kind: RecordKind,
    /// Base64 key blob, never empty
    pub key_blob: String,
    /// Base64 signature blob, always present for AKDS
    pub sig_blob: Option<String>,
}

/// Parse a single raw TXT value into its constituent blobs.
pub fn parse_record(record: &str) -> Result<ParsedRecord> {
    let patterns = &*PATTERNS;

    let kind = match RecordPatterns::capture(&patterns.header, record) {
        "akd" => RecordKind::Akd,
        "akds" => RecordKind::Akds,
        _ => return Err(AkdError::NotAnAkdRecord),
    };

    let key_blob = RecordPatterns::capture(&patterns.key, record);
    let sig_blob = RecordPatterns::capture(&patterns.signature, record);

    if kind == RecordKind::Akds && sig_blob.is_empty() {
        return Err(AkdError::MissingSignature);
    }

    if key_blob.is_empty() {
        return Err(AkdError::MissingKeyBlob(kind));
    }

    Ok(ParsedRecord {
        kind,
        key_blob: key_blob.to_string(),
        sig_blob: (!sig_blob.is_empty()).then(|| sig_blob.to_string()),
    })
}

/// Pick the first well-formed record in lookup order.
///
/// Later records are never parsed once a candidate has been chosen, and no
/// fields are merged across records.
pub fn select_candidate<I, S>(records: I) -> Result<ParsedRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    records
        .into_iter()
        .fold(None, |chosen: Option<ParsedRecord>, raw| {
            chosen.or_else(|| {
                let raw = raw.as_ref();
                debug!("Record: {}", raw);
                match parse_record(raw) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        info!("Failed to parse record: {}", e);
                        None
                    }
                }
            })
        })
        .ok_or(AkdError::NoSuitableRecord)
}
