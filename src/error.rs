use std::fmt;
use thiserror::Error;

use crate::record::RecordKind;

/// Which base64 blob of a record failed to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Key,
    Signature,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Key => write!(f, "key"),
            BlobKind::Signature => write!(f, "signature"),
        }
    }
}

/// Errors raised while resolving, trusting and validating authorized keys
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AkdError {
    // Record parsing and selection
    #[error("Not a suitable AKD/AKDS record")]
    NotAnAkdRecord,
    #[error("Failed to extract signature from AKDS record")]
    MissingSignature,
    #[error("Failed to extract a key blob from {0} record")]
    MissingKeyBlob(RecordKind),
    #[error("No suitable AKD/AKDS record found")]
    NoSuitableRecord,

    // Blob decoding
    #[error("Failed to decode {blob} blob: {reason}")]
    BlobDecode { blob: BlobKind, reason: String },

    // Signature verification
    #[error("AKDS record has empty or missing signature")]
    EmptySignature,
    #[error("No pubkey specified, cannot verify AKDS record")]
    NoPublicKeyConfigured,
    #[error("Failed to parse signature as valid PGP data: {0}")]
    SignatureFormat(String),
    #[error("Failed to verify AKDS signature: {0}")]
    SignatureInvalid(String),

    // Trust policy
    #[error("Found AKD record but not accepting unverified records")]
    AkdRequiresUnverifiedAcceptance,

    // Key format
    #[error("Invalid authorized_keys data at line {line}: {reason}")]
    KeyFormatInvalid { line: usize, reason: String },

    // Source selection
    #[error("URL specified but fallback not allowed (DNS error: {0})")]
    FallbackNotPermitted(Box<AkdError>),
    #[error("Failed to get keys from URL: {0}")]
    Fetch(String),
}

/// Errors raised while loading or validating the configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("Configuration parse error: {0}")]
    ParseError(String),
    #[error("No value for RecordName or Url provided, cannot retrieve any keys")]
    MissingSource,
    #[error("Missing AuthorizedKeysPath when OverwriteAuthorizedKeys = true")]
    MissingAuthorizedKeysPath,
    #[error("Failed to parse key from config file: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid nameserver: {0}")]
    InvalidNameserver(String),
    #[error("Invalid boolean for {key}: {value}")]
    InvalidBool { key: String, value: String },
}

/// Errors raised by the DNS wire codec and transport
#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid DNS packet: {0}")]
    InvalidPacket(String),

    #[error("Invalid label length: {0}")]
    InvalidLabelLength(u8),

    #[error("DNS name too long")]
    NameTooLong,

    #[error("Compression pointer loop")]
    CompressionLoop,

    #[error("Upstream query timeout")]
    Timeout,

    #[error("Server returned rcode {0}")]
    ServerFailure(u8),
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AkdError>;
