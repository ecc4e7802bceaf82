//! Trust policy for a chosen record.
//!
//! ```text
//! Start -> RecordChosen -> Decoded -> Verified | AcceptedUnverified | Rejected
//! ```
//!
//! `RecordChosen` can short-circuit to `Rejected` for unsigned records.
//! Every "accept anyway" decision is made by [`TrustPolicy`] in one place.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::decode::DecodedPayload;
use crate::error::{AkdError, Result};
use crate::record::{ParsedRecord, RecordKind};
use crate::signature::{DetachedVerifier, verify_signature};

/// Why a record was not trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AkdRequiresUnverifiedAcceptance,
    SignatureDecodeFailed,
    SignatureInvalid,
}

/// Result of evaluating a record against the trust policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustOutcome {
    Verified,
    AcceptedUnverified,
    Rejected(RejectReason),
}

impl TrustOutcome {
    /// Whether key bytes may flow on to key-format validation
    pub fn is_accepted(&self) -> bool {
        !matches!(self, TrustOutcome::Rejected(_))
    }
}

/// What is known about a record's signature once its blobs are decoded
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureEvidence {
    /// AKD record, nothing to check
    Unsigned,
    /// Signature blob was not valid base64
    Undecodable(AkdError),
    /// Signature checked out against the configured key
    Valid,
    /// Signature was well-formed but did not verify
    Invalid,
    /// The verifier could not run (empty signature, no key, bad packet)
    VerifierError(AkdError),
}

impl SignatureEvidence {
    /// Decode and check the signature of `payload`, if the record kind has one.
    pub fn gather(
        kind: RecordKind,
        payload: &DecodedPayload,
        verifier: Option<&dyn DetachedVerifier>,
        now: DateTime<Utc>,
    ) -> Self {
        if kind == RecordKind::Akd {
            return SignatureEvidence::Unsigned;
        }

        let sig_bytes = match &payload.sig_bytes {
            Some(Ok(bytes)) => bytes.as_slice(),
            Some(Err(e)) => return SignatureEvidence::Undecodable(e.clone()),
            None => &[],
        };

        match verify_signature(&payload.key_bytes, sig_bytes, verifier, now) {
            Ok(true) => SignatureEvidence::Valid,
            Ok(false) => SignatureEvidence::Invalid,
            Err(e) => SignatureEvidence::VerifierError(e),
        }
    }
}

/// Key bytes that passed the trust policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedPayload {
    pub kind: RecordKind,
    pub key_bytes: Vec<u8>,
    /// Either `Verified` or `AcceptedUnverified`
    pub outcome: TrustOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    accept_unverified: bool,
}

impl TrustPolicy {
    pub fn new(accept_unverified: bool) -> Self {
        Self { accept_unverified }
    }

    fn unverified_or(&self, reason: RejectReason) -> TrustOutcome {
        if self.accept_unverified {
            TrustOutcome::AcceptedUnverified
        } else {
            TrustOutcome::Rejected(reason)
        }
    }

    /// `RecordChosen` transition: unsigned records need explicit acceptance
    /// before anything is decoded.
    pub fn on_record_chosen(&self, kind: RecordKind) -> Option<TrustOutcome> {
        match kind {
            RecordKind::Akd if !self.accept_unverified => Some(TrustOutcome::Rejected(
                RejectReason::AkdRequiresUnverifiedAcceptance,
            )),
            _ => None,
        }
    }

    /// `Decoded` transition
    pub fn on_decoded(&self, kind: RecordKind, evidence: &SignatureEvidence) -> TrustOutcome {
        match (kind, evidence) {
            (RecordKind::Akd, _) => {
                self.unverified_or(RejectReason::AkdRequiresUnverifiedAcceptance)
            }
            (RecordKind::Akds, SignatureEvidence::Valid) => TrustOutcome::Verified,
            (RecordKind::Akds, SignatureEvidence::Undecodable(_)) => {
                self.unverified_or(RejectReason::SignatureDecodeFailed)
            }
            (
                RecordKind::Akds,
                SignatureEvidence::Unsigned
                | SignatureEvidence::Invalid
                | SignatureEvidence::VerifierError(_),
            ) => self.unverified_or(RejectReason::SignatureInvalid),
        }
    }

    /// Run a chosen record through the whole policy.
    ///
    /// A key blob that is not valid base64 is always fatal; every other
    /// failure is routed through the transition table.
    pub fn evaluate(
        &self,
        record: &ParsedRecord,
        verifier: Option<&dyn DetachedVerifier>,
        now: DateTime<Utc>,
    ) -> Result<TrustedPayload> {
        debug!("Record type: {}", record.kind);

        if let Some(TrustOutcome::Rejected(reason)) = self.on_record_chosen(record.kind) {
            return Err(rejection(reason, &SignatureEvidence::Unsigned));
        }

        let payload = DecodedPayload::from_record(record)?;
        let evidence = SignatureEvidence::gather(record.kind, &payload, verifier, now);
        let outcome = self.on_decoded(record.kind, &evidence);

        match outcome {
            TrustOutcome::Verified => info!("Successfully verified AKDS data"),
            TrustOutcome::AcceptedUnverified => match &evidence {
                SignatureEvidence::Unsigned => warn!("Accepting unverified AKD data"),
                SignatureEvidence::Undecodable(e) | SignatureEvidence::VerifierError(e) => {
                    warn!("Accepting unverified AKDS data: {}", e)
                }
                _ => warn!("Accepting unverified AKDS data: signature does not match"),
            },
            TrustOutcome::Rejected(reason) => return Err(rejection(reason, &evidence)),
        }

        Ok(TrustedPayload {
            kind: record.kind,
            key_bytes: payload.key_bytes,
            outcome,
        })
    }
}

fn rejection(reason: RejectReason, evidence: &SignatureEvidence) -> AkdError {
    match (reason, evidence) {
        (RejectReason::AkdRequiresUnverifiedAcceptance, _) => {
            AkdError::AkdRequiresUnverifiedAcceptance
        }
        (_, SignatureEvidence::Undecodable(e)) => e.clone(),
        (_, SignatureEvidence::VerifierError(e)) => AkdError::SignatureInvalid(e.to_string()),
        _ => AkdError::SignatureInvalid("signature does not match signing key".to_string()),
    }
}
