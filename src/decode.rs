use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::error::{AkdError, BlobKind, Result};
use crate::record::ParsedRecord;

/// Decode one standard (padded) base64 blob.
pub fn decode_blob(blob: &str, kind: BlobKind) -> Result<Vec<u8>> {
    BASE64.decode(blob).map_err(|e| AkdError::BlobDecode {
        blob: kind,
        reason: e.to_string(),
    })
}

/// Key material decoded from a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub key_bytes: Vec<u8>,
    /// `None` when the record carried no signature blob, `Some(Err)` when it
    /// carried one that is not valid base64
    pub sig_bytes: Option<Result<Vec<u8>>>,
}

impl DecodedPayload {
    /// Decode both blobs of a record.
    ///
    /// A bad key blob fails the whole decode; a bad signature blob is kept as
    /// an error so the trust policy can decide what it means.
    pub fn from_record(record: &ParsedRecord) -> Result<Self> {
        let key_bytes = decode_blob(&record.key_blob, BlobKind::Key)?;
        let sig_bytes = record
            .sig_blob
            .as_deref()
            .map(|blob| decode_blob(blob, BlobKind::Signature));

        Ok(Self {
            key_bytes,
            sig_bytes,
        })
    }
}
