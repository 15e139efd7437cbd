//! Common types and result structures.

use serde::{Deserialize, Serialize};

/// Result of a successful signature verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSignature {
    pub field_name: String,
    pub sub_filter: String,
    /// `/M` of the signature dictionary, as written.
    pub signing_time: Option<String>,
    /// Subject of the signing certificate.
    pub signer: Option<String>,
    /// SRI string of the digest over the signed byte ranges.
    pub digest_sri: String,
    pub signed_bytes: usize,
    /// False when later revisions were appended after this signature.
    pub covers_whole_document: bool,
}
