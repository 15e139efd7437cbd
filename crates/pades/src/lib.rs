//! PAdES signing for PDF containers.
//!
//! Signing runs in three steps, each consuming the previous state:
//! [`reserve_placeholder`] appends the signature field and a zeroed
//! `/Contents`, [`finalize_byte_range`] serializes the update and fixes the
//! `/ByteRange`, and [`sign`] computes the CMS structure over the covered
//! bytes and writes it into the placeholder.

pub mod byterange;
pub mod cms;
pub mod identity;
pub mod placeholder;
pub mod sign;
pub mod verify;

pub use byterange::{ByteRangeDescriptor, PreparedDocument, embed_signature, finalize_byte_range};
pub use identity::{SignerInfo, SigningIdentity, describe_certificate};
pub use placeholder::{
    BYTE_RANGE_PLACEHOLDER, DEFAULT_FIELD_NAME, DEFAULT_RESERVED_SIZE, PlaceholderRef,
    ReservedSignature, SignatureOptions, SubFilter, reserve_placeholder,
};
pub use sign::{CmsSigner, SignedDocument, sign};
pub use verify::{VerifyOptions, verify_document};
