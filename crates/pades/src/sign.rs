//! CMS signing over the prepared byte ranges.

use crate::byterange::{ByteRangeDescriptor, PreparedDocument, embed_signature};
use fse_core::{DigestAlgorithm, Result, compute_digest_over, encode_sri};

/// Produces a detached CMS `SignedData` over some content.
pub trait CmsSigner {
    /// DER-encoded CMS structure signing `content`.
    fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>>;
}

/// Result of a signing operation.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    bytes: Vec<u8>,
    descriptor: ByteRangeDescriptor,
    digest: Vec<u8>,
    signature_len: usize,
    field_name: String,
}

impl SignedDocument {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn descriptor(&self) -> &ByteRangeDescriptor {
        &self.descriptor
    }

    /// SHA-256 over exactly the signed spans.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn digest_sri(&self) -> String {
        encode_sri(DigestAlgorithm::Sha256, &self.digest)
    }

    /// Length of the DER signature before zero padding.
    pub fn signature_len(&self) -> usize {
        self.signature_len
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }
}

/// Sign the prepared document and embed the signature into its placeholder.
#[tracing::instrument(skip(prepared, signer), fields(
    data_len = prepared.bytes.len(),
    reserved = prepared.descriptor.capacity,
))]
pub fn sign(prepared: PreparedDocument, signer: &dyn CmsSigner) -> Result<SignedDocument> {
    let PreparedDocument {
        mut bytes,
        descriptor,
        field_name,
        ..
    } = prepared;

    let digest = compute_digest_over(DigestAlgorithm::Sha256, &bytes, descriptor.spans.clone());
    let content: Vec<u8> = descriptor.covered(&bytes).flatten().copied().collect();

    tracing::debug!(covered = content.len(), "Creating CMS signature");
    let signature = signer.sign_detached(&content)?;
    embed_signature(&mut bytes, &descriptor, &signature)?;

    tracing::info!(
        sig_len = signature.len(),
        digest = %encode_sri(DigestAlgorithm::Sha256, &digest),
        "Signature embedded"
    );
    Ok(SignedDocument {
        bytes,
        descriptor,
        digest,
        signature_len: signature.len(),
        field_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byterange::finalize_byte_range;
    use crate::placeholder::{SignatureOptions, reserve_placeholder};
    use fse_core::{Container, Error, compute_digest, fixtures};
    use std::cell::RefCell;

    /// Returns a fixed-size blob and remembers what it was asked to sign.
    struct FixedSigner {
        len: usize,
        seen: RefCell<Vec<u8>>,
    }

    impl CmsSigner for FixedSigner {
        fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>> {
            *self.seen.borrow_mut() = content.to_vec();
            Ok(vec![0x5A; self.len])
        }
    }

    fn prepared(reserved_size: usize) -> PreparedDocument {
        let container = Container::load(fixtures::minimal_pdf()).unwrap();
        let options = SignatureOptions {
            reserved_size,
            ..SignatureOptions::default()
        };
        finalize_byte_range(reserve_placeholder(container, &options).unwrap()).unwrap()
    }

    #[test]
    fn signs_exactly_the_covered_bytes() {
        let doc = prepared(8192);
        let d = doc.descriptor().clone();
        let mut expected = doc.bytes()[d.spans[0].clone()].to_vec();
        expected.extend_from_slice(&doc.bytes()[d.spans[1].clone()]);

        let signer = FixedSigner {
            len: 4096,
            seen: RefCell::new(Vec::new()),
        };
        let signed = sign(doc, &signer).unwrap();

        assert_eq!(*signer.seen.borrow(), expected);
        assert_eq!(signed.digest(), compute_digest(DigestAlgorithm::Sha256, &expected));
        assert_eq!(signed.signature_len(), 4096);

        // 4096 bytes of 0x5A followed by 4096 bytes worth of zero digits.
        let region = &signed.bytes()[d.contents.clone()];
        assert_eq!(region.len(), 16384);
        assert!(region[..8192].chunks(2).all(|pair| pair == b"5A"));
        assert!(region[8192..].iter().all(|&b| b == b'0'));
    }

    #[test]
    fn signing_leaves_covered_bytes_untouched() {
        let doc = prepared(256);
        let before: Vec<u8> = doc.descriptor().covered(doc.bytes()).flatten().copied().collect();
        let signer = FixedSigner {
            len: 200,
            seen: RefCell::new(Vec::new()),
        };
        let signed = sign(doc, &signer).unwrap();
        let after: Vec<u8> = signed
            .descriptor()
            .covered(signed.bytes())
            .flatten()
            .copied()
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn oversized_signature_fails_and_fits_at_capacity() {
        let signer = FixedSigner {
            len: 257,
            seen: RefCell::new(Vec::new()),
        };
        let err = sign(prepared(256), &signer).unwrap_err();
        assert!(matches!(
            err,
            Error::SignatureTooLarge {
                required: 257,
                reserved: 256
            }
        ));

        let exact = FixedSigner {
            len: 256,
            seen: RefCell::new(Vec::new()),
        };
        let signed = sign(prepared(256), &exact).unwrap();
        let region = &signed.bytes()[signed.descriptor().contents.clone()];
        assert!(!region.contains(&b'0'));
    }
}
