//! Signature verification for documents signed by this crate (and other
//! `ETSI.CAdES.detached` / `adbe.pkcs7.detached` signers).

use crate::cms::{ID_AA_SIGNING_CERTIFICATE_V2, ID_SIGNING_TIME, signed_attribute_types};
use crate::identity::describe_certificate;
use crate::placeholder::SubFilter;
use fse_core::object::decode_text_string;
use fse_core::{
    Container, DigestAlgorithm, Error, Object, Result, VerifiedSignature, compute_digest_over,
    encode_sri,
};
use openssl::cms::{CMSOptions, CmsContentInfo};
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::stack::Stack;
use openssl::x509::X509;
use openssl::x509::store::X509StoreBuilder;
use std::ops::Range;

const MAX_FIELD_DEPTH: usize = 16;

/// Options for signature verification.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Trusted roots. When empty only the CMS structure and digest are checked.
    pub trust_anchors: Vec<X509>,
}

impl VerifyOptions {
    /// Trust every certificate in a PEM bundle.
    pub fn with_anchors_pem(pem: &[u8]) -> Result<Self> {
        let trust_anchors = X509::stack_from_pem(pem)
            .map_err(|e| Error::InvalidInput(format!("unreadable trust anchors: {e}")))?;
        if trust_anchors.is_empty() {
            return Err(Error::InvalidInput("trust anchor bundle is empty".into()));
        }
        Ok(Self { trust_anchors })
    }
}

struct SignatureField {
    name: String,
    signature: fse_core::Dictionary,
}

/// Verify every signature field of a document.
#[tracing::instrument(skip(bytes, options), fields(
    data_len = bytes.len(),
    anchors = options.trust_anchors.len(),
))]
pub fn verify_document(bytes: &[u8], options: &VerifyOptions) -> Result<Vec<VerifiedSignature>> {
    let container = Container::load(bytes.to_vec())?;
    let fields = signature_fields(&container)?;
    if fields.is_empty() {
        return Err(Error::SignatureInvalid("document carries no signatures".into()));
    }

    let mut verified = Vec::with_capacity(fields.len());
    for field in fields {
        tracing::debug!(field = %field.name, "Verifying signature field");
        let result = verify_field(bytes, &field, options)
            .map_err(|e| match e {
                Error::SignatureInvalid(msg) => {
                    Error::SignatureInvalid(format!("field '{}': {msg}", field.name))
                }
                other => other,
            })?;
        tracing::info!(
            field = %result.field_name,
            digest = %result.digest_sri,
            "Signature verified"
        );
        verified.push(result);
    }
    Ok(verified)
}

fn verify_field(
    bytes: &[u8],
    field: &SignatureField,
    options: &VerifyOptions,
) -> Result<VerifiedSignature> {
    let sig = &field.signature;
    let invalid = |msg: &str| Error::SignatureInvalid(msg.to_string());

    let range: Vec<usize> = sig
        .get(b"ByteRange")
        .and_then(Object::as_array)
        .ok_or_else(|| invalid("missing /ByteRange"))?
        .iter()
        .map(|v| v.as_i64().and_then(|n| usize::try_from(n).ok()))
        .collect::<Option<_>>()
        .filter(|r: &Vec<usize>| r.len() == 4)
        .ok_or_else(|| invalid("/ByteRange must hold four non-negative integers"))?;
    let contents = sig
        .get(b"Contents")
        .and_then(Object::as_string_bytes)
        .ok_or_else(|| invalid("missing /Contents"))?;

    let spans: [Range<usize>; 2] = [range[0]..range[0] + range[1], range[2]..range[2] + range[3]];
    check_spans(bytes, &spans, contents.len())?;
    let covers_whole_document = spans[1].end == bytes.len();

    let der = &contents[..der_total_length(contents)?];
    let digest = compute_digest_over(DigestAlgorithm::Sha256, bytes, spans.clone());
    let signed: Vec<u8> = spans.iter().flat_map(|s| bytes[s.clone()].iter().copied()).collect();

    let mut cms = CmsContentInfo::from_der(der)
        .map_err(|e| Error::SignatureInvalid(format!("/Contents is not a CMS structure: {e}")))?;
    let mut store = X509StoreBuilder::new()
        .map_err(|e| Error::SignatureInvalid(e.to_string()))?;
    for anchor in &options.trust_anchors {
        store
            .add_cert(anchor.clone())
            .map_err(|e| Error::SignatureInvalid(e.to_string()))?;
    }
    let store = store.build();
    let mut flags = CMSOptions::BINARY;
    if options.trust_anchors.is_empty() {
        flags |= CMSOptions::NO_SIGNER_CERT_VERIFY;
    }
    cms.verify(None, Some(&*store), Some(signed.as_slice()), None, flags)
        .map_err(|e| Error::SignatureInvalid(format!("CMS verification failed: {e}")))?;

    let sub_filter = sig
        .get_name(b"SubFilter")
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default();
    if sub_filter == SubFilter::CadesDetached.as_name() {
        check_cades_attributes(der)?;
    }

    Ok(VerifiedSignature {
        field_name: field.name.clone(),
        sub_filter,
        signing_time: sig
            .get(b"M")
            .and_then(Object::as_string_bytes)
            .map(decode_text_string),
        signer: signer_subject(der),
        digest_sri: encode_sri(DigestAlgorithm::Sha256, &digest),
        signed_bytes: signed.len(),
        covers_whole_document,
    })
}

/// CAdES-BES needs ESS `signingCertificateV2`; PAdES baseline forbids `signingTime`.
fn check_cades_attributes(der: &[u8]) -> Result<()> {
    let types = signed_attribute_types(der)?;
    if !types.contains(&ID_AA_SIGNING_CERTIFICATE_V2) {
        return Err(Error::SignatureInvalid(
            "CAdES signature lacks the signingCertificateV2 attribute".into(),
        ));
    }
    if types.contains(&ID_SIGNING_TIME) {
        return Err(Error::SignatureInvalid(
            "PAdES signature carries a signingTime attribute".into(),
        ));
    }
    Ok(())
}

/// The spans must start at 0 and sit tight around the `<hex>` string.
fn check_spans(bytes: &[u8], spans: &[Range<usize>; 2], contents_len: usize) -> Result<()> {
    let invalid = |msg: String| Err(Error::SignatureInvalid(msg));
    let [first, second] = spans;
    if first.start != 0 {
        return invalid(format!("byte range starts at {}, not 0", first.start));
    }
    if second.end > bytes.len() || first.end >= second.start {
        return invalid(format!(
            "byte range {first:?}, {second:?} does not fit a {}-byte file",
            bytes.len()
        ));
    }
    if bytes[first.end] != b'<' || bytes[second.start - 1] != b'>' {
        return invalid("byte range gap is not the /Contents hex string".into());
    }
    let digits = second.start - first.end - 2;
    if digits != contents_len * 2 {
        return invalid(format!(
            "byte range gap holds {digits} hex digits but /Contents decodes to {contents_len} bytes"
        ));
    }
    Ok(())
}

/// Length of the DER SEQUENCE at the start of `data`; the rest is padding.
fn der_total_length(data: &[u8]) -> Result<usize> {
    let invalid = |msg: String| Error::SignatureInvalid(msg);
    if data.len() < 2 {
        return Err(invalid("signature is empty".into()));
    }
    if data[0] != 0x30 {
        return Err(invalid(format!(
            "expected a DER SEQUENCE, found tag 0x{:02X}",
            data[0]
        )));
    }
    let (header, declared) = match data[1] {
        l @ 0x00..=0x7F => (2, usize::from(l)),
        l @ 0x81..=0x84 => {
            let n = usize::from(l & 0x7F);
            let len_bytes = data
                .get(2..2 + n)
                .ok_or_else(|| invalid("truncated DER length".into()))?;
            let declared = len_bytes
                .iter()
                .fold(0usize, |acc, &b| acc << 8 | usize::from(b));
            (2 + n, declared)
        }
        other => {
            return Err(invalid(format!("unsupported DER length form 0x{other:02X}")));
        }
    };
    let total = header + declared;
    if total > data.len() {
        return Err(invalid(format!(
            "DER declares {total} bytes but only {} are present",
            data.len()
        )));
    }
    Ok(total)
}

fn signer_subject(der: &[u8]) -> Option<String> {
    let pkcs7 = Pkcs7::from_der(der).ok()?;
    let none = Stack::<X509>::new().ok()?;
    let signers = pkcs7.signers(&none, Pkcs7Flags::empty()).ok()?;
    let cert = signers.iter().next()?;
    let info = describe_certificate(&cert.to_der().ok()?).ok()?;
    Some(info.common_name.unwrap_or(info.subject))
}

/// Signature fields with a value, walking `/Kids` for nested names.
fn signature_fields(container: &Container) -> Result<Vec<SignatureField>> {
    let catalog = container.catalog()?;
    let Some((_, form)) = container.entry_dict(catalog, b"AcroForm")? else {
        return Ok(Vec::new());
    };
    let Some((_, fields)) = container.entry_array(&form, b"Fields")? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    collect_fields(container, &fields, "", 0, &mut out)?;
    Ok(out)
}

fn collect_fields(
    container: &Container,
    fields: &[Object],
    prefix: &str,
    depth: usize,
    out: &mut Vec<SignatureField>,
) -> Result<()> {
    if depth > MAX_FIELD_DEPTH {
        return Err(Error::SignatureInvalid("form fields nested too deeply".into()));
    }
    for field in fields {
        let Some(dict) = container.resolve(field).as_dict() else {
            continue;
        };
        let partial = dict
            .get(b"T")
            .and_then(Object::as_string_bytes)
            .map(decode_text_string);
        let name = match (prefix.is_empty(), partial) {
            (_, None) => prefix.to_string(),
            (true, Some(p)) => p,
            (false, Some(p)) => format!("{prefix}.{p}"),
        };
        if let Some(kids) = dict
            .get(b"Kids")
            .map(|k| container.resolve(k))
            .and_then(Object::as_array)
        {
            collect_fields(container, kids, &name, depth + 1, out)?;
        }
        if dict.get_name(b"FT") != Some(&b"Sig"[..]) {
            continue;
        }
        if let Some(signature) = dict
            .get(b"V")
            .map(|v| container.resolve(v))
            .and_then(Object::as_dict)
        {
            out.push(SignatureField {
                name,
                signature: signature.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::{self_signed, test_identity};
    use crate::{SignatureOptions, finalize_byte_range, reserve_placeholder, sign};
    use fse_core::{Relationship, SerializeMode, attach, find_subslice, fixtures};

    /// Plain S/MIME-style SignedData, as `openssl cms -sign` writes it.
    struct PlainCmsSigner {
        key: openssl::pkey::PKey<openssl::pkey::Private>,
        cert: X509,
    }

    impl crate::CmsSigner for PlainCmsSigner {
        fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>> {
            let cms = CmsContentInfo::sign(
                Some(&*self.cert),
                Some(&*self.key),
                None,
                Some(content),
                CMSOptions::DETACHED | CMSOptions::BINARY,
            )
            .unwrap();
            Ok(cms.to_der().unwrap())
        }
    }

    fn signed_fixture() -> (Vec<u8>, String, X509) {
        let identity = test_identity();
        let cert = identity.certificate().clone();
        let (bytes, sri) = signed_with(&identity);
        (bytes, sri, cert)
    }

    fn signed_with(signer: &dyn crate::CmsSigner) -> (Vec<u8>, String) {
        let container = Container::load(fixtures::minimal_pdf()).unwrap();
        let container =
            attach(container, "cda.xml", b"<ClinicalDocument/>", Relationship::Alternative)
                .unwrap();
        let container =
            Container::load(container.serialize(SerializeMode::Incremental).unwrap().bytes)
                .unwrap();
        let options = SignatureOptions {
            reserved_size: 8192,
            ..SignatureOptions::default()
        };
        let prepared =
            finalize_byte_range(reserve_placeholder(container, &options).unwrap()).unwrap();
        let signed = sign(prepared, signer).unwrap();
        let sri = signed.digest_sri();
        (signed.into_bytes(), sri)
    }

    #[test]
    fn signed_document_verifies() {
        let (bytes, sri, _) = signed_fixture();
        let results = verify_document(&bytes, &VerifyOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.field_name, "Signature1");
        assert_eq!(result.sub_filter, "ETSI.CAdES.detached");
        assert_eq!(result.digest_sri, sri);
        assert_eq!(result.signer.as_deref(), Some("Giulia Bianchi"));
        assert!(result.covers_whole_document);
    }

    #[test]
    fn tampering_inside_the_spans_is_detected() {
        let (mut bytes, _, _) = signed_fixture();
        let at = find_subslice(&bytes, b"(Referto)", 0).unwrap();
        bytes[at + 1] = b'r';
        let err = verify_document(&bytes, &VerifyOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SignatureInvalid(_)));
    }

    #[test]
    fn later_revisions_are_reported_as_partial_coverage() {
        let (bytes, _, _) = signed_fixture();
        let mut container = Container::load(bytes).unwrap();
        container
            .set_catalog_entry(b"Lang", Object::string("it-IT"))
            .unwrap();
        let updated = container.serialize(SerializeMode::Incremental).unwrap().bytes;

        let results = verify_document(&updated, &VerifyOptions::default()).unwrap();
        assert!(!results[0].covers_whole_document);
    }

    #[test]
    fn trust_anchors_are_enforced() {
        let (bytes, _, cert) = signed_fixture();
        let trusted = VerifyOptions {
            trust_anchors: vec![cert],
        };
        verify_document(&bytes, &trusted).unwrap();

        let (_, stranger) = self_signed("Someone Else");
        let untrusted = VerifyOptions {
            trust_anchors: vec![stranger],
        };
        assert!(matches!(
            verify_document(&bytes, &untrusted),
            Err(Error::SignatureInvalid(_))
        ));
    }

    #[test]
    fn cades_signature_without_ess_attribute_is_rejected() {
        let (key, cert) = self_signed("Giulia Bianchi");
        let (bytes, _) = signed_with(&PlainCmsSigner { key, cert });
        let err = verify_document(&bytes, &VerifyOptions::default()).unwrap_err();
        assert!(err.to_string().contains("signingCertificateV2"), "{err}");
    }

    #[test]
    fn unsigned_document_is_invalid() {
        let err = verify_document(&fixtures::minimal_pdf(), &VerifyOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no signatures"));
    }

    #[test]
    fn der_length_ignores_zero_padding() {
        let mut data = vec![0x30, 0x82, 0x00, 0x03, 1, 2, 3];
        data.extend_from_slice(&[0; 16]);
        assert_eq!(der_total_length(&data).unwrap(), 7);
        assert!(der_total_length(&[0x30, 0x05, 1]).is_err());
        assert!(der_total_length(&[0; 8]).is_err());
    }
}
