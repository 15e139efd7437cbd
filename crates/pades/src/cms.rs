//! CAdES-BES `SignedData` assembly and inspection.
//!
//! The `SignerInfo` carries exactly three signed attributes: `contentType`,
//! `messageDigest` and ESS `signingCertificateV2`. There is no `signingTime`;
//! the claimed time is the signature dictionary's `/M`.

use const_oid::ObjectIdentifier;
use fse_core::{DigestAlgorithm, Error, Result, compute_digest};
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKeyRef, Private};
use openssl::sign::Signer;
use openssl::x509::{X509, X509Ref};
use x509_cert::der::asn1::AnyRef;
use x509_cert::der::{Decode, Reader, SliceReader, Tagged};

pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
pub const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
pub const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
pub const ID_AA_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

const INTEGER: u8 = 0x02;
const OCTET_STRING: u8 = 0x04;
const NULL: u8 = 0x05;
const OBJECT_IDENTIFIER: u8 = 0x06;
const SEQUENCE: u8 = 0x30;
const SET: u8 = 0x31;
/// `[0]` constructed, context-specific.
const CONTEXT_0: u8 = 0xA0;
/// `GeneralName.directoryName`, `[4]` explicit.
const DIRECTORY_NAME: u8 = 0xA4;

/// DER length octets, short form below 128.
fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let octets: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = Vec::with_capacity(octets.len() + 1);
    out.push(0x80 | octets.len() as u8);
    out.extend(octets);
    out
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let length = encode_length(content.len());
    let mut out = Vec::with_capacity(1 + length.len() + content.len());
    out.push(tag);
    out.extend_from_slice(&length);
    out.extend_from_slice(content);
    out
}

fn oid(id: &ObjectIdentifier) -> Vec<u8> {
    tlv(OBJECT_IDENTIFIER, id.as_bytes())
}

/// `AlgorithmIdentifier`, with explicit NULL parameters for SHA-2 and RSA.
fn algorithm(id: &ObjectIdentifier, null_params: bool) -> Vec<u8> {
    let mut content = oid(id);
    if null_params {
        content.extend_from_slice(&[NULL, 0x00]);
    }
    tlv(SEQUENCE, &content)
}

fn attribute(id: &ObjectIdentifier, value: &[u8]) -> Vec<u8> {
    tlv(SEQUENCE, &[oid(id), tlv(SET, value)].concat())
}

fn openssl_error(context: &'static str) -> impl Fn(openssl::error::ErrorStack) -> Error {
    move |e| Error::SigningIdentity(format!("{context}: {e}"))
}

/// Positive DER INTEGER holding the certificate serial.
fn serial_integer(cert: &X509Ref) -> Result<Vec<u8>> {
    let mut serial = cert
        .serial_number()
        .to_bn()
        .map_err(openssl_error("unreadable certificate serial"))?
        .to_vec();
    if serial.first().is_none_or(|&b| b & 0x80 != 0) {
        serial.insert(0, 0x00);
    }
    Ok(tlv(INTEGER, &serial))
}

/// ESS `SigningCertificateV2` naming `cert` by SHA-256 hash and issuer/serial.
///
/// The hash algorithm is the SHA-256 default and is therefore omitted.
fn signing_certificate_v2(cert: &X509Ref, cert_der: &[u8], issuer: &[u8]) -> Result<Vec<u8>> {
    let cert_hash = compute_digest(DigestAlgorithm::Sha256, cert_der);
    let general_names = tlv(SEQUENCE, &tlv(DIRECTORY_NAME, issuer));
    let issuer_serial = tlv(SEQUENCE, &[general_names, serial_integer(cert)?].concat());
    let ess_cert_id = tlv(
        SEQUENCE,
        &[tlv(OCTET_STRING, &cert_hash), issuer_serial].concat(),
    );
    Ok(tlv(SEQUENCE, &tlv(SEQUENCE, &ess_cert_id)))
}

/// Detached CAdES-BES `ContentInfo` over `content`, signed with SHA-256.
///
/// `chain` is embedded after the signing certificate.
pub(crate) fn build_signed_data(
    key: &PKeyRef<Private>,
    cert: &X509Ref,
    chain: &[X509],
    content: &[u8],
) -> Result<Vec<u8>> {
    let key_type = key.id();
    let signature_algorithm = if key_type == Id::RSA {
        algorithm(&SHA256_WITH_RSA, true)
    } else if key_type == Id::EC {
        algorithm(&ECDSA_WITH_SHA256, false)
    } else {
        return Err(Error::SigningIdentity(format!(
            "unsupported signing key type (OpenSSL id {})",
            key_type.as_raw()
        )));
    };
    let cert_der = cert
        .to_der()
        .map_err(openssl_error("cannot encode certificate"))?;
    let issuer = cert
        .issuer_name()
        .to_der()
        .map_err(openssl_error("cannot encode certificate issuer"))?;

    let digest = compute_digest(DigestAlgorithm::Sha256, content);
    let mut attributes = vec![
        attribute(&ID_CONTENT_TYPE, &oid(&ID_DATA)),
        attribute(&ID_MESSAGE_DIGEST, &tlv(OCTET_STRING, &digest)),
        attribute(
            &ID_AA_SIGNING_CERTIFICATE_V2,
            &signing_certificate_v2(cert, &cert_der, &issuer)?,
        ),
    ];
    // SET OF is ordered by encoding.
    attributes.sort();
    let attributes = attributes.concat();

    // The signature covers the attributes re-tagged as a SET.
    let mut signer = Signer::new(MessageDigest::sha256(), key)
        .map_err(openssl_error("cannot initialise signer"))?;
    signer
        .update(&tlv(SET, &attributes))
        .map_err(openssl_error("signing failed"))?;
    let signature = signer
        .sign_to_vec()
        .map_err(openssl_error("signing failed"))?;

    let digest_algorithm = algorithm(&ID_SHA256, true);
    let issuer_and_serial = tlv(SEQUENCE, &[issuer, serial_integer(cert)?].concat());
    let signer_info = tlv(
        SEQUENCE,
        &[
            tlv(INTEGER, &[1]),
            issuer_and_serial,
            digest_algorithm.clone(),
            tlv(CONTEXT_0, &attributes),
            signature_algorithm,
            tlv(OCTET_STRING, &signature),
        ]
        .concat(),
    );

    let mut certificates = cert_der;
    for extra in chain {
        certificates.extend(
            extra
                .to_der()
                .map_err(openssl_error("cannot encode chain certificate"))?,
        );
    }

    let signed_data = tlv(
        SEQUENCE,
        &[
            tlv(INTEGER, &[1]),
            tlv(SET, &digest_algorithm),
            tlv(SEQUENCE, &oid(&ID_DATA)),
            tlv(CONTEXT_0, &certificates),
            tlv(SET, &signer_info),
        ]
        .concat(),
    );
    let content_info = tlv(
        SEQUENCE,
        &[oid(&ID_SIGNED_DATA), tlv(CONTEXT_0, &signed_data)].concat(),
    );
    tracing::debug!(
        len = content_info.len(),
        sig_len = signature.len(),
        "Built CAdES SignedData"
    );
    Ok(content_info)
}

fn malformed(e: x509_cert::der::Error) -> Error {
    Error::SignatureInvalid(format!("malformed CMS structure: {e}"))
}

fn elements(content: &[u8]) -> Result<Vec<AnyRef<'_>>> {
    let mut reader = SliceReader::new(content).map_err(malformed)?;
    let mut out = Vec::new();
    while !reader.is_finished() {
        out.push(AnyRef::decode(&mut reader).map_err(malformed)?);
    }
    Ok(out)
}

fn expect_tag<'a>(item: Option<&AnyRef<'a>>, tag: u8, what: &str) -> Result<AnyRef<'a>> {
    match item {
        Some(any) if u8::from(any.tag()) == tag => Ok(*any),
        _ => Err(Error::SignatureInvalid(format!("CMS structure lacks {what}"))),
    }
}

/// Attribute types signed by the first `SignerInfo` of a DER `ContentInfo`.
pub(crate) fn signed_attribute_types(der: &[u8]) -> Result<Vec<ObjectIdentifier>> {
    let outer = elements(der)?;
    let content_info = expect_tag(outer.first(), SEQUENCE, "a ContentInfo")?;
    let content_info = elements(content_info.value())?;
    let explicit = expect_tag(content_info.get(1), CONTEXT_0, "SignedData content")?;
    let inner = elements(explicit.value())?;
    let signed_data = expect_tag(inner.first(), SEQUENCE, "a SignedData")?;
    let signed_data = elements(signed_data.value())?;
    let signer_infos = expect_tag(signed_data.last(), SET, "signerInfos")?;
    let signer_infos = elements(signer_infos.value())?;
    let signer_info = expect_tag(signer_infos.first(), SEQUENCE, "a SignerInfo")?;

    let Some(signed_attrs) = elements(signer_info.value())?
        .into_iter()
        .find(|f| u8::from(f.tag()) == CONTEXT_0)
    else {
        return Ok(Vec::new());
    };
    elements(signed_attrs.value())?
        .iter()
        .map(|attr| {
            let parts = elements(attr.value())?;
            let id = expect_tag(parts.first(), OBJECT_IDENTIFIER, "an attribute type")?;
            ObjectIdentifier::from_bytes(id.value())
                .map_err(|e| Error::SignatureInvalid(format!("bad attribute type: {e}")))
        })
        .collect()
}
