//! PKCS#12 signing identities backed by OpenSSL.
//!
//! Signatures are CAdES-BES, assembled by [`crate::cms`].

use crate::cms::build_signed_data;
use crate::sign::CmsSigner;
use chrono::{DateTime, Utc};
use fse_core::{Error, Result};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde::Serialize;
use std::path::Path;
use x509_cert::Certificate;
use x509_cert::der::Decode;
use x509_cert::der::asn1::{PrintableStringRef, Utf8StringRef};
use x509_cert::name::Name;

/// Private key, signing certificate and chain loaded from a PKCS#12 bundle.
pub struct SigningIdentity {
    key: PKey<Private>,
    cert: X509,
    chain: Vec<X509>,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Human-readable summary of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignerInfo {
    pub subject: String,
    pub common_name: Option<String>,
    pub issuer: String,
    /// Serial number, uppercase hex.
    pub serial: String,
    pub not_after: Option<DateTime<Utc>>,
}

impl SigningIdentity {
    /// Parse a DER PKCS#12 bundle.
    #[tracing::instrument(skip(der, password), fields(der_len = der.len()))]
    pub fn from_pkcs12(der: &[u8], password: &str) -> Result<Self> {
        let bundle = Pkcs12::from_der(der)
            .map_err(|e| Error::SigningIdentity(format!("not a PKCS#12 bundle: {e}")))?;
        let parsed = bundle.parse2(password).map_err(|e| {
            Error::SigningIdentity(format!("cannot open PKCS#12 bundle (wrong password?): {e}"))
        })?;
        let key = parsed
            .pkey
            .ok_or_else(|| Error::SigningIdentity("PKCS#12 bundle has no private key".into()))?;
        let cert = parsed
            .cert
            .ok_or_else(|| Error::SigningIdentity("PKCS#12 bundle has no certificate".into()))?;

        let public = cert
            .public_key()
            .map_err(|e| Error::SigningIdentity(format!("unreadable certificate key: {e}")))?;
        if !public.public_eq(&key) {
            return Err(Error::SigningIdentity(
                "certificate does not match the private key".into(),
            ));
        }

        let chain: Vec<X509> = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();
        tracing::debug!(chain_len = chain.len(), "Loaded signing identity");
        Ok(Self { key, cert, chain })
    }

    /// Read and parse a PKCS#12 file.
    pub fn from_pkcs12_file(path: &Path, password: &str) -> Result<Self> {
        let der = std::fs::read(path).map_err(|e| {
            Error::SigningIdentity(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_pkcs12(&der, password)
    }

    pub fn certificate(&self) -> &X509 {
        &self.cert
    }

    /// Subject, issuer and serial of the signing certificate.
    pub fn describe(&self) -> Result<SignerInfo> {
        let der = self
            .cert
            .to_der()
            .map_err(|e| Error::SigningIdentity(format!("cannot encode certificate: {e}")))?;
        describe_certificate(&der)
    }
}

impl CmsSigner for SigningIdentity {
    #[tracing::instrument(skip(self, content), fields(content_len = content.len()))]
    fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>> {
        build_signed_data(&self.key, &self.cert, &self.chain, content)
    }
}

/// Summarize a DER certificate.
pub fn describe_certificate(der: &[u8]) -> Result<SignerInfo> {
    let cert = Certificate::from_der(der)
        .map_err(|e| Error::SigningIdentity(format!("failed to parse certificate: {e}")))?;
    let tbs = &cert.tbs_certificate;
    let not_after = tbs.validity.not_after.to_unix_duration().as_secs();
    Ok(SignerInfo {
        subject: tbs.subject.to_string(),
        common_name: common_name(&tbs.subject),
        issuer: tbs.issuer.to_string(),
        serial: hex::encode_upper(tbs.serial_number.as_bytes()),
        not_after: i64::try_from(not_after)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    })
}

fn common_name(name: &Name) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == const_oid::db::rfc4519::CN)
        .and_then(|atv| {
            atv.value
                .decode_as::<Utf8StringRef<'_>>()
                .map(|s| s.as_str().to_string())
                .or_else(|_| {
                    atv.value
                        .decode_as::<PrintableStringRef<'_>>()
                        .map(|s| s.as_str().to_string())
                })
                .ok()
        })
}
