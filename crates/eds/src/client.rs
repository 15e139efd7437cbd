//! HTTP client for document submission.

use async_trait::async_trait;
use fse_core::{Error, Result};
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use std::error::Error as StdError;
use std::path::Path;
use std::time::Duration;

const USER_AGENT_VALUE: &str = concat!("fse-eds/", env!("CARGO_PKG_VERSION"));

/// Body of a successful validation response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutcomeBody {
    /// Response parsed as JSON.
    Json(Value),
    /// Anything else, kept verbatim.
    Raw { raw: String },
}

impl OutcomeBody {
    fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => OutcomeBody::Json(value),
            Err(_) => OutcomeBody::Raw { raw: text },
        }
    }
}

/// Submits a signed document and returns the service verdict.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn submit(&self, signed_pdf: &[u8]) -> Result<OutcomeBody>;
}

/// PEM material for the mutual-TLS handshake.
#[derive(Clone)]
pub struct MtlsCredentials {
    pub client_cert_pem: Vec<u8>,
    pub client_key_pem: Vec<u8>,
    /// Only anchor trusted for the server certificate.
    pub ca_pem: Vec<u8>,
}

impl std::fmt::Debug for MtlsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MtlsCredentials")
            .field("client_cert_len", &self.client_cert_pem.len())
            .field("ca_len", &self.ca_pem.len())
            .finish_non_exhaustive()
    }
}

impl MtlsCredentials {
    pub fn from_files(cert: &Path, key: &Path, ca: &Path) -> Result<Self> {
        let read = |path: &Path, what: &str| {
            std::fs::read(path).map_err(|e| {
                Error::InvalidInput(format!("cannot read {what} {}: {e}", path.display()))
            })
        };
        Ok(Self {
            client_cert_pem: read(cert, "client certificate")?,
            client_key_pem: read(key, "client key")?,
            ca_pem: read(ca, "CA bundle")?,
        })
    }
}

/// Validation service client. Built per run; never retries.
#[derive(Debug, Clone)]
pub struct ValidationClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ValidationClient {
    /// Client presenting `credentials` and trusting only their CA.
    pub fn new(endpoint: &str, credentials: &MtlsCredentials, timeout: Duration) -> Result<Self> {
        let mut identity_pem = credentials.client_cert_pem.clone();
        if !identity_pem.ends_with(b"\n") {
            identity_pem.push(b'\n');
        }
        identity_pem.extend_from_slice(&credentials.client_key_pem);
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(|e| Error::InvalidInput(format!("unusable client certificate or key: {e}")))?;
        let ca = reqwest::Certificate::from_pem(&credentials.ca_pem)
            .map_err(|e| Error::InvalidInput(format!("unusable CA certificate: {e}")))?;

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_http_client(endpoint, http))
    }

    /// Client over a preconfigured `reqwest::Client`.
    pub fn with_http_client(endpoint: &str, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Validator for ValidationClient {
    #[tracing::instrument(skip(self, signed_pdf), fields(
        endpoint = %self.endpoint,
        pdf_len = signed_pdf.len(),
    ))]
    async fn submit(&self, signed_pdf: &[u8]) -> Result<OutcomeBody> {
        tracing::debug!("Submitting signed document");
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/pdf"))
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE))
            .body(signed_pdf.to_vec())
            .send()
            .await
            .map_err(|e| Error::Transport(describe(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Validation service rejected the document");
            return Err(Error::RemoteRejection {
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!(status = status.as_u16(), "Validation service accepted the document");
        Ok(OutcomeBody::from_text(body))
    }
}

/// Error text including every source in the chain.
fn describe(err: &reqwest::Error) -> String {
    let mut msg = if err.is_timeout() {
        format!("request timed out: {err}")
    } else {
        err.to_string()
    };
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ValidationClient {
        ValidationClient::with_http_client(
            &format!("{}/validate", server.uri()),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn json_response_is_returned_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/validate"))
            .and(header("content-type", "application/pdf"))
            .and(body_bytes(b"%PDF-signed".to_vec()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"esito": "OK", "warnings": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server).submit(b"%PDF-signed").await.unwrap();
        assert_eq!(
            outcome,
            OutcomeBody::Json(serde_json::json!({"esito": "OK", "warnings": []}))
        );
    }

    #[tokio::test]
    async fn non_json_response_is_kept_raw() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
            .mount(&server)
            .await;

        let outcome = client_for(&server).submit(b"%PDF").await.unwrap();
        assert_eq!(outcome, OutcomeBody::Raw { raw: "accepted".into() });
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"raw": "accepted"})
        );
    }

    #[tokio::test]
    async fn error_status_is_a_rejection_with_verbatim_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable\n"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).submit(b"%PDF").await.unwrap_err();
        match err {
            Error::RemoteRejection { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "service unavailable\n");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let client = ValidationClient::with_http_client(
            "http://127.0.0.1:1/validate",
            reqwest::Client::new(),
        );
        let err = client.submit(b"%PDF").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(err.exit_code(), 1);
    }

    /// PEM client certificate, its PKCS#8 key and the issuing CA.
    fn generated_credentials() -> MtlsCredentials {
        use openssl::asn1::Asn1Time;
        use openssl::bn::BigNum;
        use openssl::hash::MessageDigest;
        use openssl::pkey::{PKey, Private};
        use openssl::rsa::Rsa;
        use openssl::x509::extension::{BasicConstraints, KeyUsage};
        use openssl::x509::{X509, X509Builder, X509NameBuilder};

        type Issuer<'a> = Option<(&'a X509, &'a PKey<Private>)>;

        fn build(cn: &str, serial: u32, issuer: Issuer<'_>) -> (X509, PKey<Private>) {
            let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
            let mut name = X509NameBuilder::new().unwrap();
            name.append_entry_by_text("CN", cn).unwrap();
            let name = name.build();

            let mut builder = X509Builder::new().unwrap();
            builder.set_version(2).unwrap();
            let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
            builder.set_serial_number(&serial).unwrap();
            builder.set_subject_name(&name).unwrap();
            builder.set_pubkey(&key).unwrap();
            builder
                .set_not_before(&Asn1Time::days_from_now(0).unwrap())
                .unwrap();
            builder
                .set_not_after(&Asn1Time::days_from_now(30).unwrap())
                .unwrap();
            match issuer {
                Some((ca_cert, ca_key)) => {
                    builder.set_issuer_name(ca_cert.subject_name()).unwrap();
                    builder.sign(ca_key, MessageDigest::sha256()).unwrap();
                }
                None => {
                    builder
                        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
                        .unwrap();
                    builder
                        .append_extension(KeyUsage::new().key_cert_sign().build().unwrap())
                        .unwrap();
                    builder.set_issuer_name(&name).unwrap();
                    builder.sign(&key, MessageDigest::sha256()).unwrap();
                }
            }
            (builder.build(), key)
        }

        let (ca_cert, ca_key) = build("EDS Test CA", 1, None);
        let (client_cert, client_key) = build("fse-tool client", 2, Some((&ca_cert, &ca_key)));
        MtlsCredentials {
            client_cert_pem: client_cert.to_pem().unwrap(),
            client_key_pem: client_key.private_key_to_pem_pkcs8().unwrap(),
            ca_pem: ca_cert.to_pem().unwrap(),
        }
    }

    #[test]
    fn real_pem_material_builds_a_client() {
        let creds = generated_credentials();
        let client =
            ValidationClient::new("https://eds.example/validate", &creds, Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.endpoint(), "https://eds.example/validate");
    }

    #[tokio::test]
    async fn slow_service_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = ValidationClient::new(
            &format!("{}/validate", server.uri()),
            &generated_credentials(),
            Duration::from_millis(200),
        )
        .unwrap();
        let started = std::time::Instant::now();
        let err = client.submit(b"%PDF").await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(4));
        match err {
            Error::Transport(msg) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn garbage_credentials_are_rejected() {
        let creds = MtlsCredentials {
            client_cert_pem: b"not a certificate".to_vec(),
            client_key_pem: b"not a key".to_vec(),
            ca_pem: b"not a ca".to_vec(),
        };
        let err = ValidationClient::new("https://eds.invalid", &creds, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn missing_credential_file_names_the_path() {
        let err = MtlsCredentials::from_files(
            Path::new("/nonexistent/client.pem"),
            Path::new("/nonexistent/client.key"),
            Path::new("/nonexistent/ca.pem"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/client.pem"));
    }
}
