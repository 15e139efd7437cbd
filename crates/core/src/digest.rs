//! Digest (hash) abstraction with SRI-style encoding.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::ops::Range;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    Sha256,
}

impl DigestAlgorithm {
    /// Returns the algorithm name in lowercase (for SRI strings).
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Digest of `data` under `algorithm`.
#[tracing::instrument(skip(data), fields(data_len = data.len(), alg = ?algorithm))]
pub fn compute_digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    compute_digest_over(algorithm, data, std::iter::once(0..data.len()))
}

/// Digest of the concatenation of `spans` of `data`, without copying them.
pub fn compute_digest_over(
    algorithm: DigestAlgorithm,
    data: &[u8],
    spans: impl IntoIterator<Item = Range<usize>>,
) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            for span in spans {
                hasher.update(&data[span]);
            }
            hasher.finalize().to_vec()
        }
    }
}

/// Encode digest as SRI string (e.g., `sha256-<base64>`).
pub fn encode_sri(algorithm: DigestAlgorithm, digest: &[u8]) -> String {
    use base64::Engine;
    format!(
        "{}-{}",
        algorithm.name(),
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}
