//! Error taxonomy shared by every stage of the pipeline.

/// Errors raised while mutating, signing or submitting a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input container is unreadable (bad header, xref, object or catalog).
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// An association with this name is already registered.
    #[error("an associated file named '{0}' already exists")]
    DuplicateAssociation(String),

    /// The document has structure the signer refuses to touch.
    #[error("container too complex to sign: {0}")]
    ContainerTooComplex(String),

    /// Signing key material is unusable.
    #[error("signing identity error: {0}")]
    SigningIdentity(String),

    /// Encoded signature does not fit the reserved placeholder.
    #[error(
        "signature needs {required} bytes but only {reserved} were reserved \
         (re-run with a larger reservation)"
    )]
    SignatureTooLarge { required: usize, reserved: usize },

    /// A signature failed verification.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Network or TLS failure while reaching the validation service.
    #[error("transport error: {0}")]
    Transport(String),

    /// Validation service answered with a non-success status.
    #[error("validation service rejected the document (HTTP {status})")]
    RemoteRejection { status: u16, body: String },

    /// Caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Prefix a malformed-container message with the object it concerns.
    pub(crate) fn within(self, what: impl std::fmt::Display) -> Self {
        match self {
            Self::MalformedContainer(msg) => Self::MalformedContainer(format!("{what}: {msg}")),
            other => other,
        }
    }

    /// Process exit code: 2 for a rejection by the validation service, else 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RemoteRejection { .. } => 2,
            _ => 1,
        }
    }

    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result alias for container, signing and submission operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_has_distinct_exit_code() {
        let rejected = Error::RemoteRejection {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(rejected.exit_code(), 2);
        assert_eq!(Error::Transport("timeout".into()).exit_code(), 1);
        assert_eq!(Error::malformed("x").exit_code(), 1);
    }

    #[test]
    fn only_transport_is_retryable() {
        assert!(Error::Transport("reset".into()).is_retryable());
        assert!(
            !Error::SignatureTooLarge {
                required: 10,
                reserved: 9
            }
            .is_retryable()
        );
    }
}
