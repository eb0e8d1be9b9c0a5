use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use thiserror::Error;

/// Failure talking to the secret store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {

    /// The store could not be reached or answered with a server error.
    #[error("secret store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something we could not understand.
    #[error("secret store protocol error: {0}")]
    Protocol(String),
}

/// Failure loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {

    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    Parse(String),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Broad category of an `AuthError`.
///
/// Callers pick an external status from the class rather than from the
/// individual variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {

    /// The presented token or request is structurally unacceptable.
    Input,

    /// The token is outside its validity window.
    Temporal,

    /// The token cannot be trusted.
    Trust,

    /// A backing service could not be consulted. The decision is unknown, not
    /// negative.
    Infrastructure,

    /// A token could not be produced.
    Issuance,
}

/// Every failure the Authority reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token has no subject")]
    MissingSubject,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token issuer is not recognized")]
    WrongIssuer,

    #[error("no live secret for subject")]
    UnknownSubject,

    #[error("unrecognized permission: {0}")]
    UnrecognizedPermission(String),

    #[error("issuance failed")]
    IssuanceFailed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("credential verifier unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("secret store timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

impl AuthError {

    /// Return the category of the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            AuthError::Malformed(_)
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::MissingSubject
            | AuthError::UnrecognizedPermission(_) => ErrorClass::Input,
            AuthError::Expired | AuthError::NotYetValid => ErrorClass::Temporal,
            AuthError::BadSignature
            | AuthError::WrongIssuer
            | AuthError::UnknownSubject => ErrorClass::Trust,
            AuthError::Store(_)
            | AuthError::VerifierUnavailable(_)
            | AuthError::Timeout
            | AuthError::Cancelled => ErrorClass::Infrastructure,
            AuthError::IssuanceFailed => ErrorClass::Issuance,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// A cancelled or timed out call may or may not have reached the store;
    /// retrying is always safe because issuance never overwrites a live
    /// secret and revocation is idempotent.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Infrastructure
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            ErrorKind::InvalidIssuer => AuthError::WrongIssuer,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => {
                AuthError::UnsupportedAlgorithm(err.to_string())
            },
            ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => {
                AuthError::MissingSubject
            },
            _ => AuthError::Malformed(err.to_string()),
        }
    }
}
