use serde::{Serialize, Deserialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use crate::{
    error::AuthError,
    permission::Permission,
};

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Return the current time as a Timestamp.
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The signed payload of a token.
///
/// Field names follow the registered JWT claim names so that standard
/// tooling can read the temporal claims.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Claims {

    /// The subject the token was issued for.
    ///
    /// Defaults to empty when absent so that a missing subject is reported
    /// as such rather than as a decoding failure.
    #[serde(default)]
    pub sub: String,

    /// The permissions granted for the lifetime of the token.
    pub perm: Permission,

    /// Issued at.
    pub iat: Timestamp,

    /// Not before.
    pub nbf: Timestamp,

    /// Expires at.
    pub exp: Timestamp,

    /// Issuer.
    pub iss: String,
}

impl Claims {

    /// Build the claims for a token issued at `issued_at`.
    pub fn new(
        subject: &str,
        permissions: Permission,
        issued_at: Timestamp,
        lifetime: Duration,
        issuer: &str,
    ) -> Result<Self, AuthError> {
        let claims = Claims {
            sub: subject.to_owned(),
            perm: permissions,
            iat: issued_at,
            nbf: issued_at,
            exp: issued_at.saturating_add(lifetime.as_secs()),
            iss: issuer.to_owned(),
        };
        claims.check()?;
        Ok(claims)
    }

    /// Check the structural invariants: a subject is present and
    /// `iat <= nbf <= exp`.
    pub fn check(&self) -> Result<(), AuthError> {
        if self.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        if self.iat > self.nbf || self.nbf > self.exp {
            return Err(AuthError::Malformed(
                "temporal claims out of order".to_owned()
            ));
        }
        Ok(())
    }
}
