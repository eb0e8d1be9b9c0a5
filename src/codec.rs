use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::Deserialize;
use tracing::warn;
use crate::{
    claims::Claims,
    config::Config,
    error::{AuthError, ConfigError},
    store::Secret,
};

/// The part of a token header we look at before anything else.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Encodes Claims into signed tokens and recovers them again.
///
/// A token is three dot separated base64url segments: a header naming the
/// HMAC variant, the JSON claims, and the signature.
#[derive(Clone, Debug)]
pub struct ClaimsCodec {

    /// Issuer required on every decoded token.
    issuer: String,

    /// Clock skew tolerated on `nbf` and `exp`, in seconds.
    leeway: u64,

    /// Algorithm new tokens are signed with.
    algorithm: Algorithm,
}

impl ClaimsCodec {

    /// Create a codec from the configuration.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(ClaimsCodec {
            issuer: config.issuer.clone(),
            leeway: config.leeway_secs,
            algorithm: config.signing_algorithm()?,
        })
    }

    /// Sign `claims` with `secret`.
    pub fn encode(
        &self,
        claims: &Claims,
        secret: &Secret,
    ) -> Result<String, AuthError> {
        claims.check()?;
        let header = Header::new(self.algorithm);
        encode(&header, claims, &EncodingKey::from_secret(secret.expose()))
            .map_err(|e| {
                warn!(error = %e, "failed to sign token");
                AuthError::IssuanceFailed
            })
    }

    /// Check that a token is well formed and signed with a supported
    /// algorithm, returning that algorithm.
    pub fn inspect(&self, token: &str) -> Result<Algorithm, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(AuthError::Malformed(
                "expected three non-empty segments".to_owned()
            ));
        }
        let bytes = URL_SAFE_NO_PAD.decode(segments[0])
            .map_err(|e| AuthError::Malformed(format!("header: {}", e)))?;
        let header: RawHeader = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::Malformed(format!("header: {}", e)))?;
        match header.alg.as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            _ => Err(AuthError::UnsupportedAlgorithm(header.alg)),
        }
    }

    /// Read the claims without checking the signature or any claim.
    ///
    /// The result is untrusted and only good for choosing which secret to
    /// verify with.
    pub fn peek(&self, token: &str) -> Result<Claims, AuthError> {
        let algorithm = self.inspect(token)?;
        let mut validation = Validation::new(algorithm);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&[]),
            &validation,
        )?.claims;
        if claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(claims)
    }

    /// Verify the signature with `secret` and check every claim.
    pub fn decode(
        &self,
        token: &str,
        secret: &Secret,
    ) -> Result<Claims, AuthError> {
        let mut validation = self.validation(self.inspect(token)?);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);
        self.decode_with(token, secret, &validation)
    }

    /// Verify the signature with `secret` and check the issuer, ignoring
    /// the validity window.
    pub fn decode_ignoring_time(
        &self,
        token: &str,
        secret: &Secret,
    ) -> Result<Claims, AuthError> {
        let mut validation = self.validation(self.inspect(token)?);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims(&["iss", "sub"]);
        self.decode_with(token, secret, &validation)
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation
    }

    fn decode_with(
        &self,
        token: &str,
        secret: &Secret,
        validation: &Validation,
    ) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.expose()),
            validation,
        )?.claims;
        claims.check()?;
        Ok(claims)
    }
}
