use std::{future::Future, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::{
    claims::{now, Claims, Timestamp},
    codec::ClaimsCodec,
    config::Config,
    error::{AuthError, ConfigError, ErrorClass, StoreError},
    permission::Permission,
    store::{secret_key, Secret, SecretStore},
};

/// An Authority that issues signed, time bounded tokens, verifies them
/// against a permission requirement and revokes them.
///
/// Every subject signs with its own rotating secret kept in the
/// SecretStore. The Authority holds no mutable state; all of it lives in
/// the store, which is consulted on every call and never cached.
pub struct Authority {

    /// Where the per subject secrets live.
    store: Arc<dyn SecretStore>,

    /// Lifetimes, issuer and store timeouts.
    config: Arc<Config>,

    /// Signs and checks claims.
    codec: ClaimsCodec,

    /// Source of the current time for new claims.
    clock: fn() -> Timestamp,
}

impl Authority {

    /// Create a new Authority backed by `store`.
    pub fn new(
        store: Arc<dyn SecretStore>,
        config: Arc<Config>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = ClaimsCodec::new(&config)?;
        Ok(Authority {
            store,
            config,
            codec,
            clock: now,
        })
    }

    /// Replace the clock used to stamp new claims.
    ///
    /// Verification always checks against the system clock.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Issue a token carrying `permissions` for `subject`.
    ///
    /// The subject's secret is created if it does not exist yet and reused
    /// otherwise. Both go through `put_if_absent`, so concurrent first
    /// issuances for one subject all sign with the same secret, and the
    /// secret lives on for at least `secret_ttl` after the newest token.
    pub async fn issue(
        &self,
        subject: &str,
        permissions: Permission,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        if subject.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        let secret = self.claim_secret(subject, cancel).await
            .map_err(issuance_failure)?;
        // Sign a fresh set of claims with it.
        let claims = Claims::new(
            subject,
            permissions,
            (self.clock)(),
            self.config.token_lifetime(),
            &self.config.issuer,
        )?;
        let token = self.codec.encode(&claims, &secret)?;
        info!(subject, permissions = %permissions, exp = claims.exp, "issued token");
        Ok(token)
    }

    /// Verify `token` and report whether it carries every bit of
    /// `required`.
    ///
    /// Any failure to establish trust in the token is an error, never
    /// `Ok(false)`. `Ok(false)` means the token is genuine but lacks a
    /// permission.
    pub async fn verify(
        &self,
        token: &str,
        required: Permission,
        cancel: &CancellationToken,
    ) -> Result<bool, AuthError> {
        // The unverified claims only pick which secret to try.
        let hint = self.codec.peek(token)?;
        let subject = hint.sub.as_str();
        let secret = self.current_secret(subject, cancel).await?
            .ok_or(AuthError::UnknownSubject)
            .map_err(|e| reject(subject, e))?;
        let claims = match self.codec.decode(token, &secret) {
            Err(AuthError::BadSignature) if self.recently_issued(&hint) => {
                self.reverify(token, subject, &secret, cancel).await
            },
            other => other,
        }.map_err(|e| reject(subject, e))?;
        let allowed = claims.perm.has_all(required);
        debug!(subject, required = %required, allowed, "verified token");
        Ok(allowed)
    }

    /// Revoke every token ever issued for the subject of `token`.
    ///
    /// The token's signature must check out but it may be expired. A
    /// subject without a live secret has nothing left to revoke.
    pub async fn revoke(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        let hint = self.codec.peek(token)?;
        let subject = hint.sub.as_str();
        let secret = match self.current_secret(subject, cancel).await? {
            Some(secret) => secret,
            None => {
                debug!(subject, "nothing to revoke");
                return Ok(());
            },
        };
        self.codec.decode_ignoring_time(token, &secret)
            .map_err(|e| reject(subject, e))?;
        self.revoke_subject(subject, cancel).await
    }

    /// Delete the secret of `subject`, invalidating all of its tokens.
    pub async fn revoke_subject(
        &self,
        subject: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        let key = secret_key(subject);
        self.guard(cancel, self.store.delete(std::slice::from_ref(&key))).await?;
        info!(subject, "revoked all tokens");
        Ok(())
    }

    /// Read the live secret of `subject`. Empty secrets count as absent.
    async fn current_secret(
        &self,
        subject: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Secret>, AuthError> {
        let key = secret_key(subject);
        let mut found = self.guard(
            cancel,
            self.store.get(std::slice::from_ref(&key)),
        ).await?;
        Ok(found.remove(&key).filter(|secret| !secret.is_empty()))
    }

    /// Renew the live secret of `subject`, or create one if there is
    /// none. A racing call that created first wins.
    async fn claim_secret(
        &self,
        subject: &str,
        cancel: &CancellationToken,
    ) -> Result<Secret, AuthError> {
        let fresh = Secret::generate(self.config.secret_len).map_err(|e| {
            warn!(error = %e, "secret generation failed");
            AuthError::IssuanceFailed
        })?;
        let live = self.guard(
            cancel,
            self.store.put_if_absent(
                &secret_key(subject),
                fresh.clone(),
                self.config.secret_ttl(),
            ),
        ).await?;
        if live == fresh {
            debug!(subject, "created secret");
        } else {
            debug!(subject, "renewed secret");
        }
        Ok(live)
    }

    /// Whether the unverified claims say the token is young enough that a
    /// signature mismatch may come from a stale read of a just created
    /// secret.
    fn recently_issued(&self, hint: &Claims) -> bool {
        let now = now();
        hint.iat <= now.saturating_add(self.config.leeway_secs)
            && now.saturating_sub(hint.iat) <= self.config.mismatch_retry_secs
    }

    /// Re-read the secret once and verify again if it changed. Never
    /// re-signs.
    async fn reverify(
        &self,
        token: &str,
        subject: &str,
        tried: &Secret,
        cancel: &CancellationToken,
    ) -> Result<Claims, AuthError> {
        match self.current_secret(subject, cancel).await? {
            Some(fresh) if fresh != *tried => {
                debug!(subject, "secret changed, verifying again");
                self.codec.decode(token, &fresh)
            },
            _ => Err(AuthError::BadSignature),
        }
    }

    /// Run a store call, bounded by the store timeout and abandoned on
    /// cancellation.
    async fn guard<T, F>(
        &self,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, AuthError>
    where F: Future<Output = Result<T, StoreError>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            res = tokio::time::timeout(self.config.store_timeout(), call) => {
                match res {
                    Ok(res) => res.map_err(AuthError::from),
                    Err(_) => Err(AuthError::Timeout),
                }
            },
        }
    }
}

/// Log a failed verification and pass the error on.
fn reject(subject: &str, err: AuthError) -> AuthError {
    match err.class() {
        ErrorClass::Trust => {
            warn!(subject, error = %err, "rejected untrusted token, possible tampering");
        },
        _ => debug!(subject, error = %err, "rejected token"),
    }
    err
}

/// Collapse store failures during issuance into the opaque issuance
/// error. Timeouts and cancellations stay distinct so callers can retry.
fn issuance_failure(err: AuthError) -> AuthError {
    match err {
        AuthError::Store(e) => {
            warn!(error = %e, "issuance failed");
            AuthError::IssuanceFailed
        },
        other => other,
    }
}
