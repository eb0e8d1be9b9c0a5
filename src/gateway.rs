use async_trait::async_trait;
use http::{header, HeaderMap, Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::{
    authority::Authority,
    error::{AuthError, ErrorClass},
    permission::{Permission, PermissionTable},
    request::{Credential, SignInRequest, Verification},
    util::{Client, Encoding},
};

/// Decides whether a credential is valid and whom it belongs to.
///
/// Password checking lives behind this trait; the Gateway never sees how
/// it is done.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        credential: &Credential,
    ) -> Result<Verification, AuthError>;
}

/// A CredentialVerifier reached over HTTP with JSON bodies.
#[derive(Clone)]
pub struct RemoteVerifier {
    client: Client,
}

impl RemoteVerifier {
    pub fn new(host: &str) -> Self {
        RemoteVerifier {
            client: Client::new(host, Encoding::Json),
        }
    }
}

#[async_trait]
impl CredentialVerifier for RemoteVerifier {
    async fn verify(
        &self,
        credential: &Credential,
    ) -> Result<Verification, AuthError> {
        self.client.call(Method::POST, "/verify", credential).await
            .map_err(|e| AuthError::VerifierUnavailable(e.to_string()))
    }
}

/// The outward result of a Gateway operation.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {

    /// Whether the request may proceed.
    pub allowed: bool,

    /// Status for the transport to answer with.
    #[serde(skip)]
    pub status: StatusCode,

    /// Human readable explanation. Never carries internal detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// A freshly issued token, on sign in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Decision {

    fn allow(message: Option<&str>) -> Self {
        Decision {
            allowed: true,
            status: StatusCode::OK,
            message: message.map(str::to_owned),
            token: None,
        }
    }

    fn deny(status: StatusCode, message: &str) -> Self {
        Decision {
            allowed: false,
            status,
            message: Some(message.to_owned()),
            token: None,
        }
    }

    /// Translate an Authority error into what the client may see.
    ///
    /// Every input, temporal and trust failure looks the same from the
    /// outside. Only infrastructure trouble is surfaced as such.
    pub fn from_error(err: &AuthError) -> Self {
        match (err.class(), err) {
            (_, AuthError::UnrecognizedPermission(_)) => {
                Decision::deny(StatusCode::BAD_REQUEST, "unrecognized permission")
            },
            (ErrorClass::Input, _)
            | (ErrorClass::Temporal, _)
            | (ErrorClass::Trust, _) => {
                Decision::deny(StatusCode::UNAUTHORIZED, "unauthorized")
            },
            (ErrorClass::Infrastructure, _) => {
                Decision::deny(StatusCode::SERVICE_UNAVAILABLE, "try again")
            },
            (ErrorClass::Issuance, _) => {
                Decision::deny(StatusCode::INTERNAL_SERVER_ERROR, "sign in failed")
            },
        }
    }
}

/// Drives the Authority on behalf of the transport.
///
/// Signs clients in and out and gates operations on their bearer token.
/// It never looks inside a token itself.
pub struct Gateway {

    authority: Arc<Authority>,

    verifier: Arc<dyn CredentialVerifier>,

    /// Name to permission lookup for sign in and authorization requests.
    permissions: Arc<PermissionTable>,
}

impl Gateway {

    pub fn new(
        authority: Arc<Authority>,
        verifier: Arc<dyn CredentialVerifier>,
        permissions: Arc<PermissionTable>,
    ) -> Self {
        Gateway {
            authority,
            verifier,
            permissions,
        }
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    /// Check a credential and issue a token with the requested permissions.
    ///
    /// Privileged permission names are only honored for subjects the
    /// credential verifier marks as privileged.
    pub async fn sign_in(
        &self,
        req: SignInRequest,
        cancel: &CancellationToken,
    ) -> Decision {
        let verification = match self.verifier.verify(&req.credential).await {
            Ok(verification) => verification,
            Err(err) => {
                warn!(error = %err, "credential verification failed");
                return Decision::from_error(&err);
            },
        };
        if !verification.ok || verification.subject.is_empty() {
            info!(identifier = %req.credential.identifier, "rejected credential");
            return Decision::deny(StatusCode::UNAUTHORIZED, "unauthorized");
        }
        // Only the credential verifier can open the privileged table.
        let permissions = match self.permissions.resolve(
            req.permissions.as_slice(),
            verification.privileged,
        ) {
            Ok(permissions) => permissions,
            Err(err) => return Decision::from_error(&err),
        };
        match self.authority.issue(&verification.subject, permissions, cancel).await {
            Ok(token) => Decision {
                token: Some(token),
                ..Decision::allow(None)
            },
            Err(err) => Decision::from_error(&err),
        }
    }

    /// Revoke every session of the bearer.
    pub async fn sign_out(
        &self,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Decision {
        let token = match self.bearer_token(headers) {
            Some(token) => token,
            None => return Decision::deny(StatusCode::UNAUTHORIZED, "unauthorized"),
        };
        match self.authority.revoke(&token, cancel).await {
            Ok(()) => Decision::allow(Some("signed out")),
            Err(err) => Decision::from_error(&err),
        }
    }

    /// Check the bearer's token against `required`.
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        required: Permission,
        cancel: &CancellationToken,
    ) -> Decision {
        let token = match self.bearer_token(headers) {
            Some(token) => token,
            None => return Decision::deny(StatusCode::UNAUTHORIZED, "unauthorized"),
        };
        match self.authority.verify(&token, required, cancel).await {
            Ok(true) => Decision::allow(None),
            Ok(false) => Decision::deny(
                StatusCode::FORBIDDEN,
                &format!("missing permission {}", self.permissions.describe(required)),
            ),
            Err(err) => Decision::from_error(&err),
        }
    }

    /// Check the bearer's token against permissions given by name.
    ///
    /// Requirements are set by the server, so privileged names are
    /// accepted.
    pub async fn authorize_names<S: AsRef<str>>(
        &self,
        headers: &HeaderMap,
        required: &[S],
        cancel: &CancellationToken,
    ) -> Decision {
        match self.permissions.resolve(required, true) {
            Ok(required) => self.authorize(headers, required, cancel).await,
            Err(err) => Decision::from_error(&err),
        }
    }

    /// Find the bearer token in the `Authorization` header, falling back to
    /// the session cookie.
    pub fn bearer_token(&self, headers: &HeaderMap) -> Option<String> {
        let from_header = headers.get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                let (scheme, token) = v.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
            })
            .filter(|token| !token.is_empty());
        if let Some(token) = from_header {
            return Some(token.to_owned());
        }
        let cookie_name = &self.authority.config().cookie_name;
        headers.get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == cookie_name.as_str() && !value.is_empty())
            .map(|(_, value)| value.to_owned())
    }

    /// Render the cookie that carries `token` to a browser.
    pub fn session_cookie(&self, token: &str) -> String {
        let config = self.authority.config();
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Strict",
            config.cookie_name,
            token,
            config.token_lifetime_secs,
        )
    }

    /// Render a cookie that removes the session cookie.
    pub fn cleared_cookie(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Strict",
            self.authority.config().cookie_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use crate::{
        config::Config,
        error::StoreError,
        permission::{CREATE_ACCOUNT, DELETE_ACCOUNT, GRANT_PERMISSION},
        store::MemoryStore,
    };

    /// Accepts the password "open sesame" for any identifier. Only "admin"
    /// is privileged.
    struct FixedVerifier;

    #[async_trait]
    impl CredentialVerifier for FixedVerifier {
        async fn verify(
            &self,
            credential: &Credential,
        ) -> Result<Verification, AuthError> {
            Ok(Verification {
                subject: credential.identifier.clone(),
                ok: credential.secret == "open sesame",
                privileged: credential.identifier == "admin",
            })
        }
    }

    fn gateway() -> Gateway {
        let config = Arc::new(Config::default());
        let authority = Authority::new(Arc::new(MemoryStore::new()), config).unwrap();
        Gateway::new(
            Arc::new(authority),
            Arc::new(FixedVerifier),
            Arc::new(PermissionTable::standard()),
        )
    }

    fn sign_in_as(identifier: &str, secret: &str, permissions: &[&str]) -> SignInRequest {
        SignInRequest {
            credential: Credential {
                identifier: identifier.into(),
                secret: secret.into(),
            },
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn sign_in_request(secret: &str, permissions: &[&str]) -> SignInRequest {
        sign_in_as("u1", secret, permissions)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_sign_in_and_authorize() {
        let gateway = gateway();
        let cancel = CancellationToken::new();
        let decision = gateway.sign_in(sign_in_request("open sesame", &["create_account"]), &cancel).await;
        assert!(decision.allowed);
        let token = decision.token.unwrap();
        let headers = bearer(&token);
        assert!(gateway.authorize(&headers, CREATE_ACCOUNT, &cancel).await.allowed);
        let denied = gateway.authorize(&headers, CREATE_ACCOUNT | DELETE_ACCOUNT, &cancel).await;
        assert!(!denied.allowed);
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let gateway = gateway();
        let decision = gateway.sign_in(sign_in_request("guess", &[]), &CancellationToken::new()).await;
        assert!(!decision.allowed);
        assert_eq!(decision.status, StatusCode::UNAUTHORIZED);
        assert!(decision.token.is_none());
    }

    #[tokio::test]
    async fn test_unknown_permission_at_sign_in() {
        let gateway = gateway();
        let decision = gateway.sign_in(
            sign_in_request("open sesame", &["create_account", "bogus"]),
            &CancellationToken::new(),
        ).await;
        assert_eq!(decision.status, StatusCode::BAD_REQUEST);
        assert!(decision.token.is_none());
    }

    #[tokio::test]
    async fn test_privilege_is_granted_by_verifier() {
        let gateway = gateway();
        let cancel = CancellationToken::new();
        let req = sign_in_as("admin", "open sesame", &["grant_permission"]);
        let token = gateway.sign_in(req, &cancel).await.token.unwrap();
        assert!(gateway.authorize(&bearer(&token), GRANT_PERMISSION, &cancel).await.allowed);
    }

    #[tokio::test]
    async fn test_client_cannot_claim_privilege() {
        let gateway = gateway();
        let cancel = CancellationToken::new();
        let req: SignInRequest = serde_json::from_str(r#"{
            "credential": {"identifier": "u1", "secret": "open sesame"},
            "permissions": ["grant_permission"],
            "privileged": true
        }"#).unwrap();
        let decision = gateway.sign_in(req, &cancel).await;
        assert_eq!(decision.status, StatusCode::BAD_REQUEST);
        assert!(decision.token.is_none());
        let token = gateway.sign_in(sign_in_request("open sesame", &[]), &cancel).await.token.unwrap();
        let denied = gateway.authorize(&bearer(&token), GRANT_PERMISSION, &cancel).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_sign_out_revokes() {
        let gateway = gateway();
        let cancel = CancellationToken::new();
        let token = gateway.sign_in(sign_in_request("open sesame", &[]), &cancel).await.token.unwrap();
        let headers = bearer(&token);
        assert!(gateway.sign_out(&headers, &cancel).await.allowed);
        let after = gateway.authorize_names::<&str>(&headers, &[], &cancel).await;
        assert!(!after.allowed);
        assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_denials_look_alike() {
        let gateway = gateway();
        let cancel = CancellationToken::new();
        let missing = gateway.authorize(&HeaderMap::new(), CREATE_ACCOUNT, &cancel).await;
        let garbage = gateway.authorize(&bearer("not-a-token"), CREATE_ACCOUNT, &cancel).await;
        for decision in [&missing, &garbage] {
            assert_eq!(decision.status, StatusCode::UNAUTHORIZED);
            assert_eq!(decision.message.as_deref(), Some("unauthorized"));
        }
        for err in [AuthError::Expired, AuthError::BadSignature, AuthError::UnknownSubject, AuthError::WrongIssuer] {
            let decision = Decision::from_error(&err);
            assert_eq!(decision.status, StatusCode::UNAUTHORIZED);
            assert_eq!(decision.message.as_deref(), Some("unauthorized"));
        }
    }

    #[test]
    fn test_infrastructure_hides_detail() {
        let err = AuthError::Store(StoreError::Unavailable("redis://10.0.0.3:6379 refused".into()));
        let decision = Decision::from_error(&err);
        assert_eq!(decision.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(decision.message.as_deref(), Some("try again"));
    }

    #[test]
    fn test_bearer_from_cookie() {
        let gateway = gateway();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; token=abc.def.ghi"));
        assert_eq!(gateway.bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer xyz.uvw.rst"));
        assert_eq!(gateway.bearer_token(&headers).as_deref(), Some("xyz.uvw.rst"));
        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dTE6cHc="));
        assert_eq!(gateway.bearer_token(&basic), None);
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = gateway().session_cookie("abc");
        assert!(cookie.starts_with("token=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Strict"));
    }
}
