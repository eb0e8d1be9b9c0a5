use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use crate::store::Secret;

/// A request for the live secrets under `keys`.
#[derive(Deserialize, Serialize)]
pub struct GetRequest {
    pub keys: Vec<String>,
}

/// The live secrets found for a GetRequest.
#[derive(Deserialize, Serialize)]
pub struct GetResponse {
    pub secrets: HashMap<String, Secret>,
}

/// A request to upsert secrets.
#[derive(Deserialize, Serialize)]
pub struct PutRequest {

    pub entries: HashMap<String, Secret>,

    /// Time to live of every entry, in milliseconds.
    pub ttl_millis: u64,
}

/// A request to store a secret unless one is already live.
///
/// Answered with the secret that is live afterwards.
#[derive(Deserialize, Serialize)]
pub struct ClaimRequest {

    pub key: String,

    /// The secret to store if the key is vacant.
    pub secret: Secret,

    /// Time to live of the entry, in milliseconds.
    pub ttl_millis: u64,
}

/// A request to remove secrets.
#[derive(Deserialize, Serialize)]
pub struct DeleteRequest {
    pub keys: Vec<String>,
}

/// Something a client presents to prove who it is.
///
/// Opaque to the Authority; only the external credential verifier looks
/// inside.
#[derive(Deserialize, Serialize, Clone)]
pub struct Credential {

    /// Account name or email address.
    pub identifier: String,

    /// Password or equivalent proof.
    pub secret: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// The credential verifier's answer.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Verification {

    /// The subject the credential belongs to.
    pub subject: String,

    /// Whether the credential is valid.
    pub ok: bool,

    /// Whether the subject may be granted privileged permissions.
    #[serde(default)]
    pub privileged: bool,
}

/// A request to sign in and obtain a token.
#[derive(Deserialize, Serialize, Debug)]
pub struct SignInRequest {

    pub credential: Credential,

    /// Names of the permissions the token should carry.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A request to check the bearer token against a set of permissions.
#[derive(Deserialize, Serialize, Debug, Default)]
pub struct AuthorizeRequest {

    /// Names of the permissions required.
    #[serde(default)]
    pub permissions: Vec<String>,
}
