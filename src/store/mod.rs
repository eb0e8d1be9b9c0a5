use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use serde::{Serialize, Deserialize, Serializer, Deserializer};
use std::{collections::HashMap, time::Duration};
use zeroize::Zeroizing;
use crate::{
    constant::SECRET_KEY_PREFIX,
    error::StoreError,
};

mod memory;
mod remote;

pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Derive the store key holding the secret of `subject`.
pub fn secret_key(subject: &str) -> String {
    let mut key = String::with_capacity(SECRET_KEY_PREFIX.len() + subject.len());
    key.push_str(SECRET_KEY_PREFIX);
    key.push_str(subject);
    key
}

/// A symmetric signing key. The bytes are wiped when dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {

    /// Generate `len` bytes from the operating system's RNG.
    pub fn generate(len: usize) -> Result<Self, rand::Error> {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Secret(bytes))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Secret {
    fn from(bytes: Vec<u8>) -> Self {
        Secret(Zeroizing::new(bytes))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

impl Serialize for Secret {
    fn serialize<S>(
        &self,
        serializer: S
    ) -> Result<S::Ok, S::Error> where S: Serializer {
        self.0.as_slice().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        Vec::<u8>::deserialize(deserializer).map(Secret::from)
    }
}

/// A TTL capable key/value store holding one secret per subject.
///
/// Implementations must be safe to call from many tasks at once. The
/// Authority holds no state of its own and treats the store as the only
/// source of truth.
#[async_trait]
pub trait SecretStore: Send + Sync {

    /// Fetch the live secrets for `keys`. Missing or expired keys are left
    /// out of the result.
    async fn get(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Secret>, StoreError>;

    /// Upsert `entries`, resetting their TTL.
    async fn put(
        &self,
        entries: HashMap<String, Secret>,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Store `secret` under `key` unless a live, non-empty secret is
    /// already there. Returns whichever secret is live afterwards.
    ///
    /// A live secret is kept and its TTL extended to at least `ttl` from
    /// now; it is never shortened.
    ///
    /// Must be atomic: of any number of racing calls for one key, exactly
    /// one secret wins and every caller sees it.
    async fn put_if_absent(
        &self,
        key: &str,
        secret: Secret,
        ttl: Duration,
    ) -> Result<Secret, StoreError>;

    /// Remove `keys`. Removing an absent key is not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key() {
        assert_eq!(secret_key("u1"), "secret:u1");
        assert_ne!(secret_key("u1"), secret_key("u2"));
    }

    #[test]
    fn test_generate() {
        let a = Secret::generate(32).unwrap();
        let b = Secret::generate(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = Secret::from(vec![7u8; 32]);
        assert_eq!(format!("{:?}", secret), "Secret(32 bytes)");
    }

    #[test]
    fn test_serde() {
        let secret = Secret::from(vec![1, 2, 3]);
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "[1,2,3]");
        assert_eq!(serde_json::from_str::<Secret>(&json).unwrap(), secret);
    }
}
