use async_trait::async_trait;
use hyper::Method;
use std::{collections::HashMap, time::Duration};
use tracing::debug;
use crate::{
    error::StoreError,
    request::{ClaimRequest, DeleteRequest, GetRequest, GetResponse, PutRequest},
    util::{Client, ClientError, Encoding},
};
use super::{Secret, SecretStore};

/// A SecretStore served by the store service over HTTP.
#[derive(Clone)]
pub struct RemoteStore {
    client: Client,
}

impl RemoteStore {

    /// Create a client for the store service at `host`.
    pub fn new(host: &str) -> Self {
        RemoteStore {
            client: Client::new(host, Encoding::Velocypack),
        }
    }
}

impl From<ClientError> for StoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status(status) if status.is_client_error() => {
                StoreError::Protocol(err.to_string())
            },
            ClientError::Request(_) | ClientError::Status(_) => {
                StoreError::Unavailable(err.to_string())
            },
            ClientError::Encode(_) | ClientError::Decode => {
                StoreError::Protocol(err.to_string())
            },
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl SecretStore for RemoteStore {

    async fn get(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Secret>, StoreError> {
        let req = GetRequest { keys: keys.to_vec() };
        let resp: GetResponse = self.client
            .call(Method::POST, "/secrets/get", &req).await?;
        debug!(requested = keys.len(), found = resp.secrets.len(), "store get");
        Ok(resp.secrets)
    }

    async fn put(
        &self,
        entries: HashMap<String, Secret>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let req = PutRequest { entries, ttl_millis: millis(ttl) };
        self.client.put("/secrets", &req).await?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        secret: Secret,
        ttl: Duration,
    ) -> Result<Secret, StoreError> {
        let req = ClaimRequest {
            key: key.to_owned(),
            secret,
            ttl_millis: millis(ttl),
        };
        Ok(self.client.call(Method::POST, "/secrets/claim", &req).await?)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        let req = DeleteRequest { keys: keys.to_vec() };
        self.client.delete("/secrets", &req).await?;
        Ok(())
    }
}
