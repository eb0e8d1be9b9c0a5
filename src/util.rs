use hyper::{
    Body,
    Client as HyperClient,
    Method,
    Response,
    Request,
    StatusCode,
    body::{to_bytes, Bytes},
    client::connect::HttpConnector,
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Decode a velocypack body.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    velocypack::from_bytes(bytes).ok()
}

/// Decode a JSON body.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    serde_json::from_slice(bytes).ok()
}

/// Build an empty response with the given status.
pub fn status(code: StatusCode) -> Response<Body> {
    let mut resp = Response::default();
    *resp.status_mut() = code;
    resp
}

/// Body encoding spoken by a peer service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Velocypack,
    Json,
}

impl Encoding {

    pub fn encode<T: Serialize>(&self, body: &T) -> Result<Vec<u8>, ClientError> {
        match self {
            Encoding::Velocypack => velocypack::to_bytes(body)
                .map_err(|e| ClientError::Encode(e.to_string())),
            Encoding::Json => serde_json::to_vec(body)
                .map_err(|e| ClientError::Encode(e.to_string())),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ClientError> {
        let decoded = match self {
            Encoding::Velocypack => from_bytes(bytes),
            Encoding::Json => from_json(bytes),
        };
        decoded.ok_or(ClientError::Decode)
    }
}

/// Failure of a request to a peer service.
#[derive(Debug, Error)]
pub enum ClientError {

    #[error("request error: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("could not encode request: {0}")]
    Encode(String),

    #[error("could not decode response")]
    Decode,
}

/// A small HTTP client bound to one peer service.
#[derive(Clone)]
pub struct Client {
    client: HyperClient<HttpConnector, Body>,
    base: String,
    encoding: Encoding,
}

impl Client {

    pub fn new(host: &str, encoding: Encoding) -> Client {
        let mut base = String::new();
        base.push_str("http://");
        base.push_str(host);
        Client {
            client: HyperClient::new(),
            base,
            encoding,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Send `body` to `path` and return the response body of a 200 reply.
    pub async fn send<T>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<Bytes, ClientError>
    where T: Serialize {
        let mut uri = self.base.clone();
        uri.push_str(path);
        let data = self.encoding.encode(body)?;
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(data))
            .map_err(|e| ClientError::Request(e.to_string()))?;
        let resp = self.client.request(req).await
            .map_err(|e| ClientError::Request(e.to_string()))?;
        match resp.status() {
            StatusCode::OK => to_bytes(resp.into_body()).await
                .map_err(|e| ClientError::Request(e.to_string())),
            x => Err(ClientError::Status(x)),
        }
    }

    /// Send `body` and decode the reply.
    pub async fn call<T, R>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<R, ClientError>
    where T: Serialize, R: DeserializeOwned {
        let bytes = self.send(method, path, body).await?;
        self.encoding.decode(&bytes)
    }

    pub async fn post<T>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Bytes, ClientError>
    where T: Serialize {
        self.send(Method::POST, path, body).await
    }

    pub async fn put<T>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Bytes, ClientError>
    where T: Serialize {
        self.send(Method::PUT, path, body).await
    }

    pub async fn delete<T>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Bytes, ClientError>
    where T: Serialize {
        self.send(Method::DELETE, path, body).await
    }
}
