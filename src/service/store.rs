use hyper::{
    Body, Error, Method, Request, Response, Server, StatusCode,
    body::to_bytes,
    service::{make_service_fn, service_fn},
};
use serde::Serialize;
use std::{
    convert::Infallible, future::Future, net::SocketAddr, sync::Arc,
    time::Duration,
};
use tokenauth::{
    config::Config,
    constant::{MAX_TTL_SECS, PURGE_INTERVAL_MILLIS},
    error::StoreError,
    logging,
    request::{ClaimRequest, DeleteRequest, GetRequest, GetResponse, PutRequest},
    store::{MemoryStore, SecretStore},
    util::{from_bytes, status},
};
use tokio::time::interval;
use tracing::{error, info};

/// Encode a reply body, or answer 500 if it cannot be encoded.
fn reply<T: Serialize>(body: &T) -> Response<Body> {
    match velocypack::to_bytes(body) {
        Ok(bytes) => Response::new(bytes.into()),
        Err(e) => {
            error!(error = %e, "could not encode reply");
            status(StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

/// Answer a failed store call. Requests the store refused are the
/// caller's fault.
fn failure(err: StoreError) -> Response<Body> {
    match err {
        StoreError::Protocol(e) => {
            info!(error = %e, "refused store request");
            status(StatusCode::BAD_REQUEST)
        },
        StoreError::Unavailable(e) => {
            error!(error = %e, "store call failed");
            status(StatusCode::INTERNAL_SERVER_ERROR)
        },
    }
}

/// Accept a requested TTL only up to `MAX_TTL_SECS`.
fn ttl(millis: u64) -> Option<Duration> {
    let ttl = Duration::from_millis(millis);
    (ttl <= Duration::from_secs(MAX_TTL_SECS)).then(|| ttl)
}

async fn read<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Option<T> {
    let bytes = to_bytes(req.into_body()).await.ok()?;
    from_bytes(&bytes)
}

async fn handle_get(
    store: Arc<MemoryStore>,
    req: Request<Body>,
) -> Response<Body> {
    let req: GetRequest = match read(req).await {
        Some(res) => res,
        None => return status(StatusCode::BAD_REQUEST),
    };
    match store.get(&req.keys).await {
        Ok(secrets) => reply(&GetResponse { secrets }),
        Err(e) => failure(e),
    }
}

async fn handle_put(
    store: Arc<MemoryStore>,
    req: Request<Body>,
) -> Response<Body> {
    let req: PutRequest = match read(req).await {
        Some(res) => res,
        None => return status(StatusCode::BAD_REQUEST),
    };
    let ttl = match ttl(req.ttl_millis) {
        Some(ttl) => ttl,
        None => return status(StatusCode::BAD_REQUEST),
    };
    match store.put(req.entries, ttl).await {
        Ok(()) => Response::default(),
        Err(e) => failure(e),
    }
}

async fn handle_claim(
    store: Arc<MemoryStore>,
    req: Request<Body>,
) -> Response<Body> {
    let req: ClaimRequest = match read(req).await {
        Some(res) => res,
        None => return status(StatusCode::BAD_REQUEST),
    };
    let ttl = match ttl(req.ttl_millis) {
        Some(ttl) => ttl,
        None => return status(StatusCode::BAD_REQUEST),
    };
    match store.put_if_absent(&req.key, req.secret, ttl).await {
        Ok(secret) => reply(&secret),
        Err(e) => failure(e),
    }
}

async fn handle_delete(
    store: Arc<MemoryStore>,
    req: Request<Body>,
) -> Response<Body> {
    let req: DeleteRequest = match read(req).await {
        Some(res) => res,
        None => return status(StatusCode::BAD_REQUEST),
    };
    match store.delete(&req.keys).await {
        Ok(()) => Response::default(),
        Err(e) => failure(e),
    }
}

async fn handle(
    store: Arc<MemoryStore>,
    req: Request<Body>,
) -> Result<Response<Body>, Error> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/secrets/get") => Ok(handle_get(store, req).await),
        (&Method::PUT, "/secrets") => Ok(handle_put(store, req).await),
        (&Method::POST, "/secrets/claim") => Ok(handle_claim(store, req).await),
        (&Method::DELETE, "/secrets") => Ok(handle_delete(store, req).await),
        _ => Ok(status(StatusCode::NOT_FOUND)),
    }
}

/// Reclaim expired secrets forever.
async fn purge(store: Arc<MemoryStore>) {
    let mut window = interval(Duration::from_millis(PURGE_INTERVAL_MILLIS));
    // The first tick completes immediately. Get it out of the way.
    window.tick().await;
    loop {
        window.tick().await;
        store.purge_expired().await;
    }
}

/// Bind the store routes over `store` to `addr`. Returns the bound
/// address and the server to drive.
fn bind(
    addr: &SocketAddr,
    store: Arc<MemoryStore>,
) -> Result<(SocketAddr, impl Future<Output = Result<(), Error>>), Error> {
    let make_service = make_service_fn(move |_| {
        let store = Arc::clone(&store);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle(Arc::clone(&store), req)
            }))
        }
    });
    let server = Server::try_bind(addr)?.serve(make_service);
    Ok((server.local_addr(), server))
}

async fn serve(config: Config) -> Result<(), String> {
    let addr: SocketAddr = config.store_addr.parse()
        .map_err(|e| format!("bad store address {}: {}", config.store_addr, e))?;
    let store = Arc::new(MemoryStore::new());
    tokio::spawn(purge(Arc::clone(&store)));
    let (addr, server) = bind(&addr, store).map_err(|e| e.to_string())?;
    info!(%addr, "secret store listening");
    server.await.map_err(|e| e.to_string())
}

fn main() {
    logging::init(logging::DEFAULT_LEVEL);
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        },
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build();
    let result = match runtime {
        Ok(runtime) => runtime.block_on(serve(config)),
        Err(e) => Err(e.to_string()),
    };
    if let Err(e) = result {
        error!(error = %e, "secret store stopped");
        std::process::exit(1);
    }
}
