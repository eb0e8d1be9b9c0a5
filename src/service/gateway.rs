use hyper::{
    Body, Error, Method, Request, Response, Server, StatusCode,
    body::to_bytes,
    header::{CONTENT_TYPE, SET_COOKIE},
    service::{make_service_fn, service_fn},
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokenauth::{
    authority::Authority,
    config::Config,
    gateway::{Decision, Gateway, RemoteVerifier},
    logging,
    permission::PermissionTable,
    request::{AuthorizeRequest, SignInRequest},
    store::RemoteStore,
    util::{from_json, status},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Render a Decision as a JSON response, optionally setting a cookie.
fn respond(decision: Decision, cookie: Option<String>) -> Response<Body> {
    let body = match serde_json::to_vec(&decision) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "could not encode decision");
            return status(StatusCode::INTERNAL_SERVER_ERROR);
        },
    };
    let mut builder = Response::builder()
        .status(decision.status)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(SET_COOKIE, cookie);
    }
    builder.body(Body::from(body))
        .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR))
}

async fn handle_sign_in(
    gateway: Arc<Gateway>,
    req: Request<Body>,
    cancel: &CancellationToken,
) -> Response<Body> {
    let bytes = match to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(_) => return status(StatusCode::BAD_REQUEST),
    };
    let req: SignInRequest = match from_json(&bytes) {
        Some(res) => res,
        None => return status(StatusCode::BAD_REQUEST),
    };
    let decision = gateway.sign_in(req, cancel).await;
    let cookie = decision.token.as_deref().map(|t| gateway.session_cookie(t));
    respond(decision, cookie)
}

async fn handle_sign_out(
    gateway: Arc<Gateway>,
    req: Request<Body>,
    cancel: &CancellationToken,
) -> Response<Body> {
    let decision = gateway.sign_out(req.headers(), cancel).await;
    let cookie = decision.allowed.then(|| gateway.cleared_cookie());
    respond(decision, cookie)
}

async fn handle_authorize(
    gateway: Arc<Gateway>,
    req: Request<Body>,
    cancel: &CancellationToken,
) -> Response<Body> {
    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(_) => return status(StatusCode::BAD_REQUEST),
    };
    // An empty body requires no permission at all.
    let required: AuthorizeRequest = if bytes.is_empty() {
        AuthorizeRequest::default()
    } else {
        match from_json(&bytes) {
            Some(res) => res,
            None => return status(StatusCode::BAD_REQUEST),
        }
    };
    let decision = gateway
        .authorize_names(&parts.headers, &required.permissions, cancel)
        .await;
    respond(decision, None)
}

async fn handle(
    gateway: Arc<Gateway>,
    req: Request<Body>,
) -> Result<Response<Body>, Error> {
    // Store calls still in flight are abandoned if hyper drops this
    // request, e.g. because the client went away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/signin") => Ok(handle_sign_in(gateway, req, &cancel).await),
        (&Method::POST, "/signout") => Ok(handle_sign_out(gateway, req, &cancel).await),
        (&Method::POST, "/authorize") => Ok(handle_authorize(gateway, req, &cancel).await),
        _ => Ok(status(StatusCode::NOT_FOUND)),
    }
}

async fn serve(config: Arc<Config>) -> Result<(), String> {
    let addr: SocketAddr = config.gateway_addr.parse()
        .map_err(|e| format!("bad gateway address {}: {}", config.gateway_addr, e))?;
    let store = Arc::new(RemoteStore::new(&config.store_addr));
    let authority = Authority::new(store, Arc::clone(&config))
        .map_err(|e| e.to_string())?;
    let gateway = Arc::new(Gateway::new(
        Arc::new(authority),
        Arc::new(RemoteVerifier::new(&config.verifier_addr)),
        Arc::new(PermissionTable::standard()),
    ));
    let make_service = make_service_fn(move |_| {
        let gateway = Arc::clone(&gateway);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle(Arc::clone(&gateway), req)
            }))
        }
    });
    info!(%addr, issuer = %config.issuer, "gateway listening");
    Server::try_bind(&addr)
        .map_err(|e| e.to_string())?
        .serve(make_service)
        .await
        .map_err(|e| e.to_string())
}

fn main() {
    logging::init(logging::DEFAULT_LEVEL);
    let config = match Config::load() {
        Ok(config) => Arc::new(config),
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
        error!(error = %e, "gateway stopped");
        std::process::exit(1);
    }
}
