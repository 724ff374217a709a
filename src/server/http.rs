//! HTTP server implementation
//!
//! hyper http1 with TokioIo for async handling. All components are
//! explicitly constructed here and injected into the shared state; nothing
//! is fetched from globals, so a second state with different backends can
//! exist side by side (which is exactly what the tests do).

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::NonceAuthority;
use crate::config::Args;
use crate::ledger::{MemoryVotes, MongoVotes, TrendWeights, VoteStore};
use crate::limits::{DailyQuotaGate, RateLimiter};
use crate::routes;
use crate::services::{
    HttpImageGenerator, ImageGenerator, MemoryObjectStore, ObjectStore, StubImageGenerator,
    SystemTokenSource, TokenSource,
};
use crate::store::{memory::spawn_cleanup_task, AtomicKv, MemoryKv, MongoClient, MongoKv};
use crate::types::{Result, TurnstileError};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Request bodies larger than this are rejected without parsing
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub nonces: NonceAuthority,
    pub rate: RateLimiter,
    pub quota: DailyQuotaGate,
    pub votes: Arc<dyn VoteStore>,
    pub images: Arc<dyn ImageGenerator>,
    pub objects: Arc<dyn ObjectStore>,
    pub tokens: Arc<dyn TokenSource>,
    pub trend: TrendWeights,
    pub started: Instant,
    /// Kept when the KV backend is in-memory, so `run` can start its sweep
    memory_kv: Option<Arc<MemoryKv>>,
}

impl AppState {
    /// Dev-mode state: in-memory stores and a stub image provider
    pub fn in_memory(args: Args) -> Self {
        let kv = Arc::new(MemoryKv::new());
        let kv_dyn: Arc<dyn AtomicKv> = kv.clone();
        let tokens: Arc<dyn TokenSource> = Arc::new(SystemTokenSource);

        Self {
            nonces: NonceAuthority::new(
                Arc::clone(&kv_dyn),
                Arc::clone(&tokens),
                args.nonce_ttl_seconds,
            ),
            rate: RateLimiter::new(Arc::clone(&kv_dyn), args.rate_limit_per_minute),
            quota: DailyQuotaGate::new(
                kv_dyn,
                std::time::Duration::from_secs(args.daily_quota_ttl_seconds),
            ),
            votes: Arc::new(MemoryVotes::new()),
            images: Arc::new(StubImageGenerator),
            objects: Arc::new(MemoryObjectStore::new()),
            tokens,
            trend: args.trend_weights(),
            started: Instant::now(),
            memory_kv: Some(kv),
            mongo: None,
            args,
        }
    }

    /// Production state: MongoDB-backed KV and ledger, HTTP image provider
    pub async fn with_mongo(args: Args, mongo: MongoClient) -> Result<Self> {
        let kv: Arc<dyn AtomicKv> = Arc::new(MongoKv::new(&mongo).await?);
        let votes: Arc<dyn VoteStore> = Arc::new(
            MongoVotes::new(&mongo)
                .await
                .map_err(TurnstileError::from)?,
        );
        let tokens: Arc<dyn TokenSource> = Arc::new(SystemTokenSource);

        let endpoint = args.image_provider_url.as_deref().ok_or_else(|| {
            TurnstileError::Config("IMAGE_PROVIDER_URL is required in production mode".to_string())
        })?;
        let images: Arc<dyn ImageGenerator> =
            Arc::new(HttpImageGenerator::new(endpoint, args.request_timeout_ms)?);

        Ok(Self {
            nonces: NonceAuthority::new(
                Arc::clone(&kv),
                Arc::clone(&tokens),
                args.nonce_ttl_seconds,
            ),
            rate: RateLimiter::new(Arc::clone(&kv), args.rate_limit_per_minute),
            quota: DailyQuotaGate::new(
                Arc::clone(&kv),
                std::time::Duration::from_secs(args.daily_quota_ttl_seconds),
            ),
            votes,
            images,
            // The external object storage product sits behind this trait;
            // the in-process store stands in for it here.
            objects: Arc::new(MemoryObjectStore::new()),
            tokens,
            trend: args.trend_weights(),
            started: Instant::now(),
            memory_kv: None,
            mongo: Some(mongo),
            args,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Turnstile listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    info!(
        "Nonce TTL {}s, rate limit {}/min",
        state.nonces.ttl_seconds(),
        state.rate.limit_per_window()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory stores, stub image provider");
    }

    if let Some(ref kv) = state.memory_kv {
        spawn_cleanup_task(Arc::clone(kv));
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let client_ip = client_ip(&req, addr);

    debug!("[{}] {} {}", client_ip, method, path);

    // Card subresources: /cards/{id}, /cards/{id}/image, /cards/{id}/vote
    if let Some(rest) = path.strip_prefix("/cards/") {
        if rest.is_empty() {
            return Ok(to_boxed(not_found_response(&path)));
        }
        let response = match rest.split_once('/') {
            None if method == Method::GET => {
                to_boxed(routes::handle_get_card(state, rest).await)
            }
            Some((id, "image")) if method == Method::GET => {
                let if_none_match = req
                    .headers()
                    .get(header::IF_NONE_MATCH)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                to_boxed(routes::handle_card_image(state, id, if_none_match.as_deref()).await)
            }
            Some((id, "vote")) if method == Method::POST => {
                let id = id.to_string();
                let body = match read_body(req).await {
                    Ok(body) => body,
                    Err(response) => return Ok(response),
                };
                to_boxed(routes::handle_vote(state, &id, body).await)
            }
            _ if method == Method::OPTIONS => to_boxed(preflight_response()),
            _ => to_boxed(not_found_response(&path)),
        };
        return Ok(response);
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(state))
        }

        // Readiness probe - checks the backing store
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            to_boxed(routes::readiness_check(state).await)
        }

        // Version info for deployment verification
        (Method::GET, "/version") => to_boxed(routes::version_info()),

        // Challenge issuance (unauthenticated, rate limited)
        (Method::GET, "/auth/challenge") => {
            to_boxed(routes::handle_challenge(state, &query, &client_ip).await)
        }

        // Card listing
        (Method::GET, "/cards") => to_boxed(routes::handle_list_cards(state, &query).await),

        // Wallet-gated card generation
        (Method::POST, "/generate") => {
            let body = match read_body(req).await {
                Ok(body) => body,
                Err(response) => return Ok(response),
            };
            to_boxed(routes::handle_generate(state, body, &client_ip).await)
        }

        // CORS preflight
        (Method::OPTIONS, _) => to_boxed(preflight_response()),

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

/// Client IP from x-forwarded-for, falling back to the socket address
fn client_ip(req: &Request<Incoming>, addr: SocketAddr) -> String {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

/// Collect a request body, rejecting oversized payloads before parsing
async fn read_body(req: Request<Incoming>) -> std::result::Result<Bytes, Response<BoxBody>> {
    let declared_len = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > MAX_BODY_BYTES) {
        return Err(to_boxed(routes::error_response(
            &TurnstileError::BadRequest("request body too large".to_string()),
        )));
    }

    match req.into_body().collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            if bytes.len() > MAX_BODY_BYTES {
                return Err(to_boxed(routes::error_response(
                    &TurnstileError::BadRequest("request body too large".to_string()),
                )));
            }
            Ok(bytes)
        }
        Err(_) => Err(to_boxed(routes::error_response(
            &TurnstileError::BadRequest("failed to read request body".to_string()),
        ))),
    }
}

fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_response(&TurnstileError::NotFound(format!("no route for {}", path)))
}

fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, If-None-Match")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}
