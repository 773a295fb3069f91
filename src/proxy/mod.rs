use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod client_ip;
pub mod forward;
pub mod pool;

use crate::auth::TokenProvider;
use crate::cache::capture::{self, CaptureBody, CaptureStrategy};
use crate::cache::{classify, key, CacheStatus};
use crate::config::AppConfig;
use crate::store::ObjectStore;
use crate::telemetry::events::{Event, EventKind, EventSink};
use pool::OriginPool;

/// Unified body type for everything this proxy sends or forwards.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Helper to create empty responses for error statuses (502 and friends).
fn empty_response(status: hyper::StatusCode) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .body(forward::empty_body())
        .unwrap_or_else(|_| Response::new(forward::empty_body()))
}

/// Starts the caching proxy on the configured bind address. Accepts
/// connections until the shutdown token fires; each connection is served
/// by hyper HTTP/1 on its own task.
pub async fn start_proxy(
    cfg: Arc<ArcSwap<AppConfig>>,
    store: Arc<dyn ObjectStore>,
    pool: Arc<OriginPool>,
    events: Arc<EventSink>,
    tokens: Option<Arc<dyn TokenProvider>>,
    shutdown: CancellationToken,
) {
    let bind_addr = cfg.load().proxy_bind.clone();
    let addr: SocketAddr = bind_addr.parse().expect("Invalid proxy bind address");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind proxy listener");
    info!("Cachegate listening on {} (origin: {})", addr, pool.addr());

    loop {
        // Accept new connections, or break on shutdown signal
        let (stream, peer) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(s) => s,
                    Err(e) => {
                        error!("Accept error: {}", e);
                        continue;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("Proxy shutting down gracefully — no new connections accepted.");
                break;
            }
        };

        // Config snapshot per connection: SIGHUP reloads apply to new
        // connections without disturbing in-flight ones.
        let cfg_conn = cfg.load_full();
        let store_conn = Arc::clone(&store);
        let pool_conn = Arc::clone(&pool);
        let events_conn = Arc::clone(&events);
        let tokens_conn = tokens.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req| {
                let cfg = Arc::clone(&cfg_conn);
                let store = Arc::clone(&store_conn);
                let pool = Arc::clone(&pool_conn);
                let events = Arc::clone(&events_conn);
                let tokens = tokens_conn.clone();
                async move { handle_request(req, peer, cfg, store, pool, events, tokens).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                debug!("Error serving connection from {}: {:?}", peer, e);
            }
        });
    }
}

/// The per-request cache pipeline:
/// classify → (passthrough | lookup) → (hit | miss → forward → capture).
///
/// Whatever branch runs, the bytes delivered to the client are exactly the
/// origin's (or the stored copy of them); the cache machinery only ever
/// adds diagnostic headers.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    peer: SocketAddr,
    cfg: Arc<AppConfig>,
    store: Arc<dyn ObjectStore>,
    pool: Arc<OriginPool>,
    events: Arc<EventSink>,
    tokens: Option<Arc<dyn TokenProvider>>,
) -> Result<Response<ProxyBody>, hyper::Error> {
    let start = std::time::Instant::now();

    let method = req.method().clone();
    let method_str = method.to_string();
    let path = req.uri().path().to_string();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let user_agent = header_str(&req, hyper::header::USER_AGENT);
    let referer = header_str(&req, hyper::header::REFERER);
    let original_host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let client_ip = client_ip::resolve_client_ip(req.headers(), peer);

    debug!("Handling request: {} {}", method_str, path_and_query);
    events.emit(Event::new(
        EventKind::RequestReceived,
        &method_str,
        &path,
        &user_agent,
        &referer,
        "",
        None,
        0,
    ));

    // 1. Classification — denylisted prefixes never touch the store.
    if !classify::is_cacheable(&cfg.cache.bypass_prefixes, &path) {
        debug!("Non-cacheable path {} — passthrough", path);
        let req = req.map(|b| b.boxed());
        return match forward::forward_to_origin(
            req,
            &cfg.origin,
            &pool,
            &client_ip,
            original_host.as_deref(),
            tokens.as_ref(),
        )
        .await
        {
            Ok(response) => {
                let status = response.status();
                let mut response = response.map(|b| b.boxed());
                crate::cache::mark(response.headers_mut(), CacheStatus::Bypass);
                events.emit(Event::new(
                    if status.is_success() {
                        EventKind::Generated
                    } else {
                        EventKind::GenerationFailed
                    },
                    &method_str,
                    &path,
                    &user_agent,
                    &referer,
                    CacheStatus::Bypass.as_str(),
                    Some(status.as_u16()),
                    start.elapsed().as_millis() as u64,
                ));
                Ok(response)
            }
            Err(e) => {
                error!("Failed to proxy {} {} to origin: {}", method_str, path, e);
                events.emit(Event::new(
                    EventKind::GenerationFailed,
                    &method_str,
                    &path,
                    &user_agent,
                    &referer,
                    CacheStatus::Bypass.as_str(),
                    None,
                    start.elapsed().as_millis() as u64,
                ));
                Ok(empty_response(hyper::StatusCode::BAD_GATEWAY))
            }
        };
    }

    // 2. Cache key derivation. Body-bearing methods are buffered in full so
    // the same bytes feed the hash and, on a miss, the origin. If buffering
    // fails, the key degrades to path-only rather than failing the request.
    let (mut parts, body) = req.into_parts();
    let has_body = method == Method::POST || method == Method::PUT || method == Method::PATCH;
    let (cache_key, outbound_body) = if has_body {
        match body.collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                let k = key::derive_key(&method, &path_and_query, Some(&bytes));
                (k, forward::full_body(bytes))
            }
            Err(e) => {
                warn!(
                    "Could not buffer request body for {} {}: {} — using path-only key",
                    method_str, path, e
                );
                // The body forwarded upstream is now empty; the client's
                // framing headers no longer describe it.
                forward::strip_body_framing(&mut parts.headers);
                let k = key::derive_key(&method, &path_and_query, None);
                (k, forward::empty_body())
            }
        }
    } else {
        (
            key::derive_key(&method, &path_and_query, None),
            body.boxed(),
        )
    };

    // 3. Store lookup. A store outage reports a miss and the request
    // proceeds as pure passthrough.
    if let Some(entry) = store.get(&cache_key).await {
        debug!(key = %cache_key, "Cache HIT");
        let mut response = Response::new(forward::full_body(entry));
        crate::cache::mark(response.headers_mut(), CacheStatus::Hit);
        events.emit(Event::new(
            EventKind::ServedFromCache,
            &method_str,
            &path,
            &user_agent,
            &referer,
            CacheStatus::Hit.as_str(),
            Some(200),
            start.elapsed().as_millis() as u64,
        ));
        return Ok(response);
    }

    // 4. MISS — forward to the origin.
    debug!(key = %cache_key, "Cache MISS — forwarding to origin");
    let upstream_req = Request::from_parts(parts, outbound_body);
    let response = match forward::forward_to_origin(
        upstream_req,
        &cfg.origin,
        &pool,
        &client_ip,
        original_host.as_deref(),
        tokens.as_ref(),
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to proxy {} {} to origin: {}", method_str, path, e);
            events.emit(Event::new(
                EventKind::GenerationFailed,
                &method_str,
                &path,
                &user_agent,
                &referer,
                CacheStatus::Miss.as_str(),
                None,
                start.elapsed().as_millis() as u64,
            ));
            return Ok(empty_response(hyper::StatusCode::BAD_GATEWAY));
        }
    };

    let status = response.status();

    // 5. Capture decision: non-OK upstream responses pass through verbatim
    // and never reach the store; OK responses pick a capture strategy from
    // the response size signal.
    let content_length = response
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let strategy =
        match capture::capture_decision(status, content_length, cfg.cache.stream_threshold) {
            Some(strategy) => strategy,
            None => {
                debug!(key = %cache_key, status = %status, "Origin returned non-OK — not caching");
                events.emit(Event::new(
                    EventKind::GenerationFailed,
                    &method_str,
                    &path,
                    &user_agent,
                    &referer,
                    CacheStatus::Miss.as_str(),
                    Some(status.as_u16()),
                    start.elapsed().as_millis() as u64,
                ));
                return Ok(response.map(|b| b.boxed()));
            }
        };

    let generated_event = Event::new(
        EventKind::Generated,
        &method_str,
        &path,
        &user_agent,
        &referer,
        CacheStatus::Miss.as_str(),
        Some(status.as_u16()),
        start.elapsed().as_millis() as u64,
    );

    // 6. Capture.
    match strategy {
        CaptureStrategy::Buffered => {
            // Bounded body: collect it once, answer the client from the
            // buffer, and persist the same buffer out-of-band.
            let (mut parts, body) = response.into_parts();
            match body.collect().await {
                Ok(collected) => {
                    let bytes = collected.to_bytes();
                    capture::persist_buffered(&store, &cache_key, bytes.clone());
                    crate::cache::mark(&mut parts.headers, CacheStatus::Miss);
                    events.emit(generated_event);
                    Ok(Response::from_parts(parts, forward::full_body(bytes)))
                }
                Err(e) => {
                    error!(key = %cache_key, "Origin body read failed: {}", e);
                    events.emit(Event::new(
                        EventKind::GenerationFailed,
                        &method_str,
                        &path,
                        &user_agent,
                        &referer,
                        CacheStatus::Miss.as_str(),
                        Some(status.as_u16()),
                        start.elapsed().as_millis() as u64,
                    ));
                    Ok(empty_response(hyper::StatusCode::BAD_GATEWAY))
                }
            }
        }
        CaptureStrategy::Streaming => {
            // Open-ended body: tee it. The client sees the origin's chunks
            // live; the copy is persisted only on clean completion.
            let (mut parts, body) = response.into_parts();
            crate::cache::mark(&mut parts.headers, CacheStatus::Miss);
            events.emit(generated_event);
            let tee = CaptureBody::new(body, cache_key, Arc::clone(&store));
            Ok(Response::from_parts(parts, tee.boxed()))
        }
    }
}

fn header_str(req: &Request<hyper::body::Incoming>, name: hyper::header::HeaderName) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
