use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Request, Response, Uri};
use tracing::warn;

use crate::auth::TokenProvider;
use crate::config::OriginConfig;

use super::pool::OriginPool;
use super::ProxyBody;

/// Boxes a fully-buffered payload as an outbound request body.
pub fn full_body(bytes: Bytes) -> ProxyBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Boxes an empty outbound request body.
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// Removes the body framing headers. Required whenever the forwarded body
/// is not the one the client sent (e.g. it was replaced with an empty body
/// after a buffering failure): a stale `Content-Length` would leave the
/// origin waiting for bytes that never arrive.
pub fn strip_body_framing(headers: &mut http::HeaderMap) {
    headers.remove(hyper::header::CONTENT_LENGTH);
    headers.remove(hyper::header::TRANSFER_ENCODING);
}

/// Rewrites and forwards a request to the origin, returning the raw
/// upstream response.
///
/// Method, path, query, headers, and body pass through untouched apart
/// from: the target/Host rewrite, the forwarding headers
/// (`x-forwarded-for` appended, `x-forwarded-host`, `x-real-ip`), and an
/// optional origin bearer token. No caching decision happens here — the
/// caller owns that.
pub async fn forward_to_origin(
    mut req: Request<ProxyBody>,
    origin: &OriginConfig,
    pool: &OriginPool,
    client_ip: &str,
    original_host: Option<&str>,
    tokens: Option<&Arc<dyn TokenProvider>>,
) -> std::io::Result<Response<hyper::body::Incoming>> {
    // Origin-form target for the HTTP/1 upstream: path + query only.
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    *req.uri_mut() = path_and_query
        .parse::<Uri>()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // The Host header must name the origin, not this proxy.
    if let Ok(host) = HeaderValue::from_str(&origin.host_header()) {
        req.headers_mut().insert(hyper::header::HOST, host);
    }

    // Forwarding headers from the resolved client IP.
    let forwarded_for = match req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, client_ip),
        _ => client_ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&forwarded_for) {
        req.headers_mut()
            .insert(HeaderName::from_static("x-forwarded-for"), v);
    }
    if let Ok(v) = HeaderValue::from_str(client_ip) {
        req.headers_mut()
            .insert(HeaderName::from_static("x-real-ip"), v);
    }
    if let Some(host) = original_host {
        if let Ok(v) = HeaderValue::from_str(host) {
            req.headers_mut()
                .insert(HeaderName::from_static("x-forwarded-host"), v);
        }
    }

    // Origin credential, when a provider is configured.
    if let Some(provider) = tokens {
        match provider.token() {
            Some(token) => {
                if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                    req.headers_mut().insert(hyper::header::AUTHORIZATION, v);
                }
            }
            None => warn!("Token provider returned no credential — forwarding without one"),
        }
    }

    let mut sender = pool.acquire().await?;
    let response = sender
        .send_request(req)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e))?;

    // Hand the sender back; if it is still draining this response it will
    // fail the readiness check on its next checkout and be discarded there.
    pool.release(sender).await;

    Ok(response)
}
