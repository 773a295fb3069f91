pub mod capture;
pub mod classify;
pub mod key;

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Diagnostic header carrying the cache outcome for the request.
pub const CACHE_STATUS_HEADER: &str = "x-cachegate-cache";
/// Diagnostic header naming the matching strategy (always exact-match).
pub const CACHE_STRATEGY_HEADER: &str = "x-cachegate-strategy";

/// Cache outcome attached to every proxied response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the object store; the origin was never called.
    Hit,
    /// Forwarded to the origin; capture/persistence ran out-of-band.
    Miss,
    /// Denylisted path prefix; the store was never consulted.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// Attaches the diagnostic cache headers. This is the only mutation the
/// cache layer is allowed to make to a response — body bytes and timing are
/// never touched.
pub fn mark(headers: &mut HeaderMap, status: CacheStatus) {
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(status.as_str()),
    );
    if status != CacheStatus::Bypass {
        headers.insert(
            HeaderName::from_static(CACHE_STRATEGY_HEADER),
            HeaderValue::from_static("exact"),
        );
    }
}
