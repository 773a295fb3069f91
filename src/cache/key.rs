use http::Method;
use sha2::{Digest, Sha256};

/// Whether this method's body bytes participate in the cache key.
fn method_carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Derives the cache key for a request: `path+query`, suffixed with
/// `|<sha256-hex>` of the raw body bytes for body-bearing methods.
///
/// Purely a function of its inputs: identical (method, path, query, body)
/// always yields the identical key, and any body byte difference yields a
/// different key. Bodies are hashed as raw bytes — structurally-equal JSON
/// with reordered keys hashes differently, which is the documented product
/// decision, not a bug to fix here.
///
/// Callers that fail to buffer the request body pass `None` and get the
/// path-only key back — a degraded key, accepted rather than hidden.
pub fn derive_key(method: &Method, path_and_query: &str, body: Option<&[u8]>) -> String {
    match body {
        Some(bytes) if method_carries_body(method) => {
            let digest = Sha256::digest(bytes);
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            format!("{}|{}", path_and_query, hex)
        }
        _ => path_and_query.to_string(),
    }
}
