/// Default never-cacheable path prefixes: model listings, live event feeds,
/// and registration endpoints. Overridable via `bypass` directives in the
/// `cache { ... }` config block.
pub fn default_bypass_prefixes() -> Vec<String> {
    vec![
        "/v1/models".to_string(),
        "/api/tags".to_string(),
        "/api/events".to_string(),
        "/api/register".to_string(),
    ]
}

/// Returns true when the request path may be served from / written to the
/// cache. Requests matching a bypass prefix never touch the store at all.
pub fn is_cacheable(bypass_prefixes: &[String], path: &str) -> bool {
    !bypass_prefixes.iter().any(|p| path.starts_with(p.as_str()))
}
