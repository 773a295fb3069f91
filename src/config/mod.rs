pub mod parser;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::capture::DEFAULT_STREAM_THRESHOLD;
use crate::cache::classify;

/// Top-level runtime configuration for Cachegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bind address for the proxy listener.
    pub proxy_bind: String,
    /// Tokio worker thread count.
    pub workers: usize,
    /// The generation origin this proxy fronts.
    pub origin: OriginConfig,
    /// Cache store and capture behaviour.
    pub cache: CacheConfig,
    /// Path for the NDJSON telemetry event log.
    pub events_log_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_bind: "0.0.0.0:8080".to_string(),
            workers: 4,
            origin: OriginConfig::default(),
            cache: CacheConfig::default(),
            events_log_path: "logs/events.log".to_string(),
        }
    }
}

/// Connection settings for the origin completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Always `http`; other values are refused at load time.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Max idle keepalive connections held to the origin.
    pub keepalive: usize,
    /// Optional static bearer token injected on forwarded requests.
    pub bearer_token: Option<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8081,
            keepalive: 8,
            bearer_token: None,
        }
    }
}

impl OriginConfig {
    /// Socket address string, `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value for the outbound Host header. The port is omitted when it is
    /// the protocol default.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            self.addr()
        }
    }
}

/// Which backing store to open at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Fs,
    Memory,
}

/// Cache behaviour: store selection, capture threshold, bypass prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub store_kind: StoreKind,
    /// Root directory for the filesystem store.
    pub store_root: String,
    /// Responses with a Content-Length at or below this are buffered whole;
    /// larger or unsized responses are captured streaming.
    pub stream_threshold: u64,
    /// Path prefixes that never touch the cache.
    pub bypass_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_kind: StoreKind::Fs,
            store_root: "data/cache".to_string(),
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            bypass_prefixes: classify::default_bypass_prefixes(),
        }
    }
}

/// Loads configuration from a `cachegate.conf` file. A missing or
/// unreadable file is not fatal: the built-in defaults apply and a warning
/// is logged, so the proxy always comes up.
pub fn load_config(conf_path: &str) -> AppConfig {
    let contents = match std::fs::read_to_string(conf_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                "Could not read config file {}: {} — using defaults",
                conf_path, e
            );
            return AppConfig::default();
        }
    };

    let config = build_config(parser::parse_config(&contents));
    info!(
        "Loaded config from {}: listen {}, origin {}",
        conf_path,
        config.proxy_bind,
        config.origin.addr()
    );
    config
}

/// Maps a parsed AST onto the defaults, validating directive values.
pub fn build_config(ast: parser::CachegateAst) -> AppConfig {
    let mut config = AppConfig::default();

    if let Some(threads) = ast.worker_threads {
        config.workers = threads;
    }

    if let Some(listen) = ast.listen {
        // `listen 8080;` means all interfaces; `listen 127.0.0.1:8080;`
        // is taken literally.
        config.proxy_bind = if listen.contains(':') {
            listen
        } else {
            format!("0.0.0.0:{}", listen)
        };
    }

    if let Some(path) = ast.events_log {
        config.events_log_path = path;
    }

    if let Some(origin) = ast.origin {
        let d = &origin.directives;
        if let Some(host) = d.get("host") {
            config.origin.host = host.clone();
        }
        if let Some(port) = d.get("port").and_then(|p| p.parse::<u16>().ok()) {
            config.origin.port = port;
        }
        // The origin connection is plaintext HTTP/1; anything else in the
        // scheme directive would silently downgrade, so refuse it here.
        if let Some(scheme) = d.get("scheme") {
            if scheme == "http" {
                config.origin.scheme = scheme.clone();
            } else {
                warn!(
                    "Origin scheme '{}' is not supported — only http origins can be proxied, keeping http",
                    scheme
                );
            }
        }
        if let Some(keepalive) = d.get("keepalive").and_then(|k| k.parse::<usize>().ok()) {
            config.origin.keepalive = keepalive;
        }
        if let Some(token) = d.get("bearer_token") {
            config.origin.bearer_token = Some(token.clone());
        }
    }

    if let Some(cache) = ast.cache {
        let d = &cache.directives;
        match d.get("store").map(String::as_str) {
            Some("fs") | None => {}
            Some("memory") => config.cache.store_kind = StoreKind::Memory,
            Some(other) => {
                warn!("Unknown cache store '{}' — keeping fs", other);
            }
        }
        if let Some(root) = d.get("store_root") {
            config.cache.store_root = root.clone();
        }
        if let Some(threshold) = d
            .get("stream_threshold")
            .and_then(|t| t.parse::<u64>().ok())
        {
            config.cache.stream_threshold = threshold;
        }
        if !cache.bypass.is_empty() {
            config.cache.bypass_prefixes = cache.bypass;
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config("/nonexistent/cachegate.conf");
        assert_eq!(config.proxy_bind, "0.0.0.0:8080");
        assert_eq!(config.origin.port, 8081);
        assert_eq!(config.cache.store_kind, StoreKind::Fs);
    }

    #[test]
    fn full_config_round_trip() {
        let text = r#"
            # cachegate sample
            worker_threads 2;
            listen 9090;
            events_log /tmp/events.log;

            origin {
                host gen.internal;
                port 11434;
                keepalive 16;
                bearer_token secret-token;
            }

            cache {
                store memory;
                stream_threshold 1048576;
                bypass /v1/models;
                bypass /api/tags;
            }
        "#;
        let ast = parser::parse_config(text);

        assert_eq!(ast.worker_threads, Some(2));
        assert_eq!(ast.listen.as_deref(), Some("9090"));
        assert_eq!(ast.events_log.as_deref(), Some("/tmp/events.log"));

        let origin = ast.origin.expect("origin block");
        assert_eq!(origin.directives.get("host").map(String::as_str), Some("gen.internal"));
        assert_eq!(origin.directives.get("port").map(String::as_str), Some("11434"));

        let cache = ast.cache.expect("cache block");
        assert_eq!(cache.directives.get("store").map(String::as_str), Some("memory"));
        assert_eq!(cache.bypass, vec!["/v1/models", "/api/tags"]);
    }

    #[test]
    fn bare_port_listen_binds_all_interfaces() {
        let config = build_config(parser::parse_config("listen 8088;"));
        assert_eq!(config.proxy_bind, "0.0.0.0:8088");

        let config = build_config(parser::parse_config("listen 127.0.0.1:8088;"));
        assert_eq!(config.proxy_bind, "127.0.0.1:8088");
    }

    #[test]
    fn unsupported_origin_scheme_is_refused() {
        // A `scheme https;` directive must not pass validation and then
        // silently speak cleartext: the value is rejected at load time.
        let config = build_config(parser::parse_config(
            "origin { host gen.internal; port 443; scheme https; }",
        ));
        assert_eq!(config.origin.scheme, "http");
        assert_eq!(config.origin.host, "gen.internal");
        assert_eq!(config.origin.port, 443);

        let config = build_config(parser::parse_config("origin { scheme http; }"));
        assert_eq!(config.origin.scheme, "http");
    }

    #[test]
    fn comments_and_quotes_are_tolerated() {
        let text = "listen \"127.0.0.1:8080\"; # inline note\norigin { host localhost; }";
        let ast = parser::parse_config(text);
        assert_eq!(ast.listen.as_deref(), Some("127.0.0.1:8080"));
        let origin = ast.origin.expect("origin block");
        assert_eq!(
            origin.directives.get("host").map(String::as_str),
            Some("localhost")
        );
    }
}
