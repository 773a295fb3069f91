use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Supplies the bearer credential injected on requests to the origin.
///
/// One shared instance is injected where needed instead of a mutable
/// global, so deployments can swap in rotating-credential providers
/// without touching the forwarder.
pub trait TokenProvider: Send + Sync {
    /// The current token, if one is available and unexpired.
    fn token(&self) -> Option<String>;

    /// Invalidates the current credential, forcing re-provisioning.
    fn refresh(&self);
}

/// Fixed token from configuration. Never expires; `refresh` is a no-op.
pub struct StaticToken {
    value: String,
}

impl StaticToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.value.clone())
    }

    fn refresh(&self) {}
}

/// Shared token with a monotonic expiry timestamp. `set` installs a fresh
/// credential valid for `ttl`; `token` returns it only while unexpired.
pub struct ExpiringToken {
    ttl: Duration,
    state: RwLock<Option<(String, Instant)>>,
}

impl ExpiringToken {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Installs a new credential, stamped to expire `ttl` from now.
    pub fn set(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.state.write() {
            *guard = Some((token.into(), Instant::now() + self.ttl));
        }
    }
}

impl TokenProvider for ExpiringToken {
    fn token(&self) -> Option<String> {
        let guard = self.state.read().ok()?;
        match guard.as_ref() {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    fn refresh(&self) {
        if let Ok(mut guard) = self.state.write() {
            *guard = None;
        }
    }
}
