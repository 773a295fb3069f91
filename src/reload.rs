use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Spawns a background task that listens for SIGHUP (Unix) signals.
/// On SIGHUP, it re-reads `cachegate.conf`, parses it into a new `AppConfig`,
/// and atomically swaps the shared configuration pointer via `ArcSwap`.
///
/// New connections pick up the swapped config; in-flight requests keep the
/// snapshot they started with.
pub fn spawn_reload_handler(config: Arc<ArcSwap<crate::config::AppConfig>>, conf_path: String) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sighup =
                signal(SignalKind::hangup()).expect("Failed to register SIGHUP handler");

            loop {
                sighup.recv().await;
                info!("SIGHUP received — reloading configuration...");

                let new_config = crate::config::load_config(&conf_path);
                info!(
                    "Config reloaded: {} workers, origin {}, {} bypass prefixes",
                    new_config.workers,
                    new_config.origin.addr(),
                    new_config.cache.bypass_prefixes.len(),
                );

                config.store(Arc::new(new_config));
                info!("Configuration swap complete (zero-downtime reload).");
            }
        }

        #[cfg(not(unix))]
        {
            // On non-Unix platforms, SIGHUP is not available.
            // The hot-reload feature is disabled.
            tracing::warn!("Hot reload (SIGHUP) is only supported on Unix platforms.");
            let _config = config; // suppress unused warning
            std::future::pending::<()>().await;
        }
    });
}
