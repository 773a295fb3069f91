// Core module declarations are in lib.rs
use cachegate::*;

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The main entry point for the Cachegate caching proxy.
/// We use a standard synchronous `main` function here instead of `#[tokio::main]`
/// because we need to parse the configuration file *before* building the async
/// runtime to determine how many worker threads the runtime should use.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize Telemetry (Logging)
    telemetry::init_telemetry();

    // 2. Load Configuration (Synchronous)
    // Reads the path provided or defaults to `cachegate.conf`.
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cachegate.conf".to_string());
    let cfg = Arc::new(ArcSwap::from_pointee(config::load_config(&config_path)));

    // Snapshot the current config for components wired once at startup
    let cfg_snapshot = cfg.load_full();

    tracing::info!(
        "Starting Cachegate with {} worker threads... (Config: {})",
        cfg_snapshot.workers,
        config_path
    );

    // 3. Build Tokio Runtime
    // We dynamically allocate the number of OS threads based on `worker_threads` config.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg_snapshot.workers)
        .enable_all()
        .build()?;

    // 4. Start the Async Application Block
    rt.block_on(async {
        // --- Graceful Shutdown ---
        // A CancellationToken propagates shutdown signals to all spawned tasks.
        let shutdown_token = CancellationToken::new();

        // Spawn the shutdown signal handler (Ctrl+C / SIGTERM)
        let shutdown_token_signal = shutdown_token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received — initiating graceful shutdown...");
            shutdown_token_signal.cancel();
        });

        // --- Hot Reload (SIGHUP) ---
        reload::spawn_reload_handler(Arc::clone(&cfg), config_path.clone());

        // Object Store: durable home for captured completions.
        let store: Arc<dyn store::ObjectStore> = match cfg_snapshot.cache.store_kind {
            config::StoreKind::Fs => {
                Arc::new(store::FsStore::new(cfg_snapshot.cache.store_root.clone()))
            }
            config::StoreKind::Memory => Arc::new(store::MemoryStore::new()),
        };

        // Origin keepalive connection pool.
        let pool = Arc::new(proxy::pool::OriginPool::new(
            cfg_snapshot.origin.addr(),
            cfg_snapshot.origin.keepalive,
        ));

        // Telemetry Event Sink: NDJSON lifecycle events written to disk.
        let events = Arc::new(telemetry::events::EventSink::new(
            &cfg_snapshot.events_log_path,
        ));

        // Optional origin credential from configuration.
        let tokens: Option<Arc<dyn auth::TokenProvider>> = cfg_snapshot
            .origin
            .bearer_token
            .as_ref()
            .map(|t| Arc::new(auth::StaticToken::new(t.clone())) as Arc<dyn auth::TokenProvider>);

        // Start the Caching Proxy on the primary port.
        proxy::start_proxy(
            Arc::clone(&cfg),
            store,
            pool,
            events,
            tokens,
            shutdown_token.clone(),
        )
        .await;
    });

    Ok(())
}

/// Waits for Ctrl+C or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => { tracing::info!("Received Ctrl+C"); }
            _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("Failed to listen for Ctrl+C");
    }
}
