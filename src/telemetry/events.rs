use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Lifecycle notifications emitted for every proxied request.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A request arrived at the proxy.
    RequestReceived,
    /// The response came straight from the object store.
    ServedFromCache,
    /// The origin produced a successful completion.
    Generated,
    /// The origin failed: transport error or non-OK status.
    GenerationFailed,
}

/// One structured telemetry event, written as an NDJSON line.
#[derive(Debug, Serialize)]
pub struct Event {
    /// Unix epoch milliseconds.
    pub timestamp_ms: u64,
    pub kind: EventKind,
    pub method: String,
    pub path: String,
    /// HTTP User-Agent header value (empty string if absent).
    pub user_agent: String,
    /// HTTP Referer header value (empty string if absent).
    pub referer: String,
    /// Cache outcome marker (HIT/MISS/BYPASS; empty before resolution).
    pub cache_status: String,
    /// Response status, once one exists.
    pub status: Option<u16>,
    pub latency_ms: u64,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: EventKind,
        method: &str,
        path: &str,
        user_agent: &str,
        referer: &str,
        cache_status: &str,
        status: Option<u16>,
        latency_ms: u64,
    ) -> Self {
        Self {
            timestamp_ms: epoch_millis(),
            kind,
            method: method.to_string(),
            path: path.to_string(),
            user_agent: user_agent.to_string(),
            referer: referer.to_string(),
            cache_status: cache_status.to_string(),
            status,
            latency_ms,
        }
    }
}

/// Fire-and-forget telemetry sink: events go through an unbounded channel
/// to a spawned writer task that appends NDJSON lines to the configured
/// file. Emission never blocks the request path, and sink failures are
/// never surfaced to it.
pub struct EventSink {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    /// Starts the async writer. Creates the log directory if needed.
    pub fn new(log_path: &str) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();
        let path = log_path.to_string();

        tokio::spawn(async move {
            if let Some(parent) = std::path::Path::new(&path).parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }

            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await;

            match file {
                Ok(mut f) => {
                    info!("Telemetry event writer started: {}", path);
                    while let Some(event) = receiver.recv().await {
                        if let Ok(line) = serde_json::to_string(&event) {
                            let _ = f.write_all(format!("{}\n", line).as_bytes()).await;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to open telemetry event log {}: {}", path, e);
                    // Keep draining so senders never notice.
                    while receiver.recv().await.is_some() {}
                }
            }
        });

        Self { sender }
    }

    /// Non-blocking event submission. Returns immediately.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// Current time as Unix epoch milliseconds. Plain integer on purpose: no
/// format ambiguity for downstream log consumers.
pub fn epoch_millis() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
