/// Origin keepalive connection pool.
///
/// Maintains a queue of idle HTTP/1 senders to the origin so repeat misses
/// skip the TCP handshake.
///
/// Behaviour:
/// - `acquire()` — pops idle senders until a ready one turns up; opens a
///   fresh connection when the queue runs dry.
/// - `release()` — pushes the sender back if the queue is not full. A sender
///   still busy driving a streaming response simply fails the readiness
///   check on its next checkout and gets dropped there.
/// - When `max_idle == 0`, pooling is disabled and every call connects fresh.
use std::collections::VecDeque;

use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use super::ProxyBody;

pub struct OriginPool {
    addr: String,
    /// Maximum idle senders kept around (0 = pooling disabled).
    max_idle: usize,
    idle: Mutex<VecDeque<SendRequest<ProxyBody>>>,
}

impl OriginPool {
    pub fn new(addr: String, max_idle: usize) -> Self {
        Self {
            addr,
            max_idle,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Acquire a ready sender to the origin, reusing an idle keepalive
    /// connection when one is available.
    pub async fn acquire(&self) -> std::io::Result<SendRequest<ProxyBody>> {
        if self.max_idle > 0 {
            let mut guard = self.idle.lock().await;
            while let Some(sender) = guard.pop_front() {
                if sender.is_ready() {
                    debug!(origin = %self.addr, "Reusing pooled origin connection");
                    return Ok(sender);
                }
                // Closed, or still mid-response on its previous request — drop it.
            }
        }
        self.connect().await
    }

    /// Return a sender to the pool after use. Dropped if pooling is
    /// disabled or the queue is full.
    pub async fn release(&self, sender: SendRequest<ProxyBody>) {
        if self.max_idle == 0 {
            return;
        }
        let mut guard = self.idle.lock().await;
        if guard.len() < self.max_idle {
            guard.push_back(sender);
        }
    }

    async fn connect(&self) -> std::io::Result<SendRequest<ProxyBody>> {
        debug!(origin = %self.addr, "Opening new origin connection");
        let stream = TcpStream::connect(&self.addr).await?;
        let io = TokioIo::new(stream);
        let (sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e))?;

        // Drive the connection until it closes.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Origin connection ended: {:?}", e);
            }
        });

        Ok(sender)
    }
}
