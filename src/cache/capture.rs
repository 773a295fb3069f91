use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use tracing::{debug, warn};

use crate::store::ObjectStore;

/// Responses with a declared length above this (or no declared length at
/// all) go through the streaming tee instead of full buffering. 10 MiB.
pub const DEFAULT_STREAM_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Which capture path an OK upstream response takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// Declared length at or below the threshold: collect fully, then serve
    /// client and store from the same buffer.
    Buffered,
    /// No declared length, or declared length above the threshold: tee the
    /// live stream and persist only after clean completion.
    Streaming,
}

/// Picks the capture strategy from the response size signal. The threshold
/// selects a strategy only — a streaming response still accumulates fully
/// in memory before its single store write.
pub fn choose_strategy(content_length: Option<u64>, threshold: u64) -> CaptureStrategy {
    match content_length {
        Some(len) if len <= threshold => CaptureStrategy::Buffered,
        _ => CaptureStrategy::Streaming,
    }
}

/// The full post-forward caching decision: `None` means the response passes
/// through verbatim and nothing reaches the store. Only successful origin
/// responses are captured; error and redirect statuses are relayed as-is so
/// a transient failure can never be pinned into the cache.
pub fn capture_decision(
    status: http::StatusCode,
    content_length: Option<u64>,
    threshold: u64,
) -> Option<CaptureStrategy> {
    if !status.is_success() {
        return None;
    }
    Some(choose_strategy(content_length, threshold))
}

enum CaptureState {
    /// Still relaying; chunks are accumulating.
    Capturing,
    /// Clean end of stream seen; the store write has been scheduled.
    Flushed,
    /// Upstream errored mid-stream; nothing will ever be persisted.
    Poisoned,
}

/// Passive tee on an open-ended response body.
///
/// Every frame from the upstream body is forwarded downstream unchanged —
/// same bytes, same frame boundaries, no added latency — while data frames
/// are also appended (cheap `Bytes` refcount clones) to an ordered chunk
/// list. Only when the upstream stream ends cleanly is the accumulated copy
/// concatenated and handed to a background task for persistence.
///
/// If the upstream errors, or the body is dropped before end-of-stream
/// (client disconnect), the completion handler never fires and no partial
/// entry reaches the store.
pub struct CaptureBody<B> {
    inner: B,
    key: String,
    store: Arc<dyn ObjectStore>,
    chunks: Vec<Bytes>,
    captured_bytes: u64,
    state: CaptureState,
}

impl<B> CaptureBody<B> {
    pub fn new(inner: B, key: String, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            key,
            store,
            chunks: Vec::new(),
            captured_bytes: 0,
            state: CaptureState::Capturing,
        }
    }

    /// Clean end of stream: concatenate the captured chunks and schedule the
    /// store write out-of-band. The client's response cycle is already over
    /// (or still draining) — the write must not block it, and it runs to
    /// completion even if the client has gone away.
    fn flush(&mut self) {
        if !matches!(self.state, CaptureState::Capturing) {
            return;
        }
        self.state = CaptureState::Flushed;

        if self.captured_bytes == 0 {
            debug!(key = %self.key, "Empty capture — nothing persisted");
            return;
        }

        let chunks = std::mem::take(&mut self.chunks);
        let mut payload = BytesMut::with_capacity(self.captured_bytes as usize);
        for chunk in &chunks {
            payload.extend_from_slice(chunk);
        }
        let payload = payload.freeze();

        let key = self.key.clone();
        let store = Arc::clone(&self.store);
        debug!(key = %key, bytes = payload.len(), "Stream complete — persisting capture");
        tokio::spawn(async move {
            store.put(&key, payload).await;
        });
    }

    fn poison(&mut self) {
        if matches!(self.state, CaptureState::Capturing) {
            warn!(key = %self.key, "Upstream stream errored — capture discarded");
            self.state = CaptureState::Poisoned;
            self.chunks.clear();
        }
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    if matches!(this.state, CaptureState::Capturing) {
                        this.captured_bytes += data.len() as u64;
                        this.chunks.push(data.clone());
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.poison();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.flush();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for CaptureBody<B> {
    fn drop(&mut self) {
        if matches!(self.state, CaptureState::Capturing) && self.captured_bytes > 0 {
            debug!(
                key = %self.key,
                bytes = self.captured_bytes,
                "Capture dropped before end of stream — nothing persisted"
            );
        }
    }
}

/// Buffered-path persistence: the full body is already in memory, so just
/// schedule the background write. Empty payloads are skipped, matching the
/// streaming path.
pub fn persist_buffered(store: &Arc<dyn ObjectStore>, key: &str, body: Bytes) {
    if body.is_empty() {
        debug!(key = %key, "Empty response body — nothing persisted");
        return;
    }
    let store = Arc::clone(store);
    let key = key.to_string();
    tokio::spawn(async move {
        store.put(&key, body).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use http_body_util::BodyExt;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Test body that plays back a fixed script of data frames and errors.
    struct ScriptedBody {
        frames: VecDeque<Result<Bytes, std::io::Error>>,
    }

    impl ScriptedBody {
        fn new(chunks: &[&str]) -> Self {
            Self {
                frames: chunks
                    .iter()
                    .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
                    .collect(),
            }
        }

        fn with_error_after(chunks: &[&str]) -> Self {
            let mut body = Self::new(chunks);
            body.frames.push_back(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upstream reset",
            )));
            body
        }
    }

    impl Body for ScriptedBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, std::io::Error>>> {
            let this = self.get_mut();
            match this.frames.pop_front() {
                Some(Ok(data)) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Some(Err(e)) => Poll::Ready(Some(Err(e))),
                None => Poll::Ready(None),
            }
        }
    }

    async fn settle() {
        // Let the spawned persistence task run.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn clean_completion_persists_concatenated_chunks() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let upstream = ScriptedBody::new(&["data: one\n\n", "data: two\n\n", "data: [DONE]\n\n"]);
        let tee = CaptureBody::new(upstream, "/v1/chat|abc".to_string(), Arc::clone(&store));

        let relayed = tee.collect().await.unwrap().to_bytes();
        assert_eq!(relayed, "data: one\n\ndata: two\n\ndata: [DONE]\n\n");

        settle().await;
        let entry = store.get("/v1/chat|abc").await.expect("entry persisted");
        // Persisted bytes are exactly what the client saw.
        assert_eq!(entry, relayed);
    }

    #[tokio::test]
    async fn forwarded_chunks_are_untouched() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let chunks = ["alpha", "", "beta", "gamma"];
        let mut tee = CaptureBody::new(
            ScriptedBody::new(&chunks),
            "k".to_string(),
            Arc::clone(&store),
        );

        // Pull frame by frame: content and ordering must match the upstream
        // script exactly — the tee may not merge, split, or reorder.
        for expected in chunks {
            let frame = std::future::poll_fn(|cx| Pin::new(&mut tee).poll_frame(cx))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.into_data().unwrap(), expected.as_bytes());
        }
        let end = std::future::poll_fn(|cx| Pin::new(&mut tee).poll_frame(cx)).await;
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn upstream_error_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let upstream = ScriptedBody::with_error_after(&["partial chunk"]);
        let tee = CaptureBody::new(upstream, "k".to_string(), dyn_store);

        let result = tee.collect().await;
        assert!(result.is_err());

        settle().await;
        assert!(store.is_empty(), "partial capture must never be persisted");
    }

    #[tokio::test]
    async fn drop_before_completion_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let mut tee = CaptureBody::new(
            ScriptedBody::new(&["first", "second", "third"]),
            "k".to_string(),
            dyn_store,
        );

        // Client reads one chunk, then disconnects (body dropped).
        let frame = std::future::poll_fn(|cx| Pin::new(&mut tee).poll_frame(cx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.into_data().unwrap(), &b"first"[..]);
        drop(tee);

        settle().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn empty_stream_writes_no_entry() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let tee = CaptureBody::new(ScriptedBody::new(&[]), "k".to_string(), dyn_store);

        let relayed = tee.collect().await.unwrap().to_bytes();
        assert!(relayed.is_empty());

        settle().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn persist_buffered_skips_empty_payloads() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ObjectStore> = store.clone();

        persist_buffered(&dyn_store, "empty", Bytes::new());
        persist_buffered(&dyn_store, "full", Bytes::from_static(b"{\"ok\":true}"));

        settle().await;
        assert!(store.get("empty").await.is_none());
        assert_eq!(
            store.get("full").await.unwrap(),
            Bytes::from_static(b"{\"ok\":true}")
        );
    }

    #[test]
    fn strategy_follows_the_size_signal() {
        let t = DEFAULT_STREAM_THRESHOLD;
        assert_eq!(choose_strategy(Some(512), t), CaptureStrategy::Buffered);
        assert_eq!(choose_strategy(Some(t), t), CaptureStrategy::Buffered);
        assert_eq!(choose_strategy(Some(t + 1), t), CaptureStrategy::Streaming);
        assert_eq!(choose_strategy(None, t), CaptureStrategy::Streaming);
    }

    #[test]
    fn non_ok_statuses_are_never_captured() {
        use http::StatusCode;
        let t = DEFAULT_STREAM_THRESHOLD;

        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::FOUND,
        ] {
            assert_eq!(
                capture_decision(status, Some(64), t),
                None,
                "{} must pass through uncached",
                status
            );
        }

        assert_eq!(
            capture_decision(StatusCode::OK, Some(64), t),
            Some(CaptureStrategy::Buffered)
        );
        assert_eq!(
            capture_decision(StatusCode::OK, None, t),
            Some(CaptureStrategy::Streaming)
        );
    }
}
