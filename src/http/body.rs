//! Body adapters used while proxying.
//!
//! # Responsibilities
//! - `BodySlot` / `ReplayBody`: hand the inbound request body to whichever
//!   outbound attempt actually starts sending it, without buffering
//! - `MonitoredBody`: relay a response body, log stream faults and early client
//!   disconnects, and tee the bytes into the cache when the exchange is cacheable

use std::fmt::Display;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use bytes::BytesMut;
use hyper::body::{Body as HttpBody, Frame, SizeHint};

use crate::cache::{CacheEntry, ResponseCache};

/// Shared holder of the inbound request body.
///
/// The body moves into a [`ReplayBody`] on its first poll. An attempt that fails
/// to connect never polls, so the body stays in the slot for the next attempt.
#[derive(Clone)]
pub struct BodySlot {
    inner: Arc<Mutex<Option<Body>>>,
    end_stream: bool,
    hint: SizeHint,
}

impl BodySlot {
    pub fn new(body: Body) -> Self {
        Self {
            end_stream: body.is_end_stream(),
            hint: body.size_hint(),
            inner: Arc::new(Mutex::new(Some(body))),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Outbound body for one attempt.
    pub fn replay(&self) -> ReplayBody {
        let (end_stream, hint) = if self.is_available() {
            (self.end_stream, self.hint.clone())
        } else {
            (true, SizeHint::with_exact(0))
        };
        ReplayBody {
            slot: self.inner.clone(),
            taken: None,
            end_stream,
            hint,
        }
    }
}

impl std::fmt::Debug for BodySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodySlot")
            .field("available", &self.is_available())
            .finish()
    }
}

pub struct ReplayBody {
    slot: Arc<Mutex<Option<Body>>>,
    taken: Option<Body>,
    end_stream: bool,
    hint: SizeHint,
}

impl HttpBody for ReplayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.taken.is_none() {
            this.taken = this
                .slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
        match this.taken.as_mut() {
            Some(body) => Pin::new(body).poll_frame(cx),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.taken {
            Some(body) => body.is_end_stream(),
            None => self.end_stream,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.taken {
            Some(body) => body.size_hint(),
            None => self.hint.clone(),
        }
    }
}

/// Buffers a relayed body and stores it once the stream ends cleanly.
#[derive(Debug)]
pub struct CacheCapture {
    cache: ResponseCache,
    key: String,
    headers: HeaderMap,
    ttl: Duration,
    buf: BytesMut,
}

impl CacheCapture {
    pub fn new(cache: ResponseCache, key: String, headers: HeaderMap, ttl: Duration) -> Self {
        Self {
            cache,
            key,
            headers,
            ttl,
            buf: BytesMut::new(),
        }
    }

    fn push(&mut self, data: &Bytes) {
        self.buf.extend_from_slice(data);
    }

    fn commit(self) {
        tracing::debug!(key = %self.key, bytes = self.buf.len(), ttl = ?self.ttl, "Response cached");
        self.cache.set(
            self.key,
            CacheEntry {
                headers: self.headers,
                body: self.buf.freeze(),
                expiry: tokio::time::Instant::now() + self.ttl,
            },
        );
    }
}

/// Response body wrapper that never lets a stream fault go unnoticed.
pub struct MonitoredBody<B> {
    inner: B,
    source: String,
    capture: Option<CacheCapture>,
    finished: bool,
}

impl<B: HttpBody> MonitoredBody<B> {
    pub fn new(inner: B, source: impl Into<String>) -> Self {
        Self {
            // hyper never polls a body that is already at its end
            finished: inner.is_end_stream(),
            inner,
            source: source.into(),
            capture: None,
        }
    }

    pub fn with_capture(mut self, capture: Option<CacheCapture>) -> Self {
        match capture {
            Some(capture) if self.finished => capture.commit(),
            other => self.capture = other,
        }
        self
    }
}

impl<B> MonitoredBody<B> {
    fn finish(&mut self) {
        self.finished = true;
        if let Some(capture) = self.capture.take() {
            capture.commit();
        }
    }
}

impl<B> HttpBody for MonitoredBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let (Some(capture), Some(data)) = (this.capture.as_mut(), frame.data_ref()) {
                    capture.push(data);
                }
                // a sized body is not polled again once its last byte is out
                if this.inner.is_end_stream() {
                    this.finish();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(error)) => {
                tracing::error!(source = %this.source, error = %error, "Body stream failed");
                this.capture = None;
                this.finished = true;
                Poll::Ready(Some(Err(error)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for MonitoredBody<B> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(source = %self.source, "Client disconnected before body completed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn slot_survives_unpolled_attempt() {
        let slot = BodySlot::new(Body::from("payload"));

        let first = slot.replay();
        drop(first);
        assert!(slot.is_available());

        let second = slot.replay();
        let bytes = second.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "payload");
        assert!(!slot.is_available());

        let third = slot.replay();
        assert!(third.is_end_stream());
        assert_eq!(third.size_hint().exact(), Some(0));
    }

    #[tokio::test]
    async fn monitored_body_caches_on_completion() {
        let cache = ResponseCache::new();
        let capture = CacheCapture::new(
            cache.clone(),
            "http://h/x".into(),
            HeaderMap::new(),
            Duration::from_secs(30),
        );
        let body = MonitoredBody::new(Body::from("cached bytes"), "test").with_capture(Some(capture));

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "cached bytes");
        assert_eq!(cache.get("http://h/x").unwrap().body, "cached bytes");
    }

    #[tokio::test]
    async fn abandoned_body_is_not_cached() {
        let cache = ResponseCache::new();
        let capture = CacheCapture::new(
            cache.clone(),
            "http://h/y".into(),
            HeaderMap::new(),
            Duration::from_secs(30),
        );
        let body = MonitoredBody::new(Body::from("never read"), "test").with_capture(Some(capture));
        drop(body);
        assert!(!cache.exists("http://h/y"));
    }
}
