//! Streaming pipeline
//!
//! Opens a read conduit from the provider, layers the client-side adapters
//! (range length cap, fixed-size buffering, end-of-stream hook), and tracks
//! the read as a stream session. The view counter is only bumped when the
//! conduit ends naturally; errors and client disconnects close the session
//! without touching the catalog.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use account_pool::AccountPool;
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use pin_project_lite::pin_project;
use provider::{ByteStream, Catalog, ObjectStore};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::range::{RangeSpec, parse_range_header};
use crate::sessions::SessionRegistry;

/// How a conduit finished, as seen by the tail hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// All bytes delivered.
    NaturalEnd,
    /// Dropped before exhaustion: conduit error or client disconnect.
    Interrupted,
}

pin_project! {
    /// Caps a conduit at `remaining` bytes.
    ///
    /// Safe to layer over a provider that already honored the range: the cap
    /// equals the range's content length, so it never truncates an honored
    /// response.
    struct LengthCap<S> {
        #[pin]
        inner: S,
        remaining: u64,
    }
}

impl<S: Stream<Item = std::io::Result<Bytes>>> Stream for LengthCap<S> {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.remaining == 0 {
            return Poll::Ready(None);
        }
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let take = (*this.remaining).min(chunk.len() as u64) as usize;
                *this.remaining -= take as u64;
                Poll::Ready(Some(Ok(chunk.slice(..take))))
            }
            other => other,
        }
    }
}

pin_project! {
    /// Re-chunks a conduit into fixed-size buffers, flushing the remainder
    /// at end of stream.
    struct BufferChunks<S> {
        #[pin]
        inner: S,
        buf: BytesMut,
        size: usize,
        done: bool,
    }
}

impl<S: Stream<Item = std::io::Result<Bytes>>> Stream for BufferChunks<S> {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if this.buf.len() >= *this.size {
                return Poll::Ready(Some(Ok(this.buf.split_to(*this.size).freeze())));
            }
            if *this.done {
                if this.buf.is_empty() {
                    return Poll::Ready(None);
                }
                return Poll::Ready(Some(Ok(this.buf.split().freeze())));
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buf.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pin_project! {
    /// Invokes a hook exactly once when the conduit finishes: with
    /// `NaturalEnd` at exhaustion, with `Interrupted` if dropped first.
    struct TailHook<S> {
        #[pin]
        inner: S,
        hook: Option<Box<dyn FnOnce(StreamOutcome) + Send>>,
    }

    impl<S> PinnedDrop for TailHook<S> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(hook) = this.project().hook.take() {
                hook(StreamOutcome::Interrupted);
            }
        }
    }
}

impl<S: Stream<Item = std::io::Result<Bytes>>> Stream for TailHook<S> {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(None) => {
                if let Some(hook) = this.hook.take() {
                    hook(StreamOutcome::NaturalEnd);
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("range", &self.range)
            .field("total", &self.total)
            .field("content_type", &self.content_type)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// An opened read, ready to serve as an HTTP body.
pub struct OpenedStream {
    pub body: ByteStream,
    /// `Some` for a 206 partial response.
    pub range: Option<RangeSpec>,
    pub total: u64,
    pub content_type: String,
    pub session_id: String,
}

/// Streaming pipeline over the catalog, pool, and provider.
pub struct Streamer {
    pool: Arc<AccountPool>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn Catalog>,
    sessions: Arc<SessionRegistry>,
    buffer_size: usize,
    cross_account_read: bool,
}

impl Streamer {
    pub fn new(
        pool: Arc<AccountPool>,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn Catalog>,
        sessions: Arc<SessionRegistry>,
        buffer_size: usize,
        cross_account_read: bool,
    ) -> Self {
        Self {
            pool,
            store,
            catalog,
            sessions,
            buffer_size,
            cross_account_read,
        }
    }

    /// Open a read of `file_id`, optionally limited by a `Range` header.
    ///
    /// Catalog lookup and the permission check run before any pool or
    /// provider work. Reads resolve through the account that owns the
    /// object; `cross_account_read` permits falling back to any usable
    /// account when the owner is unavailable.
    pub async fn open_stream(
        &self,
        file_id: &str,
        range_header: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<OpenedStream> {
        let record = self
            .catalog
            .lookup(file_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;

        if !record.is_public {
            let user_id = user_id.ok_or(Error::PermissionDenied)?;
            if !self.catalog.has_permission(file_id, user_id).await? {
                return Err(Error::PermissionDenied);
            }
        }

        let lease = self.lease_for_read(&record.account_name).await?;

        let range = range_header
            .map(|h| parse_range_header(h, record.size))
            .transpose()?;

        let serving_account = lease.identity.account_name.clone();
        let started = Instant::now();
        let conduit = match self
            .store
            .read(
                &lease.identity,
                &record.object_id,
                range.map(|r| (r.start, r.end)),
            )
            .await
        {
            Ok(conduit) => {
                self.pool
                    .record_success(lease, 0, started.elapsed().as_secs_f64() * 1000.0)
                    .await;
                conduit
            }
            Err(e) => {
                warn!(file_id, account = %serving_account, error = %e, "failed to open read conduit");
                self.pool.record_error(lease, &e.to_string()).await;
                crate::metrics::record_stream("open_error");
                return Err(e.into());
            }
        };

        let session_id = self
            .sessions
            .register(file_id, range, &serving_account)
            .await;

        let capped: ByteStream = match range {
            Some(spec) => Box::pin(LengthCap {
                inner: conduit,
                remaining: spec.content_length,
            }),
            None => conduit,
        };
        let buffered = BufferChunks {
            inner: capped,
            buf: BytesMut::new(),
            size: self.buffer_size,
            done: false,
        };

        let hook = self.tail_hook(session_id.clone(), file_id.to_string());
        let body: ByteStream = Box::pin(TailHook {
            inner: buffered,
            hook: Some(hook),
        });

        Ok(OpenedStream {
            body,
            range,
            total: record.size,
            content_type: record.content_type,
            session_id,
        })
    }

    async fn lease_for_read(&self, owner: &str) -> Result<account_pool::SelectedAccount> {
        match self.pool.lease_account(owner).await {
            Ok(lease) => Ok(lease),
            Err(e) if self.cross_account_read => {
                debug!(owner, error = %e, "owning account unavailable, trying others");
                for name in self.pool.account_names().await {
                    if name == owner {
                        continue;
                    }
                    if let Ok(lease) = self.pool.lease_account(&name).await {
                        return Ok(lease);
                    }
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Hook run when the conduit finishes. A natural end bumps the view
    /// counter; every completion removes the session.
    fn tail_hook(
        &self,
        session_id: String,
        file_id: String,
    ) -> Box<dyn FnOnce(StreamOutcome) + Send> {
        let catalog = self.catalog.clone();
        let sessions = self.sessions.clone();
        Box::new(move |outcome| {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                return;
            };
            handle.spawn(async move {
                match outcome {
                    StreamOutcome::NaturalEnd => {
                        if let Err(e) = catalog.record_view(&file_id).await {
                            warn!(file_id, error = %e, "failed to record view");
                        }
                        crate::metrics::record_stream("natural_end");
                    }
                    StreamOutcome::Interrupted => {
                        crate::metrics::record_stream("interrupted");
                    }
                }
                sessions.finish(&session_id).await;
            });
        })
    }
}
