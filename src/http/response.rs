//! Per-request response stream.
//!
//! # Responsibilities
//! - Queue body bytes from the handler and flush them in order
//! - Signal backpressure to producers and suspend file streaming on it
//! - Coalesce corked writes into single transport flushes
//! - Deliver exactly one abort notification on peer disconnect
//!
//! # Design Decisions
//! - One writer task per connection owns the socket write half; handlers
//!   and deferred continuations only touch shared state, so body bytes
//!   cannot reorder
//! - Headers are withheld until the first flush: a response that is fully
//!   ended by then uses Content-Length, everything else goes chunked
//! - After `end` or an abort, write/end are silent no-ops; a disconnect can
//!   race handler logic and must never crash it

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Notify};

/// Pending bytes at which `write` starts reporting backpressure.
pub const HIGH_WATER_MARK: usize = 64 * 1024;

/// Read granularity for `stream_file`.
const FILE_CHUNK: usize = 64 * 1024;

/// Errors surfaced by `stream_file`.
///
/// Write/end after a terminal state are deliberately not errors.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The file could not be opened or read.
    #[error("file read failed")]
    FileRead(#[source] io::Error),
}

type AbortCallback = Box<dyn FnOnce() + Send>;

struct StreamState {
    buf: BytesMut,
    status: u16,
    extra_headers: Vec<(String, String)>,
    corked: bool,
    ended: bool,
    aborted: bool,
    /// Set by the writer once the status line and headers hit the wire.
    headers_sent: bool,
    /// Terminator flushed, or the stream was torn down.
    complete: bool,
    /// Bytes handed to the writer but not yet accepted by the transport.
    in_flight: usize,
    bytes_flushed: u64,
    on_aborted: Option<AbortCallback>,
}

struct StreamInner {
    state: Mutex<StreamState>,
    /// Producer -> writer wakeup; carries a permit, so no lost wakeups.
    wake: Notify,
    /// Writer -> producers: pending byte count after each flush.
    pending_tx: watch::Sender<usize>,
    /// Writer -> connection: response fully delivered or torn down.
    complete_tx: watch::Sender<bool>,
}

/// Handle to one request's outbound stream.
///
/// Clones share the same stream; a clone held by a deferred task after
/// connection teardown degrades to no-ops.
#[derive(Clone)]
pub struct ResponseStream {
    inner: Arc<StreamInner>,
}

impl ResponseStream {
    /// Create a stream writing to `sink` and spawn its writer task.
    pub fn new<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (pending_tx, _) = watch::channel(0usize);
        let (complete_tx, _) = watch::channel(false);
        let inner = Arc::new(StreamInner {
            state: Mutex::new(StreamState {
                buf: BytesMut::new(),
                status: 200,
                extra_headers: Vec::new(),
                corked: false,
                ended: false,
                aborted: false,
                headers_sent: false,
                complete: false,
                in_flight: 0,
                bytes_flushed: 0,
                on_aborted: None,
            }),
            wake: Notify::new(),
            pending_tx,
            complete_tx,
        });
        tokio::spawn(run_writer(Arc::clone(&inner), Box::new(sink)));
        Self { inner }
    }

    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.inner.state.lock().expect("stream state poisoned")
    }

    /// Queue body bytes.
    ///
    /// Returns `true` when accepted with room to spare, `false` under
    /// backpressure (data is still queued) or when the stream is already
    /// ended or aborted (data is dropped). Never raises.
    pub fn write(&self, data: impl AsRef<[u8]>) -> bool {
        let data = data.as_ref();
        let (pending, corked) = {
            let mut st = self.state();
            if st.ended || st.aborted {
                return false;
            }
            st.buf.extend_from_slice(data);
            (st.buf.len() + st.in_flight, st.corked)
        };
        if !corked {
            self.inner.wake.notify_one();
        }
        pending < HIGH_WATER_MARK
    }

    /// Write the optional final bytes, mark the stream ended, and flush the
    /// end-of-body frame. Idempotent; a no-op after an abort.
    pub fn end(&self, data: Option<&[u8]>) {
        let corked = {
            let mut st = self.state();
            if st.ended || st.aborted {
                return;
            }
            if let Some(data) = data {
                st.buf.extend_from_slice(data);
            }
            st.ended = true;
            st.corked
        };
        if !corked {
            self.inner.wake.notify_one();
        }
    }

    /// Run `f` with writes buffered, then flush the batch at once.
    ///
    /// Nested corks run `f` immediately without re-buffering, as do corks on
    /// an already-terminal stream.
    pub fn cork<F: FnOnce(&Self)>(&self, f: F) {
        {
            let mut st = self.state();
            if st.corked || st.ended || st.aborted {
                drop(st);
                f(self);
                return;
            }
            st.corked = true;
        }

        // Uncork on drop, so a panicking closure cannot strand the writer
        // task with the flag stuck.
        struct Uncork<'a>(&'a ResponseStream);
        impl Drop for Uncork<'_> {
            fn drop(&mut self) {
                self.0.state().corked = false;
                self.0.inner.wake.notify_one();
            }
        }

        let guard = Uncork(self);
        f(guard.0);
    }

    /// Override the response status; effective until headers are flushed.
    pub fn write_status(&self, status: u16) {
        let mut st = self.state();
        if !st.headers_sent && !st.ended && !st.aborted {
            st.status = status;
        }
    }

    /// Add a response header; effective until headers are flushed.
    pub fn write_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut st = self.state();
        if !st.headers_sent && !st.ended && !st.aborted {
            st.extra_headers.push((name.into(), value.into()));
        }
    }

    /// Register the abort callback, replacing any prior registration.
    ///
    /// Runs exactly once if the peer disconnects before the response is
    /// delivered; runs immediately if that already happened.
    pub fn on_aborted<F: FnOnce() + Send + 'static>(&self, callback: F) {
        let mut st = self.state();
        if st.aborted {
            drop(st);
            callback();
            return;
        }
        st.on_aborted = Some(Box::new(callback));
    }

    /// Stream the file at `path` in bounded chunks, yielding on
    /// backpressure, and end the stream at EOF.
    ///
    /// Errors before the first flushed byte leave the stream untouched so
    /// the caller can still produce a 404/500 response; errors after that
    /// tear the connection down rather than deliver a malformed body.
    pub async fn stream_file(&self, path: impl AsRef<Path>) -> Result<(), StreamError> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StreamError::FileNotFound(path.display().to_string())
            } else {
                StreamError::FileRead(e)
            }
        })?;

        let mut chunk = vec![0u8; FILE_CHUNK];
        loop {
            if self.is_aborted() {
                // The peer is gone; nothing left to deliver.
                return Ok(());
            }
            let n = match file.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    if self.headers_sent() {
                        self.fail();
                    }
                    return Err(StreamError::FileRead(e));
                }
            };
            if n == 0 {
                break;
            }
            if !self.write(&chunk[..n]) {
                self.drained().await;
            }
        }
        self.end(None);
        Ok(())
    }

    /// Wait until pending bytes fall below the high-water mark or the
    /// stream becomes terminal.
    pub async fn drained(&self) {
        let mut rx = self.inner.pending_tx.subscribe();
        loop {
            {
                let st = self.state();
                if st.aborted || st.complete || st.buf.len() + st.in_flight < HIGH_WATER_MARK {
                    return;
                }
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// True once `end` has been called.
    pub fn is_ended(&self) -> bool {
        self.state().ended
    }

    /// True once the stream was aborted or torn down.
    pub fn is_aborted(&self) -> bool {
        self.state().aborted
    }

    /// Body bytes queued but not yet accepted by the transport.
    pub fn pending_bytes(&self) -> usize {
        let st = self.state();
        st.buf.len() + st.in_flight
    }

    /// Body bytes flushed to the transport so far.
    pub fn bytes_flushed(&self) -> u64 {
        self.state().bytes_flushed
    }

    fn headers_sent(&self) -> bool {
        self.state().headers_sent
    }

    /// Peer-initiated abort: discard queued bytes, stop the writer, and run
    /// the registered callback exactly once.
    ///
    /// A no-op once the response was fully delivered.
    pub(crate) fn trigger_abort(&self) {
        let callback = {
            let mut st = self.state();
            if st.aborted || st.complete {
                return;
            }
            st.aborted = true;
            st.buf.clear();
            st.in_flight = 0;
            // `end` was already reached: tear down silently.
            if st.ended {
                None
            } else {
                st.on_aborted.take()
            }
        };
        let _ = self.inner.pending_tx.send(0);
        self.inner.wake.notify_one();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Local failure (e.g. a read error mid file stream): tear down without
    /// the peer-disconnect callback.
    pub(crate) fn fail(&self) {
        {
            let mut st = self.state();
            if st.aborted || st.complete {
                return;
            }
            st.aborted = true;
            st.buf.clear();
            st.in_flight = 0;
        }
        let _ = self.inner.pending_tx.send(0);
        self.inner.wake.notify_one();
    }

    /// Wait for the writer task to finish (terminator flushed or teardown).
    pub(crate) async fn wait_complete(&self) {
        let mut rx = self.inner.complete_tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct Frame {
    payload: Bytes,
    ended: bool,
    headers_already_sent: bool,
    status: u16,
    extra_headers: Vec<(String, String)>,
}

async fn run_writer(inner: Arc<StreamInner>, mut sink: Box<dyn AsyncWrite + Send + Unpin>) {
    loop {
        let frame = {
            let mut st = inner.state.lock().expect("stream state poisoned");
            if st.aborted {
                break;
            }
            if !st.corked && (!st.buf.is_empty() || st.ended) {
                let headers_already_sent = st.headers_sent;
                st.headers_sent = true;
                let payload = st.buf.split().freeze();
                st.in_flight = payload.len();
                Some(Frame {
                    payload,
                    ended: st.ended,
                    headers_already_sent,
                    status: st.status,
                    extra_headers: std::mem::take(&mut st.extra_headers),
                })
            } else {
                None
            }
        };

        let Some(frame) = frame else {
            inner.wake.notified().await;
            continue;
        };

        let flushed = frame.payload.len() as u64;
        let ended = frame.ended;
        match flush_frame(&mut sink, frame).await {
            Ok(()) => {
                let pending = {
                    let mut st = inner.state.lock().expect("stream state poisoned");
                    st.in_flight = 0;
                    st.bytes_flushed += flushed;
                    if ended {
                        st.complete = true;
                    }
                    st.buf.len()
                };
                let _ = inner.pending_tx.send(pending);
                if ended {
                    break;
                }
            }
            Err(e) => {
                // A failed write is how a reset peer shows up here.
                tracing::debug!(error = %e, "Response write failed, aborting stream");
                ResponseStream {
                    inner: Arc::clone(&inner),
                }
                .trigger_abort();
                break;
            }
        }
    }

    {
        let mut st = inner.state.lock().expect("stream state poisoned");
        st.complete = true;
    }
    let _ = inner.pending_tx.send(0);
    let _ = inner.complete_tx.send(true);
    let _ = sink.shutdown().await;
}

/// Write one coalesced frame: at most one `write_all` + `flush` pair, so a
/// corked batch is exactly one flush event on the transport.
async fn flush_frame(
    sink: &mut (impl AsyncWrite + Unpin + ?Sized),
    frame: Frame,
) -> io::Result<()> {
    let mut out = BytesMut::new();

    if !frame.headers_already_sent {
        out.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", frame.status, reason_phrase(frame.status)).as_bytes(),
        );
        for (name, value) in &frame.extra_headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"Connection: close\r\n");
        if frame.ended {
            // Whole body known up front: length-framed single flush.
            out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", frame.payload.len()).as_bytes());
            out.extend_from_slice(&frame.payload);
        } else {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            append_chunk(&mut out, &frame.payload);
        }
    } else {
        append_chunk(&mut out, &frame.payload);
        if frame.ended {
            out.extend_from_slice(b"0\r\n\r\n");
        }
    }

    sink.write_all(&out).await?;
    sink.flush().await
}

fn append_chunk(out: &mut BytesMut, payload: &[u8]) {
    if payload.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", payload.len()).as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
}

/// Write a complete, length-framed response in one shot. Used for outcomes
/// that never construct a user-visible stream (404, 400).
pub(crate) async fn write_simple_response<W: AsyncWrite + Unpin>(
    sink: &mut W,
    status: u16,
    body: &[u8],
) -> io::Result<()> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nConnection: close\r\nContent-Length: {}\r\n\r\n",
        status,
        reason_phrase(status),
        body.len()
    );
    sink.write_all(head.as_bytes()).await?;
    sink.write_all(body).await?;
    sink.flush().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
