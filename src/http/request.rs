//! Minimal request-head parsing.
//!
//! # Responsibilities
//! - Read a bounded request head (request line + header block)
//! - Expose method, path, Host header, and the port-stripped domain
//!
//! # Design Decisions
//! - Deliberately not a full HTTP parser: no bodies, cookies, or
//!   content negotiation; only what host dispatch needs
//! - Header names are lowercased on ingest
//! - The request target is percent-decoded once, up front

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Upper bound on the request head, request line included.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Errors raised while reading a request head.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request line did not have the `METHOD target HTTP/x.y` shape.
    #[error("malformed request line")]
    BadRequestLine,

    /// The head exceeded the configured size cap.
    #[error("request head larger than {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,

    /// The peer closed the connection before a full head arrived.
    #[error("connection closed mid-head")]
    UnexpectedEof,

    /// Transport-level read failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The parsed view of one request, handed to handlers.
#[derive(Debug, Clone)]
pub struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    secure: bool,
    peer: SocketAddr,
}

impl Request {
    /// Request method, case preserved.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Percent-decoded request target.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First header with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The raw Host header, empty if absent.
    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("")
    }

    /// Host with any `:port` suffix removed; the routing key.
    pub fn domain(&self) -> &str {
        crate::routing::pattern::strip_port(self.host())
    }

    /// True when the request arrived over TLS.
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Peer socket address, for diagnostics.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

/// Read and parse one request head from `reader`.
pub(crate) async fn read_request<R>(
    reader: &mut R,
    secure: bool,
    peer: SocketAddr,
) -> Result<Request, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0usize;
    let mut line_buf = Vec::new();

    let request_line = read_line(reader, &mut line_buf, &mut consumed).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(RequestError::BadRequestLine)?;
    let target = parts.next().ok_or(RequestError::BadRequestLine)?;
    let version = parts.next().ok_or(RequestError::BadRequestLine)?;
    if !version.starts_with("HTTP/") || parts.next().is_some() {
        return Err(RequestError::BadRequestLine);
    }
    let method = method.to_string();
    let path = percent_decode(target);

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader, &mut line_buf, &mut consumed).await?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
        // Lines without a colon are skipped rather than failing the request.
    }

    Ok(Request {
        method,
        path,
        headers,
        secure,
        peer,
    })
}

async fn read_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    consumed: &mut usize,
) -> Result<String, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let remaining = (MAX_HEAD_BYTES - *consumed) as u64 + 1;
    let n = reader.take(remaining).read_until(b'\n', buf).await?;
    if n == 0 {
        return Err(RequestError::UnexpectedEof);
    }
    *consumed += n;
    if *consumed > MAX_HEAD_BYTES {
        return Err(RequestError::HeadTooLarge);
    }
    if buf.last() != Some(&b'\n') {
        return Err(RequestError::UnexpectedEof);
    }

    let mut end = buf.len() - 1;
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Decode `%XX` escapes; malformed escapes pass through untouched.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
