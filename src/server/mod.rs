//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and hands every parsed HTTP/1.1 request to a
//! [`ServeMux`]. Persistent connections (keep-alive) are supported out of the
//! box. The listener speaks plain HTTP; deploy it behind a TLS-terminating
//! proxy and mark it with [`Server::behind_tls_proxy`] so the security
//! interceptors see requests as secure.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    HttpResponse, StatusCode,
    request::{MAX_REQUEST_SIZE, Request, RequestError},
};
use crate::router::ServeMux;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The safeweb HTTP server.
///
/// Binds to a TCP address and dispatches incoming HTTP/1.1 requests to a
/// [`ServeMux`].
///
/// # Examples
///
/// ```rust,no_run
/// use safeweb::context::Context;
/// use safeweb::http::Method;
/// use safeweb::response::SafeHtml;
/// use safeweb::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mux = safeweb::config::defaults(b"a long random secret key")?
///         .handle("/", Method::Get, |ctx: Context| async move {
///             ctx.write(SafeHtml::from_static("Hello!"))
///         })
///         .build();
///     Server::bind("127.0.0.1:8080")
///         .await?
///         .behind_tls_proxy(true)
///         .serve(mux)
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: bool,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            tls: false,
        })
    }

    /// Marks every request on this listener as received over TLS.
    ///
    /// Set this when a proxy in front of the server terminates TLS and only
    /// forwards HTTPS traffic. Without it the HSTS interceptor redirects
    /// every request to `https://`.
    #[must_use]
    pub fn behind_tls_proxy(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and serving them with `mux`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, mux: ServeMux) -> Result<(), ServerError> {
        let mux = Arc::new(mux);
        self.run(move |request| {
            let mux = Arc::clone(&mux);
            async move { mux.serve(request).await }
        })
        .await
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler receives a [`Request`] and must return a [`Future`] that
    /// resolves to an [`HttpResponse`]. [`serve`](Self::serve) is the usual
    /// entry point; this lower-level form exists for embedding. The handler is wrapped in an [`Arc`] and
    /// shared across all spawned Tokio tasks, so it must be `Send + Sync + 'static`.
    ///
    /// This method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = HttpResponse> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let tls = self.tls;
        info!(address = %self.local_addr, tls, "safeweb listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, tls, handler).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, serving every
/// complete request in the buffer before reading more, until the peer closes
/// the connection or signals `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    tls: bool,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = HttpResponse> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut need_read = true;

    loop {
        if need_read {
            let bytes_read = stream.read_buf(&mut buf).await?;
            if bytes_read == 0 {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
        }

        // Guard against excessively large requests.
        if buf.len() > MAX_REQUEST_SIZE {
            warn!(peer = %peer_addr, "request too large — sending 413");
            reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large").await?;
            break;
        }

        // Attempt to parse the buffered data as an HTTP request.
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Headers not yet fully received — read more data.
                need_read = true;
                continue;
            }
            Err(e @ RequestError::BodyTooLarge { .. }) => {
                warn!(peer = %peer_addr, error = %e, "declared body too large — sending 413");
                reject(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large").await?;
                break;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                reject(&mut stream, StatusCode::BadRequest, format!("Bad Request: {e}"))
                    .await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set. The
        // parser already bounded it by MAX_REQUEST_SIZE.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = body_offset + content_length;
        if buf.len() < total_needed {
            need_read = true;
            continue;
        }

        let request = request.with_tls(tls);
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = handler(request).await;
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close — shutting down");
            break;
        }

        // A pipelined request may already be waiting in the buffer.
        need_read = buf.is_empty();
    }

    Ok(())
}

// Writes a plain-text error and leaves the connection to be closed.
async fn reject(
    stream: &mut TcpStream,
    status: StatusCode,
    body: impl Into<String>,
) -> Result<(), std::io::Error> {
    let response = HttpResponse::new(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .keep_alive(false);
    stream.write_all(&response.into_bytes()).await
}
