//! # safeweb
//!
//! A secure-by-construction async HTTP/1.1 framework.
//!
//! Handlers never touch raw response bytes. They write a typed
//! [`Response`] through a [`Context`], and a chain of security
//! [interceptors](security) runs around every handler to set CSP, HSTS, COOP
//! and framing headers, check Fetch Metadata and CORS, and enforce XSRF
//! tokens. Headers owned by an interceptor are claimed so no handler can
//! weaken them, HTML has to come from [`SafeHtml`] or an auto-escaping
//! template, and SQL has to be a [`TrustedSql`](database::TrustedSql).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use safeweb::{Context, Method, SafeHtml, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mux = safeweb::config::defaults(b"replace with a random secret")?
//!         .handle("/", Method::Get, |ctx: Context| async move {
//!             ctx.write(SafeHtml::from_static("Hello, World!"))
//!         })
//!         .build();
//!
//!     // TLS is terminated by a proxy in front of this listener.
//!     let server = Server::bind("127.0.0.1:8080").await?.behind_tls_proxy(true);
//!     println!("Listening on http://127.0.0.1:8080");
//!     server.serve(mux).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod http;
pub mod interceptor;
pub mod response;
pub mod router;
pub mod security;
pub mod server;
pub mod template;

#[cfg(test)]
pub(crate) mod test_utils;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::{Context, Written};
pub use http::{HttpResponse, Method, Request, StatusCode};
pub use interceptor::{Configs, Flow, Interceptor};
pub use response::{Response, SafeHtml};
pub use router::{ServeMux, ServeMuxConfig};
pub use server::{Server, ServerError};
