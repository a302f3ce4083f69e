//! Security interceptors.
//!
//! Each submodule exposes an `Interceptor` type implementing
//! [`crate::interceptor::Interceptor`], plus the per-route configuration
//! values it understands. The recommended stack, in order, is assembled by
//! [`crate::config::defaults`]:
//!
//! | Module             | Protects against                          |
//! |--------------------|-------------------------------------------|
//! | [`hsts`]           | protocol downgrade                        |
//! | [`static_headers`] | MIME sniffing, legacy XSS auditor quirks  |
//! | [`coop`]           | cross-window attacks                      |
//! | [`csp`]            | XSS                                       |
//! | [`framing`]        | clickjacking                              |
//! | [`fetch_metadata`] | cross-site request attacks                |
//! | [`cors`]           | unintended cross-origin reads             |
//! | [`xsrf`]           | cross-site request forgery                |

pub mod coop;
pub mod cors;
pub mod csp;
pub mod fetch_metadata;
pub mod framing;
pub mod hsts;
pub mod static_headers;
pub mod xsrf;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::Rng;

/// Returns `len` random bytes encoded as standard base64.
pub(crate) fn random_base64(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(&mut bytes[..]);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_values_differ() {
        let a = random_base64(20);
        let b = random_base64(20);
        assert_eq!(a.len(), 28);
        assert_ne!(a, b);
    }
}
