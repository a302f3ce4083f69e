//! Signed, time-limited XSRF tokens.
//!
//! A token is `base64url(HMAC-SHA256(key, user ":" action ":" ts)) ":" ts`
//! with `ts` in milliseconds since the Unix epoch. Tokens are valid for
//! [`VALIDITY`]; tokens issued more than a minute in the future are refused.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// How long a token stays valid.
pub const VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("token issued in the future")]
    FromFuture,

    #[error("token signature does not match")]
    Invalid,

    #[error("signing key rejected: {0}")]
    Key(String),
}

/// Issues and checks tokens under one secret key.
///
/// ```
/// use safeweb::security::xsrf::token::{TokenError, TokenSigner};
///
/// let signer = TokenSigner::new(b"secret".to_vec());
/// let token = signer.generate("session-1", "example.com").unwrap();
/// assert!(signer.validate(&token, "session-1", "example.com").is_ok());
/// assert_eq!(
///     signer.validate(&token, "session-2", "example.com"),
///     Err(TokenError::Invalid)
/// );
/// ```
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// # Errors
    ///
    /// Only fails if the MAC cannot be keyed.
    pub fn generate(&self, user: &str, action: &str) -> Result<String, TokenError> {
        self.generate_at(user, action, now_millis())
    }

    pub(crate) fn generate_at(
        &self,
        user: &str,
        action: &str,
        millis: u64,
    ) -> Result<String, TokenError> {
        let mac = self.mac(user, action, millis)?;
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signature}:{millis}"))
    }

    /// # Errors
    ///
    /// See [`TokenError`].
    pub fn validate(&self, token: &str, user: &str, action: &str) -> Result<(), TokenError> {
        self.validate_at(token, user, action, now_millis())
    }

    pub(crate) fn validate_at(
        &self,
        token: &str,
        user: &str,
        action: &str,
        now: u64,
    ) -> Result<(), TokenError> {
        let (signature, ts) = token.rsplit_once(':').ok_or(TokenError::Malformed)?;
        let issued: u64 = ts.parse().map_err(|_| TokenError::Malformed)?;

        if issued > now.saturating_add(millis(MAX_CLOCK_SKEW)) {
            return Err(TokenError::FromFuture);
        }
        if now >= issued.saturating_add(millis(VALIDITY)) {
            return Err(TokenError::Expired);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        self.mac(user, action, issued)?
            .verify_slice(&signature)
            .map_err(|_| TokenError::Invalid)
    }

    fn mac(&self, user: &str, action: &str, millis: u64) -> Result<HmacSha256, TokenError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .map_err(|err| TokenError::Key(err.to_string()))?;
        mac.update(clean(user).as_bytes());
        mac.update(b":");
        mac.update(clean(action).as_bytes());
        mac.update(b":");
        mac.update(millis.to_string().as_bytes());
        Ok(mac)
    }
}

// Keeps "a:b" + "c" distinct from "a" + "b:c".
fn clean(s: &str) -> String {
    s.replace(':', "_:")
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn signer() -> TokenSigner {
        TokenSigner::new(b"k".to_vec())
    }

    #[test]
    fn token_shape() {
        let token = signer().generate_at("u", "a", T0).unwrap();
        let (sig, ts) = token.rsplit_once(':').unwrap();
        assert_eq!(ts, T0.to_string());
        assert_eq!(sig.len(), 43);
        assert!(!sig.contains(['+', '/', '=']));
    }

    #[test]
    fn validity_window() {
        let s = signer();
        let token = s.generate_at("u", "a", T0).unwrap();
        let day = millis(VALIDITY);
        assert_eq!(s.validate_at(&token, "u", "a", T0 + day - 1), Ok(()));
        assert_eq!(
            s.validate_at(&token, "u", "a", T0 + day),
            Err(TokenError::Expired)
        );
        assert_eq!(s.validate_at(&token, "u", "a", T0 - 60_000), Ok(()));
        assert_eq!(
            s.validate_at(&token, "u", "a", T0 - 60_001),
            Err(TokenError::FromFuture)
        );
    }

    #[test]
    fn bound_to_user_action_and_key() {
        let token = signer().generate_at("u", "a", T0).unwrap();
        assert_eq!(
            signer().validate_at(&token, "u", "b", T0),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            TokenSigner::new(b"other".to_vec()).validate_at(&token, "u", "a", T0),
            Err(TokenError::Invalid)
        );
        let colon = signer().generate_at("u:a", "", T0).unwrap();
        assert_eq!(
            signer().validate_at(&colon, "u", "a:", T0),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn tampered_tokens() {
        let s = signer();
        for token in ["", "abc", "abc:notanumber", "!!!:1700000000000"] {
            assert_eq!(
                s.validate_at(token, "u", "a", T0),
                Err(TokenError::Malformed),
                "{token}"
            );
        }
        let token = s.generate_at("u", "a", T0).unwrap();
        let shifted = token.replace(&T0.to_string(), &(T0 + 1).to_string());
        assert_eq!(s.validate_at(&shifted, "u", "a", T0), Err(TokenError::Invalid));
    }
}
