//! Session cookie signing.
//!
//! The cookie value is `<session id>.<tag>`, where the tag is a keyed
//! BLAKE2b-512 MAC over the session id, base64url encoded. The key is the
//! BLAKE2b-512 digest of the configured secret.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use blake2::digest::Mac;
use blake2::{Blake2b512, Blake2bMac512, Digest};
use zeroize::Zeroizing;

use letterbox_common::{Error, Result};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "letterbox_session";

/// Signs and verifies session cookie values.
#[derive(Clone)]
pub struct CookieSigner {
    key: Zeroizing<Vec<u8>>,
}

impl CookieSigner {
    pub fn new(secret: &str) -> Self {
        let key = Blake2b512::digest(secret.as_bytes());
        Self {
            key: Zeroizing::new(key.to_vec()),
        }
    }

    fn keyed(&self) -> Result<Blake2bMac512> {
        Blake2bMac512::new_from_slice(&self.key)
            .map_err(|e| Error::Configuration(format!("Invalid session key: {}", e)))
    }

    /// Produce the cookie value for a session id.
    pub fn sign(&self, session_id: &str) -> Result<String> {
        let mut mac = self.keyed()?;
        mac.update(session_id.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", session_id, URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Recover the session id from a cookie value, if its tag is valid.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (session_id, tag) = value.rsplit_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;

        let mut mac = self.keyed().ok()?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(session_id.to_string())
    }

    /// Extract and verify the session id carried by a request.
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, SESSION_COOKIE).and_then(|value| self.verify(value))
    }
}

/// Find a cookie by name across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// `Set-Cookie` value establishing a session.
pub fn session_cookie(value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
