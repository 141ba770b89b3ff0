use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cookie::{CookieJar as SealingJar, Key, time::Duration as CookieDuration};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SESSION_COOKIE: &str = "admin_session";
pub const SESSION_TTL_DAYS: i64 = 7;

pub type AdminId = i32;

#[derive(Serialize, Deserialize)]
struct SessionPayload {
    admin_id: Option<AdminId>,
    issued_at: i64,
}

/// Issues and verifies the admin session cookie.
///
/// The payload is encrypted with a key derived from `"enc:" + secret` and the
/// ciphertext is then signed with a key derived from `"auth:" + secret`.
#[derive(Clone)]
pub struct SessionManager {
    key: Arc<Key>,
    secure: bool,
}

impl SessionManager {
    pub fn new(secret: &str, secure: bool) -> Self {
        let signing = Sha256::digest(format!("auth:{secret}").as_bytes());
        let encryption = Sha256::digest(format!("enc:{secret}").as_bytes());

        let mut master = [0u8; 64];
        master[..32].copy_from_slice(&signing);
        master[32..].copy_from_slice(&encryption);

        Self {
            key: Arc::new(Key::from(&master)),
            secure,
        }
    }

    pub fn create(&self, admin_id: AdminId) -> Cookie<'static> {
        self.create_at(admin_id, Utc::now())
    }

    pub fn create_at(&self, admin_id: AdminId, issued_at: DateTime<Utc>) -> Cookie<'static> {
        let payload = SessionPayload {
            admin_id: Some(admin_id),
            issued_at: issued_at.timestamp(),
        };
        let json = serde_json::to_string(&payload).unwrap_or_default();

        let mut cookie = Cookie::new(SESSION_COOKIE, self.seal(json));
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_secure(self.secure);
        cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));
        cookie
    }

    /// Returns the admin id carried by the request's session cookie.
    ///
    /// Missing, tampered, undecodable and expired cookies all yield `None`.
    pub fn read(&self, jar: &CookieJar) -> Option<AdminId> {
        let cookie = jar.get(SESSION_COOKIE)?;
        self.read_value(cookie.value(), Utc::now())
    }

    pub fn read_value(&self, value: &str, now: DateTime<Utc>) -> Option<AdminId> {
        let json = self.open(value)?;
        let payload: SessionPayload = serde_json::from_str(&json).ok()?;
        let issued_at = DateTime::<Utc>::from_timestamp(payload.issued_at, 0)?;
        if now - issued_at > ChronoDuration::days(SESSION_TTL_DAYS) {
            return None;
        }
        payload.admin_id
    }

    /// Cookie that, once removed from the jar, instructs the browser to drop the session.
    pub fn destroy(&self) -> Cookie<'static> {
        let mut removal = Cookie::new(SESSION_COOKIE, "");
        removal.set_path("/");
        removal.set_http_only(true);
        removal.set_same_site(SameSite::Lax);
        removal.set_secure(self.secure);
        removal.set_max_age(CookieDuration::seconds(0));
        removal
    }

    fn seal(&self, plaintext: String) -> String {
        let mut encrypted = SealingJar::new();
        encrypted
            .private_mut(&self.key)
            .add(Cookie::new(SESSION_COOKIE, plaintext));
        let ciphertext = encrypted
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap_or_default();

        let mut signed = SealingJar::new();
        signed
            .signed_mut(&self.key)
            .add(Cookie::new(SESSION_COOKIE, ciphertext));
        signed
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap_or_default()
    }

    fn open(&self, value: &str) -> Option<String> {
        let jar = SealingJar::new();
        let verified = jar
            .signed(&self.key)
            .verify(Cookie::new(SESSION_COOKIE, value.to_string()))?;
        let decrypted = jar.private(&self.key).decrypt(verified)?;
        Some(decrypted.value().to_string())
    }
}
