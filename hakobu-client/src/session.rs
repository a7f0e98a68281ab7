//! Session and gating value types.
//!
//! The host application owns persistence (cookies, local storage, a file);
//! this module only needs a key-value capability handed to it. Nothing here
//! touches ambient global state.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Hours after which a locally cached session is considered stale and must
/// be reloaded from the backend before use.
pub const SESSION_STALE_AFTER_HOURS: i64 = 48;

const AGE_VERIFIED_KEY: &str = "age_verified_at";

/// Minimal key-value capability standing in for whatever store the host
/// application uses.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-memory store; also serves as the test double.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.inner.lock().unwrap().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }
}

/// A boolean with an issue timestamp and a time-to-live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiringFlag {
    pub issued_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl ExpiringFlag {
    pub fn new(issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self { issued_at, ttl }
    }

    /// A flag issued in the future (clock moved backwards) is invalid.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now >= self.issued_at && now - self.issued_at < self.ttl
    }
}

/// Age-verification gate backed by an injected store. The stored value is
/// the RFC 3339 confirmation timestamp; anything unparseable counts as
/// unverified.
pub struct AgeGate<S> {
    store: S,
    ttl: Duration,
}

impl<S: KeyValueStore> AgeGate<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn confirm(&self, now: DateTime<Utc>) {
        self.store.set(AGE_VERIFIED_KEY, now.to_rfc3339());
    }

    pub fn is_verified(&self, now: DateTime<Utc>) -> bool {
        let Some(raw) = self.store.get(AGE_VERIFIED_KEY) else {
            return false;
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(issued_at) => {
                ExpiringFlag::new(issued_at.with_timezone(&Utc), self.ttl).is_valid(now)
            }
            Err(_) => false,
        }
    }

    pub fn reset(&self) {
        self.store.remove(AGE_VERIFIED_KEY);
    }
}

/// Explicit session object passed into the API client. Operations return
/// new values instead of mutating shared context.
#[derive(Clone, Debug)]
pub struct AuthSession {
    token: Option<String>,
    loaded_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            loaded_at: Utc::now(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            token: None,
            loaded_at: Utc::now(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self
        }
    }

    pub fn cleared(self) -> Self {
        Self {
            token: None,
            ..self
        }
    }

    /// Marks the session as freshly loaded from the backend.
    pub fn reloaded(self, now: DateTime<Utc>) -> Self {
        Self {
            loaded_at: now,
            ..self
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.loaded_at >= Duration::hours(SESSION_STALE_AFTER_HOURS)
    }

    #[cfg(test)]
    fn loaded_at(mut self, loaded_at: DateTime<Utc>) -> Self {
        self.loaded_at = loaded_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiring_flag_validity_window() {
        let issued = Utc::now();
        let flag = ExpiringFlag::new(issued, Duration::hours(1));

        assert!(flag.is_valid(issued));
        assert!(flag.is_valid(issued + Duration::minutes(59)));
        assert!(!flag.is_valid(issued + Duration::hours(1)));
        // clock moved backwards
        assert!(!flag.is_valid(issued - Duration::seconds(1)));
    }

    #[test]
    fn age_gate_round_trip() {
        let gate = AgeGate::new(MemoryStore::default(), Duration::days(30));
        let now = Utc::now();

        assert!(!gate.is_verified(now));
        gate.confirm(now);
        assert!(gate.is_verified(now + Duration::days(29)));
        assert!(!gate.is_verified(now + Duration::days(30)));

        gate.reset();
        assert!(!gate.is_verified(now));
    }

    #[test]
    fn age_gate_rejects_garbage_timestamps() {
        let store = MemoryStore::default();
        store.set(AGE_VERIFIED_KEY, "not-a-timestamp".to_string());
        let gate = AgeGate::new(store, Duration::days(30));
        assert!(!gate.is_verified(Utc::now()));
    }

    #[test]
    fn session_staleness_at_48_hours() {
        let now = Utc::now();
        let session = AuthSession::new("token").loaded_at(now);

        assert!(!session.is_stale(now + Duration::hours(47)));
        assert!(session.is_stale(now + Duration::hours(48)));

        let session = session.reloaded(now + Duration::hours(48));
        assert!(!session.is_stale(now + Duration::hours(49)));
    }

    #[test]
    fn session_token_transitions() {
        let session = AuthSession::anonymous();
        assert!(session.token().is_none());

        let session = session.with_token("abc");
        assert_eq!(session.token(), Some("abc"));

        let session = session.cleared();
        assert!(session.token().is_none());
    }
}
