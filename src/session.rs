// src/session.rs

//! Where authenticated identities live between requests.
//!
//! NTLM authenticates a connection once; after that the browser only sends
//! a session cookie. The middleware keeps exactly one attribute per session,
//! the [`Identity`], in a [`SessionStore`] supplied by the host.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use base64::Engine as _;
use cookie::{Cookie, SameSite};
use http::{HeaderMap, HeaderValue};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::auth::Identity;

/// Cookie carrying the session token unless configured otherwise.
pub const DEFAULT_SESSION_COOKIE: &str = "NTLMSESSIONID";

/// How long a [`MemorySessionStore`] session may sit unused unless
/// configured otherwise.
pub const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const SESSION_ID_BYTES: usize = 32;

/// Per-session storage of the authenticated identity.
///
/// Implementations must be safe to call from many requests at once; the
/// middleware performs at most one read and one write per request.
pub trait SessionStore: Send + Sync + 'static {
    /// The identity stored in session `session_id`, if that session exists
    /// and is authenticated.
    fn identity(&self, session_id: &str) -> Option<Identity>;

    /// Stores `identity` in session `session_id`.
    ///
    /// When `session_id` is `None` or names no live session, a new session
    /// is created. Returns the id of the session now holding the identity.
    fn store_identity(&self, session_id: Option<&str>, identity: Identity) -> String;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn identity(&self, session_id: &str) -> Option<Identity> {
        (**self).identity(session_id)
    }

    fn store_identity(&self, session_id: Option<&str>, identity: Identity) -> String {
        (**self).store_identity(session_id, identity)
    }
}

/// A process-local [`SessionStore`].
///
/// A session ends when it goes unused for longer than the idle timeout, or
/// on [`invalidate`](Self::invalidate). Idle sessions read as absent and are
/// swept out while new sessions are stored. Session ids are 256 bits from
/// the OS CSPRNG, and ids sent by a client are only reused when this store
/// issued them.
pub struct MemorySessionStore {
    idle_timeout: Duration,
    state: Mutex<State>,
}

struct State {
    sessions: HashMap<String, Entry>,
    last_sweep: Instant,
}

struct Entry {
    identity: Identity,
    last_seen: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) < idle_timeout
    }
}

impl MemorySessionStore {
    /// Creates an empty store using [`DEFAULT_SESSION_IDLE_TIMEOUT`].
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_SESSION_IDLE_TIMEOUT)
    }

    /// Creates an empty store whose sessions end after `idle_timeout`
    /// without a request.
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        MemorySessionStore {
            idle_timeout,
            state: Mutex::new(State {
                sessions: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Ends session `session_id`, returning the identity it held.
    pub fn invalidate(&self, session_id: &str) -> Option<Identity> {
        self.lock()
            .sessions
            .remove(session_id)
            .map(|entry| entry.identity)
    }

    /// Drops every idle session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.idle_timeout;
        let mut state = self.lock();

        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, entry| entry.is_live(now, idle_timeout));
        state.last_sweep = now;
        before - state.sessions.len()
    }

    /// Number of stored sessions, including idle ones not swept yet.
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn identity(&self, session_id: &str) -> Option<Identity> {
        let now = Instant::now();
        let mut state = self.lock();

        let entry = state.sessions.get_mut(session_id)?;
        if entry.is_live(now, self.idle_timeout) {
            entry.last_seen = now;
            return Some(entry.identity.clone());
        }

        log::trace!("session for {} timed out", entry.identity.user_name());
        state.sessions.remove(session_id);
        None
    }

    fn store_identity(&self, session_id: Option<&str>, identity: Identity) -> String {
        let now = Instant::now();
        let idle_timeout = self.idle_timeout;
        let mut state = self.lock();

        if now.saturating_duration_since(state.last_sweep) >= idle_timeout {
            state
                .sessions
                .retain(|_, entry| entry.is_live(now, idle_timeout));
            state.last_sweep = now;
        }

        if let Some(id) = session_id {
            if let Some(entry) = state.sessions.get_mut(id) {
                if entry.is_live(now, idle_timeout) {
                    entry.identity = identity;
                    entry.last_seen = now;
                    return id.to_owned();
                }
            }
        }

        let id = new_session_id();
        log::trace!("created session for {}", identity.user_name());
        state.sessions.insert(
            id.clone(),
            Entry {
                identity,
                last_seen: now,
            },
        );
        id
    }
}

impl fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("idle_timeout", &self.idle_timeout)
            .field("sessions", &self.len())
            .finish()
    }
}

fn new_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Finds the value of cookie `name` in the request's `Cookie` headers.
pub(crate) fn session_id(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| Cookie::split_parse(cookies))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name && !cookie.value_trimmed().is_empty())
        .map(|cookie| cookie.value_trimmed().to_owned())
}

/// `Set-Cookie` value announcing a newly created session.
pub(crate) fn session_cookie(name: &str, session_id: &str) -> Option<HeaderValue> {
    let cookie = Cookie::build((name, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    HeaderValue::from_str(&cookie.to_string()).ok()
}
