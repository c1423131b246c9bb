// src/auth/challenge.rs

//! Outstanding server challenges, one per client.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{ClientKey, ServerChallenge};

/// How long an issued challenge stays valid unless configured otherwise.
///
/// Browsers answer a Type 2 message immediately, so a minute is generous.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(60);

/// Maps each client to the server challenge it was last issued.
///
/// Every operation takes one store-wide lock, so a request racing a
/// negotiate from the same client sees either the whole new challenge or
/// none of it. The lock is never held across engine calls or I/O.
///
/// A challenge lives until it is consumed by an authenticate attempt,
/// replaced by a newer negotiate from the same client, or outlives the TTL.
/// Expired entries read as absent and are swept out during [`put`](Self::put).
pub struct ChallengeStore {
    ttl: Duration,
    state: Mutex<State>,
}

struct State {
    challenges: HashMap<ClientKey, Entry>,
    last_sweep: Instant,
}

struct Entry {
    challenge: ServerChallenge,
    issued: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.issued) < ttl
    }
}

impl ChallengeStore {
    /// Creates an empty store using [`DEFAULT_CHALLENGE_TTL`].
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CHALLENGE_TTL)
    }

    /// Creates an empty store whose challenges expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        ChallengeStore {
            ttl,
            state: Mutex::new(State {
                challenges: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `challenge` for `key`, replacing any earlier one.
    pub fn put(&self, key: &str, challenge: ServerChallenge) {
        let now = Instant::now();
        let mut state = self.lock();

        if now.saturating_duration_since(state.last_sweep) >= self.ttl {
            let ttl = self.ttl;
            state.challenges.retain(|_, entry| entry.is_live(now, ttl));
            state.last_sweep = now;
        }

        log::trace!("storing server challenge for {}", key);
        state.challenges.insert(
            key.to_owned(),
            Entry {
                challenge,
                issued: now,
            },
        );
    }

    /// Returns the live challenge for `key` without consuming it.
    pub fn get(&self, key: &str) -> Option<ServerChallenge> {
        let now = Instant::now();
        self.lock()
            .challenges
            .get(key)
            .filter(|entry| entry.is_live(now, self.ttl))
            .map(|entry| entry.challenge)
    }

    /// Removes and returns the live challenge for `key`.
    ///
    /// Lookup and removal happen under one lock acquisition: of two
    /// concurrent callers for the same key, at most one gets the challenge.
    pub fn take(&self, key: &str) -> Option<ServerChallenge> {
        let now = Instant::now();
        let entry = self.lock().challenges.remove(key)?;

        if entry.is_live(now, self.ttl) {
            log::trace!("consumed server challenge for {}", key);
            Some(entry.challenge)
        } else {
            log::trace!("discarded expired server challenge for {}", key);
            None
        }
    }

    /// Forgets any challenge stored for `key`. Removing a missing key is fine.
    pub fn remove(&self, key: &str) {
        if self.lock().challenges.remove(key).is_some() {
            log::trace!("removed server challenge for {}", key);
        }
    }

    /// Drops every expired challenge, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut state = self.lock();

        let before = state.challenges.len();
        state.challenges.retain(|_, entry| entry.is_live(now, ttl));
        state.last_sweep = now;
        before - state.challenges.len()
    }

    /// Drops every challenge; used on shutdown.
    pub fn clear(&self) {
        self.lock().challenges.clear();
    }

    /// Number of stored challenges, including ones that expired but have not
    /// been swept yet.
    pub fn len(&self) -> usize {
        self.lock().challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Entries are plain data; a panic elsewhere cannot leave one half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}
