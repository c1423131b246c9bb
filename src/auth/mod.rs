// src/auth/mod.rs

//! Server side of the NTLM handshake.
//!
//! This module holds the pieces the middleware is made of: decoding the
//! `Authorization` header, issuing and remembering per-client server
//! challenges, calling into the [`NtlmEngine`], and attaching the resulting
//! [`Identity`] to requests.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;

mod challenge;
mod engine;
pub(crate) mod handshake;
mod identity;
mod message;

pub use self::challenge::{ChallengeStore, DEFAULT_CHALLENGE_TTL};
pub use self::engine::{EngineConfig, NtlmEngine};
pub use self::identity::{attach, AuthenticatedRequest, Principal};
pub use self::message::HandshakeMessage;

/// Key identifying one client for the duration of a handshake.
///
/// NTLM authenticates the connection, not the request, so the challenge
/// issued for a Type 1 message has to be found again when the Type 3
/// message arrives. By default the key is the peer IP address.
pub type ClientKey = String;

/// The 8 random bytes a server challenge message is built around.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerChallenge([u8; 8]);

impl ServerChallenge {
    /// Length of a server challenge in bytes.
    pub const LEN: usize = 8;

    /// Draws a fresh challenge from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LEN];
        OsRng.fill_bytes(&mut bytes);
        ServerChallenge(bytes)
    }

    /// Wraps existing bytes, mostly useful for tests and engines.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        ServerChallenge(bytes)
    }

    /// The raw challenge bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

// Challenges are secrets for as long as they are outstanding.
impl fmt::Debug for ServerChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerChallenge(..)")
    }
}

/// A principal verified by the [`NtlmEngine`].
///
/// Stored in the session once the handshake completes and handed to
/// downstream services through [`AuthenticatedRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    user_name: String,
    domain: Option<String>,
    workstation: Option<String>,
}

impl Identity {
    /// Creates an identity for `user_name`.
    pub fn new(user_name: impl Into<String>) -> Self {
        Identity {
            user_name: user_name.into(),
            domain: None,
            workstation: None,
        }
    }

    /// Sets the domain the user authenticated against.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets the workstation name the client reported.
    pub fn with_workstation(mut self, workstation: impl Into<String>) -> Self {
        self.workstation = Some(workstation.into());
        self
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn workstation(&self) -> Option<&str> {
        self.workstation.as_deref()
    }
}
