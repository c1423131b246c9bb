// src/auth/handshake.rs

//! The NTLM handshake, one request at a time.
//!
//! Per client the handshake moves `Unauthenticated -> ChallengeIssued ->
//! Authenticated`. Nothing about it is kept outside the [`ChallengeStore`]:
//! a Type 1 message stores a fresh challenge, the following Type 3 message
//! consumes it. Any failure sends the client back to the start with a bare
//! `WWW-Authenticate: NTLM`.

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderValue};

use super::message::{self, HandshakeMessage};
use super::{ChallengeStore, Identity, NtlmEngine, ServerChallenge};
use crate::error;

/// What the middleware does with a request that has no session identity.
#[derive(Debug)]
pub(crate) enum Step {
    /// Answer 401 with this `WWW-Authenticate` value.
    Challenge(HeaderValue),
    /// The handshake completed; store the identity and forward the request.
    Authenticated(Identity),
}

impl Step {
    fn restart() -> Self {
        Step::Challenge(message::restart_challenge())
    }
}

#[derive(Clone)]
pub(crate) struct Handshake {
    engine: Arc<dyn NtlmEngine>,
    challenges: Arc<ChallengeStore>,
}

impl Handshake {
    pub(crate) fn new(engine: Arc<dyn NtlmEngine>, challenges: Arc<ChallengeStore>) -> Self {
        Handshake { engine, challenges }
    }

    pub(crate) fn challenges(&self) -> &Arc<ChallengeStore> {
        &self.challenges
    }

    /// Advances the handshake for `client` using the request's headers.
    ///
    /// Never fails: every error is logged and answered with a restart.
    pub(crate) fn respond(&self, headers: &HeaderMap, client: Option<&str>) -> Step {
        let msg = match HandshakeMessage::from_headers(headers) {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                log::debug!("restarting NTLM handshake: {}", err);
                return Step::restart();
            }
            None => {
                log::debug!("no NTLM authorization, starting handshake");
                return Step::restart();
            }
        };

        let client = match client {
            Some(client) => client,
            None => {
                log::warn!("no client key for request, cannot track NTLM handshake");
                return Step::restart();
            }
        };

        match self.advance(msg, client) {
            Ok(step) => step,
            Err(err) => {
                if err.is_credentials() {
                    log::warn!("NTLM authentication failed for {}: {}", client, err);
                } else if err.is_challenge_missing() {
                    log::warn!("no challenge found for client {}, restarting", client);
                } else {
                    log::error!("NTLM handshake error for {}: {}", client, err);
                }
                Step::restart()
            }
        }
    }

    fn advance(&self, msg: HandshakeMessage, client: &str) -> crate::Result<Step> {
        match msg {
            HandshakeMessage::Negotiate(bytes) => {
                log::debug!("creating server challenge for {}", client);
                let challenge = ServerChallenge::generate();

                let reply = self
                    .engine
                    .negotiate(&bytes, &challenge)
                    .map_err(error::engine)?;
                let header = message::challenge_header(&reply)?;

                self.challenges.put(client, challenge);
                Ok(Step::Challenge(header))
            }
            HandshakeMessage::Authenticate(bytes) => {
                // Consumed before the engine runs: a challenge answers at
                // most one authenticate message, whatever its outcome.
                let challenge = self
                    .challenges
                    .take(client)
                    .ok_or_else(error::challenge_missing)?;

                log::debug!("authenticating {}", client);
                let identity = self
                    .engine
                    .authenticate(&bytes, &challenge)
                    .map_err(error::credentials)?;

                log::debug!("NTLM remote user {}", identity.user_name());
                Ok(Step::Authenticated(identity))
            }
        }
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("challenges", &self.challenges)
            .finish()
    }
}
