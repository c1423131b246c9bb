// tests/support/engine.rs

//! A stand-in for a domain-controller backed engine.
//!
//! Message layout is NTLM-shaped but the "proof" is just the challenge and
//! the password in clear, which is enough to check the middleware feeds
//! the right challenge to the right authenticate call.
//!
//! ```text
//! type 1:  NTLMSSP\0 | 01 00 00 00 | flags
//! type 2:  NTLMSSP\0 | 02 00 00 00 | challenge[8]
//! type 3:  NTLMSSP\0 | 03 00 00 00 | challenge[8] | user ":" password
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use ntlm_sso::{BoxError, Identity, NtlmEngine, ServerChallenge};

const SIGNATURE: &[u8] = b"NTLMSSP\0";

pub fn type1() -> Vec<u8> {
    let mut msg = SIGNATURE.to_vec();
    msg.extend_from_slice(&[1, 0, 0, 0]);
    msg.extend_from_slice(&[0x07, 0x82, 0x08, 0xa2]);
    msg
}

pub fn type3(challenge: &ServerChallenge, user: &str, password: &str) -> Vec<u8> {
    let mut msg = SIGNATURE.to_vec();
    msg.extend_from_slice(&[3, 0, 0, 0]);
    msg.extend_from_slice(challenge.as_bytes());
    msg.extend_from_slice(format!("{}:{}", user, password).as_bytes());
    msg
}

pub fn challenge_of(type2: &[u8]) -> ServerChallenge {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&type2[12..20]);
    ServerChallenge::from_bytes(bytes)
}

#[derive(Default)]
pub struct FakeEngine {
    users: HashMap<String, String>,
    pub negotiate_calls: AtomicUsize,
    pub authenticate_calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: &str, password: &str) -> Self {
        self.users.insert(user.to_owned(), password.to_owned());
        self
    }

    pub fn authenticate_calls(&self) -> usize {
        self.authenticate_calls.load(Ordering::SeqCst)
    }
}

impl NtlmEngine for FakeEngine {
    fn negotiate(&self, message: &[u8], challenge: &ServerChallenge) -> Result<Vec<u8>, BoxError> {
        self.negotiate_calls.fetch_add(1, Ordering::SeqCst);
        if !message.starts_with(SIGNATURE) {
            return Err("missing NTLMSSP signature".into());
        }

        let mut reply = SIGNATURE.to_vec();
        reply.extend_from_slice(&[2, 0, 0, 0]);
        reply.extend_from_slice(challenge.as_bytes());
        Ok(reply)
    }

    fn authenticate(&self, message: &[u8], challenge: &ServerChallenge) -> Result<Identity, BoxError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        if message.len() < 20 {
            return Err("type 3 message too short".into());
        }
        if &message[12..20] != challenge.as_bytes() {
            return Err("response does not match server challenge".into());
        }

        let credentials = std::str::from_utf8(&message[20..])?;
        let (user, password) = credentials
            .split_once(':')
            .ok_or("malformed credentials")?;

        match self.users.get(user) {
            Some(expected) if expected == password => Ok(Identity::new(user).with_domain("CORP")),
            _ => Err(format!("logon failure for {}", user).into()),
        }
    }
}
