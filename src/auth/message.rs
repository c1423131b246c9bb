// src/auth/message.rs

//! `Authorization: NTLM <base64>` decoding and `WWW-Authenticate` values.

use base64::Engine as _;
use http::{HeaderMap, HeaderValue};

use crate::error;
use crate::Result;

const SCHEME: &str = "NTLM";

/// Offset of the message type in every NTLM message, right after the
/// `NTLMSSP\0` signature.
const MESSAGE_TYPE_OFFSET: usize = 8;

const NEGOTIATE: u8 = 1;
const AUTHENTICATE: u8 = 3;

/// A decoded NTLM message received from a client.
///
/// Only Type 1 and Type 3 messages travel from client to server; a Type 2
/// (challenge) message is only ever sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// Type 1: the client asks for a challenge.
    Negotiate(Vec<u8>),
    /// Type 3: the client answers the challenge.
    Authenticate(Vec<u8>),
}

impl HandshakeMessage {
    /// Reads the NTLM message carried by the `Authorization` header.
    ///
    /// Returns `None` when there is no `Authorization` header or it uses a
    /// different scheme, and `Some(Err(_))` when the header claims to be
    /// NTLM but its payload is unusable.
    pub fn from_headers(headers: &HeaderMap) -> Option<Result<Self>> {
        let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
        let token = strip_scheme(value.trim())?;

        Some(
            base64::engine::general_purpose::STANDARD
                .decode(token)
                .map_err(error::protocol)
                .and_then(Self::decode),
        )
    }

    /// Classifies a raw NTLM message by its type byte.
    pub fn decode(message: Vec<u8>) -> Result<Self> {
        match message.get(MESSAGE_TYPE_OFFSET) {
            None => Err(error::protocol(format!(
                "NTLM message too short: {} bytes",
                message.len()
            ))),
            Some(&NEGOTIATE) => Ok(HandshakeMessage::Negotiate(message)),
            Some(&AUTHENTICATE) => Ok(HandshakeMessage::Authenticate(message)),
            Some(&other) => Err(error::protocol(format!(
                "unexpected NTLM message type: {}",
                other
            ))),
        }
    }

    /// The raw message bytes, as handed to the engine.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HandshakeMessage::Negotiate(bytes) | HandshakeMessage::Authenticate(bytes) => bytes,
        }
    }
}

/// Returns the token after `NTLM`, or `None` for other schemes.
fn strip_scheme(value: &str) -> Option<&str> {
    let scheme = value.get(..SCHEME.len())?;
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return None;
    }

    let rest = &value[SCHEME.len()..];
    if rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        Some(rest.trim())
    } else {
        // e.g. "NTLMv2 ..." is not ours
        None
    }
}

/// `WWW-Authenticate: NTLM`, asking the client to start over.
pub(crate) fn restart_challenge() -> HeaderValue {
    HeaderValue::from_static(SCHEME)
}

/// `WWW-Authenticate: NTLM <base64>` carrying a Type 2 message.
pub(crate) fn challenge_header(challenge_message: &[u8]) -> Result<HeaderValue> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(challenge_message);

    HeaderValue::from_str(&format!("{} {}", SCHEME, encoded))
        .map_err(|_| error::engine("challenge message is not a valid header value"))
}
