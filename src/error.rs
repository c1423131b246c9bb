// src/error.rs

use std::error::Error as StdError;
use std::fmt;

/// A `Result` alias where the `Err` case is `ntlm_sso::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by [`NtlmEngine`](crate::NtlmEngine) implementations.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The Errors that may occur while building the middleware or running a
/// handshake.
///
/// Handshake errors never reach the caller of the service; they are logged
/// and turned into a fresh `WWW-Authenticate: NTLM` challenge. Only
/// [`Builder::build`](crate::Builder::build) returns them directly.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// Returns true if the error came from an invalid middleware configuration.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// Returns true if the error came from the NTLM engine, either while
    /// constructing it or while producing a challenge message.
    pub fn is_engine(&self) -> bool {
        matches!(self.inner.kind, Kind::Engine)
    }

    /// Returns true if the `Authorization` header could not be understood.
    pub fn is_protocol(&self) -> bool {
        matches!(self.inner.kind, Kind::Protocol)
    }

    /// Returns true if the engine rejected the client's credentials.
    pub fn is_credentials(&self) -> bool {
        matches!(self.inner.kind, Kind::Credentials)
    }

    /// Returns true if an authenticate message arrived with no outstanding
    /// challenge for its client.
    pub fn is_challenge_missing(&self) -> bool {
        matches!(self.inner.kind, Kind::ChallengeMissing)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("ntlm_sso::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Engine => f.write_str("ntlm engine error")?,
            Kind::Protocol => f.write_str("malformed ntlm authorization")?,
            Kind::Credentials => f.write_str("ntlm authentication failed")?,
            Kind::ChallengeMissing => f.write_str("no outstanding ntlm challenge")?,
        }

        if let Some(e) = &self.inner.source {
            write!(f, ": {e}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) enum Kind {
    Builder,
    Engine,
    Protocol,
    Credentials,
    ChallengeMissing,
}

// constructors

pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder, Some(e))
}

pub(crate) fn engine<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Engine, Some(e))
}

pub(crate) fn protocol<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Protocol, Some(e))
}

pub(crate) fn credentials<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Credentials, Some(e))
}

pub(crate) fn challenge_missing() -> Error {
    Error::new(Kind::ChallengeMissing, None::<BoxError>)
}
