// src/auth/identity.rs

use std::fmt;
use std::sync::Arc;

use http::Request;

use super::Identity;

/// The authenticated user attached to a request.
///
/// Cheap to clone; the identity behind it is shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    identity: Arc<Identity>,
}

impl Principal {
    pub fn new(identity: Identity) -> Self {
        Principal {
            identity: Arc::new(identity),
        }
    }

    /// The Windows user name.
    pub fn name(&self) -> &str {
        self.identity.user_name()
    }

    /// Everything the engine reported about the user.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity.domain() {
            Some(domain) => write!(f, "{}\\{}", domain, self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Read access to the user a request was authenticated as.
///
/// Implemented for every `http::Request`; requests that did not pass
/// through the NTLM middleware report no user.
pub trait AuthenticatedRequest {
    /// The authenticated user name, if any.
    fn remote_user(&self) -> Option<&str>;

    /// The authenticated principal, if any.
    fn user_principal(&self) -> Option<&Principal>;
}

impl<B> AuthenticatedRequest for Request<B> {
    fn remote_user(&self) -> Option<&str> {
        self.user_principal().map(Principal::name)
    }

    fn user_principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}

/// Decorates `request` with `identity`.
///
/// Only the user accessors of [`AuthenticatedRequest`] change; method, URI,
/// headers, body and other extensions are untouched. A request that
/// already carries a principal is returned as is.
pub fn attach<B>(mut request: Request<B>, identity: &Identity) -> Request<B> {
    if let Some(existing) = request.user_principal() {
        log::trace!("request already authenticated as {}", existing);
        return request;
    }

    request
        .extensions_mut()
        .insert(Principal::new(identity.clone()));
    request
}
