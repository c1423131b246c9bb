// src/auth/engine.rs

use std::fmt;
use std::sync::Arc;

use super::{Identity, ServerChallenge};
use crate::error::{self, BoxError};

/// The cryptographic half of NTLM.
///
/// The middleware decides *when* to challenge and remembers *which*
/// challenge a client was given; an engine builds the Type 2 message and
/// verifies the Type 3 proof, typically by asking a domain controller.
///
/// Engines are shared by every request and must not keep per-handshake
/// state: the server challenge is passed back in on every call.
pub trait NtlmEngine: Send + Sync + 'static {
    /// Builds the Type 2 (challenge) message answering a Type 1 message.
    fn negotiate(&self, message: &[u8], challenge: &ServerChallenge) -> Result<Vec<u8>, BoxError>;

    /// Verifies a Type 3 message against the challenge the client was issued.
    fn authenticate(
        &self,
        message: &[u8],
        challenge: &ServerChallenge,
    ) -> Result<Identity, BoxError>;
}

impl<E: NtlmEngine + ?Sized> NtlmEngine for Arc<E> {
    fn negotiate(&self, message: &[u8], challenge: &ServerChallenge) -> Result<Vec<u8>, BoxError> {
        (**self).negotiate(message, challenge)
    }

    fn authenticate(
        &self,
        message: &[u8],
        challenge: &ServerChallenge,
    ) -> Result<Identity, BoxError> {
        (**self).authenticate(message, challenge)
    }
}

/// What an engine needs to reach the domain.
///
/// The service password never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct EngineConfig {
    domain: String,
    domain_controller: String,
    domain_controller_host_name: String,
    service_account: String,
    service_password: String,
}

impl EngineConfig {
    /// Creates a configuration.
    ///
    /// * `domain` - the Windows domain name
    /// * `domain_controller` - address of the domain controller
    /// * `domain_controller_host_name` - NetBIOS/DNS name of the domain controller
    /// * `service_account` - computer account used to talk to the domain controller
    /// * `service_password` - password of that account
    pub fn new(
        domain: impl Into<String>,
        domain_controller: impl Into<String>,
        domain_controller_host_name: impl Into<String>,
        service_account: impl Into<String>,
        service_password: impl Into<String>,
    ) -> Self {
        EngineConfig {
            domain: domain.into(),
            domain_controller: domain_controller.into(),
            domain_controller_host_name: domain_controller_host_name.into(),
            service_account: service_account.into(),
            service_password: service_password.into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn domain_controller(&self) -> &str {
        &self.domain_controller
    }

    pub fn domain_controller_host_name(&self) -> &str {
        &self.domain_controller_host_name
    }

    pub fn service_account(&self) -> &str {
        &self.service_account
    }

    pub fn service_password(&self) -> &str {
        &self.service_password
    }

    /// Checks that every field needed to reach the domain controller is set.
    pub(crate) fn validate(&self) -> crate::Result<()> {
        let fields = [
            ("domain", &self.domain),
            ("domain controller", &self.domain_controller),
            ("domain controller host name", &self.domain_controller_host_name),
            ("service account", &self.service_account),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(error::builder(format!("NTLM {} is not configured", name)));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("domain", &self.domain)
            .field("domain_controller", &self.domain_controller)
            .field("domain_controller_host_name", &self.domain_controller_host_name)
            .field("service_account", &self.service_account)
            .field("service_password", &"<redacted>")
            .finish()
    }
}
