// src/lib.rs

#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # ntlm-sso
//!
//! NTLM single-sign-on for HTTP servers built on [`tower`].
//!
//! [`NtlmLayer`] wraps any `tower::Service<http::Request<B>>`. Requests
//! whose session already carries an authenticated [`Identity`] pass straight
//! through; everything else is driven through the NTLM challenge-response
//! handshake over the `Authorization` / `WWW-Authenticate` headers:
//!
//! ```text
//! client                                   NtlmService
//!   | GET /                                     |
//!   |------------------------------------------>|  no session, no header
//!   |<------------- 401 WWW-Authenticate: NTLM  |
//!   | Authorization: NTLM <type 1>              |
//!   |------------------------------------------>|  challenge stored per client
//!   |<------ 401 WWW-Authenticate: NTLM <type 2>|
//!   | Authorization: NTLM <type 3>              |
//!   |------------------------------------------>|  challenge consumed, engine verifies
//!   |<------------ 200 (inner service response) |  identity stored in session
//! ```
//!
//! The cryptography lives behind the [`NtlmEngine`] trait and session
//! persistence behind [`SessionStore`]; both are supplied by the host.
//!
//! ```no_run
//! # use ntlm_sso::{BoxError, EngineConfig, Identity, NtlmEngine, NtlmLayer, ServerChallenge};
//! # struct DcEngine;
//! # impl DcEngine { fn connect(_: &EngineConfig) -> Result<Self, BoxError> { Ok(DcEngine) } }
//! # impl NtlmEngine for DcEngine {
//! #     fn negotiate(&self, _: &[u8], _: &ServerChallenge) -> Result<Vec<u8>, BoxError> { unimplemented!() }
//! #     fn authenticate(&self, _: &[u8], _: &ServerChallenge) -> Result<Identity, BoxError> { unimplemented!() }
//! # }
//! # fn run() -> ntlm_sso::Result<()> {
//! let config = EngineConfig::new("CORP", "10.0.0.1", "dc1.corp.example", "web$", "secret");
//!
//! let layer = NtlmLayer::builder()
//!     .engine_from_config(config, DcEngine::connect)
//!     .build()?;
//! # let _ = layer;
//! # Ok(())
//! # }
//! ```
//!
//! Downstream handlers read the principal through [`AuthenticatedRequest`]:
//!
//! ```
//! use ntlm_sso::AuthenticatedRequest;
//!
//! fn greet<B>(req: &http::Request<B>) -> String {
//!     match req.remote_user() {
//!         Some(user) => format!("hello, {user}"),
//!         None => "hello, stranger".to_owned(),
//!     }
//! }
//! ```

pub use self::auth::{
    AuthenticatedRequest, ChallengeStore, ClientKey, EngineConfig, HandshakeMessage, Identity,
    NtlmEngine, Principal, ServerChallenge,
};
pub use self::error::{BoxError, Error, Result};
pub use self::layer::{Builder, NtlmLayer, NtlmService, RemoteAddr, ResponseFuture};
pub use self::session::{MemorySessionStore, SessionStore};

pub mod auth;
mod error;
mod layer;
pub mod session;
