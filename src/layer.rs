// src/layer.rs

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use http::request::Parts;
use http::{header, HeaderValue, Request, Response, StatusCode};
use pin_project_lite::pin_project;
use tower::Layer;
use tower_service::Service;

use crate::auth::handshake::{Handshake, Step};
use crate::auth::{attach, ChallengeStore, ClientKey, EngineConfig, NtlmEngine};
use crate::error::{self, BoxError};
use crate::session::{
    self, MemorySessionStore, SessionStore, DEFAULT_SESSION_COOKIE, DEFAULT_SESSION_IDLE_TIMEOUT,
};

type KeyFn = Arc<dyn Fn(&Parts) -> Option<ClientKey> + Send + Sync>;

/// Address of the peer a request came from.
///
/// Serving loops insert this into the request extensions so the default
/// client key can be derived. A bare `SocketAddr` extension is accepted too.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteAddr(pub SocketAddr);

/// Default client key: the peer IP address, without the port, since
/// browsers may open a new connection between handshake messages.
fn remote_ip(parts: &Parts) -> Option<ClientKey> {
    parts
        .extensions
        .get::<RemoteAddr>()
        .map(|addr| addr.0)
        .or_else(|| parts.extensions.get::<SocketAddr>().copied())
        .map(|addr| addr.ip().to_string())
}

/// Applies NTLM single-sign-on to a service.
///
/// All services produced by one layer share its challenge store, session
/// store and engine.
#[derive(Clone)]
pub struct NtlmLayer {
    shared: Arc<Shared>,
}

struct Shared {
    handshake: Handshake,
    sessions: Arc<dyn SessionStore>,
    cookie_name: String,
    client_key: KeyFn,
}

impl NtlmLayer {
    /// Creates a `Builder` to configure an `NtlmLayer`.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// The store holding outstanding challenges.
    pub fn challenges(&self) -> &Arc<ChallengeStore> {
        self.shared.handshake.challenges()
    }

    /// Drops all outstanding challenges.
    ///
    /// Call when the enclosing server shuts down; clients in the middle of a
    /// handshake will be asked to start over by the next instance.
    pub fn shutdown(&self) {
        log::debug!("clearing NTLM challenge store");
        self.challenges().clear();
    }
}

impl<S> Layer<S> for NtlmLayer {
    type Service = NtlmService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NtlmService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for NtlmLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtlmLayer")
            .field("shared", &self.shared)
            .finish()
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("handshake", &self.handshake)
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

/// A `Builder` can be used to create an [`NtlmLayer`] with custom configuration.
///
/// Configuration errors are remembered and reported by [`build`](Self::build),
/// so the builder can be chained without checking every step.
#[must_use]
pub struct Builder {
    config: Config,
}

struct Config {
    engine: Option<Arc<dyn NtlmEngine>>,
    sessions: Option<Arc<dyn SessionStore>>,
    challenges: Option<Arc<ChallengeStore>>,
    challenge_ttl: Duration,
    session_idle_timeout: Duration,
    cookie_name: String,
    client_key: KeyFn,
    error: Option<crate::Error>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Constructs a new `Builder`.
    ///
    /// This is the same as `NtlmLayer::builder()`.
    pub fn new() -> Builder {
        Builder {
            config: Config {
                engine: None,
                sessions: None,
                challenges: None,
                challenge_ttl: crate::auth::DEFAULT_CHALLENGE_TTL,
                session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
                cookie_name: DEFAULT_SESSION_COOKIE.to_owned(),
                client_key: Arc::new(remote_ip),
                error: None,
            },
        }
    }

    /// Returns an `NtlmLayer` that uses this `Builder` configuration.
    ///
    /// # Errors
    ///
    /// This method fails if no engine was configured, if the engine could
    /// not be constructed, or if any setting was invalid.
    pub fn build(self) -> crate::Result<NtlmLayer> {
        let config = self.config;

        if let Some(err) = config.error {
            return Err(err);
        }

        let engine = config
            .engine
            .ok_or_else(|| error::builder("no NTLM engine configured"))?;

        let challenges = match config.challenges {
            Some(store) => store,
            None => {
                if config.challenge_ttl.is_zero() {
                    return Err(error::builder("challenge TTL must be greater than zero"));
                }
                Arc::new(ChallengeStore::with_ttl(config.challenge_ttl))
            }
        };

        let sessions: Arc<dyn SessionStore> = match config.sessions {
            Some(store) => store,
            None => {
                if config.session_idle_timeout.is_zero() {
                    return Err(error::builder("session idle timeout must be greater than zero"));
                }
                Arc::new(MemorySessionStore::with_idle_timeout(
                    config.session_idle_timeout,
                ))
            }
        };

        log::info!("NTLM filter initialized");

        Ok(NtlmLayer {
            shared: Arc::new(Shared {
                handshake: Handshake::new(engine, challenges),
                sessions,
                cookie_name: config.cookie_name,
                client_key: config.client_key,
            }),
        })
    }

    /// Uses an already constructed engine.
    pub fn engine<E: NtlmEngine>(mut self, engine: E) -> Builder {
        self.config.engine = Some(Arc::new(engine));
        self
    }

    /// Constructs the engine from `config` with `connect`.
    ///
    /// The configuration is checked for missing fields first. A failure in
    /// either step makes [`build`](Self::build) fail.
    pub fn engine_from_config<E, F>(self, config: EngineConfig, connect: F) -> Builder
    where
        E: NtlmEngine,
        F: FnOnce(&EngineConfig) -> Result<E, BoxError>,
    {
        log::info!("Windows domain: {}", config.domain());
        log::info!("Domain controller address: {}", config.domain_controller());
        log::info!(
            "Domain controller hostname: {}",
            config.domain_controller_host_name()
        );
        log::info!("Service account name: {}", config.service_account());

        match config.validate().and_then(|()| connect(&config).map_err(error::engine)) {
            Ok(engine) => self.engine(engine),
            Err(err) => {
                log::error!("NTLM engine initialization failed: {}", err);
                self.with_err(err)
            }
        }
    }

    /// Sets where authenticated identities are kept between requests.
    ///
    /// Defaults to a fresh [`MemorySessionStore`].
    pub fn session_store<S: SessionStore>(mut self, store: S) -> Builder {
        self.config.sessions = Some(Arc::new(store));
        self
    }

    /// Shares an existing challenge store instead of creating one.
    ///
    /// The store keeps its own TTL; [`challenge_ttl`](Self::challenge_ttl) is
    /// ignored.
    pub fn challenge_store(mut self, store: Arc<ChallengeStore>) -> Builder {
        self.config.challenges = Some(store);
        self
    }

    /// How long an issued challenge may wait for its authenticate message.
    ///
    /// Default is 60 seconds.
    pub fn challenge_ttl(mut self, ttl: Duration) -> Builder {
        self.config.challenge_ttl = ttl;
        self
    }

    /// How long a session of the default [`MemorySessionStore`] may go
    /// without a request before the client has to authenticate again.
    ///
    /// Default is 30 minutes. Ignored when a
    /// [`session_store`](Self::session_store) is supplied.
    pub fn session_idle_timeout(mut self, timeout: Duration) -> Builder {
        self.config.session_idle_timeout = timeout;
        self
    }

    /// Name of the cookie carrying the session id.
    ///
    /// Default is `NTLMSESSIONID`.
    pub fn session_cookie(mut self, name: impl Into<String>) -> Builder {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"-_.".contains(&b));

        if valid {
            self.config.cookie_name = name;
            self
        } else {
            self.with_err(error::builder(format!("invalid session cookie name: {:?}", name)))
        }
    }

    /// Derives the key identifying a client between handshake messages.
    ///
    /// The default uses the peer IP address from the [`RemoteAddr`]
    /// extension. Behind a proxy every client shares the proxy's address,
    /// so supply a key function reading e.g. a trusted forwarding header.
    pub fn client_key<F>(mut self, f: F) -> Builder
    where
        F: Fn(&Parts) -> Option<ClientKey> + Send + Sync + 'static,
    {
        self.config.client_key = Arc::new(f);
        self
    }

    fn with_err(mut self, err: crate::Error) -> Builder {
        // keep the first error
        self.config.error.get_or_insert(err);
        self
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("has_engine", &self.config.engine.is_some())
            .field("challenge_ttl", &self.config.challenge_ttl)
            .field("session_idle_timeout", &self.config.session_idle_timeout)
            .field("cookie_name", &self.config.cookie_name)
            .field("error", &self.config.error)
            .finish()
    }
}

/// Middleware that authenticates requests with NTLM before passing them on.
///
/// Created by [`NtlmLayer`].
#[derive(Clone)]
pub struct NtlmService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for NtlmService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let shared = &self.shared;
        let (parts, body) = req.into_parts();
        let session_id = session::session_id(&parts.headers, &shared.cookie_name);

        if let Some(identity) = session_id
            .as_deref()
            .and_then(|id| shared.sessions.identity(id))
        {
            log::debug!("NTLM user in session: {}", identity.user_name());
            let req = attach(Request::from_parts(parts, body), &identity);
            return ResponseFuture::forward(self.inner.call(req), None);
        }

        let client = (shared.client_key)(&parts);
        match shared.handshake.respond(&parts.headers, client.as_deref()) {
            Step::Challenge(challenge) => ResponseFuture::unauthorized(challenge),
            Step::Authenticated(identity) => {
                log::info!("authenticated {}, storing identity in session", identity.user_name());
                let stored = shared
                    .sessions
                    .store_identity(session_id.as_deref(), identity.clone());
                let set_cookie = if session_id.as_deref() == Some(stored.as_str()) {
                    None
                } else {
                    session::session_cookie(&shared.cookie_name, &stored)
                };

                let req = attach(Request::from_parts(parts, body), &identity);
                ResponseFuture::forward(self.inner.call(req), set_cookie)
            }
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for NtlmService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtlmService")
            .field("inner", &self.inner)
            .field("shared", &self.shared)
            .finish()
    }
}

pin_project! {
    /// Response future for [`NtlmService`].
    pub struct ResponseFuture<F, B> {
        #[pin]
        state: State<F, B>,
    }
}

pin_project! {
    #[project = StateProj]
    enum State<F, B> {
        Forward {
            #[pin]
            future: F,
            set_cookie: Option<HeaderValue>,
        },
        Unauthorized {
            response: Option<Response<B>>,
        },
    }
}

impl<F, B: Default> ResponseFuture<F, B> {
    fn forward(future: F, set_cookie: Option<HeaderValue>) -> Self {
        ResponseFuture {
            state: State::Forward { future, set_cookie },
        }
    }

    /// 401 with an empty body, ending the request here.
    fn unauthorized(challenge: HeaderValue) -> Self {
        let mut res = Response::new(B::default());
        *res.status_mut() = StatusCode::UNAUTHORIZED;
        res.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
        res.headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));

        ResponseFuture {
            state: State::Unauthorized {
                response: Some(res),
            },
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().state.project() {
            StateProj::Forward { future, set_cookie } => {
                let mut res = ready!(future.poll(cx))?;
                if let Some(cookie) = set_cookie.take() {
                    res.headers_mut().append(header::SET_COOKIE, cookie);
                }
                Poll::Ready(Ok(res))
            }
            StateProj::Unauthorized { response } => {
                Poll::Ready(Ok(response.take().expect("polled after completion")))
            }
        }
    }
}

impl<F, B> fmt::Debug for ResponseFuture<F, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture").finish()
    }
}
