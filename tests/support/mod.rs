// tests/support/mod.rs

#![allow(dead_code)]

pub mod engine;
pub mod server;

use std::net::SocketAddr;

use base64::Engine as _;
use http::header::{AUTHORIZATION, COOKIE, SET_COOKIE, WWW_AUTHENTICATE};
use http::{HeaderMap, Request};
use ntlm_sso::{RemoteAddr, ServerChallenge};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// `Authorization` value carrying a Type 1 message.
pub fn negotiate_header() -> String {
    format!("NTLM {}", b64(&engine::type1()))
}

/// `Authorization` value answering the Type 2 message in `www_authenticate`.
pub fn authenticate_header(www_authenticate: &str, user: &str, password: &str) -> String {
    let challenge = challenge_from(www_authenticate);
    format!("NTLM {}", b64(&engine::type3(&challenge, user, password)))
}

/// Pulls the server challenge out of a `WWW-Authenticate: NTLM <type 2>` value.
pub fn challenge_from(www_authenticate: &str) -> ServerChallenge {
    let token = www_authenticate
        .strip_prefix("NTLM ")
        .expect("challenge carries a payload");
    let type2 = base64::engine::general_purpose::STANDARD
        .decode(token)
        .expect("valid base64");
    engine::challenge_of(&type2)
}

pub fn www_authenticate(headers: &HeaderMap) -> &str {
    headers
        .get(WWW_AUTHENTICATE)
        .expect("WWW-Authenticate header")
        .to_str()
        .unwrap()
}

/// `name=value` part of the `Set-Cookie` header, ready to send back.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(SET_COOKIE)?.to_str().ok()?;
    let cookie = cookie::Cookie::parse(value).ok()?;
    Some(cookie.stripped().to_string())
}

/// A request from `ip`, as a serving loop would hand it to the middleware.
pub fn request(ip: &str, authorization: Option<&str>, cookie: Option<&str>) -> Request<()> {
    let mut builder = Request::builder().uri("/whoami");
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    if let Some(value) = cookie {
        builder = builder.header(COOKIE, value);
    }

    let mut req = builder.body(()).unwrap();
    let addr: SocketAddr = format!("{}:50000", ip).parse().unwrap();
    req.extensions_mut().insert(RemoteAddr(addr));
    req
}
