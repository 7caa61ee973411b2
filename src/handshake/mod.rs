// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Websocket [handshakes](https://tools.ietf.org/html/rfc6455#section-4)
//! for both endpoints.
//!
//! [`Client`] sends the upgrade request and verifies the response,
//! [`Server`] parses the request and produces the response. Both parse
//! the peer's headers line by line off the transport and carry any bytes
//! received past the end of the handshake over into the
//! [`connection::Builder`](crate::connection::Builder).

pub(crate) mod http;

pub mod client;
pub mod server;

pub use client::{Client, ServerResponse};
pub use server::{ClientRequest, Response, Server};

use crate::{extension::Extension, BoxedError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use std::{io, str};

/// Defined in RFC 6455 and used to compute the `Sec-WebSocket-Accept`
/// header value in the server handshake response.
const KEY: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The base64-encoded length of the 16-byte request nonce.
pub(crate) const NONCE_SIZE: usize = 24;

/// The base64-encoded length of the 20-byte accept digest.
pub(crate) const ACCEPT_SIZE: usize = 28;

// Header names in the canonical form produced by [`http::canonicalize`].
const SEC_WEBSOCKET_ACCEPT: &str = "Sec-Websocket-Accept";
const SEC_WEBSOCKET_EXTENSIONS: &str = "Sec-Websocket-Extensions";
const SEC_WEBSOCKET_KEY: &str = "Sec-Websocket-Key";
const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-Websocket-Protocol";
const SEC_WEBSOCKET_VERSION: &str = "Sec-Websocket-Version";

/// Fill `nonce` with the base64 encoding of 16 cryptographically
/// random bytes.
pub(crate) fn generate_nonce(nonce: &mut [u8; NONCE_SIZE]) {
    let raw: [u8; 16] = rand::random();
    let n = BASE64.encode_slice(raw, nonce)
        .expect("24 bytes hold the base64 encoding of 16 bytes");
    debug_assert_eq!(n, NONCE_SIZE)
}

/// Compute the accept value for the given nonce.
pub(crate) fn accept_value(nonce: &[u8], accept: &mut [u8; ACCEPT_SIZE]) {
    let mut digest = Sha1::new();
    digest.update(nonce);
    digest.update(KEY);
    let n = BASE64.encode_slice(digest.finalize(), accept)
        .expect("28 bytes hold the base64 encoding of a sha1 digest");
    debug_assert_eq!(n, ACCEPT_SIZE)
}

/// Does `theirs` equal the accept value of `nonce`?
///
/// The accept value is not a secret, so plain equality suffices.
pub(crate) fn check_accept(nonce: &[u8], theirs: &[u8]) -> bool {
    let mut ours = [0; ACCEPT_SIZE];
    accept_value(nonce, &mut ours);
    ours[..] == *theirs
}

/// Append the `Sec-WebSocket-Extensions` header for the given extensions
/// (if any) to an outgoing request or response.
pub(crate) fn append_extensions<'a, I>(extensions: I, buffer: &mut BytesMut)
where
    I: IntoIterator<Item = &'a Box<dyn Extension + Send>>
{
    let mut iter = extensions.into_iter().peekable();
    if iter.peek().is_none() {
        return
    }
    buffer.extend_from_slice(b"\r\nSec-WebSocket-Extensions: ");
    while let Some(e) = iter.next() {
        buffer.extend_from_slice(e.name().as_bytes());
        for p in e.params() {
            buffer.extend_from_slice(b"; ");
            buffer.extend_from_slice(p.to_string().as_bytes())
        }
        if iter.peek().is_some() {
            buffer.extend_from_slice(b", ")
        }
    }
}

/// Scan a `Sec-WebSocket-Extensions` header value and offer each element
/// to the extension with the matching name.
///
/// With `strict` set (client side), an element naming an extension we
/// never asked for is an error; otherwise (server side) it is ignored.
/// Only the first element per extension is passed on, so the first
/// accepted occurrence wins.
pub(crate) fn configure_extensions(
    extensions: &mut [Box<dyn Extension + Send>],
    value: &str,
    strict: bool
) -> Result<(), Error> {
    let options = match http::parse_options(value) {
        Some(options) => options,
        None => return Err(Error::BadExtensions)
    };
    for option in options {
        let known = extensions.iter_mut()
            .find(|e| e.name().eq_ignore_ascii_case(option.name));
        match known {
            Some(e) => {
                log::debug!("configuring extension: {}", e.name());
                e.configure(&option.params).map_err(Error::Extension)?
            }
            None if strict => return Err(Error::BadExtensions),
            None => log::debug!("ignoring unknown extension: {}", option.name)
        }
    }
    Ok(())
}

/// Does a comma-separated list of tokens contain `token`
/// (case-insensitively)?
pub(crate) fn contains_token(value: &[u8], token: &str) -> bool {
    value.split(|&b| b == b',')
        .map(http::trim)
        .any(|t| t.eq_ignore_ascii_case(token.as_bytes()))
}

/// Parse the `HTTP/<major>.<minor>` protocol version of a request or
/// status line. Only major version 1 with minor version >= 1 is accepted.
pub(crate) fn check_http_version(version: &[u8]) -> Result<(), Error> {
    let digits = match version.strip_prefix(b"HTTP/1.") {
        Some(minor) if !minor.is_empty() => minor,
        _ => return Err(Error::BadProtocol)
    };
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::BadProtocol)
    }
    // "HTTP/1.0" is the only version below 1.1 that can appear here.
    if digits == b"0" {
        return Err(Error::BadProtocol)
    }
    Ok(())
}

/// Enumeration of possible handshake errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error has been encountered.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// An unsupported HTTP version was encountered.
    #[error("unsupported http version")]
    BadProtocol,
    /// The handshake request was not a GET request.
    #[error("invalid request method")]
    BadMethod,
    /// The Host header was missing or invalid.
    #[error("missing or invalid host header")]
    BadHost,
    /// The Upgrade header was missing or did not equal "websocket".
    #[error("missing or invalid upgrade header")]
    BadUpgrade,
    /// The Connection header was missing or lacked the "upgrade" token.
    #[error("missing or invalid connection header")]
    BadConnection,
    /// The Sec-WebSocket-Version header did not equal "13".
    #[error("unsupported websocket version")]
    BadSecVersion,
    /// The Sec-WebSocket-Key header was missing or not a 24-byte nonce.
    #[error("missing or invalid sec-websocket-key header")]
    BadSecKey,
    /// The Sec-WebSocket-Accept header was missing or did not match.
    #[error("invalid sec-websocket-accept header")]
    BadSecAccept,
    /// The server selected a subprotocol the client did not ask for.
    #[error("unsolicited subprotocol")]
    BadSubProtocol,
    /// Extension negotiation failed.
    #[error("extension negotiation failed")]
    BadExtensions,
    /// A required header was not present.
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    /// The handshake request could not be parsed.
    #[error("malformed http request")]
    MalformedRequest,
    /// The handshake response could not be parsed.
    #[error("malformed http response")]
    MalformedResponse,
    /// UTF-8 decoding failed.
    #[error("utf-8 decoding error: {0}")]
    Utf8(#[from] str::Utf8Error),
    /// An extension produced an error during negotiation.
    #[error("extension error: {0}")]
    Extension(#[source] BoxedError),
    /// A header callback rejected a header.
    #[error("header callback error: {0}")]
    Callback(#[source] BoxedError)
}

impl Error {
    /// The HTTP status code a server should answer this error with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadMethod => 405,
            Error::BadProtocol => 505,
            Error::BadSecVersion => 426,
            _ => 400
        }
    }
}
