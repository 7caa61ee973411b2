// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Websocket server [handshake].
//!
//! [handshake]: https://tools.ietf.org/html/rfc6455#section-4.2

use ::http as http_types;
use crate::{
    connection::{self, Mode},
    extension::Extension,
    BoxedError
};
use bytes::BytesMut;
use futures::prelude::*;
use smallvec::SmallVec;
use std::{fmt, mem, str};
use super::{
    accept_value,
    configure_extensions,
    contains_token,
    http,
    Error,
    ACCEPT_SIZE,
    NONCE_SIZE,
    SEC_WEBSOCKET_EXTENSIONS,
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION
};

const BLOCK_SIZE: usize = 8 * 1024;

/// Seen-header bits of the request validation.
const HOST: u8 = 1;
const UPGRADE: u8 = 2;
const CONNECTION: u8 = 4;
const VERSION: u8 = 8;
const KEY: u8 = 16;

/// Websocket server handshake.
pub struct Server<'a, T> {
    socket: T,
    /// Protocols the server supports.
    protocols: SmallVec<[&'a str; 4]>,
    /// Extensions the server supports.
    extensions: SmallVec<[Box<dyn Extension + Send>; 4]>,
    /// Additional headers of the 101 response.
    headers: SmallVec<[(&'a str, &'a str); 4]>,
    /// Callback for request headers the handshake itself does not use.
    on_header: Option<Box<dyn FnMut(&str, &[u8]) -> Result<(), BoxedError> + Send>>,
    /// Encoding/decoding buffer.
    buffer: BytesMut
}

impl<T> fmt::Debug for Server<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Server")
            .field("protocols", &self.protocols)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl<'a, T: AsyncRead + AsyncWrite + Unpin> Server<'a, T> {
    /// Create a new server handshake.
    pub fn new(socket: T) -> Self {
        Server {
            socket,
            protocols: SmallVec::new(),
            extensions: SmallVec::new(),
            headers: SmallVec::new(),
            on_header: None,
            buffer: BytesMut::new()
        }
    }

    /// Override the buffer to use for request/response handling.
    pub fn set_buffer(&mut self, b: BytesMut) -> &mut Self {
        self.buffer = b;
        self
    }

    /// Extract the buffer.
    pub fn take_buffer(&mut self) -> BytesMut {
        mem::take(&mut self.buffer)
    }

    /// Add a protocol the server supports.
    pub fn add_protocol(&mut self, p: &'a str) -> &mut Self {
        self.protocols.push(p);
        self
    }

    /// Add an extension the server supports.
    pub fn add_extension(&mut self, e: Box<dyn Extension + Send>) -> &mut Self {
        self.extensions.push(e);
        self
    }

    /// Get back all extensions.
    pub fn drain_extensions(&mut self) -> impl Iterator<Item = Box<dyn Extension + Send>> + '_ {
        self.extensions.drain(..)
    }

    /// Add an arbitrary header to the 101 response.
    pub fn add_header(&mut self, name: &'a str, value: &'a str) -> &mut Self {
        self.headers.push((name, value));
        self
    }

    /// Invoke the given callback for every request header the handshake
    /// does not recognise. An error returned from the callback aborts
    /// the handshake.
    pub fn on_header<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&str, &[u8]) -> Result<(), BoxedError> + Send + 'static
    {
        self.on_header = Some(Box::new(f));
        self
    }

    /// Await and parse an incoming client handshake request.
    ///
    /// On error the caller should answer with
    /// [`Server::send_rejection`] and close the connection.
    pub async fn receive_request(&mut self) -> Result<ClientRequest<'a>, Error> {
        // Request line.
        let line = self.next_line().await?;
        let mut parts = line.as_ref().split(|&b| b == b' ').filter(|p| !p.is_empty());
        let method = parts.next().ok_or(Error::MalformedRequest)?;
        let path = parts.next().ok_or(Error::MalformedRequest)?;
        let version = parts.next().ok_or(Error::MalformedRequest)?;
        if method != b"GET" {
            return Err(Error::BadMethod)
        }
        super::check_http_version(version)?;
        let path = String::from(str::from_utf8(path)?);

        // Header lines.
        let mut seen = 0_u8;
        let mut host = None;
        let mut ws_key = [0_u8; NONCE_SIZE];
        let mut protocols = SmallVec::new();

        loop {
            let line = self.next_line().await?;
            if line.is_empty() {
                break
            }
            let header = http::HeaderLine::parse(line).ok_or(Error::MalformedRequest)?;
            match header.name() {
                "Host" => {
                    host = Some(String::from(str::from_utf8(header.value())?));
                    seen |= HOST
                }
                "Upgrade" => {
                    if !header.value().eq_ignore_ascii_case(b"websocket") {
                        return Err(Error::BadUpgrade)
                    }
                    seen |= UPGRADE
                }
                "Connection" => {
                    if !contains_token(header.value(), "upgrade") {
                        return Err(Error::BadConnection)
                    }
                    seen |= CONNECTION
                }
                SEC_WEBSOCKET_VERSION => {
                    if header.value() != b"13" {
                        return Err(Error::BadSecVersion)
                    }
                    seen |= VERSION
                }
                SEC_WEBSOCKET_KEY => {
                    // The nonce must be the base64 encoding of 16 bytes.
                    if header.value().len() != NONCE_SIZE || !header.value().is_ascii() {
                        return Err(Error::BadSecKey)
                    }
                    ws_key.copy_from_slice(header.value());
                    seen |= KEY
                }
                SEC_WEBSOCKET_PROTOCOL => {
                    // Remember every offered protocol we support, in
                    // the client's order of preference.
                    for offered in header.value().split(|&b| b == b',').map(http::trim) {
                        if let Some(&p) = self.protocols.iter().find(|&&x| x.as_bytes() == offered) {
                            if !protocols.contains(&p) {
                                protocols.push(p)
                            }
                        }
                    }
                }
                SEC_WEBSOCKET_EXTENSIONS => {
                    let value = header.value_str().ok_or(Error::MalformedRequest)?;
                    configure_extensions(&mut self.extensions, value, false)?
                }
                name => {
                    if let Some(f) = &mut self.on_header {
                        f(name, header.value()).map_err(Error::Callback)?
                    }
                }
            }
        }

        if seen & HOST == 0 {
            return Err(Error::BadHost)
        }
        if seen & UPGRADE == 0 {
            return Err(Error::BadUpgrade)
        }
        if seen & CONNECTION == 0 {
            return Err(Error::BadConnection)
        }
        if seen & KEY == 0 {
            return Err(Error::BadSecKey)
        }
        if seen & VERSION == 0 {
            return Err(Error::MissingHeader("sec-websocket-version"))
        }

        Ok(ClientRequest {
            path,
            host: host.unwrap_or_default(),
            ws_key,
            protocols
        })
    }

    /// Respond to the client.
    pub async fn send_response(&mut self, response: &Response<'_>) -> Result<(), Error> {
        self.buffer.clear();
        self.encode_response(response);
        self.socket.write_all(&self.buffer).await?;
        self.socket.flush().await?;
        self.buffer.clear();
        Ok(())
    }

    /// Answer a failed handshake with the HTTP error response matching
    /// the given error.
    pub async fn send_rejection(&mut self, error: &Error) -> Result<(), Error> {
        let reason = error.to_string();
        self.send_response(&Response::Reject {
            status_code: error.status_code(),
            reason: Some(&reason)
        }).await
    }

    /// Turn this handshake into a [`connection::Builder`].
    pub fn into_builder(mut self) -> connection::Builder<T> {
        let mut builder = connection::Builder::new(self.socket, Mode::Server);
        builder.set_buffer(self.buffer);
        builder.add_extensions(self.extensions.drain(..));
        builder
    }

    /// Get out the inner socket of the server.
    pub fn into_inner(self) -> T {
        self.socket
    }

    // Encode the server handshake response.
    fn encode_response(&mut self, response: &Response<'_>) {
        match response {
            Response::Accept { key, protocol } => {
                let mut accept = [0; ACCEPT_SIZE];
                accept_value(&key[..], &mut accept);
                self.buffer.extend_from_slice(b"HTTP/1.1 101 Switching Protocols");
                self.buffer.extend_from_slice(b"\r\nUpgrade: websocket\r\nConnection: Upgrade");
                self.buffer.extend_from_slice(b"\r\nSec-WebSocket-Accept: ");
                self.buffer.extend_from_slice(&accept);
                if let Some(p) = protocol {
                    self.buffer.extend_from_slice(b"\r\nSec-WebSocket-Protocol: ");
                    self.buffer.extend_from_slice(p.as_bytes())
                }
                super::append_extensions(
                    self.extensions.iter().filter(|e| e.is_enabled()),
                    &mut self.buffer
                );
                for (name, value) in &self.headers {
                    self.buffer.extend_from_slice(b"\r\n");
                    self.buffer.extend_from_slice(name.as_bytes());
                    self.buffer.extend_from_slice(b": ");
                    self.buffer.extend_from_slice(value.as_bytes())
                }
                self.buffer.extend_from_slice(b"\r\n\r\n")
            }
            Response::Reject { status_code, reason } => {
                self.buffer.extend_from_slice(b"HTTP/1.1 ");
                let status = http_types::StatusCode::from_u16(*status_code)
                    .unwrap_or(http_types::StatusCode::INTERNAL_SERVER_ERROR);
                self.buffer.extend_from_slice(status.as_str().as_bytes());
                self.buffer.extend_from_slice(b" ");
                let phrase = status.canonical_reason().unwrap_or("Unknown");
                self.buffer.extend_from_slice(phrase.as_bytes());
                // A body carrying the reason, safe against sniffing.
                let body = (*reason).unwrap_or(phrase);
                self.buffer.extend_from_slice(b"\r\nContent-Type: text/plain; charset=utf-8");
                self.buffer.extend_from_slice(b"\r\nX-Content-Type-Options: nosniff");
                if *status_code == 426 {
                    self.buffer.extend_from_slice(b"\r\nSec-WebSocket-Version: 13")
                }
                self.buffer.extend_from_slice(b"\r\nContent-Length: ");
                self.buffer.extend_from_slice((body.len() + 1).to_string().as_bytes());
                self.buffer.extend_from_slice(b"\r\n\r\n");
                self.buffer.extend_from_slice(body.as_bytes());
                self.buffer.extend_from_slice(b"\n")
            }
        }
    }

    /// Take the next CRLF-delimited line off the transport.
    async fn next_line(&mut self) -> Result<BytesMut, Error> {
        loop {
            if let Some(end) = http::line_end(&self.buffer).map_err(|()| Error::MalformedRequest)? {
                let mut line = self.buffer.split_to(end);
                line.truncate(end - 2);
                return Ok(line)
            }
            crate::read_more(&mut self.socket, &mut self.buffer, BLOCK_SIZE).await?;
        }
    }
}

/// Handshake request received from the client.
#[derive(Debug)]
pub struct ClientRequest<'a> {
    path: String,
    host: String,
    ws_key: [u8; NONCE_SIZE],
    protocols: SmallVec<[&'a str; 4]>
}

impl<'a> ClientRequest<'a> {
    /// The requested HTTP resource path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The value of the Host header.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// A reference to the nonce the client sent.
    pub fn key(&self) -> &[u8; NONCE_SIZE] {
        &self.ws_key
    }

    /// The protocols the client proposed which this server supports,
    /// in the client's order of preference.
    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.protocols.iter().copied()
    }
}

/// Handshake response the server sends back to the client.
#[derive(Debug)]
pub enum Response<'a> {
    /// The server accepts the handshake request.
    Accept {
        /// The nonce from the client's [`ClientRequest::key`].
        key: &'a [u8; NONCE_SIZE],
        /// The subprotocol the server selected, if any.
        protocol: Option<&'a str>
    },
    /// The server rejects the handshake request.
    Reject {
        /// HTTP response status code.
        status_code: u16,
        /// Reason text for the response body; the canonical reason
        /// phrase of the status code is used if absent.
        reason: Option<&'a str>
    }
}
