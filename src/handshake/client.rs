// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Websocket client [handshake].
//!
//! [handshake]: https://tools.ietf.org/html/rfc6455#section-4.1

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
    check_accept,
    configure_extensions,
    generate_nonce,
    http,
    Error,
    NONCE_SIZE,
    SEC_WEBSOCKET_ACCEPT,
    SEC_WEBSOCKET_EXTENSIONS,
    SEC_WEBSOCKET_PROTOCOL
};

const BLOCK_SIZE: usize = 8 * 1024;

/// Seen-header bits of the response validation.
const UPGRADE: u8 = 1;
const CONNECTION: u8 = 2;
const ACCEPT: u8 = 4;

/// Websocket client handshake.
pub struct Client<'a, T> {
    /// The underlying async I/O resource.
    socket: T,
    /// The HTTP host to send the handshake to.
    host: &'a str,
    /// The HTTP resource to request.
    resource: &'a str,
    /// The HTTP origin header.
    origin: Option<&'a str>,
    /// Additional request headers.
    headers: SmallVec<[(&'a str, &'a str); 4]>,
    /// The base64-encoded request nonce (all zero until the request
    /// has been encoded).
    nonce: [u8; NONCE_SIZE],
    /// The protocols to include in the handshake.
    protocols: SmallVec<[&'a str; 4]>,
    /// The extensions the client wishes to include in the request.
    extensions: SmallVec<[Box<dyn Extension + Send>; 4]>,
    /// Callback for response headers the handshake itself does not use.
    on_header: Option<Box<dyn FnMut(&str, &[u8]) -> Result<(), BoxedError> + Send>>,
    /// Encoding/decoding buffer.
    buffer: BytesMut
}

impl<T> fmt::Debug for Client<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.host)
            .field("resource", &self.resource)
            .field("origin", &self.origin)
            .field("protocols", &self.protocols)
            .field("extensions", &self.extensions)
            .finish()
    }
}

impl<'a, T: AsyncRead + AsyncWrite + Unpin> Client<'a, T> {
    /// Create a new client handshake for some host and resource.
    pub fn new(socket: T, host: &'a str, resource: &'a str) -> Self {
        Client {
            socket,
            host,
            resource,
            origin: None,
            headers: SmallVec::new(),
            nonce: [0; NONCE_SIZE],
            protocols: SmallVec::new(),
            extensions: SmallVec::new(),
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

    /// Set the handshake origin header.
    pub fn set_origin(&mut self, o: &'a str) -> &mut Self {
        self.origin = Some(o);
        self
    }

    /// Add a protocol to be included in the handshake.
    pub fn add_protocol(&mut self, p: &'a str) -> &mut Self {
        self.protocols.push(p);
        self
    }

    /// Add an extension to be included in the handshake.
    pub fn add_extension(&mut self, e: Box<dyn Extension + Send>) -> &mut Self {
        self.extensions.push(e);
        self
    }

    /// Get back all extensions.
    pub fn drain_extensions(&mut self) -> impl Iterator<Item = Box<dyn Extension + Send>> + '_ {
        self.extensions.drain(..)
    }

    /// Add an arbitrary header to the handshake request.
    pub fn add_header(&mut self, name: &'a str, value: &'a str) -> &mut Self {
        self.headers.push((name, value));
        self
    }

    /// Invoke the given callback for every response header the handshake
    /// does not recognise. An error returned from the callback aborts
    /// the handshake.
    pub fn on_header<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(&str, &[u8]) -> Result<(), BoxedError> + Send + 'static
    {
        self.on_header = Some(Box::new(f));
        self
    }

    /// Initiate the client handshake request to the server and get back
    /// the response.
    pub async fn handshake(&mut self) -> Result<ServerResponse, Error> {
        self.buffer.clear();
        self.encode_request();
        self.socket.write_all(&self.buffer).await?;
        self.socket.flush().await?;
        self.buffer.clear();
        self.decode_response().await
    }

    /// Turn this handshake into a [`connection::Builder`].
    ///
    /// Bytes the server sent past the end of its response are carried
    /// over, as are the negotiated extensions.
    pub fn into_builder(mut self) -> connection::Builder<T> {
        let mut builder = connection::Builder::new(self.socket, Mode::Client);
        builder.set_buffer(self.buffer);
        builder.add_extensions(self.extensions.drain(..));
        builder
    }

    /// Get out the inner socket of this handshake.
    pub fn into_inner(self) -> T {
        self.socket
    }

    /// Encode the client handshake as a request, ready to be sent to the server.
    fn encode_request(&mut self) {
        if self.nonce == [0; NONCE_SIZE] {
            generate_nonce(&mut self.nonce)
        }
        self.buffer.extend_from_slice(b"GET ");
        self.buffer.extend_from_slice(self.resource.as_bytes());
        self.buffer.extend_from_slice(b" HTTP/1.1");
        self.buffer.extend_from_slice(b"\r\nHost: ");
        self.buffer.extend_from_slice(self.host.as_bytes());
        self.buffer.extend_from_slice(b"\r\nUpgrade: websocket\r\nConnection: Upgrade");
        self.buffer.extend_from_slice(b"\r\nSec-WebSocket-Version: 13");
        self.buffer.extend_from_slice(b"\r\nSec-WebSocket-Key: ");
        self.buffer.extend_from_slice(&self.nonce);
        if let Some(o) = &self.origin {
            self.buffer.extend_from_slice(b"\r\nOrigin: ");
            self.buffer.extend_from_slice(o.as_bytes())
        }
        if let Some((last, prefix)) = self.protocols.split_last() {
            self.buffer.extend_from_slice(b"\r\nSec-WebSocket-Protocol: ");
            for p in prefix {
                self.buffer.extend_from_slice(p.as_bytes());
                self.buffer.extend_from_slice(b", ")
            }
            self.buffer.extend_from_slice(last.as_bytes())
        }
        super::append_extensions(&self.extensions, &mut self.buffer);
        for (name, value) in &self.headers {
            self.buffer.extend_from_slice(b"\r\n");
            self.buffer.extend_from_slice(name.as_bytes());
            self.buffer.extend_from_slice(b": ");
            self.buffer.extend_from_slice(value.as_bytes())
        }
        self.buffer.extend_from_slice(b"\r\n\r\n")
    }

    /// Read and check the server response.
    async fn decode_response(&mut self) -> Result<ServerResponse, Error> {
        let line = self.next_line().await?;
        let mut parts = line.as_ref().split(|&b| b == b' ').filter(|p| !p.is_empty());

        let version = parts.next().ok_or(Error::MalformedResponse)?;
        super::check_http_version(version)?;

        let status = parts.next()
            .and_then(|s| str::from_utf8(s).ok())
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or(Error::MalformedResponse)?;

        match status {
            101 => {}
            301 ..= 303 | 307 | 308 => {
                // Read the remaining headers to extract the new location.
                let mut location = None;
                loop {
                    let line = self.next_line().await?;
                    if line.is_empty() {
                        break
                    }
                    let header = http::HeaderLine::parse(line).ok_or(Error::MalformedResponse)?;
                    if header.name() == "Location" {
                        location = Some(String::from(str::from_utf8(header.value())?))
                    }
                }
                let location = location.ok_or(Error::MalformedResponse)?;
                return Ok(ServerResponse::Redirect { status_code: status, location })
            }
            _ => {
                // The remainder of the response stays in the buffer for
                // the caller to inspect.
                return Ok(ServerResponse::Rejected { status_code: status })
            }
        }

        let mut seen = 0_u8;
        let mut selected_proto = None;

        loop {
            let line = self.next_line().await?;
            if line.is_empty() {
                break
            }
            let header = http::HeaderLine::parse(line).ok_or(Error::MalformedResponse)?;
            match header.name() {
                "Upgrade" => {
                    if !header.value().eq_ignore_ascii_case(b"websocket") {
                        return Err(Error::BadUpgrade)
                    }
                    seen |= UPGRADE
                }
                "Connection" => {
                    if !header.value().eq_ignore_ascii_case(b"upgrade") {
                        return Err(Error::BadConnection)
                    }
                    seen |= CONNECTION
                }
                SEC_WEBSOCKET_ACCEPT => {
                    if !check_accept(&self.nonce, header.value()) {
                        return Err(Error::BadSecAccept)
                    }
                    seen |= ACCEPT
                }
                SEC_WEBSOCKET_PROTOCOL => {
                    if let Some(&p) = self.protocols.iter().find(|&&x| x.as_bytes() == header.value()) {
                        selected_proto = Some(String::from(p))
                    } else {
                        return Err(Error::BadSubProtocol)
                    }
                }
                SEC_WEBSOCKET_EXTENSIONS => {
                    let value = header.value_str().ok_or(Error::MalformedResponse)?;
                    configure_extensions(&mut self.extensions, value, true)?
                }
                name => {
                    if let Some(f) = &mut self.on_header {
                        f(name, header.value()).map_err(Error::Callback)?
                    }
                }
            }
        }

        if seen & UPGRADE == 0 {
            return Err(Error::MissingHeader("upgrade"))
        }
        if seen & CONNECTION == 0 {
            return Err(Error::MissingHeader("connection"))
        }
        if seen & ACCEPT == 0 {
            return Err(Error::MissingHeader("sec-websocket-accept"))
        }

        log::trace!("client handshake accepted; subprotocol: {:?}", selected_proto);
        Ok(ServerResponse::Accepted { protocol: selected_proto })
    }

    /// Take the next CRLF-delimited line off the transport.
    async fn next_line(&mut self) -> Result<BytesMut, Error> {
        loop {
            if let Some(end) = http::line_end(&self.buffer).map_err(|()| Error::MalformedResponse)? {
                let mut line = self.buffer.split_to(end);
                line.truncate(end - 2);
                return Ok(line)
            }
            crate::read_more(&mut self.socket, &mut self.buffer, BLOCK_SIZE).await?;
        }
    }
}

/// Handshake response received from the server.
#[derive(Debug)]
pub enum ServerResponse {
    /// The server has accepted our request.
    Accepted {
        /// The protocol (if any) the server has selected.
        protocol: Option<String>
    },
    /// The server is redirecting us to some other location.
    Redirect {
        /// The HTTP response status code.
        status_code: u16,
        /// The location URL we should go to.
        location: String
    },
    /// The server rejected our request.
    ///
    /// The response headers and body remain buffered and can be
    /// inspected via [`Client::take_buffer`] and [`Client::into_inner`].
    Rejected {
        /// HTTP response status code.
        status_code: u16
    }
}
