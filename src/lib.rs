// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! An implementation of the [RFC 6455][rfc6455] websocket protocol on top
//! of any asynchronous byte stream.
//!
//! This crate is a protocol kernel, not a server: it contains the opening
//! handshake for both endpoints ([`handshake::Client`], [`handshake::Server`]),
//! the base frame codec ([`base`]), a streaming message [`Receiver`] and
//! [`Sender`] pair, and the [permessage-deflate][rfc7692] extension (behind
//! the `deflate` feature). The transport is anything implementing
//! [`AsyncRead`](futures::io::AsyncRead) + [`AsyncWrite`](futures::io::AsyncWrite);
//! connecting, TLS and timeouts are the caller's business.
//!
//! A typical client session:
//!
//! ```no_run
//! # async fn doc(socket: impl futures::io::AsyncRead + futures::io::AsyncWrite + Unpin) -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = wskit::handshake::Client::new(socket, "example.com", "/chat");
//! let (mut sender, mut receiver) = match client.handshake().await? {
//!     wskit::handshake::ServerResponse::Accepted { .. } => client.into_builder().finish(),
//!     other => return Err(format!("handshake failed: {:?}", other).into())
//! };
//! sender.send_text("hello").await?;
//! sender.flush().await?;
//! let mut message = Vec::new();
//! receiver.receive_data(&mut message).await?;
//! # Ok(()) }
//! ```
//!
//! [rfc6455]: https://tools.ietf.org/html/rfc6455
//! [rfc7692]: https://tools.ietf.org/html/rfc7692

pub mod base;
pub mod close;
pub mod connection;
pub mod data;
pub mod extension;
pub mod handshake;
pub mod mask;
pub mod utf8;


pub use connection::{Builder, Mode, Receiver, Sender};
pub use data::{ByteSlice125, Data};

use bytes::BytesMut;
use futures::io::{AsyncRead, AsyncReadExt};
use std::io;

/// A boxed `std::error::Error`.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Progress of an incremental parsing step.
#[derive(Debug, Clone)]
pub enum Parsing<T, N = ()> {
    /// A value has been parsed from the first `offset` input bytes.
    Done {
        /// The parsed value.
        value: T,
        /// The number of input bytes consumed.
        offset: usize
    },
    /// More input is needed before a value can be parsed.
    NeedMore(N)
}

/// Payload data of varying ownership.
///
/// Depending on where payload data comes from, the codec either must not
/// touch it ([`Storage::Shared`]), may transform it in place
/// ([`Storage::Unique`]), or owns it outright ([`Storage::Owned`]).
#[derive(Debug)]
pub enum Storage<'a> {
    /// Data shared with the caller, read-only.
    Shared(&'a [u8]),
    /// Data that is mutably borrowed from the caller.
    Unique(&'a mut [u8]),
    /// Data owned by the codec.
    Owned(BytesMut)
}

impl AsRef<[u8]> for Storage<'_> {
    fn as_ref(&self) -> &[u8] {
        match self {
            Storage::Shared(d) => d,
            Storage::Unique(d) => d,
            Storage::Owned(d) => d
        }
    }
}

/// Cast a `usize` to `u64` (lossless on all supported targets).
pub(crate) fn as_u64(n: usize) -> u64 {
    n as u64
}

/// Read some more bytes from `socket` into `buffer`, growing it by at most
/// `block` bytes. End of input maps to [`io::ErrorKind::UnexpectedEof`].
pub(crate) async fn read_more<T>(socket: &mut T, buffer: &mut BytesMut, block: usize) -> io::Result<usize>
where
    T: AsyncRead + Unpin
{
    let offset = buffer.len();
    buffer.resize(offset + block, 0);
    match socket.read(&mut buffer[offset ..]).await {
        Ok(0) => {
            buffer.truncate(offset);
            Err(io::ErrorKind::UnexpectedEof.into())
        }
        Ok(n) => {
            buffer.truncate(offset + n);
            log::trace!("read {} bytes", n);
            Ok(n)
        }
        Err(e) => {
            buffer.truncate(offset);
            Err(e)
        }
    }
}
