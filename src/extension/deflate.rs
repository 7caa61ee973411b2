// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Deflate compression extension mostly conformant with [RFC 7692][rfc7692].
//!
//! A compressed message is a message whose first frame carries the RSV1
//! bit. Its payload is a raw deflate stream ending in an empty block;
//! the final four bytes of that block (`00 00 FF FF`) are stripped
//! before sending and re-appended before decompression.
//!
//! [rfc7692]: https://tools.ietf.org/html/rfc7692

use crate::{
    as_u64,
    base::{Header, OpCode},
    connection::Mode,
    extension::{Extension, Param},
    BoxedError,
    Storage
};
use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};
use log::debug;
use smallvec::SmallVec;
use std::fmt;

const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";

/// The trailer every deflate block flushed with an empty block ends in.
const FLUSH_TRAILER: [u8; 4] = [0, 0, 0xFF, 0xFF];

/// The deflate extension type.
///
/// Compression always uses the default LZ77 window of 15 bits. Offers
/// demanding a smaller window from this end are declined; window limits
/// on the remote end are accepted, since inflating data compressed with
/// a smaller window is always possible.
pub struct Deflate {
    mode: Mode,
    enabled: bool,
    params: SmallVec<[Param<'static>; 2]>,
    /// Drop the compression context after each outgoing message.
    our_no_context_takeover: bool,
    /// Drop the decompression context after each incoming message.
    their_no_context_takeover: bool,
    /// Decline offers which do not ask for `server_no_context_takeover`.
    require_no_context_takeover: bool,
    /// Decline offers which do not include `client_max_window_bits`.
    require_client_max_window_bits: bool,
    deflate: Compress,
    inflate: Decompress
}

impl fmt::Debug for Deflate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Deflate")
            .field("mode", &self.mode)
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .field("our_no_context_takeover", &self.our_no_context_takeover)
            .field("their_no_context_takeover", &self.their_no_context_takeover)
            .finish()
    }
}

impl Deflate {
    /// Create a new deflate extension either on client or server side.
    pub fn new(mode: Mode) -> Self {
        let params = match mode {
            Mode::Server => SmallVec::new(),
            Mode::Client => {
                let mut params = SmallVec::new();
                params.push(Param::new(SERVER_NO_CONTEXT_TAKEOVER));
                params.push(Param::new(CLIENT_NO_CONTEXT_TAKEOVER));
                params
            }
        };
        Deflate {
            mode,
            enabled: false,
            params,
            // The client always offers `client_no_context_takeover`, so
            // it resets its context no matter what the server replies.
            our_no_context_takeover: mode.is_client(),
            their_no_context_takeover: false,
            require_no_context_takeover: false,
            require_client_max_window_bits: false,
            deflate: Compress::new(Compression::fast(), false),
            inflate: Decompress::new(false)
        }
    }

    /// Decline client offers which do not contain
    /// `server_no_context_takeover`. The extension must be in server mode.
    pub fn require_no_context_takeover(&mut self) -> &mut Self {
        assert!(self.mode.is_server(), "requiring no context takeover is a server side setting");
        self.require_no_context_takeover = true;
        self
    }

    /// Decline client offers which do not include the
    /// `client_max_window_bits` parameter. The extension must be in
    /// server mode.
    pub fn require_client_max_window_bits(&mut self) -> &mut Self {
        assert!(self.mode.is_server(), "requiring client_max_window_bits is a server side setting");
        self.require_client_max_window_bits = true;
        self
    }

    // The offer or response value of a `*_max_window_bits` parameter,
    // if it is well-formed.
    fn window_bits(param: &Param) -> Option<u8> {
        match param.value().map(str::parse::<u8>) {
            Some(Ok(v)) if (8 ..= 15).contains(&v) => Some(v),
            _ => None
        }
    }

    fn configure_server(&mut self, params: &[Param]) -> Result<(), BoxedError> {
        // Parameters of the client's offer. Nothing is committed until
        // the whole offer has been found acceptable.
        let mut server_no_context_takeover = false;
        let mut client_no_context_takeover = false;
        let mut client_max_window_bits = false;
        for p in params {
            match p.name() {
                SERVER_NO_CONTEXT_TAKEOVER => server_no_context_takeover = true,
                CLIENT_NO_CONTEXT_TAKEOVER => client_no_context_takeover = true,
                SERVER_MAX_WINDOW_BITS => match Self::window_bits(p) {
                    // We always compress with the default window.
                    Some(15) => {}
                    Some(v) => {
                        debug!("unacceptable server_max_window_bits: {}", v);
                        return Ok(())
                    }
                    None => {
                        debug!("invalid server_max_window_bits: {:?}", p.value());
                        return Ok(())
                    }
                },
                CLIENT_MAX_WINDOW_BITS => {
                    // A hint that we may limit the client's window; we
                    // never do, and inflate copes with any window <= 15.
                    if p.value().is_some() && Self::window_bits(p).is_none() {
                        debug!("invalid client_max_window_bits: {:?}", p.value());
                        return Ok(())
                    }
                    client_max_window_bits = true
                }
                other => {
                    debug!("{}: unknown parameter: {}", self.name(), other);
                    return Ok(())
                }
            }
        }
        if self.require_no_context_takeover && !server_no_context_takeover {
            debug!("{}: offer without server_no_context_takeover declined", self.name());
            return Ok(())
        }
        if self.require_client_max_window_bits && !client_max_window_bits {
            debug!("{}: offer without client_max_window_bits declined", self.name());
            return Ok(())
        }
        // The response repeats the parameters the client must see again.
        self.params.clear();
        if server_no_context_takeover {
            self.our_no_context_takeover = true;
            self.params.push(Param::new(SERVER_NO_CONTEXT_TAKEOVER))
        }
        if client_no_context_takeover {
            self.their_no_context_takeover = true;
            self.params.push(Param::new(CLIENT_NO_CONTEXT_TAKEOVER))
        }
        self.enabled = true;
        Ok(())
    }

    fn configure_client(&mut self, params: &[Param]) -> Result<(), BoxedError> {
        // Parameters of the server's response to our offer.
        for p in params {
            match p.name() {
                SERVER_NO_CONTEXT_TAKEOVER => self.their_no_context_takeover = true,
                CLIENT_NO_CONTEXT_TAKEOVER => {} // offered by us
                SERVER_MAX_WINDOW_BITS => {
                    if Self::window_bits(p).is_none() {
                        debug!("invalid server_max_window_bits: {:?}", p.value());
                        return Ok(())
                    }
                }
                CLIENT_MAX_WINDOW_BITS => match Self::window_bits(p) {
                    Some(15) => {}
                    _ => {
                        debug!("unacceptable client_max_window_bits: {:?}", p.value());
                        return Ok(())
                    }
                },
                other => {
                    debug!("{}: unknown parameter: {}", self.name(), other);
                    return Ok(())
                }
            }
        }
        self.enabled = true;
        Ok(())
    }
}

impl Extension for Deflate {
    fn name(&self) -> &str {
        "permessage-deflate"
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn configure(&mut self, params: &[Param]) -> Result<(), BoxedError> {
        if self.enabled {
            // Only the first accepted occurrence counts.
            return Ok(())
        }
        match self.mode {
            Mode::Server => self.configure_server(params),
            Mode::Client => self.configure_client(params)
        }
    }

    fn reserved_bits(&self) -> (bool, bool, bool) {
        (true, false, false)
    }

    fn encode(&mut self, header: &mut Header, data: &mut Storage<'_>) -> Result<(), BoxedError> {
        if let OpCode::Binary | OpCode::Text = header.opcode() {
            log::trace!("deflate: encoding {}", header)
        } else {
            return Ok(())
        }

        let input = data.as_ref();
        if input.is_empty() {
            return Ok(())
        }

        let mut output = Vec::with_capacity(input.len() / 2 + 32);
        let mut consumed = 0;
        loop {
            let before = self.deflate.total_in();
            output.reserve((input.len() - consumed).max(64));
            self.deflate.compress_vec(&input[consumed ..], &mut output, FlushCompress::Sync)?;
            consumed += (self.deflate.total_in() - before) as usize;
            // A sync flush is complete once all input is consumed and
            // the last call ran out of input rather than output space.
            if consumed == input.len() && output.len() < output.capacity() {
                break
            }
        }

        if output.ends_with(&FLUSH_TRAILER) {
            output.truncate(output.len() - FLUSH_TRAILER.len()) // cf. RFC 7692, section 7.2.1
        }

        header.set_rsv1(true);
        header.set_payload_len(as_u64(output.len()));
        *data = Storage::Owned(BytesMut::from(&output[..]));

        if self.our_no_context_takeover {
            self.deflate.reset()
        }

        Ok(())
    }

    fn decode(&mut self, header: &mut Header, data: &mut BytesMut) -> Result<(), BoxedError> {
        if !header.is_rsv1() {
            return Ok(())
        }
        match header.opcode() {
            OpCode::Binary | OpCode::Text => log::trace!("deflate: decoding {}", header),
            _ => return Ok(())
        }

        header.set_rsv1(false);

        if data.is_empty() {
            return Ok(())
        }

        let mut input = Vec::with_capacity(data.len() + FLUSH_TRAILER.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&FLUSH_TRAILER); // cf. RFC 7692, section 7.2.2

        let mut output = Vec::with_capacity(2 * data.len());
        let mut consumed = 0;
        loop {
            let before = self.inflate.total_in();
            output.reserve((input.len() - consumed).max(64) * 2);
            self.inflate.decompress_vec(&input[consumed ..], &mut output, FlushDecompress::Sync)?;
            consumed += (self.inflate.total_in() - before) as usize;
            if consumed == input.len() && output.len() < output.capacity() {
                break
            }
        }

        data.clear();
        data.extend_from_slice(&output);
        header.set_payload_len(as_u64(data.len()));

        if self.their_no_context_takeover {
            self.inflate.reset(false)
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Deflate;
    use crate::{
        base::{Header, OpCode},
        connection::Mode,
        extension::{Extension, Param},
        Storage
    };
    use bytes::BytesMut;
    use quickcheck::quickcheck;

    fn configured_pair() -> (Deflate, Deflate) {
        let mut client = Deflate::new(Mode::Client);
        let mut server = Deflate::new(Mode::Server);
        let offer: Vec<Param> = client.params().to_vec();
        server.configure(&offer).unwrap();
        assert!(server.is_enabled());
        let response: Vec<Param> = server.params().to_vec();
        client.configure(&response).unwrap();
        assert!(client.is_enabled());
        (client, server)
    }

    fn encode(ext: &mut Deflate, payload: &[u8]) -> (Header, BytesMut) {
        let mut header = Header::new(OpCode::Binary);
        header.set_payload_len(payload.len() as u64);
        let mut data = Storage::Shared(payload);
        ext.encode(&mut header, &mut data).unwrap();
        (header, BytesMut::from(data.as_ref()))
    }

    fn decode(ext: &mut Deflate, header: &mut Header, data: &mut BytesMut) {
        ext.decode(header, data).unwrap()
    }

    #[test]
    fn negotiation_round() {
        let (client, server) = configured_pair();
        assert!(client.our_no_context_takeover);
        assert!(client.their_no_context_takeover);
        assert!(server.our_no_context_takeover);
        assert!(server.their_no_context_takeover)
    }

    #[test]
    fn declines_smaller_server_window() {
        let mut server = Deflate::new(Mode::Server);
        let mut param = Param::new("server_max_window_bits");
        param.set_value(Some("10"));
        server.configure(&[param]).unwrap();
        assert!(!server.is_enabled())
    }

    #[test]
    fn declines_unknown_parameter() {
        let mut server = Deflate::new(Mode::Server);
        server.configure(&[Param::new("brotli")]).unwrap();
        assert!(!server.is_enabled())
    }

    #[test]
    fn requires_no_context_takeover_if_told_to() {
        let mut server = Deflate::new(Mode::Server);
        server.require_no_context_takeover();
        server.configure(&[Param::new("client_no_context_takeover")]).unwrap();
        assert!(!server.is_enabled());
        server.configure(&[Param::new("server_no_context_takeover")]).unwrap();
        assert!(server.is_enabled())
    }

    #[test]
    fn requires_client_max_window_bits_if_told_to() {
        let mut server = Deflate::new(Mode::Server);
        server.require_client_max_window_bits();
        server.configure(&[Param::new("server_no_context_takeover")]).unwrap();
        assert!(!server.is_enabled());
        server.configure(&[Param::new("client_max_window_bits")]).unwrap();
        assert!(server.is_enabled())
    }

    #[test]
    fn first_accepted_occurrence_wins() {
        let mut server = Deflate::new(Mode::Server);
        server.configure(&[]).unwrap();
        assert!(server.is_enabled());
        assert!(!server.their_no_context_takeover);
        // A second occurrence must not reconfigure the extension.
        server.configure(&[Param::new("client_no_context_takeover")]).unwrap();
        assert!(!server.their_no_context_takeover)
    }

    #[test]
    fn encode_sets_rsv1_and_strips_trailer() {
        let (mut client, _) = configured_pair();
        let (header, data) = encode(&mut client, b"hello, hello, hello");
        assert!(header.is_rsv1());
        assert_eq!(header.payload_len(), data.len() as u64);
        assert!(!data.ends_with(&[0, 0, 0xFF, 0xFF]))
    }

    #[test]
    fn empty_and_control_payloads_pass_through() {
        let (mut client, _) = configured_pair();
        let (header, data) = encode(&mut client, b"");
        assert!(!header.is_rsv1());
        assert!(data.is_empty());

        let mut header = Header::new(OpCode::Ping);
        let mut data = Storage::Shared(&b"ping"[..]);
        client.encode(&mut header, &mut data).unwrap();
        assert!(!header.is_rsv1());
        assert_eq!(data.as_ref(), b"ping")
    }

    #[test]
    fn uncompressed_messages_are_left_alone() {
        let (mut client, _) = configured_pair();
        let mut header = Header::new(OpCode::Binary);
        let mut data = BytesMut::from(&b"plain"[..]);
        decode(&mut client, &mut header, &mut data);
        assert_eq!(&data[..], b"plain")
    }

    quickcheck! {
        fn compress_decompress_roundtrip(payload: Vec<u8>) -> bool {
            let (mut client, mut server) = configured_pair();
            let (mut header, mut data) = encode(&mut client, &payload);
            decode(&mut server, &mut header, &mut data);
            data[..] == payload[..]
        }

        fn roundtrip_across_messages(messages: Vec<Vec<u8>>) -> bool {
            let (mut client, mut server) = configured_pair();
            for payload in messages {
                let (mut header, mut data) = encode(&mut client, &payload);
                decode(&mut server, &mut header, &mut data);
                if data[..] != payload[..] {
                    return false
                }
            }
            true
        }
    }
}
