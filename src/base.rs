// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! A websocket [base](https://tools.ietf.org/html/rfc6455#section-5.2)
//! frame header and its codec.
//!
//! Frame headers are 2 to 14 bytes long: two fixed bytes, an optional
//! 16 or 64-bit extended payload length and an optional 4-byte mask.
//! [`Codec::decode_header`] parses a header from a byte slice without
//! allocating, [`Codec::encode_header`] writes one into an internal
//! fixed-size buffer, and [`check`] applies the RFC 6455 §5 validity
//! rules of a received header against the connection [`State`].

use crate::Parsing;
use std::{convert::TryFrom, fmt};

/// Maximum size of a frame header: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// Maximum payload length of a control frame.
pub const MAX_CTRL_BODY_SIZE: u64 = 125;

/// If the payload length byte is 126, the following two bytes represent the
/// actual payload length.
const TWO_EXT: u8 = 126;

/// If the payload length byte is 127, the following eight bytes represent
/// the actual payload length.
const EIGHT_EXT: u8 = 127;

// OpCode /////////////////////////////////////////////////////////////////////////////////////////

/// Operation codes defined in [RFC 6455](https://tools.ietf.org/html/rfc6455#section-5.2).
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum OpCode {
    /// A continuation frame of a fragmented message.
    Continue,
    /// A text data frame.
    Text,
    /// A binary data frame.
    Binary,
    /// A close control frame.
    Close,
    /// A ping control frame.
    Ping,
    /// A pong control frame.
    Pong,
    /// A reserved op code.
    Reserved3,
    /// A reserved op code.
    Reserved4,
    /// A reserved op code.
    Reserved5,
    /// A reserved op code.
    Reserved6,
    /// A reserved op code.
    Reserved7,
    /// A reserved op code.
    Reserved11,
    /// A reserved op code.
    Reserved12,
    /// A reserved op code.
    Reserved13,
    /// A reserved op code.
    Reserved14,
    /// A reserved op code.
    Reserved15
}

impl OpCode {
    /// Is this a control opcode, i.e. is the high bit of its value set?
    pub fn is_control(self) -> bool {
        u8::from(self) & 8 != 0
    }

    /// Is this opcode reserved?
    pub fn is_reserved(self) -> bool {
        matches!(self,
            OpCode::Reserved3
            | OpCode::Reserved4
            | OpCode::Reserved5
            | OpCode::Reserved6
            | OpCode::Reserved7
            | OpCode::Reserved11
            | OpCode::Reserved12
            | OpCode::Reserved13
            | OpCode::Reserved14
            | OpCode::Reserved15)
    }

    /// Is this a text or binary opcode?
    pub fn is_data(self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpCode::Continue => f.write_str("Continue"),
            OpCode::Text => f.write_str("Text"),
            OpCode::Binary => f.write_str("Binary"),
            OpCode::Close => f.write_str("Close"),
            OpCode::Ping => f.write_str("Ping"),
            OpCode::Pong => f.write_str("Pong"),
            OpCode::Reserved3
            | OpCode::Reserved4
            | OpCode::Reserved5
            | OpCode::Reserved6
            | OpCode::Reserved7
            | OpCode::Reserved11
            | OpCode::Reserved12
            | OpCode::Reserved13
            | OpCode::Reserved14
            | OpCode::Reserved15 => write!(f, "Reserved:{}", u8::from(*self))
        }
    }
}

/// Error returned by `OpCode::try_from` if an unknown opcode
/// number is encountered.
#[derive(Debug)]
pub struct UnknownOpCode(());

impl fmt::Display for UnknownOpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("unknown opcode")
    }
}

impl std::error::Error for UnknownOpCode {}

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(val: u8) -> Result<OpCode, Self::Error> {
        match val {
            0 => Ok(OpCode::Continue),
            1 => Ok(OpCode::Text),
            2 => Ok(OpCode::Binary),
            3 => Ok(OpCode::Reserved3),
            4 => Ok(OpCode::Reserved4),
            5 => Ok(OpCode::Reserved5),
            6 => Ok(OpCode::Reserved6),
            7 => Ok(OpCode::Reserved7),
            8 => Ok(OpCode::Close),
            9 => Ok(OpCode::Ping),
            10 => Ok(OpCode::Pong),
            11 => Ok(OpCode::Reserved11),
            12 => Ok(OpCode::Reserved12),
            13 => Ok(OpCode::Reserved13),
            14 => Ok(OpCode::Reserved14),
            15 => Ok(OpCode::Reserved15),
            _ => Err(UnknownOpCode(()))
        }
    }
}

impl From<OpCode> for u8 {
    fn from(opcode: OpCode) -> u8 {
        match opcode {
            OpCode::Continue => 0,
            OpCode::Text => 1,
            OpCode::Binary => 2,
            OpCode::Close => 8,
            OpCode::Ping => 9,
            OpCode::Pong => 10,
            OpCode::Reserved3 => 3,
            OpCode::Reserved4 => 4,
            OpCode::Reserved5 => 5,
            OpCode::Reserved6 => 6,
            OpCode::Reserved7 => 7,
            OpCode::Reserved11 => 11,
            OpCode::Reserved12 => 12,
            OpCode::Reserved13 => 13,
            OpCode::Reserved14 => 14,
            OpCode::Reserved15 => 15
        }
    }
}

// Header /////////////////////////////////////////////////////////////////////////////////////////

/// A websocket base frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    masked: bool,
    opcode: OpCode,
    mask: [u8; 4],
    payload_len: u64
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({} (fin {}) (rsv {}{}{}) (mask {}) (len {}))",
            self.opcode,
            self.fin as u8,
            self.rsv1 as u8,
            self.rsv2 as u8,
            self.rsv3 as u8,
            self.masked as u8,
            self.payload_len)
    }
}

impl Header {
    /// Create a new (final) frame header with the given [`OpCode`].
    pub fn new(opcode: OpCode) -> Self {
        Header {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            masked: false,
            opcode,
            mask: [0; 4],
            payload_len: 0
        }
    }

    /// Is the `fin` flag set?
    pub fn is_fin(&self) -> bool {
        self.fin
    }

    /// Set the `fin` flag.
    pub fn set_fin(&mut self, fin: bool) -> &mut Self {
        self.fin = fin;
        self
    }

    /// Is the `rsv1` flag set?
    pub fn is_rsv1(&self) -> bool {
        self.rsv1
    }

    /// Set the `rsv1` flag.
    pub fn set_rsv1(&mut self, rsv1: bool) -> &mut Self {
        self.rsv1 = rsv1;
        self
    }

    /// Is the `rsv2` flag set?
    pub fn is_rsv2(&self) -> bool {
        self.rsv2
    }

    /// Set the `rsv2` flag.
    pub fn set_rsv2(&mut self, rsv2: bool) -> &mut Self {
        self.rsv2 = rsv2;
        self
    }

    /// Is the `rsv3` flag set?
    pub fn is_rsv3(&self) -> bool {
        self.rsv3
    }

    /// Set the `rsv3` flag.
    pub fn set_rsv3(&mut self, rsv3: bool) -> &mut Self {
        self.rsv3 = rsv3;
        self
    }

    /// Is any reserved bit set?
    pub fn has_rsv(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Is the `masked` flag set?
    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Set the `masked` flag.
    pub fn set_masked(&mut self, masked: bool) -> &mut Self {
        self.masked = masked;
        self
    }

    /// Get the `opcode`.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Set the `opcode`.
    pub fn set_opcode(&mut self, opcode: OpCode) -> &mut Self {
        self.opcode = opcode;
        self
    }

    /// Get the masking key.
    pub fn mask(&self) -> [u8; 4] {
        self.mask
    }

    /// Set the masking key (only meaningful if the `masked` flag is set).
    pub fn set_mask(&mut self, mask: [u8; 4]) -> &mut Self {
        self.mask = mask;
        self
    }

    /// The payload length in bytes.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    /// Set the payload length.
    pub fn set_payload_len(&mut self, len: u64) -> &mut Self {
        self.payload_len = len;
        self
    }
}

// Connection state ///////////////////////////////////////////////////////////////////////////////

/// The connection properties a received frame header is checked against.
///
/// Exactly one of the side bits is set on a live connection. The
/// `extended` bit is set iff at least one extension has been negotiated
/// and the `fragmented` bit while a multi-frame message is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State(u8);

const SERVER_SIDE: u8 = 1;
const CLIENT_SIDE: u8 = 2;
const EXTENDED: u8 = 4;
const FRAGMENTED: u8 = 8;

impl State {
    /// The state of a fresh server-side connection.
    pub fn server() -> Self {
        State(SERVER_SIDE)
    }

    /// The state of a fresh client-side connection.
    pub fn client() -> Self {
        State(CLIENT_SIDE)
    }

    /// Is this the server side of a connection?
    pub fn is_server_side(self) -> bool {
        self.0 & SERVER_SIDE != 0
    }

    /// Is this the client side of a connection?
    pub fn is_client_side(self) -> bool {
        self.0 & CLIENT_SIDE != 0
    }

    /// Has an extension been negotiated?
    pub fn is_extended(self) -> bool {
        self.0 & EXTENDED != 0
    }

    /// Is a fragmented message currently in progress?
    pub fn is_fragmented(self) -> bool {
        self.0 & FRAGMENTED != 0
    }

    /// Record that at least one extension has been negotiated.
    pub fn set_extended(&mut self, value: bool) -> &mut Self {
        if value {
            self.0 |= EXTENDED
        } else {
            self.0 &= !EXTENDED
        }
        self
    }

    /// Record the begin or end of a fragmented message.
    pub fn set_fragmented(&mut self, value: bool) -> &mut Self {
        if value {
            self.0 |= FRAGMENTED
        } else {
            self.0 &= !FRAGMENTED
        }
        self
    }
}

/// Check a decoded frame header against the connection state, applying
/// the validity rules of [RFC 6455 §5](https://tools.ietf.org/html/rfc6455#section-5).
pub fn check(header: &Header, state: State) -> Result<(), Error> {
    if header.opcode().is_reserved() {
        return Err(Error::ReservedOpCode)
    }
    if header.opcode().is_control() {
        if header.payload_len() > MAX_CTRL_BODY_SIZE {
            return Err(Error::ControlPayloadOverflow)
        }
        if !header.is_fin() {
            return Err(Error::FragmentedControl)
        }
    }
    if header.has_rsv() && !state.is_extended() {
        return Err(Error::UnexpectedReservedBit)
    }
    if state.is_server_side() && !header.is_masked() {
        return Err(Error::MissingMask)
    }
    if state.is_client_side() && header.is_masked() {
        return Err(Error::UnexpectedMask)
    }
    if state.is_fragmented() && header.opcode().is_data() {
        return Err(Error::ContinuationExpected)
    }
    if !state.is_fragmented() && header.opcode() == OpCode::Continue {
        return Err(Error::UnexpectedContinuation)
    }
    Ok(())
}

// Codec //////////////////////////////////////////////////////////////////////////////////////////

/// Codec for decoding and encoding websocket frame headers.
#[derive(Debug, Clone)]
pub struct Codec {
    /// Scratch buffer for encoded headers.
    buffer: [u8; MAX_HEADER_SIZE]
}

impl Default for Codec {
    fn default() -> Self {
        Codec { buffer: [0; MAX_HEADER_SIZE] }
    }
}

impl Codec {
    /// Create a new frame header codec.
    pub fn new() -> Self {
        Codec::default()
    }

    /// The size in bytes of the encoded form of `header`.
    pub fn header_size(header: &Header) -> usize {
        let extra = if header.payload_len() < u64::from(TWO_EXT) {
            0
        } else if header.payload_len() <= u64::from(u16::MAX) {
            2
        } else {
            8
        };
        2 + extra + if header.is_masked() { 4 } else { 0 }
    }

    /// Decode a frame header from the beginning of the given bytes.
    ///
    /// Returns [`Parsing::NeedMore`] if `bytes` does not yet contain a
    /// complete header. No payload bytes are inspected.
    pub fn decode_header(&self, bytes: &[u8]) -> Result<Parsing<Header>, Error> {
        if bytes.len() < 2 {
            return Ok(Parsing::NeedMore(()))
        }

        let first = bytes[0];
        let second = bytes[1];

        let fin = first & 0x80 != 0;
        let rsv1 = first & 0x40 != 0;
        let rsv2 = first & 0x20 != 0;
        let rsv3 = first & 0x10 != 0;
        let opcode = OpCode::try_from(first & 0xF)?;
        let masked = second & 0x80 != 0;

        let len_code = second & 0x7F;
        let extra = match len_code {
            TWO_EXT => 2,
            EIGHT_EXT => 8,
            _ => 0
        };
        let mask_len = if masked { 4 } else { 0 };

        if bytes.len() < 2 + extra + mask_len {
            return Ok(Parsing::NeedMore(()))
        }

        let payload_len = match len_code {
            TWO_EXT => u64::from(u16::from_be_bytes([bytes[2], bytes[3]])),
            EIGHT_EXT => {
                let len = u64::from_be_bytes([
                    bytes[2], bytes[3], bytes[4], bytes[5],
                    bytes[6], bytes[7], bytes[8], bytes[9]
                ]);
                // The most significant bit of the 64-bit length is reserved.
                if len & 0x8000_0000_0000_0000 != 0 {
                    return Err(Error::MalformedHeader)
                }
                len
            }
            n => u64::from(n)
        };

        let mut mask = [0; 4];
        if masked {
            mask.copy_from_slice(&bytes[2 + extra .. 2 + extra + 4])
        }

        let header = Header {
            fin,
            rsv1,
            rsv2,
            rsv3,
            masked,
            opcode,
            mask,
            payload_len
        };

        Ok(Parsing::Done { value: header, offset: 2 + extra + mask_len })
    }

    /// Encode the given frame header.
    ///
    /// The returned slice borrows the codec's internal buffer and is
    /// between 2 and 14 bytes long.
    pub fn encode_header(&mut self, header: &Header) -> Result<&[u8], Error> {
        if header.payload_len() > i64::MAX as u64 {
            return Err(Error::OverlongLength)
        }

        let mut first = u8::from(header.opcode());
        if header.is_fin() {
            first |= 0x80
        }
        if header.is_rsv1() {
            first |= 0x40
        }
        if header.is_rsv2() {
            first |= 0x20
        }
        if header.is_rsv3() {
            first |= 0x10
        }
        self.buffer[0] = first;

        let second = if header.is_masked() { 0x80 } else { 0 };
        let len = header.payload_len();

        let mut offset = 2;
        if len < u64::from(TWO_EXT) {
            self.buffer[1] = second | len as u8
        } else if len <= u64::from(u16::MAX) {
            self.buffer[1] = second | TWO_EXT;
            self.buffer[2 .. 4].copy_from_slice(&(len as u16).to_be_bytes());
            offset = 4
        } else {
            self.buffer[1] = second | EIGHT_EXT;
            self.buffer[2 .. 10].copy_from_slice(&len.to_be_bytes());
            offset = 10
        }

        if header.is_masked() {
            self.buffer[offset .. offset + 4].copy_from_slice(&header.mask());
            offset += 4
        }

        Ok(&self.buffer[.. offset])
    }
}

// Error type /////////////////////////////////////////////////////////////////////////////////////

/// Enumeration of possible frame level errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An impossible bit pattern was encountered in a frame header.
    #[error("malformed frame header")]
    MalformedHeader,
    /// A payload length does not fit into 63 bits.
    #[error("payload length exceeds 63 bits")]
    OverlongLength,
    /// Some unknown opcode number has been decoded.
    #[error("unknown opcode")]
    UnknownOpCode,
    /// The opcode decoded is reserved.
    #[error("reserved opcode")]
    ReservedOpCode,
    /// A control frame with a payload length greater than 125 bytes
    /// has been decoded.
    #[error("control frame payload overflow")]
    ControlPayloadOverflow,
    /// A fragmented control frame (fin bit not set) has been decoded.
    #[error("fragmented control frame")]
    FragmentedControl,
    /// A reserved bit was set but no extension has been negotiated.
    #[error("unexpected reserved bit")]
    UnexpectedReservedBit,
    /// The server received an unmasked frame.
    #[error("mask required")]
    MissingMask,
    /// The client received a masked frame.
    #[error("mask unexpected")]
    UnexpectedMask,
    /// A new data frame arrived while a fragmented message was
    /// still in progress.
    #[error("continuation frame expected")]
    ContinuationExpected,
    /// A continuation frame arrived outside of a fragmented message.
    #[error("unexpected continuation frame")]
    UnexpectedContinuation
}

impl From<UnknownOpCode> for Error {
    fn from(_: UnknownOpCode) -> Self {
        Error::UnknownOpCode
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{check, Codec, Error, Header, OpCode, State, MAX_HEADER_SIZE};
    use crate::Parsing;
    use quickcheck::quickcheck;
    use std::convert::TryFrom;

    // Truncated headers, should return NeedMore.
    // One byte of the 2 byte header:
    const PARTIAL_HEADER: [u8; 1] = [0x89];
    // Two of the 2 + 2 length bytes:
    const PARTIAL_LENGTH_1: [u8; 3] = [0x82, 0xFE, 0x01];
    // Five of the 2 + 8 length bytes:
    const PARTIAL_LENGTH_2: [u8; 6] = [0x82, 0xFF, 0x01, 0x02, 0x03, 0x04];
    // Two of the 4 mask bytes:
    const PARTIAL_MASK: [u8; 6] = [0x82, 0xFE, 0x01, 0x02, 0x00, 0x00];

    fn decode(bytes: &[u8]) -> Result<Parsing<Header>, Error> {
        Codec::new().decode_header(bytes)
    }

    fn decoded(bytes: &[u8]) -> Header {
        match decode(bytes) {
            Ok(Parsing::Done { value, .. }) => value,
            other => panic!("no complete header in {:?}: {:?}", bytes, other)
        }
    }

    #[test]
    fn decode_partial_inputs() {
        for bytes in [&PARTIAL_HEADER[..], &PARTIAL_LENGTH_1, &PARTIAL_LENGTH_2, &PARTIAL_MASK] {
            assert!(matches!(decode(bytes), Ok(Parsing::NeedMore(()))))
        }
    }

    #[test]
    fn decode_text_frame_header() {
        // Unmasked text frame header advertising "Hello" (5 bytes).
        let header = decoded(&[0x81, 0x05]);
        assert!(header.is_fin());
        assert!(!header.has_rsv());
        assert!(!header.is_masked());
        assert_eq!(header.opcode(), OpCode::Text);
        assert_eq!(header.payload_len(), 5)
    }

    #[test]
    fn decode_masked_header_and_offset() {
        match decode(&[0x81, 0x8C, 1, 2, 3, 4, 0xFF]) {
            Ok(Parsing::Done { value, offset }) => {
                assert_eq!(offset, 6);
                assert!(value.is_masked());
                assert_eq!(value.mask(), [1, 2, 3, 4]);
                assert_eq!(value.payload_len(), 12)
            }
            other => panic!("unexpected: {:?}", other)
        }
    }

    #[test]
    fn decode_fragmented_binary_headers() {
        let first = decoded(&[0x02, 0x03]);
        assert!(!first.is_fin());
        assert_eq!(first.opcode(), OpCode::Binary);
        let second = decoded(&[0x80, 0x03]);
        assert!(second.is_fin());
        assert_eq!(second.opcode(), OpCode::Continue)
    }

    #[test]
    fn decode_rejects_overlong_length() {
        let mut bytes = vec![0x82, 0xFF];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(decode(&bytes), Err(Error::MalformedHeader)))
    }

    #[test]
    fn encode_rejects_overlong_length() {
        let mut header = Header::new(OpCode::Binary);
        header.set_payload_len(1 + i64::MAX as u64);
        assert!(matches!(Codec::new().encode_header(&header), Err(Error::OverlongLength)))
    }

    #[test]
    fn check_reserved_opcodes() {
        for bits in [3, 4, 5, 6, 7, 11, 12, 13, 14, 15] {
            let opcode = OpCode::try_from(bits).unwrap();
            let mut header = Header::new(opcode);
            header.set_masked(true);
            assert!(matches!(check(&header, State::server()), Err(Error::ReservedOpCode)))
        }
    }

    #[test]
    fn check_control_frame_invariants() {
        let mut header = Header::new(OpCode::Ping);
        header.set_masked(true).set_payload_len(126);
        assert!(matches!(check(&header, State::server()), Err(Error::ControlPayloadOverflow)));

        let mut header = Header::new(OpCode::Close);
        header.set_masked(true).set_fin(false);
        assert!(matches!(check(&header, State::server()), Err(Error::FragmentedControl)))
    }

    #[test]
    fn check_reserved_bits_require_extension() {
        let mut header = Header::new(OpCode::Text);
        header.set_masked(true).set_rsv1(true);
        assert!(matches!(check(&header, State::server()), Err(Error::UnexpectedReservedBit)));
        let mut extended = State::server();
        extended.set_extended(true);
        assert!(check(&header, extended).is_ok())
    }

    #[test]
    fn check_mask_direction() {
        let header = Header::new(OpCode::Binary);
        assert!(matches!(check(&header, State::server()), Err(Error::MissingMask)));
        assert!(check(&header, State::client()).is_ok());

        let mut header = Header::new(OpCode::Binary);
        header.set_masked(true);
        assert!(matches!(check(&header, State::client()), Err(Error::UnexpectedMask)));
        assert!(check(&header, State::server()).is_ok())
    }

    #[test]
    fn check_continuation_rules() {
        let mut fragmented = State::client();
        fragmented.set_fragmented(true);

        let header = Header::new(OpCode::Text);
        assert!(matches!(check(&header, fragmented), Err(Error::ContinuationExpected)));

        let header = Header::new(OpCode::Continue);
        assert!(check(&header, fragmented).is_ok());
        assert!(matches!(check(&header, State::client()), Err(Error::UnexpectedContinuation)));

        // Control frames may be interleaved into a fragmented message.
        let header = Header::new(OpCode::Ping);
        assert!(check(&header, fragmented).is_ok())
    }

    quickcheck! {
        fn encode_decode_roundtrip(fin: bool, rsv: (bool, bool, bool), op: u8, masked: bool, mask: (u8, u8, u8, u8), len: u64) -> bool {
            let opcode = match OpCode::try_from(op % 16) {
                Ok(oc) if !oc.is_reserved() => oc,
                _ => OpCode::Binary
            };
            let mut header = Header::new(opcode);
            header.set_fin(fin)
                .set_rsv1(rsv.0)
                .set_rsv2(rsv.1)
                .set_rsv3(rsv.2)
                .set_masked(masked)
                .set_mask([mask.0, mask.1, mask.2, mask.3])
                .set_payload_len(len % (1 + i64::MAX as u64));
            if !masked {
                header.set_mask([0; 4]); // not part of the encoding
            }
            let mut codec = Codec::new();
            let bytes = codec.encode_header(&header).unwrap().to_vec();
            assert!(bytes.len() >= 2 && bytes.len() <= MAX_HEADER_SIZE);
            assert_eq!(bytes.len(), Codec::header_size(&header));
            match codec.decode_header(&bytes) {
                Ok(Parsing::Done { value, offset }) => value == header && offset == bytes.len(),
                _ => false
            }
        }
    }
}
