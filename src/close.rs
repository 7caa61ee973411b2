// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Close frame payloads: a big-endian status code followed by an
//! optional UTF-8 reason, as defined in
//! [RFC 6455 §5.5.1](https://tools.ietf.org/html/rfc6455#section-5.5.1)
//! and [§7.4](https://tools.ietf.org/html/rfc6455#section-7.4).

use bytes::{BufMut, BytesMut};
use std::fmt;

/// The maximum number of reason bytes that fit into a close frame
/// alongside the 2-byte status code.
pub const MAX_REASON_SIZE: usize = 123;

/// A websocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 1000, normal closure.
    pub const NORMAL_CLOSURE: StatusCode = StatusCode(1000);
    /// 1001, the endpoint is going away.
    pub const GOING_AWAY: StatusCode = StatusCode(1001);
    /// 1002, a protocol error occurred.
    pub const PROTOCOL_ERROR: StatusCode = StatusCode(1002);
    /// 1003, a data type was received that the endpoint cannot accept.
    pub const UNSUPPORTED_DATA: StatusCode = StatusCode(1003);
    /// 1005, no status code was present (never sent on the wire).
    pub const NO_STATUS_RCVD: StatusCode = StatusCode(1005);
    /// 1006, the connection closed abnormally (never sent on the wire).
    pub const ABNORMAL_CLOSURE: StatusCode = StatusCode(1006);
    /// 1007, a payload was not consistent with the type of the message.
    pub const INVALID_PAYLOAD: StatusCode = StatusCode(1007);
    /// 1008, a message violated the endpoint's policy.
    pub const POLICY_VIOLATION: StatusCode = StatusCode(1008);
    /// 1009, a message was too big to process.
    pub const MESSAGE_TOO_BIG: StatusCode = StatusCode(1009);
    /// 1010, a required extension was not negotiated.
    pub const MANDATORY_EXTENSION: StatusCode = StatusCode(1010);
    /// 1011, the server encountered an unexpected condition.
    pub const INTERNAL_ERROR: StatusCode = StatusCode(1011);
    /// 1015, the TLS handshake failed (never sent on the wire).
    pub const TLS_HANDSHAKE: StatusCode = StatusCode(1015);

    /// The numeric value of this status code.
    pub fn value(self) -> u16 {
        self.0
    }

    /// Is this code in the 0 .. 999 range no close code may come from?
    pub fn is_not_used(self) -> bool {
        self.0 < 1000
    }

    /// Is this code in the range reserved for this protocol specification
    /// (1000 ..= 2999)?
    pub fn is_protocol(self) -> bool {
        (1000 ..= 2999).contains(&self.0)
    }

    /// Is this code in the range for registered applications
    /// (3000 ..= 3999)?
    pub fn is_application(self) -> bool {
        (3000 ..= 3999).contains(&self.0)
    }

    /// Is this code in the range for private use (4000 ..= 4999)?
    pub fn is_private(self) -> bool {
        (4000 ..= 4999).contains(&self.0)
    }

    /// May this code appear in a close frame on the wire?
    ///
    /// 1005, 1006 and 1015 are reserved for local reporting, 1004 has no
    /// defined meaning and codes in the protocol range that are not
    /// assigned by the specification must not be used either.
    pub fn is_valid(self) -> bool {
        match self.0 {
            1000 ..= 1003 | 1007 ..= 1011 => true,
            n => (3000 ..= 4999).contains(&n)
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> Self {
        code.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The reason a close frame payload could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum InvalidClose {
    /// The status code must not appear on the wire.
    #[error("invalid close code: {0}")]
    Code(u16),
    /// The close reason was not valid UTF-8.
    #[error("close reason is not valid utf-8")]
    Reason
}

/// Build a close frame payload from a status code and a reason.
///
/// The reason is truncated (on a character boundary) so that the whole
/// payload fits into a control frame.
pub fn close_body(code: StatusCode, reason: &str) -> BytesMut {
    let mut n = reason.len().min(MAX_REASON_SIZE);
    while !reason.is_char_boundary(n) {
        n -= 1
    }
    let mut body = BytesMut::with_capacity(2 + n);
    body.put_u16(code.value());
    body.extend_from_slice(&reason.as_bytes()[.. n]);
    body
}

/// Split a close frame payload into status code and reason bytes.
///
/// A payload shorter than two bytes carries no status code; the reason
/// bytes are borrowed, not copied.
pub fn parse_close(body: &[u8]) -> (Option<StatusCode>, &[u8]) {
    if body.len() < 2 {
        return (None, &[])
    }
    let code = u16::from_be_bytes([body[0], body[1]]);
    (Some(StatusCode(code)), &body[2 ..])
}

/// Check that a received status code and reason may appear on the wire.
pub fn check_close(code: StatusCode, reason: &[u8]) -> Result<(), InvalidClose> {
    if !code.is_valid() {
        return Err(InvalidClose::Code(code.value()))
    }
    if std::str::from_utf8(reason).is_err() {
        return Err(InvalidClose::Reason)
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_close, close_body, parse_close, StatusCode, MAX_REASON_SIZE};

    #[test]
    fn roundtrip() {
        let body = close_body(StatusCode::GOING_AWAY, "bye");
        assert_eq!(&body[..], &[0x03, 0xE9, b'b', b'y', b'e']);
        let (code, reason) = parse_close(&body);
        assert_eq!(code, Some(StatusCode::GOING_AWAY));
        assert_eq!(reason, b"bye")
    }

    #[test]
    fn reason_is_truncated() {
        let long = "x".repeat(200);
        let body = close_body(StatusCode::NORMAL_CLOSURE, &long);
        assert_eq!(body.len(), 2 + MAX_REASON_SIZE)
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "ε".repeat(100); // 2 bytes each, 123 is not a boundary
        let body = close_body(StatusCode::NORMAL_CLOSURE, &long);
        assert_eq!(body.len(), 2 + 122);
        let (_, reason) = parse_close(&body);
        assert!(std::str::from_utf8(reason).is_ok())
    }

    #[test]
    fn short_body_has_no_code() {
        assert_eq!(parse_close(&[]), (None, &[][..]));
        assert_eq!(parse_close(&[0x03]), (None, &[][..]))
    }

    #[test]
    fn code_classification() {
        assert!(StatusCode::from(500).is_not_used());
        assert!(StatusCode::NORMAL_CLOSURE.is_protocol());
        assert!(StatusCode::from(3000).is_application());
        assert!(StatusCode::from(4999).is_private())
    }

    #[test]
    fn wire_validity() {
        for ok in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1010, 1011, 3000, 3999, 4000, 4999] {
            assert!(check_close(StatusCode::from(ok), b"reason").is_ok(), "{}", ok)
        }
        for bad in [0, 999, 1004, 1005, 1006, 1012, 1013, 1014, 1015, 1016, 2999, 5000, u16::MAX] {
            assert!(check_close(StatusCode::from(bad), b"").is_err(), "{}", bad)
        }
        assert!(check_close(StatusCode::NORMAL_CLOSURE, &[0xFF, 0xFE]).is_err())
    }
}
