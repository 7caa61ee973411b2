// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Just enough streaming HTTP/1.1 tokenization for the opening handshake.
//!
//! The handshake works line by line: CRLF-delimited lines are taken off a
//! refillable buffer (lines may straddle buffer refills), header names are
//! canonicalized in place, and option headers such as
//! `Sec-WebSocket-Extensions` are scanned with the token and quoted-string
//! rules of [RFC 7230 §3.2.6](https://tools.ietf.org/html/rfc7230#section-3.2.6).
//! This is not a general HTTP parser and does not want to be one.

use crate::extension::Param;
use bytes::BytesMut;
use smallvec::SmallVec;
use std::borrow::Cow;

/// An upper bound on the length of a single header line.
pub(crate) const MAX_LINE_SIZE: usize = 8 * 1024;

/// Locate the first CRLF-terminated line of `buffer`.
///
/// Returns the offset one past the trailing LF, or `None` if the buffer
/// does not yet hold a complete line. A bare LF is an error, as is a
/// line longer than [`MAX_LINE_SIZE`].
pub(crate) fn line_end(buffer: &[u8]) -> Result<Option<usize>, ()> {
    match buffer.iter().position(|&b| b == b'\n') {
        Some(0) => Err(()),
        Some(n) if buffer[n - 1] != b'\r' => Err(()),
        Some(n) if n >= MAX_LINE_SIZE => Err(()),
        Some(n) => Ok(Some(n + 1)),
        None if buffer.len() > MAX_LINE_SIZE => Err(()),
        None => Ok(None)
    }
}

/// Strip ASCII whitespace from both ends.
pub(crate) fn trim(mut bytes: &[u8]) -> &[u8] {
    while let Some((first, rest)) = bytes.split_first() {
        if first.is_ascii_whitespace() {
            bytes = rest
        } else {
            break
        }
    }
    while let Some((last, rest)) = bytes.split_last() {
        if last.is_ascii_whitespace() {
            bytes = rest
        } else {
            break
        }
    }
    bytes
}

/// Canonicalize a header name in place: every `-`-separated segment
/// starts with an upper case letter, the remainder is lower case
/// (`sec-webSOCKET-key` becomes `Sec-Websocket-Key`).
pub(crate) fn canonicalize(name: &mut [u8]) {
    let mut at_start = true;
    for byte in name {
        if *byte == b'-' {
            at_start = true;
            continue
        }
        if at_start {
            byte.make_ascii_uppercase()
        } else {
            byte.make_ascii_lowercase()
        }
        at_start = false
    }
}

/// A single `name: value` header line with the name canonicalized.
#[derive(Debug)]
pub(crate) struct HeaderLine {
    line: BytesMut,
    /// Length of the header name prefix of `line`.
    name_end: usize,
    /// Value range within `line`, already trimmed.
    value_start: usize,
    value_end: usize
}

impl HeaderLine {
    /// Split a raw header line (without CRLF) on the first colon.
    pub(crate) fn parse(mut line: BytesMut) -> Option<HeaderLine> {
        let colon = line.iter().position(|&b| b == b':')?;
        canonicalize(&mut line[.. colon]);
        let name = trim(&line[.. colon]);
        if name.len() != colon || name.is_empty() {
            return None // whitespace around the header name is invalid
        }
        let value = trim(&line[colon + 1 ..]);
        let value_start = value.as_ptr() as usize - line.as_ptr() as usize;
        let value_end = value_start + value.len();
        Some(HeaderLine { line, name_end: colon, value_start, value_end })
    }

    /// The canonicalized header name.
    pub(crate) fn name(&self) -> &str {
        // Canonicalization forces the name into printable ASCII.
        std::str::from_utf8(&self.line[.. self.name_end]).unwrap_or("")
    }

    /// The trimmed header value.
    pub(crate) fn value(&self) -> &[u8] {
        &self.line[self.value_start .. self.value_end]
    }

    /// The trimmed header value, if it is valid UTF-8.
    pub(crate) fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(self.value()).ok()
    }
}

/// Is `byte` an RFC 7230 `tchar`?
fn is_token_char(byte: u8) -> bool {
    matches!(byte,
        b'a' ..= b'z' | b'A' ..= b'Z' | b'0' ..= b'9'
        | b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+'
        | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

/// One element of an option header: a name and its parameters, e.g.
/// `permessage-deflate; client_max_window_bits=15`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct HeaderOption<'a> {
    pub(crate) name: &'a str,
    pub(crate) params: SmallVec<[Param<'a>; 4]>
}

/// Scanner over the `1#element` option header syntax.
struct Scanner<'a> {
    input: &'a str,
    pos: usize
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn token(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while self.peek().map(is_token_char).unwrap_or(false) {
            self.pos += 1
        }
        if self.pos == start {
            None
        } else {
            Some(&self.input[start .. self.pos])
        }
    }

    fn quoted_string(&mut self) -> Option<Cow<'a, str>> {
        if !self.eat(b'"') {
            return None
        }
        let start = self.pos;
        let mut unescaped: Option<String> = None;
        loop {
            match self.peek()? {
                b'"' => {
                    let plain = &self.input[start .. self.pos];
                    self.pos += 1;
                    return Some(match unescaped {
                        None => Cow::Borrowed(plain),
                        Some(s) => Cow::Owned(s)
                    })
                }
                b'\\' => {
                    let s = unescaped.get_or_insert_with(|| self.input[start .. self.pos].to_string());
                    self.pos += 1;
                    let escaped = self.peek()?;
                    s.push(escaped as char);
                    self.pos += 1
                }
                byte => {
                    if let Some(s) = &mut unescaped {
                        s.push(byte as char)
                    }
                    self.pos += 1
                }
            }
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }
}

/// Scan an option header value into its elements.
///
/// Returns `None` if the value does not follow the
/// `name *(";" param ["=" value]) *("," ...)` shape.
pub(crate) fn parse_options(value: &str) -> Option<SmallVec<[HeaderOption<'_>; 2]>> {
    let mut scanner = Scanner::new(value);
    let mut options = SmallVec::new();
    loop {
        scanner.skip_ws();
        if scanner.at_end() && !options.is_empty() {
            return Some(options)
        }
        if scanner.eat(b',') {
            continue // empty list elements are allowed
        }
        let name = scanner.token()?;
        let mut params = SmallVec::new();
        loop {
            scanner.skip_ws();
            if !scanner.eat(b';') {
                break
            }
            scanner.skip_ws();
            let mut param = Param::new(scanner.token()?);
            scanner.skip_ws();
            if scanner.eat(b'=') {
                scanner.skip_ws();
                if let Some(token) = scanner.token() {
                    param.set_value(Some(token));
                } else {
                    param.set_value(Some(scanner.quoted_string()?));
                }
            }
            params.push(param)
        }
        options.push(HeaderOption { name, params });
        scanner.skip_ws();
        if scanner.at_end() {
            return Some(options)
        }
        if !scanner.eat(b',') {
            return None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{canonicalize, line_end, parse_options, trim, HeaderLine};
    use bytes::BytesMut;

    #[test]
    fn lines() {
        assert_eq!(line_end(b"Host: x\r\nrest"), Ok(Some(9)));
        assert_eq!(line_end(b"\r\n"), Ok(Some(2)));
        assert_eq!(line_end(b"no newline yet"), Ok(None));
        assert!(line_end(b"bare\nnewline").is_err());
        assert!(line_end(b"\n").is_err())
    }

    #[test]
    fn canonical_names() {
        let mut name = b"sec-webSOCKET-accept".to_vec();
        canonicalize(&mut name);
        assert_eq!(name, b"Sec-Websocket-Accept");

        let mut name = b"HOST".to_vec();
        canonicalize(&mut name);
        assert_eq!(name, b"Host")
    }

    #[test]
    fn header_lines() {
        let h = HeaderLine::parse(BytesMut::from("upgrade:  websocket  ")).unwrap();
        assert_eq!(h.name(), "Upgrade");
        assert_eq!(h.value(), b"websocket");

        let h = HeaderLine::parse(BytesMut::from("X-Empty:")).unwrap();
        assert_eq!(h.value(), b"");

        assert!(HeaderLine::parse(BytesMut::from("no colon here")).is_none());
        assert!(HeaderLine::parse(BytesMut::from("spaced name : x")).is_none())
    }

    #[test]
    fn trims() {
        assert_eq!(trim(b"  x y\t"), b"x y");
        assert_eq!(trim(b""), b"");
        assert_eq!(trim(b" \t "), b"")
    }

    #[test]
    fn option_lists() {
        let opts = parse_options("permessage-deflate").unwrap();
        assert_eq!(opts.len(), 1);
        assert_eq!(opts[0].name, "permessage-deflate");
        assert!(opts[0].params.is_empty());

        let opts = parse_options(
            "permessage-deflate; client_max_window_bits; server_max_window_bits=10, \
             permessage-deflate; server_no_context_takeover"
        ).unwrap();
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].params.len(), 2);
        assert_eq!(opts[0].params[0].name(), "client_max_window_bits");
        assert_eq!(opts[0].params[0].value(), None);
        assert_eq!(opts[0].params[1].name(), "server_max_window_bits");
        assert_eq!(opts[0].params[1].value(), Some("10"));
        assert_eq!(opts[1].params[0].name(), "server_no_context_takeover")
    }

    #[test]
    fn quoted_parameter_values() {
        let opts = parse_options(r#"foo; a="plain"; b="es\"caped""#).unwrap();
        assert_eq!(opts[0].params[0].value(), Some("plain"));
        assert_eq!(opts[0].params[1].value(), Some("es\"caped"))
    }

    #[test]
    fn malformed_option_lists() {
        assert!(parse_options("").is_none());
        assert!(parse_options("foo; =x").is_none());
        assert!(parse_options("foo bar").is_none());
        assert!(parse_options("foo; a=\"unterminated").is_none())
    }
}
