// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! [Extensions](https://tools.ietf.org/html/rfc6455#section-9) and their
//! negotiation parameters.

#[cfg(feature = "deflate")]
pub mod deflate;

use crate::{base::Header, BoxedError, Storage};
use bytes::BytesMut;
use std::{borrow::Cow, fmt};

/// A websocket extension as per RFC 6455 §9.
///
/// Extensions are added to a handshake before it runs. During the
/// handshake [`Extension::configure`] is called for every matching
/// offer (server) or response option (client); an extension that
/// accepts the parameters flags itself [enabled](Extension::is_enabled).
/// Enabled extensions take part in the data exchange: the reserved bits
/// they claim are allowed on incoming frames, [`Extension::encode`] runs
/// over every outgoing message and [`Extension::decode`] over every
/// complete incoming one.
pub trait Extension: fmt::Debug {
    /// The name of this extension, e.g. as it appears in
    /// `Sec-WebSocket-Extensions` headers.
    fn name(&self) -> &str;

    /// The parameters this extension wants to send during negotiation.
    fn params(&self) -> &[Param];

    /// Configure this extension with the parameters received during
    /// negotiation. Unacceptable parameters leave the extension disabled.
    fn configure(&mut self, params: &[Param]) -> Result<(), BoxedError>;

    /// Has negotiation enabled this extension?
    fn is_enabled(&self) -> bool;

    /// The reserved bits this extension may set on outgoing frames and
    /// accepts on incoming ones.
    fn reserved_bits(&self) -> (bool, bool, bool) {
        (false, false, false)
    }

    /// Transform an outgoing message, e.g. by compressing the payload
    /// and setting reserved header bits.
    fn encode(&mut self, header: &mut Header, data: &mut Storage<'_>) -> Result<(), BoxedError>;

    /// Transform a complete incoming message, e.g. by decompressing the
    /// payload and clearing reserved header bits.
    fn decode(&mut self, header: &mut Header, data: &mut BytesMut) -> Result<(), BoxedError>;
}

impl<E: Extension + ?Sized> Extension for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn params(&self) -> &[Param] {
        (**self).params()
    }

    fn configure(&mut self, params: &[Param]) -> Result<(), BoxedError> {
        (**self).configure(params)
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn reserved_bits(&self) -> (bool, bool, bool) {
        (**self).reserved_bits()
    }

    fn encode(&mut self, header: &mut Header, data: &mut Storage<'_>) -> Result<(), BoxedError> {
        (**self).encode(header, data)
    }

    fn decode(&mut self, header: &mut Header, data: &mut BytesMut) -> Result<(), BoxedError> {
        (**self).decode(header, data)
    }
}

/// An extension parameter: a name with an optional value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param<'a> {
    name: Cow<'a, str>,
    value: Option<Cow<'a, str>>
}

impl<'a> Param<'a> {
    /// Create a new parameter with the given name and no value.
    pub fn new(name: impl Into<Cow<'a, str>>) -> Self {
        Param { name: name.into(), value: None }
    }

    /// The name of this parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value of this parameter, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Set the value of this parameter.
    pub fn set_value(&mut self, value: Option<impl Into<Cow<'a, str>>>) -> &mut Self {
        self.value = value.map(Into::into);
        self
    }

    /// Turn this parameter into one that owns its contents.
    pub fn acquire(self) -> Param<'static> {
        Param {
            name: Cow::Owned(self.name.into_owned()),
            value: self.value.map(|v| Cow::Owned(v.into_owned()))
        }
    }
}

impl fmt::Display for Param<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(v) = &self.value {
            write!(f, "{}={}", self.name, v)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
