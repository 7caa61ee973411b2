// Copyright (c) 2026 wskit developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! A persistent websocket connection after the handshake phase,
//! represented as a [`Sender`] and [`Receiver`] pair.
//!
//! The [`Receiver`] is a frame-by-frame streaming reader:
//! [`Receiver::next_frame`] advances to the next data frame of the
//! inbound stream and [`Receiver::read`] pulls payload bytes out of it,
//! unmasking and UTF-8 checking as it goes. By default control frames
//! never reach the caller; pings are answered, pongs discarded and a
//! close frame is echoed before it surfaces as [`Error::Closed`]. With
//! [`Builder::set_auto_control`] disabled, control frames are returned
//! from `next_frame` instead and consuming them is the caller's duty.
//! The whole-message convenience [`Receiver::receive_data`] builds on
//! the same machinery and runs negotiated extensions over each
//! complete message.
//!
//! The [`Sender`] buffers outgoing bytes and emits them as one or more
//! frames: the first frame of a message carries the message opcode and
//! any reserved bits claimed by extensions, every further frame is a
//! continuation, and the final frame of a message is flagged with `fin`
//! by [`Sender::flush`]. Writes larger than the frame buffer bypass it
//! entirely.

use bytes::{Buf, BytesMut};
use crate::{
    as_u64,
    base::{self, Header, OpCode, State, MAX_HEADER_SIZE},
    close::{self, StatusCode},
    data::{ByteSlice125, Data},
    extension::Extension,
    mask, utf8, BoxedError, Parsing, Storage
};
use futures::{io::{BufWriter, ReadHalf, WriteHalf}, lock::BiLock, prelude::*};
use smallvec::SmallVec;
use static_assertions::const_assert;
use std::io;

/// Allocation block size.
const BLOCK_SIZE: usize = 8 * 1024;
/// Capacity of the buffered transport writer.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;
/// Default payload capacity of the [`Sender`] frame buffer.
const FRAME_BUFFER_SIZE: usize = 8 * 1024;
/// Default accumulated max. size of a complete message.
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;
/// Default max. size of a single frame payload.
const MAX_FRAME_SIZE: u64 = 256 * 1024 * 1024;

const_assert!(MAX_HEADER_SIZE < BLOCK_SIZE);

/// Is the connection used by a client or server?
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Client-side of a connection (implies masking of payload data).
    Client,
    /// Server-side of a connection.
    Server
}

impl Mode {
    /// Is this the client side?
    pub fn is_client(self) -> bool {
        matches!(self, Mode::Client)
    }

    /// Is this the server side?
    pub fn is_server(self) -> bool {
        !self.is_client()
    }
}

/// A connection builder.
///
/// Allows configuring limits and extensions before creating the
/// [`Sender`]/[`Receiver`] pair that represents the connection.
#[derive(Debug)]
pub struct Builder<T> {
    mode: Mode,
    socket: T,
    codec: base::Codec,
    extensions: SmallVec<[Box<dyn Extension + Send>; 4]>,
    buffer: BytesMut,
    max_message_size: usize,
    max_frame_size: u64,
    frame_size: usize,
    auto_control: bool
}

impl<T: AsyncRead + AsyncWrite + Unpin> Builder<T> {
    /// Create a new `Builder` from the given async I/O resource and mode.
    ///
    /// **Note**: Use this type only after a successful handshake
    /// (cf. [`Client::into_builder`][1] and [`Server::into_builder`][2]).
    ///
    /// [1]: crate::handshake::Client::into_builder
    /// [2]: crate::handshake::Server::into_builder
    pub fn new(socket: T, mode: Mode) -> Self {
        Builder {
            mode,
            socket,
            codec: base::Codec::new(),
            extensions: SmallVec::new(),
            buffer: BytesMut::new(),
            max_message_size: MAX_MESSAGE_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            frame_size: FRAME_BUFFER_SIZE,
            auto_control: true
        }
    }

    /// Set a custom read buffer, e.g. one carrying bytes which arrived
    /// immediately after the handshake.
    pub fn set_buffer(&mut self, b: BytesMut) {
        self.buffer = b
    }

    /// Add extensions to use with this connection.
    ///
    /// Only enabled extensions will be considered.
    pub fn add_extensions<I>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = Box<dyn Extension + Send>>
    {
        for e in extensions.into_iter().filter(|e| e.is_enabled()) {
            log::debug!("using extension: {}", e.name());
            self.extensions.push(e)
        }
    }

    /// Set the maximum size of a complete message.
    ///
    /// Message fragments will be buffered and concatenated up to this
    /// value, i.e. the sum of all message frame payload lengths will not
    /// be greater than this maximum. However, extensions may increase
    /// the total message size further, e.g. by decompressing the data.
    pub fn set_max_message_size(&mut self, max: usize) {
        self.max_message_size = max
    }

    /// Set the maximum payload size of a single websocket frame.
    pub fn set_max_frame_size(&mut self, max: u64) {
        self.max_frame_size = max
    }

    /// Set the payload capacity of the sender's frame buffer, i.e. the
    /// fragmentation threshold of outgoing messages.
    pub fn set_frame_buffer_size(&mut self, size: usize) {
        self.frame_size = size.max(1)
    }

    /// Control how the receiver treats incoming control frames.
    ///
    /// When enabled (the default), pings are answered, pongs discarded
    /// and close frames echoed internally, so [`Receiver::next_frame`]
    /// only ever returns data frame headers. When disabled, control
    /// frames are returned from [`Receiver::next_frame`] like any other
    /// frame and it is the caller's duty to consume their payload and
    /// answer pings and close frames.
    pub fn set_auto_control(&mut self, enabled: bool) {
        self.auto_control = enabled
    }

    /// Create a configured [`Sender`]/[`Receiver`] pair.
    pub fn finish(self) -> (Sender<T>, Receiver<T>) {
        let (read_half, write_half) = self.socket.split();
        let (writer1, writer2) = BiLock::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, write_half));
        let has_extensions = !self.extensions.is_empty();
        let (ext1, ext2) = BiLock::new(self.extensions);

        let mut state = if self.mode.is_server() {
            State::server()
        } else {
            State::client()
        };
        state.set_extended(has_extensions);

        // The sender's frame buffer keeps room for a frame header in
        // front of the payload, so header and payload go out in one write.
        let mut frame_buffer = BytesMut::with_capacity(MAX_HEADER_SIZE + self.frame_size);
        frame_buffer.resize(MAX_HEADER_SIZE, 0);

        let receiver = Receiver {
            mode: self.mode,
            reader: read_half,
            writer: writer1,
            codec: self.codec.clone(),
            extensions: ext1,
            has_extensions,
            state,
            buffer: self.buffer,
            progress: Progress::Idle,
            first_header: None,
            is_text: false,
            validate: false,
            utf8: utf8::Validator::new(),
            message: BytesMut::new(),
            mask_buffer: Vec::new(),
            max_frame_size: self.max_frame_size,
            max_message_size: self.max_message_size,
            auto_control: self.auto_control,
            closed: None
        };

        let sender = Sender {
            mode: self.mode,
            writer: writer2,
            codec: self.codec,
            extensions: ext2,
            has_extensions,
            buffer: frame_buffer,
            frame_size: self.frame_size,
            opcode: OpCode::Binary,
            rsv1: false,
            frames_sent: 0,
            dirty: false,
            mask_buffer: Vec::new()
        };

        (sender, receiver)
    }
}

/// Where the receiver stands within the inbound frame sequence.
#[derive(Debug, Clone, Copy)]
enum Progress {
    /// No frame has been prepared for reading.
    Idle,
    /// A data frame payload is being streamed.
    Frame {
        /// The frame header.
        header: Header,
        /// Payload bytes already consumed (doubles as the mask offset).
        consumed: u64
    },
    /// A non-final frame has been fully consumed; the message continues
    /// with the next frame.
    FrameDone,
    /// The final frame of a message has been fully consumed.
    End
}

/// The receiving half of a connection.
#[derive(Debug)]
pub struct Receiver<T> {
    mode: Mode,
    reader: ReadHalf<T>,
    writer: BiLock<BufWriter<WriteHalf<T>>>,
    codec: base::Codec,
    extensions: BiLock<SmallVec<[Box<dyn Extension + Send>; 4]>>,
    has_extensions: bool,
    state: State,
    /// Read buffer over the transport.
    buffer: BytesMut,
    progress: Progress,
    /// Header of the first frame of the current message.
    first_header: Option<Header>,
    /// Is the current message a text message?
    is_text: bool,
    /// Validate payload bytes incrementally as UTF-8?
    validate: bool,
    utf8: utf8::Validator,
    /// Accumulation buffer of [`Receiver::receive_data`].
    message: BytesMut,
    /// Scratch buffer for masking outbound control frames.
    mask_buffer: Vec<u8>,
    max_frame_size: u64,
    max_message_size: usize,
    /// Answer control frames internally instead of surfacing them.
    auto_control: bool,
    /// Close details once the close handshake has completed.
    closed: Option<(StatusCode, String)>
}

impl<T: AsyncRead + AsyncWrite + Unpin> Receiver<T> {
    /// Advance to the header of the next frame.
    ///
    /// Any unconsumed remainder of the current frame is discarded.
    /// By default control frames are handled internally: pings are
    /// answered with an identical pong, pongs are dropped, and a close
    /// frame is echoed before this method returns [`Error::Closed`].
    /// With [`Builder::set_auto_control`] disabled they are returned
    /// like data frames instead, and answering them is the caller's
    /// duty.
    ///
    /// The returned header has already passed the frame validity rules;
    /// its payload is read with [`Receiver::read`].
    pub async fn next_frame(&mut self) -> Result<Header, Error> {
        let auto_control = self.auto_control;
        self.next_frame_with(auto_control).await
    }

    async fn next_frame_with(&mut self, auto_control: bool) -> Result<Header, Error> {
        if let Some((code, reason)) = &self.closed {
            return Err(Error::Closed { code: *code, reason: reason.clone() })
        }
        if let Progress::Frame { header, .. } = self.progress {
            if !header.opcode().is_control() {
                self.validate = false // bytes are skipped, the validator desyncs
            }
            self.drain_frame().await?
        }
        loop {
            let header = self.receive_header().await?;
            log::trace!("recv: {}", header);
            base::check(&header, self.state)?;

            if header.opcode().is_control() {
                if header.is_rsv1() {
                    return Err(Error::UnexpectedCompressionBit)
                }
                if auto_control {
                    self.on_control(&header).await?;
                    continue
                }
                // The caller consumes the payload; message state is
                // untouched while the control frame streams.
                self.progress = Progress::Frame { header, consumed: 0 };
                return Ok(header)
            }

            if header.payload_len() > self.max_frame_size {
                // The header is consumed, the payload is not.
                return Err(Error::FrameTooLarge {
                    actual: header.payload_len(),
                    maximum: self.max_frame_size
                })
            }

            if header.opcode() == OpCode::Continue {
                // Compression only marks the first frame of a message.
                if header.is_rsv1() {
                    return Err(Error::UnexpectedCompressionBit)
                }
                if header.is_fin() {
                    self.state.set_fragmented(false);
                }
            } else {
                self.first_header = Some(header);
                self.is_text = header.opcode() == OpCode::Text;
                // Compressed text is validated after decompression.
                self.validate = self.is_text && !header.is_rsv1();
                self.utf8.reset();
                if !header.is_fin() {
                    self.state.set_fragmented(true);
                }
            }

            self.progress = Progress::Frame { header, consumed: 0 };
            return Ok(header)
        }
    }

    /// Read payload bytes of the current frame into `dst`.
    ///
    /// Returns `Ok(0)` when the current frame is exhausted: if it was a
    /// non-final frame, [`Receiver::next_frame`] continues the message;
    /// if it was final, the message is complete. Masked payloads are
    /// unmasked and text messages are UTF-8 validated on the fly, with
    /// [`Error::InvalidUtf8`] raised at the first offending byte.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, Error> {
        if let Some((code, reason)) = &self.closed {
            return Err(Error::Closed { code: *code, reason: reason.clone() })
        }
        match self.progress {
            Progress::Idle => Err(Error::NoFrameAdvance),
            Progress::FrameDone | Progress::End => Ok(0),
            Progress::Frame { header, consumed } => {
                let remaining = header.payload_len() - consumed;
                if remaining == 0 {
                    self.finish_frame(&header)?;
                    return Ok(0)
                }
                if dst.is_empty() {
                    return Ok(0)
                }
                if self.buffer.is_empty() {
                    crate::read_more(&mut self.reader, &mut self.buffer, BLOCK_SIZE).await?;
                }
                let n = as_u64(dst.len().min(self.buffer.len())).min(remaining) as usize;
                dst[.. n].copy_from_slice(&self.buffer[.. n]);
                self.buffer.advance(n);
                if header.is_masked() {
                    mask::apply_mask(&mut dst[.. n], header.mask(), (consumed % 4) as usize)
                }
                if self.validate
                    && !header.opcode().is_control()
                    && self.utf8.push(&dst[.. n]).is_err()
                {
                    return Err(Error::InvalidUtf8)
                }
                let consumed = consumed + as_u64(n);
                if consumed == header.payload_len() {
                    self.finish_frame(&header)?
                } else {
                    self.progress = Progress::Frame { header, consumed }
                }
                Ok(n)
            }
        }
    }

    /// Read and discard whatever remains of the current message,
    /// including subsequent continuation frames.
    pub async fn discard(&mut self) -> Result<(), Error> {
        loop {
            match self.progress {
                Progress::Idle | Progress::End => return Ok(()),
                Progress::FrameDone => {
                    self.next_frame().await?;
                }
                Progress::Frame { header, .. } => {
                    if !header.opcode().is_control() {
                        self.validate = false
                    }
                    self.drain_frame().await?
                }
            }
        }
    }

    /// Receive the next complete message, appending its payload to
    /// `message`.
    ///
    /// Fragments are concatenated up to the maximum message size and
    /// negotiated extensions run over the complete payload. Control
    /// frames are always handled internally here, regardless of the
    /// [`Builder::set_auto_control`] setting.
    pub async fn receive_data(&mut self, message: &mut Vec<u8>) -> Result<Data, Error> {
        let mut chunk = [0_u8; BLOCK_SIZE];
        self.message.clear();
        loop {
            self.next_frame_with(true).await?;
            loop {
                let n = self.read(&mut chunk).await?;
                if n == 0 {
                    break
                }
                if self.message.len() + n > self.max_message_size {
                    return Err(Error::MessageTooLarge {
                        current: self.message.len() + n,
                        maximum: self.max_message_size
                    })
                }
                self.message.extend_from_slice(&chunk[.. n])
            }
            if let Progress::End = self.progress {
                break
            }
        }

        let mut first = self.first_header.take().unwrap_or_else(|| Header::new(OpCode::Binary));
        let was_compressed = first.is_rsv1();
        first.set_payload_len(as_u64(self.message.len()));

        if self.has_extensions {
            let mut extensions = self.extensions.lock().await;
            for e in extensions.iter_mut() {
                log::trace!("decoding with extension: {}", e.name());
                e.decode(&mut first, &mut self.message).map_err(Error::Extension)?
            }
        }

        if self.is_text && was_compressed && std::str::from_utf8(&self.message).is_err() {
            return Err(Error::InvalidUtf8)
        }

        message.extend_from_slice(&self.message);
        let data = if self.is_text {
            Data::Text(self.message.len())
        } else {
            Data::Binary(self.message.len())
        };
        self.message.clear();
        Ok(data)
    }

    /// Read the next frame header off the transport.
    async fn receive_header(&mut self) -> Result<Header, Error> {
        loop {
            match self.codec.decode_header(&self.buffer)? {
                Parsing::Done { value, offset } => {
                    debug_assert!(offset <= MAX_HEADER_SIZE);
                    self.buffer.advance(offset);
                    return Ok(value)
                }
                Parsing::NeedMore(()) => {
                    crate::read_more(&mut self.reader, &mut self.buffer, BLOCK_SIZE).await?;
                }
            }
        }
    }

    /// Consume and drop the unread remainder of the current frame.
    async fn drain_frame(&mut self) -> Result<(), Error> {
        if let Progress::Frame { header, consumed } = self.progress {
            let mut remaining = header.payload_len() - consumed;
            while remaining > 0 {
                if self.buffer.is_empty() {
                    crate::read_more(&mut self.reader, &mut self.buffer, BLOCK_SIZE).await?;
                }
                let n = as_u64(self.buffer.len()).min(remaining) as usize;
                self.buffer.advance(n);
                remaining -= as_u64(n)
            }
            self.progress = self.after_frame(&header)
        }
        Ok(())
    }

    /// Where the receiver stands once the given frame is consumed.
    ///
    /// A control frame does not affect the progress of a message, so
    /// after one the receiver is back where it was: mid-message if a
    /// fragmented message is open, at a message boundary otherwise.
    fn after_frame(&self, header: &Header) -> Progress {
        if header.opcode().is_control() {
            if self.state.is_fragmented() {
                Progress::FrameDone
            } else {
                Progress::End
            }
        } else if header.is_fin() {
            Progress::End
        } else {
            Progress::FrameDone
        }
    }

    /// Mark the end of the current frame and finalize validation.
    fn finish_frame(&mut self, header: &Header) -> Result<(), Error> {
        self.progress = self.after_frame(header);
        if header.is_fin()
            && !header.opcode().is_control()
            && self.validate
            && !self.utf8.is_complete()
        {
            return Err(Error::InvalidUtf8)
        }
        Ok(())
    }

    /// Answer an incoming control frame.
    async fn on_control(&mut self, header: &Header) -> Result<(), Error> {
        debug_assert!(header.payload_len() <= base::MAX_CTRL_BODY_SIZE);
        let len = header.payload_len() as usize;
        while self.buffer.len() < len {
            crate::read_more(&mut self.reader, &mut self.buffer, BLOCK_SIZE).await?;
        }
        let mut payload = self.buffer.split_to(len);
        if header.is_masked() {
            mask::apply_mask(&mut payload, header.mask(), 0)
        }
        match header.opcode() {
            OpCode::Ping => {
                log::trace!("answering ping with {} byte pong", len);
                let mut answer = Header::new(OpCode::Pong);
                self.write(&mut answer, &mut Storage::Unique(&mut payload)).await?;
                self.flush().await
            }
            OpCode::Pong => {
                log::trace!("discarding unsolicited pong");
                Ok(())
            }
            OpCode::Close => self.on_close(&payload).await,
            opcode => {
                debug_assert!(false, "{} is not a control opcode", opcode);
                Ok(())
            }
        }
    }

    /// Answer a close frame and report the end of the connection.
    async fn on_close(&mut self, payload: &[u8]) -> Result<(), Error> {
        match close::parse_close(payload) {
            (None, _) => {
                let mut answer = Header::new(OpCode::Close);
                self.write(&mut answer, &mut Storage::Shared(&[])).await?;
                self.flush().await?;
                let code = StatusCode::NO_STATUS_RCVD;
                self.closed = Some((code, String::new()));
                Err(Error::Closed { code, reason: String::new() })
            }
            (Some(code), reason) => match close::check_close(code, reason) {
                Ok(()) => {
                    let mut answer = Header::new(OpCode::Close);
                    self.write(&mut answer, &mut Storage::Owned(close::close_body(code, ""))).await?;
                    self.flush().await?;
                    let reason = String::from(std::str::from_utf8(reason).unwrap_or_default());
                    self.closed = Some((code, reason.clone()));
                    Err(Error::Closed { code, reason })
                }
                Err(e) => {
                    let message = e.to_string();
                    let mut answer = Header::new(OpCode::Close);
                    let body = close::close_body(StatusCode::PROTOCOL_ERROR, &message);
                    self.write(&mut answer, &mut Storage::Owned(body)).await?;
                    self.flush().await?;
                    self.closed = Some((StatusCode::PROTOCOL_ERROR, message));
                    Err(match e {
                        close::InvalidClose::Code(c) => Error::InvalidCloseCode(c),
                        close::InvalidClose::Reason => Error::InvalidUtf8
                    })
                }
            }
        }
    }

    /// Write a frame to the shared transport writer.
    async fn write(&mut self, header: &mut Header, data: &mut Storage<'_>) -> Result<(), Error> {
        write(self.mode, &mut self.codec, &self.writer, header, data, &mut self.mask_buffer).await
    }

    /// Flush the shared transport writer.
    async fn flush(&mut self) -> Result<(), Error> {
        self.writer.lock().await.flush().await.map_err(Error::from)
    }
}

/// The sending half of a connection.
#[derive(Debug)]
pub struct Sender<T> {
    mode: Mode,
    writer: BiLock<BufWriter<WriteHalf<T>>>,
    codec: base::Codec,
    extensions: BiLock<SmallVec<[Box<dyn Extension + Send>; 4]>>,
    has_extensions: bool,
    /// Frame buffer: [`MAX_HEADER_SIZE`] reserved bytes, then payload.
    buffer: BytesMut,
    /// Payload capacity per buffered frame.
    frame_size: usize,
    /// The opcode of the current message.
    opcode: OpCode,
    /// Set the rsv1 bit on the first frame of the current message.
    rsv1: bool,
    /// Frames emitted for the current message so far.
    frames_sent: usize,
    /// Has anything been written into the current message?
    dirty: bool,
    /// Scratch buffer for masking borrowed payloads.
    mask_buffer: Vec<u8>
}

impl<T: AsyncRead + AsyncWrite + Unpin> Sender<T> {
    /// Begin a new message with the given data opcode, discarding any
    /// buffered bytes of an unfinished message.
    ///
    /// # Panics
    ///
    /// If `opcode` is not `Text` or `Binary`.
    pub fn reset(&mut self, opcode: OpCode) {
        assert!(opcode.is_data(), "a message starts with a data opcode");
        self.opcode = opcode;
        self.rsv1 = false;
        self.frames_sent = 0;
        self.dirty = false;
        self.buffer.truncate(MAX_HEADER_SIZE)
    }

    /// Append `data` to the current message.
    ///
    /// Bytes are collected in the frame buffer; each time it fills up a
    /// non-final frame goes out. If `data` alone exceeds the buffer
    /// capacity while nothing is buffered, it is sent directly as a
    /// single non-final frame without copying.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.dirty = true;
        if self.fill() == 0 && data.len() > self.frame_size {
            return self.emit_borrowed(data, false).await
        }
        let mut data = data;
        while !data.is_empty() {
            let room = self.frame_size - self.fill();
            let n = room.min(data.len());
            self.buffer.extend_from_slice(&data[.. n]);
            data = &data[n ..];
            if self.fill() == self.frame_size {
                self.emit_buffered(false).await?
            }
        }
        Ok(())
    }

    /// Finish the current message and flush the transport.
    ///
    /// Emits the buffered bytes (possibly none) as the final frame of
    /// the message. If nothing was ever written since the last message
    /// ended, no frame is emitted and only the transport is flushed.
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.end_message().await?;
        log::trace!("flushing connection");
        self.writer.lock().await.flush().await.map_err(Error::from)
    }

    /// Send a text message.
    ///
    /// The message is finalized immediately; call [`Sender::flush`] to
    /// push buffered transport writes to the peer.
    pub async fn send_text(&mut self, data: impl AsRef<str>) -> Result<(), Error> {
        self.send_message(OpCode::Text, &mut Storage::Shared(data.as_ref().as_bytes())).await
    }

    /// Send a binary message.
    pub async fn send_binary(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.send_message(OpCode::Binary, &mut Storage::Shared(data.as_ref())).await
    }

    /// Send a binary message, transforming the provided data in place
    /// where possible (e.g. when masking).
    pub async fn send_binary_mut(&mut self, mut data: impl AsMut<[u8]>) -> Result<(), Error> {
        self.send_message(OpCode::Binary, &mut Storage::Unique(data.as_mut())).await
    }

    /// Ping the remote end.
    pub async fn send_ping(&mut self, data: ByteSlice125<'_>) -> Result<(), Error> {
        let mut header = Header::new(OpCode::Ping);
        self.write_frame(&mut header, &mut Storage::Shared(data.as_ref())).await
    }

    /// Send an unsolicited pong to the remote end.
    pub async fn send_pong(&mut self, data: ByteSlice125<'_>) -> Result<(), Error> {
        let mut header = Header::new(OpCode::Pong);
        self.write_frame(&mut header, &mut Storage::Shared(data.as_ref())).await
    }

    /// Send a close frame with code 1000 (normal closure) and flush.
    ///
    /// The transport itself is left open; dropping it is up to the
    /// caller once the peer's close answer has been received.
    pub async fn close(&mut self) -> Result<(), Error> {
        log::trace!("closing connection");
        let mut header = Header::new(OpCode::Close);
        let body = close::close_body(StatusCode::NORMAL_CLOSURE, "");
        self.write_frame(&mut header, &mut Storage::Owned(body)).await?;
        self.writer.lock().await.flush().await.map_err(Error::from)
    }

    /// Send one complete message, running extensions over the payload.
    async fn send_message(&mut self, opcode: OpCode, data: &mut Storage<'_>) -> Result<(), Error> {
        if self.dirty {
            return Err(Error::UnfinishedMessage)
        }

        let mut header = Header::new(opcode);
        header.set_payload_len(as_u64(data.as_ref().len()));

        if self.has_extensions {
            let mut extensions = self.extensions.lock().await;
            for e in extensions.iter_mut() {
                log::trace!("encoding with extension: {}", e.name());
                e.encode(&mut header, data).map_err(Error::Extension)?
            }
        }

        self.reset(header.opcode());
        self.rsv1 = header.is_rsv1();
        self.dirty = true;
        self.write(data.as_ref()).await?;
        self.end_message().await
    }

    /// Emit the final frame of the current message, if one is open.
    async fn end_message(&mut self) -> Result<(), Error> {
        if self.dirty {
            self.emit_buffered(true).await?;
            self.dirty = false;
            self.frames_sent = 0;
            self.rsv1 = false
        }
        Ok(())
    }

    /// Payload bytes currently buffered.
    fn fill(&self) -> usize {
        self.buffer.len() - MAX_HEADER_SIZE
    }

    /// The header of the next outgoing frame of the current message.
    fn next_header(&self, fin: bool) -> Header {
        let opcode = if self.frames_sent == 0 { self.opcode } else { OpCode::Continue };
        let mut header = Header::new(opcode);
        header.set_fin(fin);
        if self.frames_sent == 0 && self.rsv1 {
            header.set_rsv1(true);
        }
        header
    }

    /// Emit the buffered payload as one frame.
    ///
    /// The header is encoded into the reserved space directly in front
    /// of the payload, so header and payload leave in a single write.
    async fn emit_buffered(&mut self, fin: bool) -> Result<(), Error> {
        let fill = self.fill();
        let mut header = self.next_header(fin);
        header.set_payload_len(as_u64(fill));
        if self.mode.is_client() {
            header.set_masked(true);
            header.set_mask(rand::random());
            mask::apply_mask(&mut self.buffer[MAX_HEADER_SIZE ..], header.mask(), 0)
        }
        log::trace!("send: {}", header);
        let size = base::Codec::header_size(&header);
        let start = MAX_HEADER_SIZE - size;
        let encoded = self.codec.encode_header(&header)?;
        self.buffer[start .. MAX_HEADER_SIZE].copy_from_slice(encoded);
        {
            let mut w = self.writer.lock().await;
            w.write_all(&self.buffer[start ..]).await?;
        }
        self.frames_sent += 1;
        self.buffer.truncate(MAX_HEADER_SIZE);
        Ok(())
    }

    /// Emit one frame with a payload borrowed from the caller.
    async fn emit_borrowed(&mut self, data: &[u8], fin: bool) -> Result<(), Error> {
        let mut header = self.next_header(fin);
        write(self.mode, &mut self.codec, &self.writer, &mut header, &mut Storage::Shared(data), &mut self.mask_buffer).await?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Write a single control frame.
    async fn write_frame(&mut self, header: &mut Header, data: &mut Storage<'_>) -> Result<(), Error> {
        write(self.mode, &mut self.codec, &self.writer, header, data, &mut self.mask_buffer).await
    }
}

/// Write header and payload data to the shared transport writer.
///
/// The data will be masked if the mode requires it. No extensions are
/// applied to header or payload.
async fn write<T: AsyncWrite + Unpin>(
    mode: Mode,
    codec: &mut base::Codec,
    writer: &BiLock<BufWriter<WriteHalf<T>>>,
    header: &mut Header,
    data: &mut Storage<'_>,
    mask_buffer: &mut Vec<u8>
) -> Result<(), Error> {
    if mode.is_client() {
        header.set_masked(true);
        header.set_mask(rand::random());
    }
    header.set_payload_len(as_u64(data.as_ref().len()));

    log::trace!("send: {}", header);

    let header_bytes = codec.encode_header(header)?;
    let mut w = writer.lock().await;
    w.write_all(header_bytes).await?;

    if !header.is_masked() {
        return w.write_all(data.as_ref()).await.map_err(Error::from)
    }

    match data {
        Storage::Shared(slice) => {
            mask_buffer.clear();
            mask_buffer.extend_from_slice(slice);
            mask::apply_mask(mask_buffer, header.mask(), 0);
            w.write_all(mask_buffer).await.map_err(Error::from)
        }
        Storage::Unique(slice) => {
            mask::apply_mask(slice, header.mask(), 0);
            w.write_all(slice).await.map_err(Error::from)
        }
        Storage::Owned(bytes) => {
            mask::apply_mask(bytes, header.mask(), 0);
            w.write_all(bytes).await.map_err(Error::from)
        }
    }
}

/// Errors which may occur when sending or receiving messages.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error was encountered.
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    /// The frame codec errored.
    #[error("codec error: {0}")]
    Codec(#[from] base::Error),

    /// An extension produced an error while encoding or decoding.
    #[error("extension error: {0}")]
    Extension(#[source] BoxedError),

    /// The transport ended in the middle of a frame.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The payload length of a frame exceeded the configured maximum.
    /// The frame header has been consumed, its payload has not.
    #[error("frame too large: len = {actual}, maximum = {maximum}")]
    FrameTooLarge {
        /// The advertised frame payload length.
        actual: u64,
        /// The configured limit.
        maximum: u64
    },

    /// The accumulated message payload exceeded the configured maximum.
    #[error("message too large: len >= {current}, maximum = {maximum}")]
    MessageTooLarge {
        /// The accumulated size so far.
        current: usize,
        /// The configured limit.
        maximum: usize
    },

    /// A text payload or close reason was not valid UTF-8.
    #[error("invalid utf-8 payload")]
    InvalidUtf8,

    /// The compression bit was set on a continuation or control frame.
    #[error("unexpected compression bit")]
    UnexpectedCompressionBit,

    /// A close frame carried a status code that must not appear on
    /// the wire.
    #[error("invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// [`Receiver::read`] was called although no frame has been
    /// prepared with [`Receiver::next_frame`].
    #[error("no frame has been prepared for reading")]
    NoFrameAdvance,

    /// A new message was started before the previous one was flushed.
    #[error("previous message has not been finished")]
    UnfinishedMessage,

    /// The close handshake with the remote has completed. Not a
    /// failure, but the terminal outcome of the connection.
    #[error("connection closed: code = {code}, reason = {reason:?}")]
    Closed {
        /// The close status code.
        code: StatusCode,
        /// The close reason, possibly empty.
        reason: String
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}
