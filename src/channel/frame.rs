//! RFC 6455 frame codec.
//!
//! Header parsing and frame formatting come from tungstenite's frame layer,
//! wrapped in a `tokio_util` codec. On top of it sit the gateway's limits:
//! client frames must be masked, payloads are bounded, and close codes must
//! be ones a peer is allowed to send. Fragmented messages are NOT joined
//! here; that is the reassembler's job.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tungstenite::error::ProtocolError;
use tungstenite::protocol::frame::coding::{Control, Data, OpCode};
use tungstenite::protocol::frame::{self as wire, FrameHeader};

pub use tungstenite::protocol::frame::coding::CloseCode;

const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Close reasons are cut so the control payload stays within 125 bytes.
const MAX_CLOSE_REASON: usize = 123;

/// Payload of a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    pub reason: String,
}

/// One protocol unit of the upgraded channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text { payload: Bytes, fin: bool },
    Binary { payload: Bytes, fin: bool },
    Continuation { payload: Bytes, fin: bool },
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseFrame>),
}

impl Frame {
    /// A complete (final) text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text {
            payload: Bytes::from(text.into()),
            fin: true,
        }
    }

    /// A close frame carrying a status code and reason.
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Frame::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close(_))
    }

    fn into_wire(self) -> wire::Frame {
        match self {
            Frame::Text { payload, fin } => wire::Frame::message(payload, OpCode::Data(Data::Text), fin),
            Frame::Binary { payload, fin } => {
                wire::Frame::message(payload, OpCode::Data(Data::Binary), fin)
            }
            Frame::Continuation { payload, fin } => {
                wire::Frame::message(payload, OpCode::Data(Data::Continue), fin)
            }
            Frame::Ping(payload) => wire::Frame::ping(payload),
            Frame::Pong(payload) => wire::Frame::pong(payload),
            Frame::Close(close) => wire::Frame::close(close.map(|c| wire::CloseFrame {
                code: c.code,
                reason: truncate_reason(&c.reason).into(),
            })),
        }
    }

    /// Encode as a server-to-client (unmasked) frame.
    pub fn encode(&self) -> Bytes {
        self.encode_with_mask(None)
    }

    /// Encode as a client-to-server frame masked with `key`.
    pub fn encode_masked(&self, key: [u8; 4]) -> Bytes {
        self.encode_with_mask(Some(key))
    }

    fn encode_with_mask(&self, mask: Option<[u8; 4]>) -> Bytes {
        let mut frame = self.clone().into_wire();
        frame.header_mut().mask = mask;
        let mut out = Vec::with_capacity(frame.len());
        // Writing into a Vec cannot fail.
        let _ = frame.format(&mut out);
        Bytes::from(out)
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut cut = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }
    &reason[..cut]
}

/// Errors raised while decoding or encoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame codec error: {0}")]
    Codec(tungstenite::Error),

    #[error("client frame is not masked")]
    Unmasked,

    #[error("frame payload of {size} bytes exceeds limit of {limit}")]
    Oversized { size: u64, limit: usize },

    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,

    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u8),

    #[error("control frame must not be fragmented")]
    FragmentedControl,

    #[error("control frame payload exceeds 125 bytes")]
    ControlTooLarge,

    #[error("malformed close frame payload")]
    InvalidClose,

    #[error("close code {0} must not be sent by a peer")]
    ForbiddenCloseCode(u16),

    #[error("text payload is not valid UTF-8")]
    Utf8,

    #[error("binary messages are not supported")]
    UnsupportedData,
}

impl From<tungstenite::Error> for FrameError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(e) => FrameError::Io(e),
            tungstenite::Error::Protocol(ProtocolError::InvalidOpcode(op)) => FrameError::UnknownOpcode(op),
            other => FrameError::Codec(other),
        }
    }
}

impl FrameError {
    /// Close status to report to the peer for this failure.
    pub fn close_code(&self) -> CloseCode {
        match self {
            FrameError::Io(_) | FrameError::Codec(_) => CloseCode::Error,
            FrameError::Oversized { .. } => CloseCode::Size,
            FrameError::Utf8 => CloseCode::Invalid,
            FrameError::UnsupportedData => CloseCode::Unsupported,
            _ => CloseCode::Protocol,
        }
    }
}

/// Splits a byte stream into [`Frame`]s and formats frames back onto it.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload: usize,
    require_mask: bool,
}

impl FrameCodec {
    /// Codec for the server side; every inbound frame must be masked.
    pub fn server(max_payload: usize) -> Self {
        Self {
            max_payload,
            require_mask: true,
        }
    }

    /// Codec for the client side; inbound masking is optional.
    pub fn client(max_payload: usize) -> Self {
        Self {
            max_payload,
            require_mask: false,
        }
    }

    fn check(&self, header: &FrameHeader, len: u64) -> Result<(), FrameError> {
        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(FrameError::ReservedBits);
        }
        if let OpCode::Control(_) = header.opcode {
            if !header.is_final {
                return Err(FrameError::FragmentedControl);
            }
            if len > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlTooLarge);
            }
        }
        if len > self.max_payload as u64 {
            return Err(FrameError::Oversized {
                size: len,
                limit: self.max_payload,
            });
        }
        if self.require_mask && header.mask.is_none() {
            return Err(FrameError::Unmasked);
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let mut cursor = Cursor::new(&src[..]);
        let Some((header, len)) = FrameHeader::parse(&mut cursor)? else {
            return Ok(None);
        };
        let header_len = cursor.position() as usize;
        self.check(&header, len)?;

        // `check` bounds `len` by `max_payload`, so it fits in usize.
        let total = header_len + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(len as usize);
        if let Some(key) = header.mask {
            payload
                .iter_mut()
                .enumerate()
                .for_each(|(i, b)| *b ^= key[i & 3]);
        }
        into_frame(&header, payload.freeze()).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let frame = frame.into_wire();
        dst.reserve(frame.len());
        frame.format(&mut BufMut::writer(&mut *dst))?;
        Ok(())
    }
}

fn into_frame(header: &FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
    let fin = header.is_final;
    let frame = match header.opcode {
        OpCode::Data(Data::Continue) => Frame::Continuation { payload, fin },
        OpCode::Data(Data::Text) => Frame::Text { payload, fin },
        OpCode::Data(Data::Binary) => Frame::Binary { payload, fin },
        OpCode::Control(Control::Close) => Frame::Close(parse_close(&payload)?),
        OpCode::Control(Control::Ping) => Frame::Ping(payload),
        OpCode::Control(Control::Pong) => Frame::Pong(payload),
        OpCode::Data(Data::Reserved(op)) | OpCode::Control(Control::Reserved(op)) => {
            return Err(FrameError::UnknownOpcode(op))
        }
    };
    Ok(frame)
}

fn parse_close(payload: &[u8]) -> Result<Option<CloseFrame>, FrameError> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(FrameError::InvalidClose),
        _ => {
            let raw = u16::from_be_bytes([payload[0], payload[1]]);
            let code = CloseCode::from(raw);
            if !code.is_allowed() {
                return Err(FrameError::ForbiddenCloseCode(raw));
            }
            let reason = std::str::from_utf8(&payload[2..]).map_err(|_| FrameError::Utf8)?;
            Ok(Some(CloseFrame {
                code,
                reason: reason.to_string(),
            }))
        }
    }
}

/// Reads frames off a byte stream.
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reader for frames sent by a client; every frame must be masked.
    pub fn server(inner: R, max_payload: usize) -> Self {
        Self {
            inner: FramedRead::new(inner, FrameCodec::server(max_payload)),
        }
    }

    /// Reader for frames sent by a server; masking is optional.
    pub fn client(inner: R, max_payload: usize) -> Self {
        Self {
            inner: FramedRead::new(inner, FrameCodec::client(max_payload)),
        }
    }

    /// Read the next frame. Returns `Ok(None)` when the stream ends cleanly
    /// on a frame boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        self.inner.next().await.transpose()
    }
}

/// Sink of server-to-client frames; each `send` flushes.
pub type FrameWriter<W> = FramedWrite<W, FrameCodec>;

pub fn frame_writer<W: AsyncWrite>(inner: W, max_payload: usize) -> FrameWriter<W> {
    FramedWrite::new(inner, FrameCodec::server(max_payload))
}
