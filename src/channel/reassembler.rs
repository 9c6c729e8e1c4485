//! Message fragment reassembly.
//!
//! ```text
//!            Text(fin=false)              Continuation(fin=false)
//!   IDLE ────────────────────▶ ACCUMULATING ◀──────┐
//!    ▲  │                         │    └───────────┘
//!    │  └─ Text(fin=true) → emit  │
//!    └──── Continuation(fin=true) → emit concatenation
//! ```
//!
//! Control frames never touch the buffer, except Close, which drops it.

use bytes::{Bytes, BytesMut};

use crate::channel::frame::{CloseFrame, Frame, FrameError};

/// What the session should do after a frame has been absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A complete logical message is ready for the command processor.
    Message(String),
    /// Reply with a pong carrying this payload.
    Pong(Bytes),
    /// Peer started the close handshake.
    Close(Option<CloseFrame>),
    /// Nothing to do.
    None,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Accumulating(BytesMut),
}

/// Turns a frame sequence into complete text messages.
#[derive(Debug)]
pub struct Reassembler {
    state: State,
    max_message_size: usize,
}

impl Reassembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            state: State::Idle,
            max_message_size,
        }
    }

    /// Is a fragmented message in progress?
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating(_))
    }

    /// Feed one frame through the state machine.
    pub fn push(&mut self, frame: Frame) -> Result<Action, FrameError> {
        match frame {
            Frame::Text { payload, fin } => {
                if self.is_accumulating() {
                    tracing::warn!("Text frame interrupted a fragmented message, discarding partial buffer");
                }
                if fin {
                    self.state = State::Idle;
                    return into_message(payload.to_vec());
                }
                self.check_size(payload.len())?;
                self.state = State::Accumulating(BytesMut::from(&payload[..]));
                Ok(Action::None)
            }
            Frame::Continuation { payload, fin } => {
                let State::Accumulating(buffer) = &mut self.state else {
                    tracing::warn!("Continuation frame received without initial frame");
                    return Ok(Action::None);
                };
                let total = buffer.len() + payload.len();
                if total > self.max_message_size {
                    self.state = State::Idle;
                    return Err(FrameError::Oversized {
                        size: total as u64,
                        limit: self.max_message_size,
                    });
                }
                buffer.extend_from_slice(&payload);
                if !fin {
                    return Ok(Action::None);
                }
                match std::mem::take(&mut self.state) {
                    State::Accumulating(buffer) => into_message(buffer.to_vec()),
                    State::Idle => Ok(Action::None),
                }
            }
            Frame::Ping(payload) => Ok(Action::Pong(payload)),
            Frame::Pong(_) => {
                tracing::debug!("Pong frame received");
                Ok(Action::None)
            }
            Frame::Close(close) => {
                if let State::Accumulating(buffer) = std::mem::take(&mut self.state) {
                    tracing::debug!(
                        buffered_bytes = buffer.len(),
                        "Close received mid-message, discarding partial buffer"
                    );
                }
                Ok(Action::Close(close))
            }
            Frame::Binary { .. } => {
                self.state = State::Idle;
                Err(FrameError::UnsupportedData)
            }
        }
    }

    fn check_size(&self, len: usize) -> Result<(), FrameError> {
        if len > self.max_message_size {
            return Err(FrameError::Oversized {
                size: len as u64,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }
}

fn into_message(bytes: Vec<u8>) -> Result<Action, FrameError> {
    String::from_utf8(bytes)
        .map(Action::Message)
        .map_err(|_| FrameError::Utf8)
}
