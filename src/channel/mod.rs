//! Upgraded bidirectional channel subsystem.
//!
//! # Data Flow
//! ```text
//! GET with Upgrade: websocket
//!     → handshake.rs (version check, accept key, 101)
//!     → session.rs (one task per upgraded connection)
//!         reader: frame.rs → reassembler.rs → ticker::command
//!         writer: drains the session's outbound queue
//! ```
//!
//! # Design Decisions
//! - Frames come off tungstenite's frame layer one at a time, unjoined, so
//!   reassembly stays in the session and is bounded per session
//! - Each session's outbound queue is bounded; broadcasts to a full queue
//!   are dropped rather than buffered
//! - Every write for a session goes through one queue; replies and
//!   broadcasts never interleave mid-frame
//! - Reassembly state is owned by the session task and never shared

pub mod frame;
pub mod handshake;
pub mod reassembler;
pub mod session;

pub use frame::{CloseCode, CloseFrame, Frame, FrameCodec, FrameError, FrameReader};
pub use handshake::HandshakeError;
pub use reassembler::{Action, Reassembler};
pub use session::{run_session, Outbound, SessionId, SessionLimits};
