//! Upgraded session lifecycle.
//!
//! # Responsibilities
//! - Assign a unique session ID
//! - Register the session's outbound handle with the subscription registry
//! - Read frames, reassemble messages, dispatch commands
//! - Serialize all writes (replies, pongs, broadcasts) through one writer task
//! - Unregister on close or error

use futures_util::SinkExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::channel::frame::{frame_writer, CloseFrame, Frame, FrameError, FrameReader};
use crate::channel::reassembler::{Action, Reassembler};
use crate::config::WebSocketConfig;
use crate::observability::metrics;
use crate::ticker::command::process_message;
use crate::ticker::registry::SubscriptionRegistry;

/// Relaxed ordering is sufficient since we only need uniqueness.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an upgraded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Writable handle to a session; frames are written in send order.
pub type Outbound = mpsc::Sender<Frame>;

/// Per-session bounds taken from the channel configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_frame_size: usize,
    pub outbound_queue: usize,
}

impl From<&WebSocketConfig> for SessionLimits {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            max_frame_size: config.max_frame_size,
            outbound_queue: config.outbound_queue,
        }
    }
}

/// Why the read side stopped.
#[derive(Debug)]
enum Ending {
    PeerClosed(Option<CloseFrame>),
    Eof,
    Failed(FrameError),
}

/// Drive one upgraded connection to completion.
pub async fn run_session<S>(io: S, registry: Arc<SubscriptionRegistry>, limits: SessionLimits)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = SessionId::new();
    let (read_half, write_half) = tokio::io::split(io);
    let (tx, rx) = mpsc::channel(limits.outbound_queue);

    registry.register(id, tx.clone());
    metrics::session_opened();
    tracing::info!(session_id = %id, "Session upgraded");

    let writer = tokio::spawn(write_loop(id, write_half, rx, limits.max_frame_size));

    let mut reader = FrameReader::server(read_half, limits.max_frame_size);
    let ending = read_loop(id, &mut reader, &tx, &registry, limits.max_frame_size).await;

    registry.unregister(id);
    let farewell = match ending {
        Ending::PeerClosed(close) => {
            tracing::info!(
                session_id = %id,
                code = close.as_ref().map(|c| u16::from(c.code)),
                "Peer closed session"
            );
            // Echo the peer's status to finish the close handshake.
            Some(Frame::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: String::new(),
            })))
        }
        Ending::Eof => {
            tracing::info!(session_id = %id, "Session ended without close frame");
            None
        }
        Ending::Failed(FrameError::Io(e)) => {
            tracing::info!(session_id = %id, error = %e, "Session transport error");
            None
        }
        Ending::Failed(e) => {
            tracing::warn!(session_id = %id, error = %e, "Protocol violation, closing session");
            Some(Frame::close(e.close_code(), e.to_string()))
        }
    };
    if let Some(frame) = farewell {
        let _ = tx.send(frame).await;
    }
    drop(tx);

    if let Err(e) = writer.await {
        tracing::error!(session_id = %id, error = %e, "Session writer task failed");
    }
    metrics::session_closed();
}

async fn read_loop<R>(
    id: SessionId,
    reader: &mut FrameReader<R>,
    tx: &Outbound,
    registry: &SubscriptionRegistry,
    max_message_size: usize,
) -> Ending
where
    R: AsyncRead + Unpin,
{
    let mut reassembler = Reassembler::new(max_message_size);

    loop {
        let frame = match reader.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ending::Eof,
            Err(e) => return Ending::Failed(e),
        };
        tracing::trace!(session_id = %id, frame = ?frame, "Frame received");

        // Replies wait for queue space, so a peer that stops reading also
        // stops being read.
        let reply = match reassembler.push(frame) {
            Ok(Action::Message(text)) => {
                Frame::text(process_message(registry, id, &text).to_json())
            }
            Ok(Action::Pong(payload)) => Frame::Pong(payload),
            Ok(Action::Close(close)) => return Ending::PeerClosed(close),
            Ok(Action::None) => continue,
            Err(e) => return Ending::Failed(e),
        };
        if tx.send(reply).await.is_err() {
            return Ending::Eof;
        }
    }
}

async fn write_loop<W>(id: SessionId, writer: W, mut rx: mpsc::Receiver<Frame>, max_payload: usize)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = frame_writer(writer, max_payload);
    while let Some(frame) = rx.recv().await {
        let closing = frame.is_close();
        if let Err(e) = writer.send(frame).await {
            tracing::debug!(session_id = %id, error = %e, "Session write failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = writer.close().await;
    tracing::debug!(session_id = %id, "Session writer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::frame::CloseCode;
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    const KEY: [u8; 4] = [1, 2, 3, 4];

    const LIMITS: SessionLimits = SessionLimits {
        max_frame_size: 4096,
        outbound_queue: 16,
    };

    async fn send(client: &mut DuplexStream, frame: Frame) {
        client.write_all(&frame.encode_masked(KEY)).await.unwrap();
    }

    async fn recv(reader: &mut FrameReader<tokio::io::ReadHalf<DuplexStream>>) -> Frame {
        tokio::time::timeout(std::time::Duration::from_secs(2), reader.read_frame())
            .await
            .expect("timed out waiting for frame")
            .unwrap()
            .expect("stream ended")
    }

    fn spawn_session() -> (
        Arc<SubscriptionRegistry>,
        tokio::io::WriteHalf<DuplexStream>,
        FrameReader<tokio::io::ReadHalf<DuplexStream>>,
        tokio::task::JoinHandle<()>,
    ) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (client, server) = duplex(64 * 1024);
        let handle = tokio::spawn(run_session(server, registry.clone(), LIMITS));
        let (read, write) = tokio::io::split(client);
        (registry, write, FrameReader::client(read, 4096), handle)
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("session-"));
    }

    #[test]
    fn limits_follow_channel_config() {
        let limits = SessionLimits::from(&WebSocketConfig::default());
        assert_eq!(limits.max_frame_size, 65536);
        assert_eq!(limits.outbound_queue, 100);
    }

    #[tokio::test]
    async fn fragmented_command_gets_one_reply() {
        let (registry, mut write, mut read, handle) = spawn_session();

        let mut wire = Frame::Text {
            payload: Bytes::from_static(br#"{"command":"add","#),
            fin: false,
        }
        .encode_masked(KEY)
        .to_vec();
        wire.extend_from_slice(
            &Frame::Continuation {
                payload: Bytes::from_static(br#""tickerSymbol":"XYZ"}"#),
                fin: true,
            }
            .encode_masked(KEY),
        );
        write.write_all(&wire).await.unwrap();

        assert_eq!(recv(&mut read).await, Frame::text(r#"{"result":"success"}"#));
        assert_eq!(registry.session_count(), 1);

        let frame = Frame::close(CloseCode::Normal, "bye").encode_masked(KEY);
        write.write_all(&frame).await.unwrap();
        assert_eq!(
            recv(&mut read).await,
            Frame::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: String::new()
            }))
        );
        handle.await.unwrap();
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn reserved_close_code_is_answered_with_protocol_error() {
        let (registry, mut write, mut read, handle) = spawn_session();

        // Close with 1005, which may only be reported locally, never sent.
        let wire = [0x88, 0x82, 0, 0, 0, 0, 0x03, 0xED];
        write.write_all(&wire).await.unwrap();

        match recv(&mut read).await {
            Frame::Close(Some(close)) => assert_eq!(close.code, CloseCode::Protocol),
            other => panic!("expected close, got {other:?}"),
        }
        handle.await.unwrap();
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn ping_is_answered_with_identical_pong() {
        let (_registry, mut write, mut read, _handle) = spawn_session();
        let ping = Frame::Ping(Bytes::from_static(b"are-you-there"));
        write.write_all(&ping.encode_masked(KEY)).await.unwrap();
        assert_eq!(
            recv(&mut read).await,
            Frame::Pong(Bytes::from_static(b"are-you-there"))
        );
    }

    #[tokio::test]
    async fn binary_frames_close_with_unsupported_data() {
        let (registry, mut write, mut read, handle) = spawn_session();
        let binary = Frame::Binary {
            payload: Bytes::from_static(b"\x01\x02"),
            fin: true,
        };
        write.write_all(&binary.encode_masked(KEY)).await.unwrap();

        match recv(&mut read).await {
            Frame::Close(Some(close)) => assert_eq!(close.code, CloseCode::Unsupported),
            other => panic!("expected close, got {other:?}"),
        }
        handle.await.unwrap();
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn eof_unregisters_session() {
        let (registry, write, read, handle) = spawn_session();
        drop(write);
        drop(read);
        handle.await.unwrap();
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn unmasked_frames_are_protocol_errors() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (mut client, server) = duplex(4096);
        let handle = tokio::spawn(run_session(server, registry, LIMITS));

        client.write_all(&Frame::text("hi").encode()).await.unwrap();
        let mut reader = FrameReader::client(&mut client, 4096);
        match reader.read_frame().await.unwrap() {
            Some(Frame::Close(Some(close))) => assert_eq!(close.code, CloseCode::Protocol),
            other => panic!("expected close, got {other:?}"),
        }
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unrecognized_command_gets_failure_reply() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (mut client, server) = duplex(4096);
        let _handle = tokio::spawn(run_session(server, registry.clone(), LIMITS));

        send(&mut client, Frame::text(r#"{"command":"bogus"}"#)).await;
        let mut reader = FrameReader::client(&mut client, 4096);
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Frame::text(r#"{"result":"Failed. Command not recognized."}"#))
        );
    }
}
