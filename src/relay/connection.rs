//! Duplexed message connection used by the relay.
//!
//! # Responsibilities
//! - Present one shape for every WebSocket flavour the gateway touches
//!   (axum server sockets, tungstenite client sockets, in-memory pairs)
//! - Separate data messages from closure and transport failures
//! - Split into a reader half and a writer half owned by different tasks
//!
//! # Design Decisions
//! - Ping/pong are answered by each endpoint locally and never surface here
//! - Closing a writer is idempotent and never reports an error
//! - Payloads are never inspected; text stays text, binary stays binary

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{future, stream, Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::WebSocketStream;

/// Close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code sent when an endpoint is going away (gateway shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code sent when the session could not be set up.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Which end of a session a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Client-facing connection accepted by the gateway.
    Downstream,
    /// Backend-facing connection dialed by the gateway.
    Upstream,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Downstream => "downstream",
            Side::Upstream => "upstream",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque data message. The type tag is preserved, the payload is not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Binary(bytes)
    }
}

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }
}

/// Unit exchanged with the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Message),
    Close(Option<CloseFrame>),
}

/// How a peer ended its side of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closure {
    /// Close code from the peer's close frame; `None` when the stream ended
    /// without one (abnormal closure).
    pub code: Option<u16>,
    pub reason: String,
}

impl Closure {
    /// Transport ended without a close handshake.
    pub fn abnormal() -> Self {
        Self {
            code: None,
            reason: String::new(),
        }
    }

    /// Peer closed normally or navigated away.
    pub fn is_expected(&self) -> bool {
        matches!(self.code, Some(CLOSE_NORMAL) | Some(CLOSE_GOING_AWAY))
    }
}

impl From<Option<CloseFrame>> for Closure {
    fn from(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => Self {
                code: Some(frame.code),
                reason: frame.reason,
            },
            // A close frame without a status is still a completed handshake.
            None => Self {
                code: Some(CLOSE_NORMAL),
                reason: String::new(),
            },
        }
    }
}

/// Transport-level failure on a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket protocol error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("connection closed by peer")]
    Disconnected,
}

/// Result of one `receive` call.
#[derive(Debug)]
pub enum Received {
    Message(Message),
    Closed(Closure),
    Failed(ConnectionError),
}

type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, ConnectionError>> + Send>>;
type FrameSink = Pin<Box<dyn Sink<Frame, Error = ConnectionError> + Send>>;

/// A duplexed message connection.
pub struct Connection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl Connection {
    /// Build a connection from any frame stream and frame sink.
    pub fn new<St, Si>(side: Side, inbound: St, outbound: Si) -> Self
    where
        St: Stream<Item = Result<Frame, ConnectionError>> + Send + 'static,
        Si: Sink<Frame, Error = ConnectionError> + Send + 'static,
    {
        Self {
            reader: ConnectionReader {
                side,
                inbound: Box::pin(inbound),
                finished: false,
            },
            writer: ConnectionWriter {
                side,
                outbound: Box::pin(outbound),
                closed: false,
            },
        }
    }

    /// Wrap a socket accepted through axum's upgrade.
    pub fn from_axum(side: Side, socket: axum::extract::ws::WebSocket) -> Self {
        use axum::extract::ws::{CloseFrame as AxumClose, Message as AxumMessage};

        let (outbound, inbound) = socket.split();

        let inbound = inbound.filter_map(|item| {
            future::ready(match item {
                Ok(AxumMessage::Text(text)) => {
                    Some(Ok(Frame::Message(Message::Text(text.as_str().to_owned()))))
                }
                Ok(AxumMessage::Binary(bytes)) => {
                    Some(Ok(Frame::Message(Message::Binary(bytes.to_vec()))))
                }
                Ok(AxumMessage::Close(frame)) => Some(Ok(Frame::Close(frame.map(|f| {
                    CloseFrame::new(f.code, f.reason.as_str())
                })))),
                Ok(AxumMessage::Ping(_)) | Ok(AxumMessage::Pong(_)) => None,
                Err(e) => Some(Err(ConnectionError::from(e))),
            })
        });

        let outbound = outbound
            .sink_map_err(ConnectionError::from)
            .with(|frame: Frame| {
                future::ready(Ok::<_, ConnectionError>(match frame {
                    Frame::Message(Message::Text(text)) => AxumMessage::Text(text.into()),
                    Frame::Message(Message::Binary(bytes)) => AxumMessage::Binary(bytes.into()),
                    Frame::Close(frame) => AxumMessage::Close(frame.map(|f| AxumClose {
                        code: f.code,
                        reason: f.reason.into(),
                    })),
                }))
            });

        Self::new(side, inbound, outbound)
    }

    /// Wrap a tungstenite client or server stream.
    pub fn from_tungstenite<S>(side: Side, socket: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        use tungstenite::protocol::frame::coding::CloseCode;
        use tungstenite::protocol::CloseFrame as WsClose;
        use tungstenite::Message as WsMessage;

        let (outbound, inbound) = socket.split();

        let inbound = inbound.filter_map(|item| {
            future::ready(match item {
                Ok(WsMessage::Text(text)) => {
                    Some(Ok(Frame::Message(Message::Text(text.as_str().to_owned()))))
                }
                Ok(WsMessage::Binary(bytes)) => {
                    Some(Ok(Frame::Message(Message::Binary(bytes.to_vec()))))
                }
                Ok(WsMessage::Close(frame)) => Some(Ok(Frame::Close(frame.map(|f| {
                    CloseFrame::new(u16::from(f.code), f.reason.as_str())
                })))),
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => None,
                // Reported after a completed close handshake.
                Err(tungstenite::Error::ConnectionClosed) => None,
                Err(e) => Some(Err(ConnectionError::from(e))),
            })
        });

        let outbound = outbound
            .sink_map_err(ConnectionError::from)
            .with(|frame: Frame| {
                future::ready(Ok::<_, ConnectionError>(match frame {
                    Frame::Message(Message::Text(text)) => WsMessage::Text(text.into()),
                    Frame::Message(Message::Binary(bytes)) => WsMessage::Binary(bytes.into()),
                    Frame::Close(frame) => WsMessage::Close(frame.map(|f| WsClose {
                        code: CloseCode::from(f.code),
                        reason: f.reason.into(),
                    })),
                }))
            });

        Self::new(side, inbound, outbound)
    }

    pub async fn receive(&mut self) -> Received {
        self.reader.receive().await
    }

    pub async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        self.writer.send(message).await
    }

    /// Send a close frame (best effort) and close the transport.
    pub async fn close_with(&mut self, frame: CloseFrame) {
        self.writer.close_with(frame).await
    }

    pub async fn close(&mut self) {
        self.writer.close().await
    }

    pub fn split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("side", &self.reader.side)
            .field("closed", &self.writer.closed)
            .finish()
    }
}

/// Read half of a [`Connection`].
pub struct ConnectionReader {
    side: Side,
    inbound: FrameStream,
    finished: bool,
}

impl ConnectionReader {
    /// Wait for the next data message, the peer's closure, or a failure.
    ///
    /// Once closure or failure has been reported, every later call reports
    /// an abnormal closure without touching the transport.
    pub async fn receive(&mut self) -> Received {
        if self.finished {
            return Received::Closed(Closure::abnormal());
        }

        let received = match self.inbound.next().await {
            Some(Ok(Frame::Message(message))) => return Received::Message(message),
            Some(Ok(Frame::Close(frame))) => Received::Closed(Closure::from(frame)),
            Some(Err(e)) => Received::Failed(e),
            None => Received::Closed(Closure::abnormal()),
        };
        self.finished = true;
        received
    }
}

/// Write half of a [`Connection`].
pub struct ConnectionWriter {
    side: Side,
    outbound: FrameSink,
    closed: bool,
}

impl ConnectionWriter {
    pub async fn send(&mut self, message: Message) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Disconnected);
        }
        let result = self.outbound.send(Frame::Message(message)).await;
        if result.is_err() {
            // A failed transport gets no close handshake.
            self.closed = true;
        }
        result
    }

    /// Send `frame` to the peer, then close. Errors are swallowed: the peer
    /// may already be gone.
    pub async fn close_with(&mut self, frame: CloseFrame) {
        if self.closed {
            return;
        }
        if let Err(e) = self.outbound.send(Frame::Close(Some(frame))).await {
            tracing::trace!(side = %self.side, error = %e, "Close frame not delivered");
        }
        self.close().await;
    }

    /// Close the transport. Safe to call any number of times.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.outbound.close().await {
            tracing::trace!(side = %self.side, error = %e, "Close after failure");
        }
    }
}

/// Handle driving the far end of an in-memory connection.
pub struct MemoryPeer {
    to_connection: Option<mpsc::UnboundedSender<Result<Frame, ConnectionError>>>,
    from_connection: Option<mpsc::UnboundedReceiver<Frame>>,
}

impl MemoryPeer {
    /// Deliver a data message to the connection.
    pub fn send(&self, message: impl Into<Message>) -> bool {
        self.push(Ok(Frame::Message(message.into())))
    }

    /// Deliver a close frame to the connection.
    pub fn close(&self, frame: Option<CloseFrame>) -> bool {
        self.push(Ok(Frame::Close(frame)))
    }

    /// Make the connection's next read fail.
    pub fn fail(&self, error: ConnectionError) -> bool {
        self.push(Err(error))
    }

    /// End the inbound stream without a close frame.
    pub fn hang_up(&mut self) {
        self.to_connection = None;
    }

    /// Stop accepting frames; the connection's next write fails.
    pub fn stop_reading(&mut self) {
        self.from_connection = None;
    }

    /// Next frame written by the connection; `None` once its writer is closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        match self.from_connection.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn push(&self, item: Result<Frame, ConnectionError>) -> bool {
        match &self.to_connection {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

impl Sink<Frame> for MemorySink {
    type Error = ConnectionError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(match &self.tx {
            Some(tx) if !tx.is_closed() => Ok(()),
            _ => Err(ConnectionError::Disconnected),
        })
    }

    fn start_send(self: Pin<&mut Self>, frame: Frame) -> Result<(), Self::Error> {
        match &self.tx {
            Some(tx) => tx.send(frame).map_err(|_| ConnectionError::Disconnected),
            None => Err(ConnectionError::Disconnected),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.tx = None;
        Poll::Ready(Ok(()))
    }
}

/// Create an in-memory connection and the handle driving its far end.
pub fn duplex(side: Side) -> (Connection, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<Frame, ConnectionError>>();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Frame>();

    let inbound = stream::unfold(in_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let connection = Connection::new(side, inbound, MemorySink { tx: Some(out_tx) });
    let peer = MemoryPeer {
        to_connection: Some(in_tx),
        from_connection: Some(out_rx),
    };
    (connection, peer)
}
