//! Relay session: dial upstream, forward both directions, tear down.
//!
//! # Data Flow
//! ```text
//!                 ┌──────────── to_upstream task ────────────┐
//! downstream.read ┘                                          └ upstream.write
//! downstream.write ┐                                         ┌ upstream.read
//!                  └─────────── to_downstream task ──────────┘
//!
//! coordinator: select!(to_upstream, to_downstream, gateway shutdown)
//!              → halt the other task → close both connections
//! ```
//!
//! Each task owns the read half of one connection and the write half of the
//! other, so no half is ever shared. The first task to finish decides how
//! the session ends:
//! - source closed or unreadable: normal close sent on the other connection
//! - write failed: failing connection dropped, healthy one closed
//! - gateway shutdown: going-away close sent on both

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinError;
use url::Url;

use crate::lifecycle::Shutdown;
use crate::relay::connection::{
    CloseFrame, Closure, Connection, ConnectionError, ConnectionReader, ConnectionWriter, Received,
    Side, CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR,
};
use crate::relay::dialer::Dialer;
use crate::relay::registry::{SessionId, SessionRegistry, SessionSlot, SessionState};

/// One-way forwarding channel within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DownstreamToUpstream,
    UpstreamToDownstream,
}

impl Direction {
    pub fn source(&self) -> Side {
        match self {
            Direction::DownstreamToUpstream => Side::Downstream,
            Direction::UpstreamToDownstream => Side::Upstream,
        }
    }

    pub fn destination(&self) -> Side {
        match self {
            Direction::DownstreamToUpstream => Side::Upstream,
            Direction::UpstreamToDownstream => Side::Downstream,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::DownstreamToUpstream => "to_upstream",
            Direction::UpstreamToDownstream => "to_downstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a forwarding task stopped.
#[derive(Debug)]
pub enum DirectionEnd {
    /// The source peer closed (cleanly or not).
    SourceClosed(Closure),
    /// Reading from the source failed.
    ReadFailed(ConnectionError),
    /// Writing to the destination failed.
    WriteFailed(ConnectionError),
    /// The coordinator stopped the task.
    Halted,
}

/// How a whole session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    DialFailed(String),
    PeerClosed { side: Side, closure: Closure },
    ReadFailed { side: Side, error: String },
    WriteFailed { side: Side, error: String },
    Shutdown,
    /// A forwarding task panicked; its halves were dropped.
    Aborted,
}

impl SessionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEnd::DialFailed(_) => "dial_failed",
            SessionEnd::PeerClosed { .. } => "peer_closed",
            SessionEnd::ReadFailed { .. } => "read_failed",
            SessionEnd::WriteFailed { .. } => "write_failed",
            SessionEnd::Shutdown => "shutdown",
            SessionEnd::Aborted => "aborted",
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: SessionId,
    pub end: SessionEnd,
    pub to_upstream: u64,
    pub to_downstream: u64,
    pub duration: Duration,
}

/// Relay behaviour knobs.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Upper bound on sending a close frame and closing one connection.
    pub close_grace: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_secs(2),
        }
    }
}

/// Runs relay sessions between accepted downstream connections and upstream.
pub struct Relay<D> {
    dialer: D,
    registry: SessionRegistry,
    shutdown: Shutdown,
    settings: RelaySettings,
}

impl<D: Dialer> Relay<D> {
    pub fn new(dialer: D, registry: SessionRegistry, shutdown: Shutdown, settings: RelaySettings) -> Self {
        Self {
            dialer,
            registry,
            shutdown,
            settings,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Relay `downstream` to `target` until either side ends, then close both.
    ///
    /// `slot` is the reservation taken (usually before the protocol upgrade)
    /// from this relay's registry.
    pub async fn run(&self, slot: SessionSlot, mut downstream: Connection, target: &Url) -> SessionReport {
        let started = Instant::now();
        let guard = self.registry.register(slot, target.as_str());
        let id = guard.id();
        let mut shutdown = self.shutdown.subscribe();

        tracing::debug!(session_id = %id, target = %target, "Dialing upstream");

        // Subscribed first, so a trigger is either seen here or delivered later.
        let dialed = if self.shutdown.is_triggered() {
            None
        } else {
            tokio::select! {
                dialed = self.dialer.dial(target) => Some(dialed),
                _ = shutdown.recv() => None,
            }
        };

        let upstream = match dialed {
            Some(Ok(upstream)) => upstream,
            Some(Err(e)) => {
                tracing::warn!(session_id = %id, target = %target, error = %e, "Upstream dial failed");
                metrics::counter!("gateway_relay_dial_failures_total").increment(1);
                self.close_within(downstream.close_with(CloseFrame::new(
                    CLOSE_INTERNAL_ERROR,
                    "upstream unavailable",
                )))
                .await;
                guard.set_state(SessionState::Closed);
                return self.finish(id, SessionEnd::DialFailed(e.to_string()), 0, 0, started);
            }
            None => {
                self.close_within(downstream.close_with(CloseFrame::new(
                    CLOSE_GOING_AWAY,
                    "gateway shutting down",
                )))
                .await;
                guard.set_state(SessionState::Closed);
                return self.finish(id, SessionEnd::Shutdown, 0, 0, started);
            }
        };

        guard.set_state(SessionState::Forwarding);
        tracing::info!(session_id = %id, target = %target, "Relay session started");

        let (down_reader, down_writer) = downstream.split();
        let (up_reader, up_writer) = upstream.split();

        let halt = Shutdown::new();
        let mut to_upstream = tokio::spawn(forward(
            id,
            Direction::DownstreamToUpstream,
            down_reader,
            up_writer,
            halt.subscribe(),
        ));
        let mut to_downstream = tokio::spawn(forward(
            id,
            Direction::UpstreamToDownstream,
            up_reader,
            down_writer,
            halt.subscribe(),
        ));

        let first = tokio::select! {
            joined = &mut to_upstream => First::ToUpstream(joined),
            joined = &mut to_downstream => First::ToDownstream(joined),
            _ = shutdown.recv() => First::Shutdown,
        };

        guard.set_state(SessionState::Draining);
        halt.trigger();

        let (trigger, up_joined, down_joined) = match first {
            First::ToUpstream(joined) => {
                (Some(Direction::DownstreamToUpstream), joined, to_downstream.await)
            }
            First::ToDownstream(joined) => {
                (Some(Direction::UpstreamToDownstream), to_upstream.await, joined)
            }
            First::Shutdown => (None, to_upstream.await, to_downstream.await),
        };
        let up_leg = collect(id, Direction::DownstreamToUpstream, up_joined);
        let down_leg = collect(id, Direction::UpstreamToDownstream, down_joined);

        let forwarded_up = up_leg.as_ref().map_or(0, |leg| leg.forwarded);
        let forwarded_down = down_leg.as_ref().map_or(0, |leg| leg.forwarded);

        let end = match (trigger, up_leg, down_leg) {
            (Some(first), Some(up), Some(down)) => {
                let (first_leg, other_leg) = match first {
                    Direction::DownstreamToUpstream => (up, down),
                    Direction::UpstreamToDownstream => (down, up),
                };
                self.teardown(id, first_leg, other_leg).await
            }
            (None, Some(up), Some(down)) => {
                let mut up = up;
                let mut down = down;
                tracing::info!(session_id = %id, "Closing relay session for shutdown");
                let going_away = || CloseFrame::new(CLOSE_GOING_AWAY, "gateway shutting down");
                tokio::join!(
                    self.close_within(up.writer.close_with(going_away())),
                    self.close_within(down.writer.close_with(going_away())),
                );
                SessionEnd::Shutdown
            }
            (_, up, down) => {
                // A task panicked and took its halves with it; close what is left.
                for leg in [up, down].into_iter().flatten() {
                    let mut leg = leg;
                    self.close_within(leg.writer.close()).await;
                }
                SessionEnd::Aborted
            }
        };

        guard.set_state(SessionState::Closed);
        drop(guard);
        self.finish(id, end, forwarded_up, forwarded_down, started)
    }

    async fn teardown(&self, id: SessionId, first: Leg, other: Leg) -> SessionEnd {
        let Leg {
            direction,
            writer: mut first_writer,
            end,
            ..
        } = first;
        let mut other_writer = other.writer;

        if !matches!(other.end, DirectionEnd::Halted) {
            log_direction_end(id, other.direction, &other.end);
        }

        match end {
            DirectionEnd::SourceClosed(closure) => {
                log_closure(id, direction.source(), &closure);
                // The destination is still open: tell it the session is over.
                tokio::join!(
                    self.close_within(first_writer.close_with(CloseFrame::normal())),
                    self.close_within(other_writer.close()),
                );
                SessionEnd::PeerClosed {
                    side: direction.source(),
                    closure,
                }
            }
            DirectionEnd::ReadFailed(error) => {
                tracing::warn!(
                    session_id = %id,
                    side = %direction.source(),
                    error = %error,
                    "Read failed; closing session"
                );
                tokio::join!(
                    self.close_within(first_writer.close_with(CloseFrame::normal())),
                    self.close_within(other_writer.close()),
                );
                SessionEnd::ReadFailed {
                    side: direction.source(),
                    error: error.to_string(),
                }
            }
            DirectionEnd::WriteFailed(error) => {
                tracing::warn!(
                    session_id = %id,
                    side = %direction.destination(),
                    error = %error,
                    "Write failed; terminating session"
                );
                // No close handshake towards the failed side: drop it.
                drop(first_writer);
                self.close_within(other_writer.close()).await;
                SessionEnd::WriteFailed {
                    side: direction.destination(),
                    error: error.to_string(),
                }
            }
            DirectionEnd::Halted => {
                tokio::join!(
                    self.close_within(first_writer.close()),
                    self.close_within(other_writer.close()),
                );
                SessionEnd::Shutdown
            }
        }
    }

    async fn close_within<F>(&self, close: F)
    where
        F: std::future::Future<Output = ()>,
    {
        if tokio::time::timeout(self.settings.close_grace, close).await.is_err() {
            tracing::debug!(grace = ?self.settings.close_grace, "Close did not finish in time; dropping connection");
        }
    }

    fn finish(
        &self,
        id: SessionId,
        end: SessionEnd,
        to_upstream: u64,
        to_downstream: u64,
        started: Instant,
    ) -> SessionReport {
        let duration = started.elapsed();
        metrics::counter!("gateway_relay_sessions_total", "outcome" => end.as_str()).increment(1);
        tracing::info!(
            session_id = %id,
            outcome = end.as_str(),
            to_upstream,
            to_downstream,
            duration_ms = duration.as_millis() as u64,
            "Relay session closed"
        );
        SessionReport {
            id,
            end,
            to_upstream,
            to_downstream,
            duration,
        }
    }
}

impl<D> fmt::Debug for Relay<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("active_sessions", &self.registry.active_count())
            .field("settings", &self.settings)
            .finish()
    }
}

/// First event observed by the coordinator.
enum First {
    ToUpstream(Result<Leg, JoinError>),
    ToDownstream(Result<Leg, JoinError>),
    Shutdown,
}

/// A finished forwarding task and the halves it owned.
struct Leg {
    direction: Direction,
    // Held so the source is only released once teardown is done.
    _reader: ConnectionReader,
    writer: ConnectionWriter,
    forwarded: u64,
    end: DirectionEnd,
}

/// Forward messages from `reader` to `writer`, one at a time, in order.
async fn forward(
    id: SessionId,
    direction: Direction,
    mut reader: ConnectionReader,
    mut writer: ConnectionWriter,
    mut halt: broadcast::Receiver<()>,
) -> Leg {
    let mut forwarded = 0u64;

    let end = loop {
        let received = tokio::select! {
            biased;
            _ = halt.recv() => break DirectionEnd::Halted,
            received = reader.receive() => received,
        };

        let message = match received {
            Received::Message(message) => message,
            Received::Closed(closure) => break DirectionEnd::SourceClosed(closure),
            Received::Failed(error) => break DirectionEnd::ReadFailed(error),
        };

        tokio::select! {
            biased;
            _ = halt.recv() => break DirectionEnd::Halted,
            sent = writer.send(message) => {
                if let Err(error) = sent {
                    break DirectionEnd::WriteFailed(error);
                }
            }
        }

        forwarded += 1;
        metrics::counter!("gateway_relay_messages_total", "direction" => direction.as_str()).increment(1);
        tracing::trace!(session_id = %id, direction = %direction, forwarded, "Message forwarded");
    };

    Leg {
        direction,
        _reader: reader,
        writer,
        forwarded,
        end,
    }
}

fn collect(id: SessionId, direction: Direction, joined: Result<Leg, JoinError>) -> Option<Leg> {
    match joined {
        Ok(leg) => Some(leg),
        Err(e) => {
            tracing::error!(session_id = %id, direction = %direction, error = %e, "Forwarding task failed");
            None
        }
    }
}

fn log_closure(id: SessionId, side: Side, closure: &Closure) {
    if closure.is_expected() {
        tracing::debug!(session_id = %id, side = %side, code = ?closure.code, "Peer closed");
    } else {
        tracing::info!(
            session_id = %id,
            side = %side,
            code = ?closure.code,
            reason = %closure.reason,
            "Peer closed unexpectedly"
        );
    }
}

fn log_direction_end(id: SessionId, direction: Direction, end: &DirectionEnd) {
    match end {
        DirectionEnd::SourceClosed(closure) => log_closure(id, direction.source(), closure),
        DirectionEnd::ReadFailed(error) => {
            tracing::warn!(session_id = %id, side = %direction.source(), error = %error, "Read failed")
        }
        DirectionEnd::WriteFailed(error) => {
            tracing::warn!(session_id = %id, side = %direction.destination(), error = %error, "Write failed")
        }
        DirectionEnd::Halted => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::relay::connection::{duplex, Frame, Message, MemoryPeer, CLOSE_NORMAL};
    use crate::relay::dialer::StaticDialer;

    fn target() -> Url {
        Url::parse("ws://localhost:8000/ws/chat").unwrap()
    }

    fn relay_with(upstream: Vec<Connection>) -> (Relay<StaticDialer>, Shutdown) {
        let shutdown = Shutdown::new();
        let relay = Relay::new(
            StaticDialer::new(upstream),
            SessionRegistry::new(16),
            shutdown.clone(),
            RelaySettings {
                close_grace: Duration::from_millis(200),
            },
        );
        (relay, shutdown)
    }

    fn spawn_session(
        relay: Arc<Relay<StaticDialer>>,
        downstream: Connection,
    ) -> tokio::task::JoinHandle<SessionReport> {
        let slot = relay.registry().try_reserve().unwrap();
        tokio::spawn(async move { relay.run(slot, downstream, &target()).await })
    }

    async fn expect_message(peer: &mut MemoryPeer, text: &str) {
        assert_eq!(peer.recv().await, Some(Frame::Message(Message::Text(text.into()))));
    }

    #[tokio::test]
    async fn downstream_clean_close_forwards_in_order_then_closes_upstream() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, mut up_peer) = duplex(Side::Upstream);
        let (relay, _shutdown) = relay_with(vec![up]);
        let relay = Arc::new(relay);

        down_peer.send("A");
        down_peer.send("B");
        down_peer.close(Some(CloseFrame::normal()));

        let report = spawn_session(relay.clone(), down).await.unwrap();

        expect_message(&mut up_peer, "A").await;
        expect_message(&mut up_peer, "B").await;
        assert_eq!(up_peer.recv().await, Some(Frame::Close(Some(CloseFrame::normal()))));
        assert_eq!(up_peer.recv().await, None, "upstream should be closed");
        assert_eq!(down_peer.recv().await, None, "downstream should be closed");

        assert_eq!(report.to_upstream, 2);
        assert_eq!(report.to_downstream, 0);
        assert!(matches!(
            report.end,
            SessionEnd::PeerClosed { side: Side::Downstream, ref closure } if closure.is_expected()
        ));
        assert_eq!(relay.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn upstream_messages_reach_downstream_in_order() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, up_peer) = duplex(Side::Upstream);
        let (relay, _shutdown) = relay_with(vec![up]);

        let handle = spawn_session(Arc::new(relay), down);

        for i in 0..50 {
            up_peer.send(format!("chunk-{}", i));
        }
        up_peer.send(vec![0u8, 159, 146, 150]);
        up_peer.close(Some(CloseFrame::normal()));

        for i in 0..50 {
            expect_message(&mut down_peer, &format!("chunk-{}", i)).await;
        }
        assert_eq!(
            down_peer.recv().await,
            Some(Frame::Message(Message::Binary(vec![0, 159, 146, 150])))
        );
        assert_eq!(down_peer.recv().await, Some(Frame::Close(Some(CloseFrame::normal()))));
        assert_eq!(down_peer.recv().await, None);

        let report = handle.await.unwrap();
        assert_eq!(report.to_downstream, 51);
        assert!(matches!(report.end, SessionEnd::PeerClosed { side: Side::Upstream, .. }));
    }

    /// Log sink for asserting on emitted records.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8_lossy(&bytes).lines().map(str::to_owned).collect()
        }
    }

    #[tokio::test]
    async fn dial_failure_closes_downstream_without_forwarding() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let (down, mut down_peer) = duplex(Side::Downstream);
        let (relay, _shutdown) = relay_with(Vec::new());

        down_peer.send("never forwarded");
        // Run inline so every record lands on this thread's subscriber.
        let slot = relay.registry().try_reserve().unwrap();
        let report = relay.run(slot, down, &target()).await;

        match down_peer.recv().await {
            Some(Frame::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_INTERNAL_ERROR),
            other => panic!("expected close frame, got {:?}", other),
        }
        assert_eq!(down_peer.recv().await, None);
        assert!(matches!(report.end, SessionEnd::DialFailed(_)));
        assert_eq!(report.to_upstream + report.to_downstream, 0);
        assert_eq!(relay.registry().active_count(), 0);

        let diagnostics: Vec<String> = logs
            .lines()
            .into_iter()
            .filter(|line| line.contains(" WARN ") || line.contains(" ERROR "))
            .collect();
        assert_eq!(diagnostics.len(), 1, "expected one diagnostic, got {:?}", diagnostics);
        assert!(diagnostics[0].contains("Upstream dial failed"));
        assert!(diagnostics[0].contains("ws://localhost:8000/ws/chat"));
    }

    #[tokio::test]
    async fn abnormal_downstream_disconnect_sends_normal_close_upstream() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, mut up_peer) = duplex(Side::Upstream);
        let (relay, _shutdown) = relay_with(vec![up]);

        let handle = spawn_session(Arc::new(relay), down);

        down_peer.send("partial");
        expect_message(&mut up_peer, "partial").await;
        down_peer.hang_up();

        match up_peer.recv().await {
            Some(Frame::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_NORMAL),
            other => panic!("expected normal close, got {:?}", other),
        }
        assert_eq!(up_peer.recv().await, None);

        // Upstream traffic after teardown goes nowhere.
        up_peer.send("too late");
        assert_eq!(down_peer.recv().await, None);

        let report = handle.await.unwrap();
        assert!(matches!(
            report.end,
            SessionEnd::PeerClosed { side: Side::Downstream, ref closure } if !closure.is_expected()
        ));
    }

    #[tokio::test]
    async fn upstream_write_failure_closes_both_sides() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, mut up_peer) = duplex(Side::Upstream);
        let (relay, _shutdown) = relay_with(vec![up]);

        up_peer.stop_reading();
        let handle = spawn_session(Arc::new(relay), down);
        down_peer.send("doomed");

        let report = handle.await.unwrap();
        assert!(matches!(report.end, SessionEnd::WriteFailed { side: Side::Upstream, .. }));
        assert_eq!(report.to_upstream, 0);

        // Healthy side closed without a normal-closure frame.
        assert_eq!(down_peer.recv().await, None);
        assert!(!down_peer.send("ignored"));
    }

    #[tokio::test]
    async fn upstream_read_failure_closes_downstream_normally() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, up_peer) = duplex(Side::Upstream);
        let (relay, _shutdown) = relay_with(vec![up]);

        let handle = spawn_session(Arc::new(relay), down);
        up_peer.fail(ConnectionError::Disconnected);

        assert_eq!(down_peer.recv().await, Some(Frame::Close(Some(CloseFrame::normal()))));
        let report = handle.await.unwrap();
        assert!(matches!(report.end, SessionEnd::ReadFailed { side: Side::Upstream, .. }));
    }

    #[tokio::test]
    async fn shutdown_sends_going_away_to_both_sides() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, mut up_peer) = duplex(Side::Upstream);
        let (relay, shutdown) = relay_with(vec![up]);
        let relay = Arc::new(relay);

        let handle = spawn_session(relay.clone(), down);
        down_peer.send("hello");
        expect_message(&mut up_peer, "hello").await;

        shutdown.trigger();

        let report = handle.await.unwrap();
        assert_eq!(report.end, SessionEnd::Shutdown);
        for peer in [&mut down_peer, &mut up_peer] {
            match peer.recv().await {
                Some(Frame::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_GOING_AWAY),
                other => panic!("expected going-away close, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn session_started_after_shutdown_closes_immediately() {
        let (down, mut down_peer) = duplex(Side::Downstream);
        let (up, mut up_peer) = duplex(Side::Upstream);
        let (relay, shutdown) = relay_with(vec![up]);
        let relay = Arc::new(relay);

        shutdown.trigger();
        let report = spawn_session(relay.clone(), down).await.unwrap();

        assert_eq!(report.end, SessionEnd::Shutdown);
        match down_peer.recv().await {
            Some(Frame::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_GOING_AWAY),
            other => panic!("expected going-away close, got {:?}", other),
        }
        assert_eq!(relay.registry().active_count(), 0);

        // The upstream was never dialed, so it is still waiting in the dialer.
        let handed_out = relay.dialer.dial(&target()).await;
        assert!(handed_out.is_ok());
        drop(handed_out);
        assert_eq!(up_peer.recv().await, None);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let (down_a, mut down_a_peer) = duplex(Side::Downstream);
        let (down_b, mut down_b_peer) = duplex(Side::Downstream);
        let (up_a, mut up_a_peer) = duplex(Side::Upstream);
        let (up_b, up_b_peer) = duplex(Side::Upstream);
        let (relay, _shutdown) = relay_with(vec![up_a, up_b]);
        let relay = Arc::new(relay);

        let a = spawn_session(relay.clone(), down_a);
        // Make sure session A dials first so it gets `up_a`.
        down_a_peer.send("ping-a");
        expect_message(&mut up_a_peer, "ping-a").await;
        let b = spawn_session(relay.clone(), down_b);

        up_b_peer.send("for-b");
        expect_message(&mut down_b_peer, "for-b").await;

        down_a_peer.close(Some(CloseFrame::normal()));
        let report_a = a.await.unwrap();
        assert!(matches!(report_a.end, SessionEnd::PeerClosed { .. }));

        // B is unaffected by A's teardown.
        up_b_peer.send("still-there");
        expect_message(&mut down_b_peer, "still-there").await;
        assert_eq!(relay.registry().active_count(), 1);

        down_b_peer.close(None);
        let report_b = b.await.unwrap();
        assert_eq!(report_b.to_downstream, 2);
        assert_eq!(relay.registry().active_count(), 0);
    }
}
