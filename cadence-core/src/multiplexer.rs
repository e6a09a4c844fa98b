//! Readiness multiplexer over the event loop's descriptor classes.
//!
//! Wraps tokio's readiness notifications behind the register / unregister /
//! poll contract of a classic poll(2)-style loop. A read-ready notification
//! only guarantees that the next read will not block — it does **not**
//! guarantee the read returns data. A closed connection stays read-ready
//! forever with an empty result, so callers must re-check for the empty
//! read on every dispatch, not just the first.
//!
//! Two of the descriptor classes fuse readiness with the acting operation,
//! because that is the shape tokio exposes:
//! - the listener's ready event carries the accepted connection. A state
//!   that must not admit peers leaves [`Interest::LISTENER`] out of its
//!   poll mask, so no accept can ever run on its behalf; pending
//!   connections wait in the OS backlog.
//! - the console's ready event carries the drained line.
//!
//! `poll` yields at most one event per call; a source that stays ready is
//! yielded again on the next tick. That is also how "accept exactly one
//! connection per ready notification" falls out: a backlog deeper than one
//! keeps the listener ready.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::console::Console;
use crate::registry::{PeerId, Registry};

// ── Handles & interest ───────────────────────────────────────────

/// Identity of one registered event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    /// The control connection to the lead.
    Control,
    /// The peer-listening socket.
    Listener,
    /// The operator console.
    Console,
    /// One accepted peer connection.
    Peer(PeerId),
}

bitflags::bitflags! {
    /// Descriptor classes a protocol state includes in its poll set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        const CONTROL = 1 << 0;
        const LISTENER = 1 << 1;
        const CONSOLE = 1 << 2;
        const PEERS = 1 << 3;
    }
}

/// One readiness notification from [`Multiplexer::poll`].
#[derive(Debug)]
pub enum ReadyEvent {
    /// The control connection is read-ready.
    Control,
    /// The listener produced a pending peer connection.
    Incoming(TcpStream, SocketAddr),
    /// One console line was drained (`None` = console closed).
    ConsoleLine(Option<String>),
    /// A registered peer connection is read-ready.
    Peer(PeerId),
}

/// Borrowed view of the event sources owned by the caller.
pub struct PollSources<'a> {
    pub control: &'a TcpStream,
    pub listener: &'a TcpListener,
    pub console: &'a mut Console,
    pub peers: &'a Registry,
}

// ── Multiplexer ──────────────────────────────────────────────────

/// Tracks which handles participate in the poll set.
///
/// The registered peer-handle set mirrors the connection registry at all
/// times; the event loop is the only mutator of either.
#[derive(Debug)]
pub struct Multiplexer {
    fixed: Interest,
    peers: HashSet<PeerId>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self {
            fixed: Interest::empty(),
            peers: HashSet::new(),
        }
    }

    pub fn register(&mut self, handle: Handle) {
        match handle {
            Handle::Control => self.fixed.insert(Interest::CONTROL),
            Handle::Listener => self.fixed.insert(Interest::LISTENER),
            Handle::Console => self.fixed.insert(Interest::CONSOLE),
            Handle::Peer(id) => {
                self.peers.insert(id);
            }
        }
    }

    pub fn unregister(&mut self, handle: Handle) {
        match handle {
            Handle::Control => self.fixed.remove(Interest::CONTROL),
            Handle::Listener => self.fixed.remove(Interest::LISTENER),
            Handle::Console => self.fixed.remove(Interest::CONSOLE),
            Handle::Peer(id) => {
                self.peers.remove(&id);
            }
        }
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        match handle {
            Handle::Control => self.fixed.contains(Interest::CONTROL),
            Handle::Listener => self.fixed.contains(Interest::LISTENER),
            Handle::Console => self.fixed.contains(Interest::CONSOLE),
            Handle::Peer(id) => self.peers.contains(&id),
        }
    }

    /// Registered peer handles, sorted. Counterpart of [`Registry::ids`]
    /// for the handle-set equality invariant.
    pub fn registered_peers(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Wait for one readiness event, bounded by `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing ready —
    /// the loop's natural tick. Only sources that are both registered and
    /// named in `interest` are polled. Accept failures are absorbed as
    /// absence of an event: no connection is registered and the loop
    /// continues.
    pub async fn poll(
        &self,
        sources: PollSources<'_>,
        timeout: Duration,
        interest: Interest,
    ) -> io::Result<Option<ReadyEvent>> {
        let want = interest & self.fixed;
        let poll_control = want.contains(Interest::CONTROL);
        let poll_listener = want.contains(Interest::LISTENER);
        let poll_console = want.contains(Interest::CONSOLE);
        let poll_peers = interest.contains(Interest::PEERS) && !self.peers.is_empty();

        let PollSources {
            control,
            listener,
            console,
            peers,
        } = sources;

        // Branch choice among simultaneously ready sources is select!'s
        // pseudo-random pick: no ordering guarantee between unrelated
        // descriptors, and none may be assumed.
        tokio::select! {
            () = tokio::time::sleep(timeout) => Ok(None),

            ready = control.readable(), if poll_control => {
                ready?;
                Ok(Some(ReadyEvent::Control))
            }

            accepted = listener.accept(), if poll_listener => match accepted {
                Ok((stream, addr)) => Ok(Some(ReadyEvent::Incoming(stream, addr))),
                Err(e) => {
                    warn!("accept error: {e}");
                    Ok(None)
                }
            },

            line = console.next_line(), if poll_console => {
                Ok(Some(ReadyEvent::ConsoleLine(line?)))
            }

            (id, ready) = ready_in(peers, |id| self.peers.contains(&id)), if poll_peers => {
                match ready {
                    Ok(()) => Ok(Some(ReadyEvent::Peer(id))),
                    Err(e) => {
                        // Mirrors skipping non-readable poll flags: an
                        // errored peer produced no readable event.
                        debug!("readiness error on {id}: {e}");
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Peer readiness fan-in ────────────────────────────────────────

/// Resolves once any kept connection in `registry` is read-ready. Pends
/// forever when nothing qualifies.
async fn ready_in(
    registry: &Registry,
    keep: impl Fn(PeerId) -> bool,
) -> (PeerId, io::Result<()>) {
    let mut ready: FuturesUnordered<_> = registry
        .iter()
        .filter(|(id, _)| keep(*id))
        .map(|(id, conn)| async move { (id, conn.stream().readable().await) })
        .collect();

    match ready.next().await {
        Some(event) => event,
        None => futures::future::pending().await,
    }
}

/// Resolves once any connection in `registry` is read-ready.
///
/// The lead's fan-out loop uses this directly; it has no per-state
/// interest masking, so every tracked follow is in its poll set.
pub async fn any_ready(registry: &Registry) -> (PeerId, io::Result<()>) {
    ready_in(registry, |_| true).await
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PeerConnection;
    use tokio::io::AsyncWriteExt;

    const TICK: Duration = Duration::from_millis(20);

    struct Fixture {
        control: TcpStream,
        control_remote: TcpStream,
        listener: TcpListener,
        console: Console,
        console_tx: Option<tokio::io::DuplexStream>,
        peers: Registry,
    }

    async fn fixture() -> Fixture {
        let lead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control = TcpStream::connect(lead.local_addr().unwrap())
            .await
            .unwrap();
        let (control_remote, _) = lead.accept().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (console_rx, console_tx) = tokio::io::duplex(64);

        Fixture {
            control,
            control_remote,
            listener,
            console: Console::from_reader(console_rx),
            console_tx: Some(console_tx),
            peers: Registry::new(),
        }
    }

    fn all_registered() -> Multiplexer {
        let mut mux = Multiplexer::new();
        mux.register(Handle::Control);
        mux.register(Handle::Listener);
        mux.register(Handle::Console);
        mux
    }

    impl Fixture {
        fn sources(&mut self) -> PollSources<'_> {
            PollSources {
                control: &self.control,
                listener: &self.listener,
                console: &mut self.console,
                peers: &self.peers,
            }
        }
    }

    #[tokio::test]
    async fn quiet_poll_times_out() {
        let mut fx = fixture().await;
        let mux = all_registered();

        let event = mux.poll(fx.sources(), TICK, Interest::all()).await.unwrap();
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn control_readiness_is_surfaced() {
        let mut fx = fixture().await;
        let mux = all_registered();

        fx.control_remote.write_all(b"RQUP").await.unwrap();

        // Interest is narrowed to the control class so the assertion does
        // not race the console branch.
        let event = loop {
            match mux
                .poll(fx.sources(), TICK, Interest::CONTROL)
                .await
                .unwrap()
            {
                Some(event) => break event,
                None => continue,
            }
        };
        assert!(matches!(event, ReadyEvent::Control));
    }

    #[tokio::test]
    async fn unregistered_control_is_not_polled() {
        let mut fx = fixture().await;
        let mut mux = all_registered();
        mux.unregister(Handle::Control);

        fx.control_remote.write_all(b"RQUP").await.unwrap();

        let event = mux
            .poll(fx.sources(), TICK, Interest::CONTROL)
            .await
            .unwrap();
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn masked_listener_never_accepts() {
        let mut fx = fixture().await;
        let mux = all_registered();
        let masked = Interest::all() - Interest::LISTENER;

        let _pending = TcpStream::connect(fx.listener.local_addr().unwrap())
            .await
            .unwrap();

        for _ in 0..5 {
            let event = mux.poll(fx.sources(), TICK, masked).await.unwrap();
            assert!(event.is_none());
        }

        // Re-enabling the listener surfaces the connection that has been
        // waiting in the backlog all along.
        let event = loop {
            match mux
                .poll(fx.sources(), TICK, Interest::LISTENER)
                .await
                .unwrap()
            {
                Some(event) => break event,
                None => continue,
            }
        };
        assert!(matches!(event, ReadyEvent::Incoming(..)));
    }

    #[tokio::test]
    async fn console_event_carries_the_line() {
        let mut fx = fixture().await;
        let mux = all_registered();

        fx.console_tx
            .as_mut()
            .unwrap()
            .write_all(b"advance\n")
            .await
            .unwrap();

        let event = loop {
            match mux
                .poll(fx.sources(), TICK, Interest::CONSOLE)
                .await
                .unwrap()
            {
                Some(event) => break event,
                None => continue,
            }
        };
        match event {
            ReadyEvent::ConsoleLine(line) => assert_eq!(line.as_deref(), Some("advance")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn console_eof_is_surfaced() {
        let mut fx = fixture().await;
        let mux = all_registered();

        drop(fx.console_tx.take());

        let event = loop {
            match mux
                .poll(fx.sources(), TICK, Interest::CONSOLE)
                .await
                .unwrap()
            {
                Some(event) => break event,
                None => continue,
            }
        };
        assert!(matches!(event, ReadyEvent::ConsoleLine(None)));
    }

    #[tokio::test]
    async fn peer_readiness_does_not_consume_data() {
        let mut fx = fixture().await;
        let mut mux = all_registered();

        let mut client = TcpStream::connect(fx.listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, addr) = fx.listener.accept().await.unwrap();
        let id = fx.peers.insert(PeerConnection::new(server, addr));
        mux.register(Handle::Peer(id));

        client.write_all(b"hello").await.unwrap();

        let event = loop {
            match mux.poll(fx.sources(), TICK, Interest::PEERS).await.unwrap() {
                Some(event) => break event,
                None => continue,
            }
        };
        match event {
            ReadyEvent::Peer(ready_id) => assert_eq!(ready_id, id),
            other => panic!("unexpected event: {other:?}"),
        }

        // Readiness reported, nothing read: the bytes are still there.
        let mut buf = [0u8; 8];
        let n = fx
            .peers
            .values()
            .next()
            .unwrap()
            .stream()
            .try_read(&mut buf)
            .unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn peer_unregister_removes_from_poll_set() {
        let mut fx = fixture().await;
        let mut mux = all_registered();

        let mut client = TcpStream::connect(fx.listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, addr) = fx.listener.accept().await.unwrap();
        let id = fx.peers.insert(PeerConnection::new(server, addr));
        mux.register(Handle::Peer(id));
        assert!(mux.is_registered(Handle::Peer(id)));

        mux.unregister(Handle::Peer(id));
        assert!(!mux.is_registered(Handle::Peer(id)));

        client.write_all(b"hello").await.unwrap();
        let event = mux.poll(fx.sources(), TICK, Interest::PEERS).await.unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn registered_peers_tracks_registration() {
        let mut mux = Multiplexer::new();
        assert!(mux.registered_peers().is_empty());

        // Fixed handles never show up in the peer set.
        mux.register(Handle::Control);
        mux.register(Handle::Listener);
        assert!(mux.registered_peers().is_empty());
    }
}
