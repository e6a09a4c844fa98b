//! Lead-side fan-out: accept follows, broadcast round codes.
//!
//! Deliberately no state machine here — the lead tracks one bit (is a
//! round open) and fans control codes out to every connected follow. The
//! hard sequencing lives entirely on the follow side.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use cadence_core::codec::{self, ControlCode, MAX_REPORT_LEN};
use cadence_core::console::Console;
use cadence_core::multiplexer;
use cadence_core::registry::{PeerConnection, PeerId, Registry};

// ── Events ───────────────────────────────────────────────────────

/// One thing the lead's loop observed.
#[derive(Debug)]
enum LeadEvent {
    /// A follow finished its TCP handshake.
    Accepted(TcpStream, SocketAddr),
    /// The operator asked to advance the round.
    Trigger,
    /// The operator console reached end of input.
    ConsoleClosed,
    /// A connected follow has data (a report) or has disconnected.
    FollowReady(PeerId),
    /// Nothing actionable this pass.
    Idle,
}

// ── Lead ─────────────────────────────────────────────────────────

/// The lead node: a listener, the connected follows, and the operator
/// console that triggers round advancement.
#[derive(Debug)]
pub struct Lead {
    listener: TcpListener,
    follows: Registry,
    console: Console,
    round_open: bool,
    console_open: bool,
}

impl Lead {
    pub fn new(listener: TcpListener, console: Console) -> Self {
        Self {
            listener,
            follows: Registry::new(),
            console,
            round_open: false,
            console_open: true,
        }
    }

    /// Bind the control listener and wire up stdin.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::new(listener, Console::stdin()))
    }

    /// Address follows dial.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connected follows.
    pub fn follow_count(&self) -> usize {
        self.follows.len()
    }

    /// Whether a round is currently in flight.
    pub fn round_open(&self) -> bool {
        self.round_open
    }

    /// Accept, trigger, and reap until the surrounding task is cancelled.
    pub async fn run(&mut self) -> io::Result<()> {
        info!("listening for follows on {}", self.local_addr()?);
        loop {
            let event = self.next_event().await?;
            self.handle_event(event);
        }
    }

    // ── Event intake ─────────────────────────────────────────────

    /// Wait for the next observation. Pure intake: all mutation happens
    /// in [`Lead::handle_event`].
    async fn next_event(&mut self) -> io::Result<LeadEvent> {
        tokio::select! {
            accepted = self.listener.accept() => match accepted {
                Ok((stream, addr)) => Ok(LeadEvent::Accepted(stream, addr)),
                Err(e) => {
                    warn!("accept error: {e}");
                    Ok(LeadEvent::Idle)
                }
            },

            line = self.console.next_line(), if self.console_open => match line? {
                Some(_) => Ok(LeadEvent::Trigger),
                None => Ok(LeadEvent::ConsoleClosed),
            },

            (id, _ready) = multiplexer::any_ready(&self.follows), if !self.follows.is_empty() => {
                // Readiness errors surface in the follow's try_read below.
                Ok(LeadEvent::FollowReady(id))
            }
        }
    }

    fn handle_event(&mut self, event: LeadEvent) {
        match event {
            LeadEvent::Accepted(stream, addr) => {
                info!("accepting a connection from {addr}");
                self.follows.insert(PeerConnection::new(stream, addr));
            }
            LeadEvent::Trigger => self.trigger_round(),
            LeadEvent::ConsoleClosed => {
                info!("console closed; rounds can no longer be triggered");
                self.console_open = false;
            }
            LeadEvent::FollowReady(id) => self.service_follow(id),
            LeadEvent::Idle => {}
        }
    }

    // ── Round control ────────────────────────────────────────────

    /// One operator trigger: opens the round if none is in flight,
    /// closes it otherwise.
    fn trigger_round(&mut self) {
        let code = if self.round_open {
            ControlCode::UpdateComplete
        } else {
            ControlCode::RequestUpdate
        };
        self.round_open = !self.round_open;

        match code {
            ControlCode::RequestUpdate => {
                info!("requesting an update from {} follows", self.follows.len());
            }
            ControlCode::UpdateComplete => {
                info!("round complete; notifying {} follows", self.follows.len());
            }
        }
        self.broadcast(code);
    }

    /// Fan one control code out to every follow; a follow whose socket
    /// refuses the 4-byte write is gone and gets dropped.
    fn broadcast(&mut self, code: ControlCode) {
        let frame = codec::encode(code);
        let mut dead = Vec::new();

        for (id, conn) in self.follows.iter() {
            match conn.stream().try_write(&frame) {
                Ok(n) if n == frame.len() => {}
                Ok(n) => {
                    warn!("dropping {id}: short control write ({n} bytes)");
                    dead.push(id);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Send buffer full after only 4 bytes: the follow has
                    // stopped draining long ago.
                    warn!("dropping {id}: send buffer full");
                    dead.push(id);
                }
                Err(e) => {
                    warn!("dropping {id}: {e}");
                    dead.push(id);
                }
            }
        }
        for id in dead {
            self.follows.remove(id);
        }
    }

    /// One non-blocking read of a ready follow: an empty read means it
    /// disconnected; otherwise the bytes are expected to be a report.
    fn service_follow(&mut self, id: PeerId) {
        let Some(conn) = self.follows.get(id) else {
            return;
        };

        let mut buf = [0u8; MAX_REPORT_LEN];
        match conn.stream().try_read(&mut buf) {
            Ok(0) => {
                info!("{id} disconnected");
                self.follows.remove(id);
            }
            Ok(n) => match codec::decode_report(&buf[..n]) {
                Some(report) => info!("{id} reports {} rounds completed", report.rounds),
                None => debug!("{id}: ignoring {n} unrecognized bytes"),
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("{id}: read error: {e}");
                self.follows.remove(id);
            }
        }
    }

    /// Close the listener and every follow connection.
    pub fn shutdown(mut self) {
        for (id, conn) in self.follows.drain() {
            debug!("closing {id} ({})", conn.addr());
        }
        info!("closing all open sockets");
        // listener and console close as `self` drops here.
    }
}

// ── Tests ────────────────────────────────────────────────────────
