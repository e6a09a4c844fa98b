//! The follow node: owns the event sources and runs the control loop.
//!
//! Single-threaded, cooperative: one loop, no parallel workers. The only
//! suspension point is the bounded multiplexer poll; every socket
//! operation behind it is a non-blocking read or accept that never waits.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::console::Console;
use crate::error::CadenceError;
use crate::multiplexer::{Handle, Multiplexer, PollSources};
use crate::registry::Registry;
use crate::state::{EventContext, RoundState, Shutdown, Verdict};

/// Default bounded poll timeout: the loop's tick.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// A follow node: one control connection up to the lead, one listening
/// socket for downstream peers, one console, and the round state machine.
///
/// At most one control connection and one listening socket exist per
/// instance. The control connection is created once and never reopened;
/// losing it is terminal for the process.
#[derive(Debug)]
pub struct FollowNode {
    control: TcpStream,
    listener: TcpListener,
    console: Console,
    registry: Registry,
    multiplexer: Multiplexer,
    state: RoundState,
    poll_timeout: Duration,
    rounds_completed: u64,
}

impl FollowNode {
    /// Assemble a node from already-opened sources and register the three
    /// fixed handles with the multiplexer.
    pub fn new(
        control: TcpStream,
        listener: TcpListener,
        console: Console,
        poll_timeout: Duration,
    ) -> Self {
        let mut multiplexer = Multiplexer::new();
        multiplexer.register(Handle::Control);
        multiplexer.register(Handle::Listener);
        multiplexer.register(Handle::Console);

        Self {
            control,
            listener,
            console,
            registry: Registry::new(),
            multiplexer,
            state: RoundState::default(),
            poll_timeout,
            rounds_completed: 0,
        }
    }

    /// Connect to the lead, bind the peer listener, and wire up stdin.
    pub async fn connect(
        lead_addr: &str,
        listen_addr: &str,
        poll_timeout: Duration,
    ) -> Result<Self, CadenceError> {
        let control = TcpStream::connect(lead_addr).await?;
        let listener = TcpListener::bind(listen_addr).await?;
        info!("listening for peers on {}", listener.local_addr()?);
        Ok(Self::new(control, listener, Console::stdin(), poll_timeout))
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The currently active protocol state.
    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Rounds completed since startup.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Number of tracked peer connections.
    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    /// Address peers may dial.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The connection registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The readiness multiplexer.
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    // ── Event loop ───────────────────────────────────────────────

    /// Run until a termination verdict.
    ///
    /// The caller owns cleanup: whether this returns a [`Shutdown`], an
    /// error, or the future is dropped for an external interrupt,
    /// [`FollowNode::shutdown`] must follow.
    pub async fn run(&mut self) -> Result<Shutdown, CadenceError> {
        self.state.on_enter(&self.control, self.rounds_completed)?;
        loop {
            if let Some(shutdown) = self.tick().await? {
                return Ok(shutdown);
            }
        }
    }

    /// One bounded poll and at most one dispatched event.
    ///
    /// Returns `Some` when the handled event decided to stop the loop.
    pub async fn tick(&mut self) -> Result<Option<Shutdown>, CadenceError> {
        let interest = self.state.interest();
        let event = self
            .multiplexer
            .poll(
                PollSources {
                    control: &self.control,
                    listener: &self.listener,
                    console: &mut self.console,
                    peers: &self.registry,
                },
                self.poll_timeout,
                interest,
            )
            .await?;

        let Some(event) = event else {
            return Ok(None); // quiet tick
        };

        let state = self.state;
        let mut ctx = EventContext {
            control: &self.control,
            registry: &mut self.registry,
            multiplexer: &mut self.multiplexer,
        };
        match state.on_event(&mut ctx, event)? {
            Verdict::Stay => Ok(None),
            Verdict::Transition(next) => {
                self.transition(next)?;
                Ok(None)
            }
            Verdict::Terminate(shutdown) => Ok(Some(shutdown)),
        }
    }

    /// Request one status report to the lead: the extension point that
    /// enters the reporting state from outside the listening/updating
    /// cycle.
    pub fn begin_reporting(&mut self) -> Result<(), CadenceError> {
        self.transition(RoundState::Reporting)
    }

    /// Apply a state switch: bookkeeping first, then `on_enter` exactly
    /// once, before any further event is polled.
    fn transition(&mut self, next: RoundState) -> Result<(), CadenceError> {
        if matches!(
            (self.state, next),
            (RoundState::Updating, RoundState::Listening)
        ) {
            self.rounds_completed += 1;
            debug!("round {} complete", self.rounds_completed);
        }
        self.state = next;
        self.state.on_enter(&self.control, self.rounds_completed)
    }

    /// The single cleanup point: close the control connection, the
    /// listening socket, and every registered peer connection.
    ///
    /// Every exit path — lead loss, external interrupt, or an error out
    /// of the loop — routes through here; dropping performs the close,
    /// and RAII covers any path that skips this entirely (panic unwind).
    pub fn shutdown(mut self) {
        for (id, conn) in self.registry.drain() {
            self.multiplexer.unregister(Handle::Peer(id));
            debug!("closing {id} ({})", conn.addr());
        }
        info!("closing all open sockets");
        // control, listener, and console close as `self` drops here.
    }
}

// ── Tests ────────────────────────────────────────────────────────
