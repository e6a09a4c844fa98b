//! The follow node's protocol states.
//!
//! A tagged variant over the three protocol states, dispatched through the
//! fixed `on_enter` / `on_event` interface. Event handlers are synchronous:
//! every I/O operation inside them is a non-blocking `try_read` /
//! `try_write` against a descriptor the multiplexer already reported ready.

use std::io;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::codec::{self, CODE_LEN, ControlCode, ControlEvent, Report};
use crate::error::CadenceError;
use crate::multiplexer::{Handle, Interest, Multiplexer, ReadyEvent};
use crate::registry::{PeerConnection, Registry};

// ── Outcomes ─────────────────────────────────────────────────────

/// Why the event loop stopped.
///
/// Termination is a value returned up the call stack and handled once at
/// the outermost scope, which then runs the unconditional socket cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The control connection returned an empty read: the lead is gone.
    /// Fatal for the process; never retried or reconnected.
    LeadClosed,
    /// An external interrupt asked for a graceful stop.
    Interrupted,
}

/// What a state decided after handling one readiness event.
#[derive(Debug)]
pub enum Verdict {
    /// Remain in the current state.
    Stay,
    /// Switch states; the machine invokes `on_enter` on the target.
    Transition(RoundState),
    /// Stop the loop and unwind to cleanup.
    Terminate(Shutdown),
}

/// Mutable view of the node a state may touch while handling an event.
pub struct EventContext<'a> {
    pub control: &'a TcpStream,
    pub registry: &'a mut Registry,
    pub multiplexer: &'a mut Multiplexer,
}

// ── RoundState ───────────────────────────────────────────────────

/// The protocol state gating which readiness events are acted upon.
///
/// ```text
///               REQUEST_UPDATE
///    Listening ───────────────► Updating
///        ▲                         │
///        └─────────────────────────┘
///              UPDATE_COMPLETE
/// ```
///
/// `Reporting` sits outside the cycle: nothing transitions into it in the
/// minimal protocol and nothing transitions out. It is the designed hook
/// for a follow to push a status payload to the lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundState {
    /// Accepting peers and waiting for the lead to open a round.
    #[default]
    Listening,
    /// A round transition is in flight; peer admission is suspended.
    Updating,
    /// Push one status report to the lead (extension hook; terminal).
    Reporting,
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listening => write!(f, "Listening"),
            Self::Updating => write!(f, "Updating"),
            Self::Reporting => write!(f, "Reporting"),
        }
    }
}

impl RoundState {
    /// The descriptor classes this state polls.
    ///
    /// `Updating` leaves the listener out: new peer connections are not
    /// accepted while a round transition is in flight, and the OS backlog
    /// holds them until `Listening` resumes. Peer sockets stay in every
    /// poll set — their events are ignored, not their readiness.
    pub fn interest(&self) -> Interest {
        match self {
            Self::Listening => Interest::all(),
            Self::Updating | Self::Reporting => Interest::all() - Interest::LISTENER,
        }
    }

    /// Entry hook, invoked exactly once per transition, before the next
    /// event is processed.
    pub fn on_enter(&self, control: &TcpStream, rounds_completed: u64) -> Result<(), CadenceError> {
        match self {
            Self::Listening => {
                info!("waiting for the next round");
                Ok(())
            }
            Self::Updating => {
                info!("advancing to the next round");
                Ok(())
            }
            Self::Reporting => {
                let payload = codec::encode_report(&Report {
                    rounds: rounds_completed,
                })?;
                // A report fits the socket's send buffer, so a WouldBlock
                // here means the control connection is wedged; it surfaces
                // as a connection error like any other write failure.
                control.try_write(&payload)?;
                debug!("report sent ({} rounds)", rounds_completed);
                Ok(())
            }
        }
    }

    /// Handle one readiness event, returning the next state or a
    /// termination verdict.
    pub fn on_event(
        &self,
        ctx: &mut EventContext<'_>,
        event: ReadyEvent,
    ) -> Result<Verdict, CadenceError> {
        match self {
            Self::Listening => listening_event(ctx, event),
            Self::Updating => updating_event(ctx, event),
            Self::Reporting => reporting_event(ctx, event),
        }
    }
}

// ── Per-state handlers ───────────────────────────────────────────

fn listening_event(
    ctx: &mut EventContext<'_>,
    event: ReadyEvent,
) -> Result<Verdict, CadenceError> {
    match event {
        ReadyEvent::ConsoleLine(line) => Ok(drain_console(ctx, line)),

        ReadyEvent::Control => Ok(match read_control(ctx.control)? {
            Some(ControlEvent::Closed) => Verdict::Terminate(Shutdown::LeadClosed),
            Some(ControlEvent::Code(ControlCode::RequestUpdate)) => {
                Verdict::Transition(RoundState::Updating)
            }
            Some(ControlEvent::Code(ControlCode::UpdateComplete)) => {
                // Not expected outside a round; ignored.
                debug!("UpdateComplete while listening; ignored");
                Verdict::Stay
            }
            Some(ControlEvent::Unknown) => {
                debug!("unknown control code; ignored");
                Verdict::Stay
            }
            None => Verdict::Stay,
        }),

        ReadyEvent::Incoming(stream, addr) => {
            // One accept per ready notification: if the backlog holds
            // more, the listener stays ready and is serviced next tick.
            info!("accepting a connection from {addr}");
            let id = ctx.registry.insert(PeerConnection::new(stream, addr));
            ctx.multiplexer.register(Handle::Peer(id));
            Ok(Verdict::Stay)
        }

        // Peer data is not read in the minimal protocol.
        ReadyEvent::Peer(_) => Ok(Verdict::Stay),
    }
}

fn updating_event(
    ctx: &mut EventContext<'_>,
    event: ReadyEvent,
) -> Result<Verdict, CadenceError> {
    match event {
        ReadyEvent::ConsoleLine(line) => Ok(drain_console(ctx, line)),

        ReadyEvent::Control => Ok(match read_control(ctx.control)? {
            Some(ControlEvent::Closed) => Verdict::Terminate(Shutdown::LeadClosed),
            Some(ControlEvent::Code(ControlCode::UpdateComplete)) => {
                Verdict::Transition(RoundState::Listening)
            }
            Some(ControlEvent::Code(ControlCode::RequestUpdate)) => {
                // Already updating; a repeated request has no effect.
                debug!("RequestUpdate while updating; ignored");
                Verdict::Stay
            }
            Some(ControlEvent::Unknown) => {
                debug!("unknown control code; ignored");
                Verdict::Stay
            }
            None => Verdict::Stay,
        }),

        ReadyEvent::Peer(id) => {
            // Peer servicing is suspended during an update: no read is
            // issued, and whatever the peer sent waits in the transport
            // buffer until servicing resumes.
            debug!("{id} ready during update; not read");
            Ok(Verdict::Stay)
        }

        ReadyEvent::Incoming(..) => {
            // The interest mask keeps the listener out of this state's
            // poll set, so an accept cannot surface here.
            debug_assert!(false, "listener polled while updating");
            Ok(Verdict::Stay)
        }
    }
}

fn reporting_event(
    ctx: &mut EventContext<'_>,
    event: ReadyEvent,
) -> Result<Verdict, CadenceError> {
    match event {
        // The empty-read check on the control connection applies in every
        // active state; everything else is a no-op here, and the state has
        // no exit transition of its own.
        ReadyEvent::Control => Ok(match read_control(ctx.control)? {
            Some(ControlEvent::Closed) => Verdict::Terminate(Shutdown::LeadClosed),
            _ => Verdict::Stay,
        }),

        ReadyEvent::ConsoleLine(line) => Ok(drain_console(ctx, line)),

        _ => Ok(Verdict::Stay),
    }
}

// ── Shared event plumbing ────────────────────────────────────────

/// One non-blocking read of the control connection, decoded.
///
/// This runs on every dispatch of the control handle: a closed socket
/// stays read-ready forever, so hoisting the empty-read check out of the
/// dispatch path would spin the loop without making progress.
///
/// `None` means the readiness notification was spurious (`WouldBlock`);
/// reads are capped at [`CODE_LEN`] bytes so back-to-back codes in the
/// buffer stay aligned and are consumed one per tick.
fn read_control(control: &TcpStream) -> Result<Option<ControlEvent>, CadenceError> {
    let mut buf = [0u8; CODE_LEN];
    match control.try_read(&mut buf) {
        Ok(n) => Ok(Some(codec::decode(&buf[..n]))),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Acknowledge one console line so a perpetually ready input stream
/// cannot starve the socket events. Content is discarded.
fn drain_console(ctx: &mut EventContext<'_>, line: Option<String>) -> Verdict {
    match line {
        Some(_) => info!("input acknowledged"),
        None => {
            // A closed console would otherwise report ready forever.
            debug!("console closed; removing it from the poll set");
            ctx.multiplexer.unregister(Handle::Console);
        }
    }
    Verdict::Stay
}

// ── Tests ────────────────────────────────────────────────────────
