//! # cadence-core
//!
//! Core library for the cadence round-synchronization protocol: one Lead
//! node drives round advancement over TCP; each Follow node runs a
//! single-threaded, readiness-driven state machine that suspends peer
//! admission while a round transition is in flight.
//!
//! This crate contains:
//! - **Codec**: fixed-size control codes and the follow→lead report payload
//! - **Multiplexer**: readiness notification over the loop's descriptor classes
//! - **Registry**: bookkeeping for accepted peer connections
//! - **Console**: line-oriented operator input
//! - **State**: the round state machine gating which events are acted upon
//! - **Follow**: `FollowNode`, the event loop tying the above together
//! - **Error**: `CadenceError` — typed, `thiserror`-based errors

pub mod codec;
pub mod console;
pub mod error;
pub mod follow;
pub mod multiplexer;
pub mod registry;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{CODE_LEN, ControlCode, ControlEvent, MAX_REPORT_LEN, Report};
pub use console::Console;
pub use error::CadenceError;
pub use follow::FollowNode;
pub use multiplexer::{Handle, Interest, Multiplexer, PollSources, ReadyEvent};
pub use registry::{PeerConnection, PeerId, Registry};
pub use state::{EventContext, RoundState, Shutdown, Verdict};
