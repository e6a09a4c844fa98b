//! Wire message codec: fixed-size control codes and the report payload.
//!
//! Control codes are exactly [`CODE_LEN`] bytes on the wire. Every message,
//! report included, is assumed to fit under [`MAX_REPORT_LEN`] bytes and to
//! arrive in full within a single transport read; there is no length
//! prefix, delimiter, or reassembly. That is a documented simplifying
//! assumption of the minimal protocol, not a transport guarantee — anyone
//! extending this codec for larger or streamed payloads must add framing.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

/// Size of every control code on the wire.
pub const CODE_LEN: usize = 4;

/// Upper bound on any single message, chosen so it survives one read call.
pub const MAX_REPORT_LEN: usize = 64;

/// Wire tag that prefixes a report payload.
const REPORT_TAG: [u8; CODE_LEN] = *b"RPRT";

// ── ControlCode ──────────────────────────────────────────────────

/// Zero-argument control codes broadcast by the lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    /// The lead asks every follow to begin a round transition.
    RequestUpdate,
    /// The lead confirms the round transition has finished.
    UpdateComplete,
}

impl ControlCode {
    /// The exact bytes this code occupies on the wire.
    pub const fn as_bytes(self) -> [u8; CODE_LEN] {
        match self {
            ControlCode::RequestUpdate => *b"RQUP",
            ControlCode::UpdateComplete => *b"UPOK",
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Decoding ─────────────────────────────────────────────────────

/// Outcome of decoding one control-connection read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Zero bytes were read: the remote end closed the connection.
    Closed,
    /// The bytes match no known code; the caller's policy is to ignore it.
    Unknown,
    /// A recognized control code.
    Code(ControlCode),
}

/// Encode a zero-argument control code.
pub const fn encode(code: ControlCode) -> [u8; CODE_LEN] {
    code.as_bytes()
}

/// Decode the result of one control-connection read.
///
/// An empty buffer is a distinguished signal — the remote end closed the
/// connection — not an error. Any non-empty buffer that is not an exact
/// [`CODE_LEN`]-byte known code decodes to [`ControlEvent::Unknown`], so a
/// misaligned or third-party message in the same fixed-width channel is a
/// no-op for the caller rather than a process failure.
pub fn decode(buf: &[u8]) -> ControlEvent {
    if buf.is_empty() {
        return ControlEvent::Closed;
    }
    let Ok(code) = <[u8; CODE_LEN]>::try_from(buf) else {
        return ControlEvent::Unknown;
    };
    if code == ControlCode::RequestUpdate.as_bytes() {
        ControlEvent::Code(ControlCode::RequestUpdate)
    } else if code == ControlCode::UpdateComplete.as_bytes() {
        ControlEvent::Code(ControlCode::UpdateComplete)
    } else {
        ControlEvent::Unknown
    }
}

// ── Report ───────────────────────────────────────────────────────

/// Status payload a follow pushes up to the lead (follow → lead only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Rounds this follow has completed.
    pub rounds: u64,
}

/// Encode a report: [`REPORT_TAG`] followed by the bincode body.
///
/// The result must fit one transport read; [`MAX_REPORT_LEN`] is enforced
/// here so an extended `Report` cannot silently outgrow the wire contract.
pub fn encode_report(report: &Report) -> Result<Bytes, CadenceError> {
    let body = bincode::serialize(report)?;
    let mut buf = BytesMut::with_capacity(CODE_LEN + body.len());
    buf.put_slice(&REPORT_TAG);
    buf.put_slice(&body);
    if buf.len() > MAX_REPORT_LEN {
        return Err(CadenceError::ReportTooLarge {
            size: buf.len(),
            max: MAX_REPORT_LEN,
        });
    }
    Ok(buf.freeze())
}

/// Decode a report on the lead side.
///
/// Returns `None` when the buffer does not carry the report tag or the
/// body fails to parse; the follow side needs no decoder in the minimal
/// protocol.
pub fn decode_report(buf: &[u8]) -> Option<Report> {
    let body = buf.strip_prefix(REPORT_TAG.as_slice())?;
    bincode::deserialize(body).ok()
}

// ── Tests ────────────────────────────────────────────────────────
