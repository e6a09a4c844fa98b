//! Domain-specific error types for the cadence protocol.
//!
//! All fallible operations return `Result<T, CadenceError>`.
//! Loss of the control connection is deliberately *not* an error variant:
//! it is a termination outcome ([`crate::state::Shutdown`]) returned up the
//! call stack and handled once at the outermost scope.

use thiserror::Error;

/// The canonical error type for the cadence protocol.
#[derive(Debug, Error)]
pub enum CadenceError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a report payload failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A report payload exceeds the single-read size limit.
    #[error("report too large: {size} bytes (max {max})")]
    ReportTooLarge { size: usize, max: usize },

    // ── Protocol Errors ──────────────────────────────────────────
    /// An operation violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

// ── Convenient From implementations ──────────────────────────────

impl From<Box<bincode::ErrorKind>> for CadenceError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        CadenceError::Encoding(e.to_string())
    }
}
