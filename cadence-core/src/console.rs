//! Line-oriented operator input.
//!
//! The core acknowledges and discards console lines; their content has no
//! protocol meaning in the minimal version. Draining one line per readiness
//! event keeps a chatty console from starving the socket events.

use std::io;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

/// A line-oriented input stream (the process's stdin in production).
pub struct Console {
    lines: FramedRead<Box<dyn AsyncRead + Send + Unpin>, LinesCodec>,
}

impl Console {
    /// Console over the process's stdin.
    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    /// Console over an arbitrary reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            lines: FramedRead::new(Box::new(reader), LinesCodec::new()),
        }
    }

    /// The next line, or `None` once the stream is closed.
    ///
    /// Cancel-safe: a partially received line stays buffered in the framed
    /// reader until a later call completes it.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.lines.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(LinesCodecError::Io(e))) => Err(e),
            Some(Err(e @ LinesCodecError::MaxLineLengthExceeded)) => {
                Err(io::Error::new(io::ErrorKind::InvalidData, e))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_lines_then_eof() {
        let reader = tokio_test::io::Builder::new()
            .read(b"alpha\nbeta\n")
            .build();
        let mut console = Console::from_reader(reader);

        assert_eq!(console.next_line().await.unwrap(), Some("alpha".into()));
        assert_eq!(console.next_line().await.unwrap(), Some("beta".into()));
        assert_eq!(console.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn line_split_across_reads() {
        let reader = tokio_test::io::Builder::new()
            .read(b"hel")
            .read(b"lo\n")
            .build();
        let mut console = Console::from_reader(reader);

        assert_eq!(console.next_line().await.unwrap(), Some("hello".into()));
    }

    #[tokio::test]
    async fn unterminated_trailing_line_is_yielded_at_eof() {
        let reader = tokio_test::io::Builder::new().read(b"tail").build();
        let mut console = Console::from_reader(reader);

        assert_eq!(console.next_line().await.unwrap(), Some("tail".into()));
        assert_eq!(console.next_line().await.unwrap(), None);
    }
}
