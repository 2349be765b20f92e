//! Error types for console automation

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by expect and send operations.
///
/// The terminal stream conditions (`Timeout`, `Eof`, `PtyClosed`) carry the
/// buffer accumulated before the stream ended, so diagnostics can show what
/// was actually read. Each of them is only an error when the corresponding
/// matcher was *not* requested; an expect call that asks for
/// [`Matcher::Eof`](crate::Matcher::Eof) treats end-of-stream as a match.
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::{Console, ExpectError, ExpectOpts, Matcher};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let console = Console::new()?;
/// let opts = ExpectOpts::default().timeout(Duration::from_secs(5));
/// match console.expect_with(vec![Matcher::string("login:")], opts).await {
///     Ok(m) => println!("matched: {}", m.buffer),
///     Err(ExpectError::Timeout { duration, buffer }) => {
///         eprintln!("no prompt after {:?}, saw {:?}", duration, buffer);
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum ExpectError {
    /// The effective deadline expired before any matcher hit.
    #[error("timed out after {duration:?} before a match")]
    Timeout {
        /// Effective timeout for the expect call.
        duration: Duration,
        /// Output accumulated before the deadline expired.
        buffer: String,
    },

    /// The stream ended before any matcher hit and no
    /// [`Matcher::Eof`](crate::Matcher::Eof) was requested.
    #[error("end of stream before a match")]
    Eof {
        /// Output accumulated before the stream ended.
        buffer: String,
    },

    /// The pty subordinate was closed (the master read failed with `EIO`)
    /// and no [`Matcher::PtyClosed`](crate::Matcher::PtyClosed) was
    /// requested. Distinct from a generic end of stream.
    #[error("pty subordinate closed before a match")]
    PtyClosed {
        /// Output accumulated before the subordinate closed.
        buffer: String,
    },

    /// Any other I/O failure, surfaced verbatim.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The console was closed and can no longer be used.
    #[error("console is closed")]
    ConsoleClosed,
}

impl ExpectError {
    /// Whether this error is a timeout.
    ///
    /// True for [`ExpectError::Timeout`] and for I/O errors whose kind is
    /// [`io::ErrorKind::TimedOut`] (the platform timeout predicate, which
    /// is also what [`PassthroughPipe`](crate::PassthroughPipe) reads
    /// yield on an expired deadline).
    pub fn is_timeout(&self) -> bool {
        match self {
            ExpectError::Timeout { .. } => true,
            ExpectError::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// The output accumulated before the stream condition, if this error
    /// carries one.
    pub fn buffer(&self) -> Option<&str> {
        match self {
            ExpectError::Timeout { buffer, .. }
            | ExpectError::Eof { buffer }
            | ExpectError::PtyClosed { buffer } => Some(buffer),
            _ => None,
        }
    }
}
