//! Pty-backed console: output expectation and input injection

mod builder;
mod decode;

pub use builder::{Closer, ConsoleBuilder, ExpectFilter, ExpectObserver, SendObserver};

use crate::console::decode::Utf8Reader;
use crate::matcher::Matcher;
use crate::pipe::PassthroughPipe;
use crate::result::{ExpectError, MatchResult};
use bytes::BytesMut;
use nix::errno::Errno;
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Per-call options for expect operations.
///
/// The effective timeout of a call resolves as: per-call
/// [`timeout`](ExpectOpts::timeout) if set, else the console's
/// [`default_timeout`](ConsoleBuilder::default_timeout), else none.
/// [`no_timeout`](ExpectOpts::no_timeout) explicitly suppresses the
/// console default. A zero `timeout` produces a deadline that has already
/// expired, failing the call with a timeout as soon as it has to wait.
#[derive(Debug, Default, Clone)]
pub struct ExpectOpts {
    timeout: Option<Duration>,
    no_timeout: bool,
}

impl ExpectOpts {
    /// Bound this call by `timeout`, overriding the console default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let this call wait indefinitely even if the console has a default
    /// timeout.
    pub fn no_timeout(mut self) -> Self {
        self.no_timeout = true;
        self
    }

    fn effective_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        if self.no_timeout {
            None
        } else {
            self.timeout.or(default)
        }
    }
}

/// A pseudoterminal with expect-style automation around it.
///
/// The console owns a pty pair. The subordinate end is handed to the
/// caller's own child processes via [`tty`](Console::tty); the console
/// never spawns or manages a child itself. The master side is driven
/// programmatically: [`send`](Console::send) injects input, and the
/// `expect` family reads output until a [`Matcher`] hits, tee'ing every
/// byte to the configured sinks along the way.
///
/// `Console` is a cheap clone; clones share the same pty and state, so
/// one task can expect while another sends. Concurrent expect calls are
/// allowed and serialize on the shared match stream: the second caller
/// blocks until the first returns, then applies its own timeout from the
/// moment it actually starts reading.
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::Console;
/// use std::process::{Command, Stdio};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let console = Console::new()?;
///
/// let mut child = Command::new("bc")
///     .stdin(Stdio::from(console.tty()?))
///     .stdout(Stdio::from(console.tty()?))
///     .stderr(Stdio::from(console.tty()?))
///     .spawn()?;
///
/// console.send_line("1+1").await?;
/// console.expect_string("2").await?;
///
/// console.send_line("quit").await?;
/// child.wait()?;
/// console.close_tty()?;
/// console.expect_eof().await?;
/// console.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Console {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) subordinate: Mutex<Option<File>>,
    pub(crate) master: Mutex<Option<File>>,
    pub(crate) stream: Mutex<StreamState>,
    pub(crate) pipe: PassthroughPipe,
    pub(crate) sinks: Mutex<Vec<Box<dyn Write + Send>>>,
    pub(crate) expect_observers: Vec<ExpectObserver>,
    pub(crate) send_observers: Vec<SendObserver>,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) closers: Mutex<Vec<Closer>>,
    pub(crate) closed: AtomicBool,
}

pub(crate) struct StreamState {
    pub(crate) reader: Utf8Reader<Box<dyn Read + Send>>,
}

impl Console {
    /// A console with no options. Shorthand for
    /// `Console::builder().build()`.
    pub fn new() -> Result<Self, ExpectError> {
        ConsoleBuilder::new().build()
    }

    /// A [`ConsoleBuilder`] for configuring sinks, sources, observers,
    /// filters, closers, the default timeout and the pty size.
    pub fn builder() -> ConsoleBuilder {
        ConsoleBuilder::new()
    }

    /// A handle to the pty subordinate end, for wiring a child's
    /// stdin/stdout/stderr (each call returns a fresh dup) or for driving
    /// the pty directly.
    pub fn tty(&self) -> Result<File, ExpectError> {
        let guard = self.inner.subordinate.lock().unwrap();
        match guard.as_ref() {
            Some(f) => f.try_clone().map_err(ExpectError::Io),
            None => Err(ExpectError::ConsoleClosed),
        }
    }

    /// Close the console's own subordinate handle. Once every dup handed
    /// out by [`tty`](Console::tty) is also gone (the child exited), the
    /// master reaches end-of-stream and [`expect_eof`](Console::expect_eof)
    /// completes.
    pub fn close_tty(&self) -> Result<(), ExpectError> {
        self.inner.subordinate.lock().unwrap().take();
        Ok(())
    }

    /// Write `message` to the pty master, returning the number of bytes
    /// written. Send observers run exactly once per call.
    pub async fn send(&self, message: &str) -> Result<usize, ExpectError> {
        let inner = Arc::clone(&self.inner);
        let message = message.to_string();
        tokio::task::spawn_blocking(move || send_sync(&inner, &message))
            .await
            .map_err(|e| ExpectError::Io(io::Error::other(e)))?
    }

    /// [`send`](Console::send) with a trailing newline.
    pub async fn send_line(&self, message: &str) -> Result<usize, ExpectError> {
        self.send(&format!("{message}\n")).await
    }

    /// Read the pty until one of `matchers` hits, using the console's
    /// default timeout if any.
    ///
    /// Bytes are consumed one scalar at a time and tee'd to every sink
    /// before matchers run, and no byte beyond the match is consumed:
    /// the next expect call resumes exactly where this one stopped.
    /// Matchers are evaluated in argument order against the whole buffer
    /// accumulated during the call; the first hit wins. Expect observers
    /// run exactly once per call, on every return path.
    pub async fn expect(&self, matchers: Vec<Matcher>) -> Result<MatchResult, ExpectError> {
        self.expect_with(matchers, ExpectOpts::default()).await
    }

    /// [`expect`](Console::expect) with per-call options.
    pub async fn expect_with(
        &self,
        matchers: Vec<Matcher>,
        opts: ExpectOpts,
    ) -> Result<MatchResult, ExpectError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || expect_sync(&inner, &matchers, &opts))
            .await
            .map_err(|e| ExpectError::Io(io::Error::other(e)))?
    }

    /// Wait for `needle` to appear in the output.
    pub async fn expect_string(&self, needle: impl Into<String>) -> Result<MatchResult, ExpectError> {
        self.expect(vec![Matcher::string(needle)]).await
    }

    /// Wait for formatted text to appear in the output:
    /// `console.expectf(format_args!("What is 1+{}?", 1))`.
    ///
    /// The format arguments are rendered before the returned future is
    /// created, so the future is `Send` and can cross task boundaries.
    pub fn expectf(
        &self,
        args: std::fmt::Arguments<'_>,
    ) -> impl std::future::Future<Output = Result<MatchResult, ExpectError>> + Send + '_ {
        let needle = args.to_string();
        async move { self.expect_string(needle).await }
    }

    /// Read the pty until the stream terminates, tee'ing everything to
    /// the sinks.
    ///
    /// Accepts both terminal conditions: a clean end-of-stream and the
    /// subordinate-closed error (Linux masters report `EIO` rather than
    /// end-of-stream once every subordinate handle is gone).
    pub async fn expect_eof(&self) -> Result<MatchResult, ExpectError> {
        self.expect(vec![Matcher::Eof, Matcher::PtyClosed]).await
    }

    /// Close the console: run user closers in reverse registration order,
    /// close the match stream (unblocking any in-flight expect with the
    /// stream's terminal error), then the subordinate, then the master.
    ///
    /// Idempotent: each closer runs once no matter how often `close` is
    /// called or how many clones exist. Errors from individual closers
    /// are collected; closing proceeds past them and the first error is
    /// returned.
    pub fn close(&self) -> Result<(), ExpectError> {
        close_inner(&self.inner)
    }
}

fn close_inner(inner: &Inner) -> Result<(), ExpectError> {
    if inner.closed.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let mut first_err: Option<io::Error> = None;
    let closers: Vec<Closer> = inner.closers.lock().unwrap().drain(..).collect();
    for closer in closers.into_iter().rev() {
        if let Err(e) = closer() {
            debug!(error = %e, "closer failed");
            first_err.get_or_insert(e);
        }
    }

    inner.pipe.close();
    inner.subordinate.lock().unwrap().take();
    inner.master.lock().unwrap().take();
    debug!("console closed");

    match first_err {
        Some(e) => Err(ExpectError::Io(e)),
        None => Ok(()),
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = close_inner(self);
    }
}

fn send_sync(inner: &Inner, message: &str) -> Result<usize, ExpectError> {
    let result = write_master(inner, message.as_bytes());
    trace!(message = %message.escape_debug(), "send");

    let err = result.as_ref().err();
    let written = *result.as_ref().unwrap_or(&0);
    for observer in &inner.send_observers {
        observer(message, written, err);
    }
    result
}

fn write_master(inner: &Inner, bytes: &[u8]) -> Result<usize, ExpectError> {
    if inner.closed.load(Ordering::SeqCst) {
        return Err(ExpectError::ConsoleClosed);
    }
    let mut guard = inner.master.lock().unwrap();
    let master = guard.as_mut().ok_or(ExpectError::ConsoleClosed)?;

    let mut written = 0;
    while written < bytes.len() {
        let n = master.write(&bytes[written..]).map_err(ExpectError::Io)?;
        if n == 0 {
            return Err(ExpectError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "pty master accepted no bytes",
            )));
        }
        written += n;
    }
    master.flush().map_err(ExpectError::Io)?;
    Ok(written)
}

fn expect_sync(
    inner: &Inner,
    matchers: &[Matcher],
    opts: &ExpectOpts,
) -> Result<MatchResult, ExpectError> {
    let timeout = opts.effective_timeout(inner.default_timeout);
    let mut buf = BytesMut::new();

    let outcome = expect_loop(inner, matchers, timeout, &mut buf);

    let buffer = String::from_utf8_lossy(&buf).into_owned();
    let result = match outcome {
        Ok(index) => Ok(MatchResult {
            buffer: buffer.clone(),
            matcher_index: index,
        }),
        Err(e) => Err(e),
    };

    let err = result.as_ref().err();
    for observer in &inner.expect_observers {
        observer(matchers, &buffer, err);
    }
    result
}

fn expect_loop(
    inner: &Inner,
    matchers: &[Matcher],
    timeout: Option<Duration>,
    buf: &mut BytesMut,
) -> Result<usize, ExpectError> {
    if inner.closed.load(Ordering::SeqCst) {
        return Err(ExpectError::ConsoleClosed);
    }

    let mut stream = inner.stream.lock().unwrap();
    let mut sinks = inner.sinks.lock().unwrap();

    // One absolute deadline for the whole call, cleared when unbounded.
    // Installed only once the stream lock is held: concurrent expect
    // calls serialize on that lock, so a second caller cannot overwrite
    // this call's deadline while it is live.
    inner.pipe.set_read_deadline(timeout.map(|t| Instant::now() + t));

    loop {
        let decoded = match stream.reader.read_char() {
            Ok(Some(dc)) => dc,
            Ok(None) => {
                let buffer = String::from_utf8_lossy(buf).into_owned();
                return match matchers.iter().position(|m| matches!(m, Matcher::Eof)) {
                    Some(index) => Ok(index),
                    None => Err(ExpectError::Eof { buffer }),
                };
            }
            Err(e) => {
                let buffer = String::from_utf8_lossy(buf).into_owned();
                if e.raw_os_error() == Some(Errno::EIO as i32) {
                    return match matchers.iter().position(|m| matches!(m, Matcher::PtyClosed)) {
                        Some(index) => Ok(index),
                        None => Err(ExpectError::PtyClosed { buffer }),
                    };
                }
                if e.kind() == io::ErrorKind::TimedOut {
                    return Err(ExpectError::Timeout {
                        duration: timeout.unwrap_or_default(),
                        buffer,
                    });
                }
                return Err(ExpectError::Io(e));
            }
        };

        trace!(rune = ?decoded.ch, "expect read");

        // Tee to every sink, flushing immediately so sinks stay at least
        // as current as the match buffer.
        for sink in sinks.iter_mut() {
            sink.write_all(decoded.as_bytes()).map_err(ExpectError::Io)?;
            sink.flush().map_err(ExpectError::Io)?;
        }
        buf.extend_from_slice(decoded.as_bytes());

        if let Some(index) = matchers.iter().position(|m| m.matches(buf)) {
            debug!(criteria = %matchers[index].criteria(), "matched");
            return Ok(index);
        }
    }
}
