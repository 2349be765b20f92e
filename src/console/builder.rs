//! Console construction and its options

use crate::console::decode::Utf8Reader;
use crate::console::{Console, Inner, StreamState};
use crate::matcher::Matcher;
use crate::pipe::PassthroughPipe;
use crate::result::ExpectError;
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, OutputFlags, SetArg};
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Observer invoked at the end of every expect call with the attempted
/// matchers, the final buffer, and the error (`None` on a match).
pub type ExpectObserver = Box<dyn Fn(&[Matcher], &str, Option<&ExpectError>) + Send + Sync>;

/// Observer invoked after every send with the message, the number of
/// bytes written, and the error (`None` on success).
pub type SendObserver = Box<dyn Fn(&str, usize, Option<&ExpectError>) + Send + Sync>;

/// Wraps the match-side read stream; filters compose in registration
/// order and may transform bytes (e.g. masking secrets) before the match
/// buffer, the sinks and the observers see them.
pub type ExpectFilter = Box<dyn FnOnce(Box<dyn Read + Send>) -> Box<dyn Read + Send> + Send>;

/// Extra resource released by [`Console::close`]; closers run in reverse
/// registration order, before the console's own pty endpoints.
pub type Closer = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Builder for a [`Console`].
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::Console;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let console = Console::builder()
///     .stdout(std::io::stdout())
///     .default_timeout(Duration::from_secs(10))
///     .winsize(40, 120)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConsoleBuilder {
    sinks: Vec<Box<dyn Write + Send>>,
    sources: Vec<Box<dyn Read + Send>>,
    closers: Vec<Closer>,
    filters: Vec<ExpectFilter>,
    expect_observers: Vec<ExpectObserver>,
    send_observers: Vec<SendObserver>,
    default_timeout: Option<Duration>,
    winsize: Winsize,
}

impl Default for ConsoleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleBuilder {
    /// A builder with no sinks, sources, observers or default timeout and
    /// a 24x80 pty.
    pub fn new() -> Self {
        ConsoleBuilder {
            sinks: Vec::new(),
            sources: Vec::new(),
            closers: Vec::new(),
            filters: Vec::new(),
            expect_observers: Vec::new(),
            send_observers: Vec::new(),
            default_timeout: None,
            winsize: Winsize {
                ws_row: DEFAULT_ROWS,
                ws_col: DEFAULT_COLS,
                ws_xpixel: 0,
                ws_ypixel: 0,
            },
        }
    }

    /// Append an output sink. Every byte read during expect calls is
    /// written to every sink, in read order, before matchers see it.
    pub fn stdout(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Append an input source. A background task copies the source into
    /// the pty master for the lifetime of the console; source errors are
    /// swallowed (input sources are best-effort).
    pub fn stdin(mut self, source: impl Read + Send + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Append an extra closer, released by [`Console::close`] in reverse
    /// registration order.
    pub fn closer(mut self, closer: impl FnOnce() -> io::Result<()> + Send + 'static) -> Self {
        self.closers.push(Box::new(closer));
        self
    }

    /// Timeout applied to every expect call that does not set its own.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Register an expect observer. May be called multiple times; all
    /// observers run, in registration order, exactly once per expect
    /// call.
    pub fn expect_observer(
        mut self,
        observer: impl Fn(&[Matcher], &str, Option<&ExpectError>) + Send + Sync + 'static,
    ) -> Self {
        self.expect_observers.push(Box::new(observer));
        self
    }

    /// Register a send observer. May be called multiple times; all
    /// observers run, in registration order, exactly once per send.
    pub fn send_observer(
        mut self,
        observer: impl Fn(&str, usize, Option<&ExpectError>) + Send + Sync + 'static,
    ) -> Self {
        self.send_observers.push(Box::new(observer));
        self
    }

    /// Register an expect filter wrapping the match-side read stream.
    /// Filters compose in registration order (the first registered sits
    /// closest to the pty). The match buffer, the sinks and the observers
    /// all see the filtered bytes.
    pub fn expect_filter(
        mut self,
        filter: impl FnOnce(Box<dyn Read + Send>) -> Box<dyn Read + Send> + Send + 'static,
    ) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Pty dimensions presented to the child (default 24x80).
    pub fn winsize(mut self, rows: u16, cols: u16) -> Self {
        self.winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        self
    }

    /// Open the pty pair and assemble the console.
    pub fn build(self) -> Result<Console, ExpectError> {
        let pty = openpty(Some(&self.winsize), None)
            .map_err(|e| ExpectError::Io(io::Error::from_raw_os_error(e as i32)))?;

        let master = File::from(pty.master);
        let subordinate = File::from(pty.slave);

        // Byte-transparent subordinate: no echo of injected input, no
        // NL -> CRNL rewriting of child output. Canonical mode stays on
        // so line-reading children behave normally.
        let mut termios = tcgetattr(&subordinate)
            .map_err(|e| ExpectError::Io(io::Error::from_raw_os_error(e as i32)))?;
        termios.local_flags.remove(LocalFlags::ECHO);
        termios.output_flags.remove(OutputFlags::ONLCR);
        tcsetattr(&subordinate, SetArg::TCSANOW, &termios)
            .map_err(|e| ExpectError::Io(io::Error::from_raw_os_error(e as i32)))?;

        let pipe = PassthroughPipe::new(master.try_clone().map_err(ExpectError::Io)?);
        let mut stream: Box<dyn Read + Send> = Box::new(pipe.clone());
        for filter in self.filters {
            stream = filter(stream);
        }

        for source in self.sources {
            let writer = master.try_clone().map_err(ExpectError::Io)?;
            spawn_input_copier(source, writer);
        }

        debug!(
            rows = self.winsize.ws_row,
            cols = self.winsize.ws_col,
            "console opened"
        );

        Ok(Console {
            inner: Arc::new(Inner {
                subordinate: Mutex::new(Some(subordinate)),
                master: Mutex::new(Some(master)),
                stream: Mutex::new(StreamState {
                    reader: Utf8Reader::new(stream),
                }),
                pipe,
                sinks: Mutex::new(self.sinks),
                expect_observers: self.expect_observers,
                send_observers: self.send_observers,
                default_timeout: self.default_timeout,
                closers: Mutex::new(self.closers),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

fn spawn_input_copier(mut source: Box<dyn Read + Send>, mut master: File) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    trace!(error = %e, "stdin copier read ended");
                    break;
                }
            };
            if let Err(e) = master.write_all(&buf[..n]).and_then(|_| master.flush()) {
                trace!(error = %e, "stdin copier write ended");
                break;
            }
        }
    });
}
