//! Deadline-capable wrapper around a blocking byte stream

use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::trace;

const COPY_CHUNK: usize = 4096;
const CHANNEL_DEPTH: usize = 32;

/// Wraps a reader so that reads honor a settable deadline without losing
/// bytes that are already in flight.
///
/// A background thread continuously copies the upstream reader into an
/// internal channel; handle reads drain that channel and fail with an
/// [`io::ErrorKind::TimedOut`] error once the deadline expires. Bytes that
/// arrive while no read is pending stay buffered and are delivered to the
/// next read, so a timeout never drops data.
///
/// Once the upstream yields a terminal error, every read after the
/// buffered bytes drain returns that error rather than a generic
/// end-of-stream. A clean upstream end-of-stream yields `Ok(0)`.
///
/// The handle is cheaply cloneable; clones share the buffered bytes and
/// the deadline. [`Console`](crate::Console) keeps one clone for deadline
/// control while the filter chain owns another.
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::PassthroughPipe;
/// use std::io::Read;
/// use std::time::{Duration, Instant};
///
/// # fn example(upstream: std::fs::File) -> std::io::Result<()> {
/// let mut pipe = PassthroughPipe::new(upstream);
/// pipe.set_read_deadline(Some(Instant::now() + Duration::from_secs(1)));
///
/// let mut buf = [0u8; 64];
/// match pipe.read(&mut buf) {
///     Ok(n) => println!("read {} bytes", n),
///     Err(e) if e.kind() == std::io::ErrorKind::TimedOut => println!("deadline hit"),
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
pub struct PassthroughPipe {
    shared: Arc<Shared>,
}

struct Shared {
    data_rx: Receiver<io::Result<Vec<u8>>>,
    closed_rx: Receiver<()>,
    // Held only so dropping it on close wakes blocked reads; never sent on.
    closed_tx: Mutex<Option<Sender<()>>>,
    state: Mutex<State>,
}

struct State {
    leftover: VecDeque<u8>,
    deadline: Option<Instant>,
    terminal: Option<Terminal>,
    closed: bool,
}

enum Terminal {
    Eof,
    Error {
        raw: Option<i32>,
        kind: io::ErrorKind,
        msg: String,
    },
}

impl Terminal {
    fn from_error(e: &io::Error) -> Self {
        Terminal::Error {
            raw: e.raw_os_error(),
            kind: e.kind(),
            msg: e.to_string(),
        }
    }

    fn surface(&self) -> io::Result<usize> {
        match self {
            Terminal::Eof => Ok(0),
            Terminal::Error { raw: Some(code), .. } => Err(io::Error::from_raw_os_error(*code)),
            Terminal::Error { kind, msg, .. } => Err(io::Error::new(*kind, msg.clone())),
        }
    }
}

impl PassthroughPipe {
    /// Wrap `upstream`, spawning the background copier thread. The thread
    /// terminates when the upstream read returns end-of-stream or an
    /// error, or when every handle has been dropped.
    pub fn new(upstream: impl Read + Send + 'static) -> Self {
        let (data_tx, data_rx) = bounded(CHANNEL_DEPTH);
        let (closed_tx, closed_rx) = bounded(0);

        std::thread::spawn(move || copy_upstream(upstream, data_tx));

        PassthroughPipe {
            shared: Arc::new(Shared {
                data_rx,
                closed_rx,
                closed_tx: Mutex::new(Some(closed_tx)),
                state: Mutex::new(State {
                    leftover: VecDeque::new(),
                    deadline: None,
                    terminal: None,
                    closed: false,
                }),
            }),
        }
    }

    /// Set the deadline for subsequent reads; `None` clears it. The
    /// deadline only affects this handle side: upstream bytes keep
    /// accumulating and are never dropped.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.shared.state.lock().unwrap().deadline = deadline;
    }

    /// Close the handle. A read blocked on the pipe fails immediately
    /// (with the upstream's terminal error if one occurred, otherwise a
    /// closed-pipe error), as do all subsequent reads.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
        }
        // Disconnecting the channel wakes any read blocked in select.
        self.shared.closed_tx.lock().unwrap().take();
    }

    fn read_inner(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let deadline = {
                let mut state = self.shared.state.lock().unwrap();

                if let Some(deadline) = state.deadline {
                    if Instant::now() >= deadline {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "read deadline expired",
                        ));
                    }
                }
                if !state.leftover.is_empty() {
                    let n = buf.len().min(state.leftover.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = state.leftover.pop_front().unwrap();
                    }
                    return Ok(n);
                }
                if let Some(terminal) = &state.terminal {
                    return terminal.surface();
                }
                if state.closed {
                    return Err(closed_error());
                }
                state.deadline
            };

            // Wait without holding the state lock so close() and
            // set_read_deadline() stay responsive.
            let received = match deadline {
                Some(deadline) => crossbeam_channel::select! {
                    recv(self.shared.data_rx) -> msg => Some(msg),
                    recv(self.shared.closed_rx) -> _ => None,
                    default(deadline.saturating_duration_since(Instant::now())) => {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "read deadline expired",
                        ));
                    }
                },
                None => crossbeam_channel::select! {
                    recv(self.shared.data_rx) -> msg => Some(msg),
                    recv(self.shared.closed_rx) -> _ => None,
                },
            };

            let mut state = self.shared.state.lock().unwrap();
            match received {
                Some(Ok(Ok(chunk))) => state.leftover.extend(chunk),
                Some(Ok(Err(e))) => {
                    state.terminal = Some(Terminal::from_error(&e));
                    return Err(e);
                }
                // Copier finished cleanly and dropped its sender.
                Some(Err(_)) => {
                    if state.terminal.is_none() {
                        state.terminal = Some(Terminal::Eof);
                    }
                }
                // closed_rx disconnected by close().
                None => state.closed = true,
            }
        }
    }
}

impl Read for PassthroughPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf)
    }
}

impl Clone for PassthroughPipe {
    fn clone(&self) -> Self {
        PassthroughPipe {
            shared: Arc::clone(&self.shared),
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::other("read on closed passthrough pipe")
}

fn copy_upstream(mut upstream: impl Read, tx: Sender<io::Result<Vec<u8>>>) {
    let mut buf = [0u8; COPY_CHUNK];
    loop {
        match upstream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if tx.send(Ok(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                trace!(error = %e, "passthrough copier ended");
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io;
    use std::time::Duration;

    /// Blocks until fed bytes through a channel; disconnect is EOF. The
    /// test-side stand-in for a pty master.
    struct FeedReader {
        rx: Receiver<io::Result<Vec<u8>>>,
    }

    fn feed_pair() -> (Sender<io::Result<Vec<u8>>>, FeedReader) {
        let (tx, rx) = unbounded();
        (tx, FeedReader { rx })
    }

    impl Read for FeedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.rx.recv() {
                Ok(Ok(data)) => {
                    let n = buf.len().min(data.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn surfaces_upstream_error_not_eof() {
        let (tx, reader) = feed_pair();
        let pipe = PassthroughPipe::new(reader);
        pipe.set_read_deadline(Some(Instant::now() + Duration::from_secs(3600)));

        tx.send(Err(io::Error::other("pipe error"))).unwrap();
        drop(tx);

        let mut p = [0u8; 1];
        let err = pipe.clone().read(&mut p).unwrap_err();
        assert_eq!(err.to_string(), "pipe error");

        // The terminal error is sticky.
        let err = pipe.clone().read(&mut p).unwrap_err();
        assert_eq!(err.to_string(), "pipe error");
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let (tx, reader) = feed_pair();
        let pipe = PassthroughPipe::new(reader);
        pipe.set_read_deadline(Some(Instant::now()));

        tx.send(Ok(b"gibberish".to_vec())).unwrap();

        let mut p = [0u8; 1];
        let err = pipe.clone().read(&mut p).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn timeout_drops_no_bytes() {
        let (tx, reader) = feed_pair();
        let mut pipe = PassthroughPipe::new(reader);
        pipe.set_read_deadline(Some(Instant::now()));

        tx.send(Ok(b"kept".to_vec())).unwrap();

        let mut p = [0u8; 4];
        assert!(pipe.read(&mut p).is_err());

        // A fresh deadline sees the bytes that arrived during the timeout.
        pipe.set_read_deadline(Some(Instant::now() + Duration::from_secs(5)));
        let n = pipe.read(&mut p).unwrap();
        assert_eq!(&p[..n], b"kept");
    }

    #[test]
    fn buffered_bytes_delivered_before_terminal_error() {
        let (tx, reader) = feed_pair();
        let mut pipe = PassthroughPipe::new(reader);

        tx.send(Ok(b"abc".to_vec())).unwrap();
        tx.send(Err(io::Error::other("boom"))).unwrap();
        drop(tx);

        let mut p = [0u8; 2];
        assert_eq!(pipe.read(&mut p).unwrap(), 2);
        assert_eq!(&p[..2], b"ab");
        assert_eq!(pipe.read(&mut p).unwrap(), 1);
        assert_eq!(&p[..1], b"c");
        assert_eq!(pipe.read(&mut p).unwrap_err().to_string(), "boom");
    }

    #[test]
    fn clean_end_of_stream_is_ok_zero() {
        let (tx, reader) = feed_pair();
        let mut pipe = PassthroughPipe::new(reader);
        drop(tx);

        let mut p = [0u8; 1];
        assert_eq!(pipe.read(&mut p).unwrap(), 0);
        assert_eq!(pipe.read(&mut p).unwrap(), 0);
    }

    #[test]
    fn raw_os_error_survives_resurfacing() {
        let (tx, reader) = feed_pair();
        let pipe = PassthroughPipe::new(reader);

        tx.send(Err(io::Error::from_raw_os_error(nix::errno::Errno::EIO as i32)))
            .unwrap();
        drop(tx);

        let mut p = [0u8; 1];
        let first = pipe.clone().read(&mut p).unwrap_err();
        assert_eq!(first.raw_os_error(), Some(nix::errno::Errno::EIO as i32));
        let second = pipe.clone().read(&mut p).unwrap_err();
        assert_eq!(second.raw_os_error(), Some(nix::errno::Errno::EIO as i32));
    }

    #[test]
    fn close_wakes_a_blocked_read() {
        let (_tx, reader) = feed_pair();
        let pipe = PassthroughPipe::new(reader);

        let blocked = pipe.clone();
        let handle = std::thread::spawn(move || {
            let mut p = [0u8; 1];
            blocked.clone().read(&mut p)
        });

        std::thread::sleep(Duration::from_millis(50));
        pipe.close();

        let result = handle.join().unwrap();
        assert!(result.is_err());

        let mut p = [0u8; 1];
        assert!(pipe.clone().read(&mut p).is_err());
    }
}
