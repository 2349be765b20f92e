//! Fan-out of one byte stream to independently cancellable readers

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::{self, Read};
use std::sync::Mutex;

/// Demultiplexes one upstream reader into per-consumer readers.
///
/// [`mux`](ReaderMux::mux) runs on a background task, reading the upstream
/// one byte at a time and publishing each byte to a single shared channel.
/// Every [`reader`](ReaderMux::reader) call produces an independent
/// consumer tied to a [`ReadScope`]; bytes go to at most one consumer, and
/// cancelling a scope releases only its readers. A cancelled consumer's
/// pending take is abandoned without a byte being consumed.
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::{ReaderMux, ReadScope};
/// use std::io::Read;
///
/// # fn example(upstream: std::fs::File) -> std::io::Result<()> {
/// let mux = std::sync::Arc::new(ReaderMux::new(upstream));
///
/// let runner = std::sync::Arc::clone(&mux);
/// std::thread::spawn(move || {
///     let _ = runner.mux();
/// });
///
/// let scope = ReadScope::new();
/// let mut reader = mux.reader(&scope);
/// let mut b = [0u8; 1];
/// while reader.read(&mut b)? == 1 {
///     print!("{}", b[0] as char);
/// }
/// scope.cancel();
/// # Ok(())
/// # }
/// ```
pub struct ReaderMux {
    upstream: Mutex<Box<dyn Read + Send>>,
    byte_tx: Sender<u8>,
    byte_rx: Receiver<u8>,
}

impl ReaderMux {
    /// Wrap `upstream` for demultiplexing. The byte channel is a
    /// rendezvous: [`mux`](ReaderMux::mux) blocks until some consumer
    /// takes each byte.
    pub fn new(upstream: impl Read + Send + 'static) -> Self {
        let (byte_tx, byte_rx) = bounded(0);
        ReaderMux {
            upstream: Mutex::new(Box::new(upstream)),
            byte_tx,
            byte_rx,
        }
    }

    /// Pump the upstream into the shared byte channel, one byte at a
    /// time. Runs until the upstream ends (`Ok(0)`, which is how
    /// `std::io::Read` spells end-of-stream) or fails, returning the
    /// failure. Intended to run on a dedicated background task.
    pub fn mux(&self) -> io::Result<()> {
        let mut upstream = self.upstream.lock().unwrap();
        let mut p = [0u8; 1];
        loop {
            match upstream.read(&mut p) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
            if self.byte_tx.send(p[0]).is_err() {
                return Ok(());
            }
        }
    }

    /// A new consumer of the shared byte channel, released when `scope`
    /// is cancelled.
    pub fn reader(&self, scope: &ReadScope) -> ScopedReader {
        ScopedReader {
            byte_rx: self.byte_rx.clone(),
            cancelled: scope.watch(),
        }
    }
}

/// Cancellation scope for [`ReaderMux`] consumers.
///
/// Readers tied to a scope yield end-of-stream once
/// [`cancel`](ReadScope::cancel) is called (or the scope is dropped);
/// other scopes' readers are unaffected.
pub struct ReadScope {
    // Dropping the sender is the cancellation signal; nothing is sent.
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
}

impl ReadScope {
    /// A fresh, uncancelled scope.
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = bounded(0);
        ReadScope {
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx,
        }
    }

    /// Cancel the scope. Idempotent; all readers tied to it yield
    /// end-of-stream from now on.
    pub fn cancel(&self) {
        self.cancel_tx.lock().unwrap().take();
    }

    fn watch(&self) -> Receiver<()> {
        self.cancel_rx.clone()
    }
}

impl Default for ReadScope {
    fn default() -> Self {
        Self::new()
    }
}

/// A consumer handle produced by [`ReaderMux::reader`].
pub struct ScopedReader {
    byte_rx: Receiver<u8>,
    cancelled: Receiver<()>,
}

impl Read for ScopedReader {
    /// Delivers exactly one byte per call, or `Ok(0)` once the scope is
    /// cancelled. A zero-length destination is an `InvalidInput` error.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot read into empty buffer",
            ));
        }

        crossbeam_channel::select! {
            recv(self.cancelled) -> _ => Ok(0),
            recv(self.byte_rx) -> byte => match byte {
                Ok(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                // Mux side gone; nothing more will ever arrive.
                Err(_) => Ok(0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::Arc;
    use std::time::Duration;

    struct FeedReader {
        rx: Receiver<Vec<u8>>,
        pending: Vec<u8>,
    }

    fn feed_pair() -> (Sender<Vec<u8>>, FeedReader) {
        let (tx, rx) = unbounded();
        (
            tx,
            FeedReader {
                rx,
                pending: Vec::new(),
            },
        )
    }

    impl Read for FeedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.rx.recv() {
                    Ok(data) => self.pending = data,
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    fn read_exact_bytes(reader: &mut ScopedReader, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut b = [0u8; 1];
        for _ in 0..len {
            assert_eq!(reader.read(&mut b).unwrap(), 1);
            out.push(b[0]);
        }
        out
    }

    #[test]
    fn sequential_scopes_steal_no_bytes() {
        let (tx, upstream) = feed_pair();
        let mux = Arc::new(ReaderMux::new(upstream));

        let runner = Arc::clone(&mux);
        std::thread::spawn(move || {
            let _ = runner.mux();
        });

        for word in [&b"apple"[..], &b"banana"[..]] {
            let scope = ReadScope::new();
            let mut reader = mux.reader(&scope);

            tx.send(word.to_vec()).unwrap();
            assert_eq!(read_exact_bytes(&mut reader, word.len()), word);

            scope.cancel();
            let mut b = [0u8; 1];
            assert_eq!(reader.read(&mut b).unwrap(), 0);
        }
    }

    #[test]
    fn cancel_releases_only_that_scope() {
        let (tx, upstream) = feed_pair();
        let mux = Arc::new(ReaderMux::new(upstream));

        let runner = Arc::clone(&mux);
        std::thread::spawn(move || {
            let _ = runner.mux();
        });

        let live = ReadScope::new();
        let doomed = ReadScope::new();
        let mut live_reader = mux.reader(&live);
        let mut doomed_reader = mux.reader(&doomed);

        doomed.cancel();
        let mut b = [0u8; 1];
        assert_eq!(doomed_reader.read(&mut b).unwrap(), 0);

        tx.send(b"z".to_vec()).unwrap();
        assert_eq!(live_reader.read(&mut b).unwrap(), 1);
        assert_eq!(b[0], b'z');
    }

    #[test]
    fn cancelled_take_consumes_nothing() {
        let (tx, upstream) = feed_pair();
        let mux = Arc::new(ReaderMux::new(upstream));

        let runner = Arc::clone(&mux);
        std::thread::spawn(move || {
            let _ = runner.mux();
        });

        // A consumer blocks waiting for a byte, then its scope cancels
        // before anything arrives.
        let scope = ReadScope::new();
        let mut reader = mux.reader(&scope);
        let waiter = std::thread::spawn(move || {
            let mut b = [0u8; 1];
            reader.read(&mut b).unwrap()
        });
        std::thread::sleep(Duration::from_millis(50));
        scope.cancel();
        assert_eq!(waiter.join().unwrap(), 0);

        // The byte it never took is still there for the next scope.
        tx.send(b"q".to_vec()).unwrap();
        let scope2 = ReadScope::new();
        let mut reader2 = mux.reader(&scope2);
        let mut b = [0u8; 1];
        assert_eq!(reader2.read(&mut b).unwrap(), 1);
        assert_eq!(b[0], b'q');
    }

    #[test]
    fn zero_length_destination_fails() {
        let (_tx, upstream) = feed_pair();
        let mux = ReaderMux::new(upstream);
        let scope = ReadScope::new();
        let mut reader = mux.reader(&scope);

        let err = reader.read(&mut []).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn mux_returns_upstream_error() {
        struct FailReader;
        impl Read for FailReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("upstream broke"))
            }
        }

        let mux = ReaderMux::new(FailReader);
        let err = mux.mux().unwrap_err();
        assert_eq!(err.to_string(), "upstream broke");
    }
}
