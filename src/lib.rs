//! ptyexpect: expect-style automation of terminal programs
//!
//! ptyexpect automates interaction with terminal-oriented programs. It
//! owns a pseudoterminal (pty) pair and hands you both sides of the
//! conversation: the child process attaches to the subordinate end and
//! behaves exactly as if a human were at a terminal, while your code
//! drives the master end, waiting for expected output patterns and
//! injecting scripted input.
//!
//! Unlike the classic `expect` utility, this library does **not** spawn
//! or manage the child process. You wire [`Console::tty`] into your own
//! `std::process::Command` (or anything else that accepts a file); the
//! library only provides the pty endpoints and the automation around
//! them. Unix only.
//!
//! # Features
//!
//! - **No process management**: bring your own child; test the
//!   interaction separately from how you launch.
//! - **First-match-wins matching**: literal strings (byte-wise
//!   Boyer-Moore-Horspool), regexes over raw bytes, end-of-stream,
//!   pty-closed, and custom predicates.
//! - **No over-read**: matching consumes the stream one UTF-8 scalar at
//!   a time and stops at the match, so consecutive expect calls see
//!   every byte exactly once.
//! - **Deadline-based timeouts**: a single absolute deadline per expect
//!   call, enforced by a timed channel wait rather than sleep polling,
//!   never dropping in-flight bytes.
//! - **Sinks, observers, filters**: tee output to any writers, observe
//!   every expect/send for diagnostics, and transform the match stream
//!   (e.g. mask secrets) before anything downstream sees it.
//!
//! # Quick start
//!
//! ```no_run
//! use ptyexpect::Console;
//! use std::process::{Command, Stdio};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let console = Console::builder()
//!         .stdout(std::io::stdout())
//!         .default_timeout(Duration::from_secs(10))
//!         .build()?;
//!
//!     let mut child = Command::new("python3")
//!         .arg("-i")
//!         .stdin(Stdio::from(console.tty()?))
//!         .stdout(Stdio::from(console.tty()?))
//!         .stderr(Stdio::from(console.tty()?))
//!         .spawn()?;
//!
//!     console.expect_string(">>> ").await?;
//!     console.send_line("print('Hello, World!')").await?;
//!     console.expect_string("Hello, World!").await?;
//!
//!     console.send_line("exit()").await?;
//!     child.wait()?;
//!     console.close_tty()?;
//!     console.expect_eof().await?;
//!     console.close()?;
//!     Ok(())
//! }
//! ```
//!
//! # Waiting on several conditions
//!
//! ```no_run
//! use ptyexpect::{Console, Matcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let console = Console::new()?;
//! let result = console
//!     .expect(vec![
//!         Matcher::string("login:"),
//!         Matcher::regex(r"error: \w+")?,
//!         Matcher::Eof,
//!     ])
//!     .await?;
//!
//! match result.matcher_index {
//!     0 => { /* answer the login prompt */ }
//!     1 => { /* inspect result.buffer */ }
//!     2 => { /* program exited */ }
//!     _ => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! When several matchers would hit on the same output, the one listed
//! first wins. Stream-terminal matchers ([`Matcher::Eof`],
//! [`Matcher::PtyClosed`]) beat pending string matchers once the stream
//! ends: no further bytes will arrive.
//!
//! # Masking sensitive output
//!
//! Expect filters wrap the match-side stream; the match buffer, sinks
//! and observers all see the filtered bytes, so a masked secret never
//! reaches diagnostics:
//!
//! ```no_run
//! use ptyexpect::Console;
//! use std::io::Read;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let console = Console::builder()
//!     .expect_filter(|inner| {
//!         Box::new(MaskDigits { inner })
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//!
//! struct MaskDigits { inner: Box<dyn Read + Send> }
//!
//! impl Read for MaskDigits {
//!     fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
//!         let n = self.inner.read(buf)?;
//!         for b in &mut buf[..n] {
//!             if b.is_ascii_digit() {
//!                 *b = b'*';
//!             }
//!         }
//!         Ok(n)
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod console;
mod matcher;
mod mux;
mod pipe;
mod result;
pub mod testlog;

pub use console::{
    Closer, Console, ConsoleBuilder, ExpectFilter, ExpectObserver, ExpectOpts, SendObserver,
};
pub use matcher::{CustomMatch, Matcher, RegexMatch, StringMatch};
pub use mux::{ReadScope, ReaderMux, ScopedReader};
pub use pipe::PassthroughPipe;
pub use result::{ExpectError, MatchResult};
