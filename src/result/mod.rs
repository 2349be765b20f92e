//! Result types for expect operations

mod error;

pub use error::ExpectError;

/// Result of a successful expect call.
///
/// Contains everything read from the stream during the call and the index
/// of the matcher that hit first.
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::{Console, Matcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let console = Console::new()?;
/// let result = console
///     .expect(vec![Matcher::string("$ "), Matcher::Eof])
///     .await?;
///
/// match result.matcher_index {
///     0 => println!("got a prompt, output so far: {}", result.buffer),
///     1 => println!("program exited"),
///     _ => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Everything read from the stream during this expect call, up to and
    /// including the bytes that completed the match. Invalid UTF-8 is
    /// rendered with replacement characters; matching itself is byte-wise.
    pub buffer: String,

    /// Index into the matcher list passed to the call, identifying which
    /// matcher hit first.
    pub matcher_index: usize,
}
