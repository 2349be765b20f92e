//! Matchers evaluated against the accumulated output buffer

mod search;

use search::Needle;
use std::fmt;

/// A condition on the output accumulated during one expect call.
///
/// `String`, `Regex` and `Custom` are evaluated against the growing match
/// buffer after every rune read; `Eof` and `PtyClosed` are stream-terminal
/// conditions, matched only when the read stream itself ends. When several
/// matchers would hit on the same buffer, the one listed first in the call
/// wins.
///
/// # Examples
///
/// ```
/// use ptyexpect::Matcher;
///
/// let prompt = Matcher::string("password: ");
/// let digits = Matcher::regex(r"\d+").unwrap();
/// let bell = Matcher::custom(|buf| buf.contains(&0x07));
/// let done = Matcher::Eof;
/// ```
pub enum Matcher {
    /// Buffer contains the given byte sequence as a substring
    /// (case-sensitive, byte-wise).
    String(StringMatch),

    /// Buffer matches the regular expression. The regex runs over the raw
    /// bytes, so output containing invalid UTF-8 still matches correctly.
    /// Capture groups are not surfaced; the contract is hit or no hit.
    Regex(RegexMatch),

    /// The read stream yielded end-of-stream.
    Eof,

    /// The read stream failed because the pty subordinate was closed
    /// (`EIO` from the master). Used to cleanly end expect loops after the
    /// child exits.
    PtyClosed,

    /// A caller-supplied predicate over the raw buffer.
    Custom(CustomMatch),
}

/// Payload of [`Matcher::String`]; build with [`Matcher::string`].
pub struct StringMatch {
    needle: Needle,
}

/// Payload of [`Matcher::Regex`]; build with [`Matcher::regex`].
pub struct RegexMatch {
    re: regex::bytes::Regex,
}

/// Payload of [`Matcher::Custom`]; build with [`Matcher::custom`].
pub struct CustomMatch {
    pred: Box<dyn Fn(&[u8]) -> bool + Send + Sync>,
}

impl Matcher {
    /// A substring matcher.
    pub fn string(s: impl Into<String>) -> Self {
        Matcher::String(StringMatch {
            needle: Needle::new(s.into().into_bytes()),
        })
    }

    /// A regex matcher. Fails if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Regex(RegexMatch {
            re: regex::bytes::Regex::new(pattern)?,
        }))
    }

    /// A matcher from an arbitrary predicate over the raw buffer.
    pub fn custom(pred: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Custom(CustomMatch {
            pred: Box::new(pred),
        })
    }

    /// Human-readable description of what this matcher waits for, used in
    /// error messages and observer diagnostics.
    pub fn criteria(&self) -> String {
        match self {
            Matcher::String(m) => format!("{:?}", String::from_utf8_lossy(m.needle.as_bytes())),
            Matcher::Regex(m) => format!("/{}/", m.re.as_str()),
            Matcher::Eof => "EOF".to_string(),
            Matcher::PtyClosed => "PTY closed".to_string(),
            Matcher::Custom(_) => "custom predicate".to_string(),
        }
    }

    /// Evaluate this matcher against the current buffer. Stream-terminal
    /// matchers never match on buffer contents.
    pub(crate) fn matches(&self, buffer: &[u8]) -> bool {
        match self {
            Matcher::String(m) => m.needle.found_in(buffer),
            Matcher::Regex(m) => m.re.is_match(buffer),
            Matcher::Custom(m) => (m.pred)(buffer),
            Matcher::Eof | Matcher::PtyClosed => false,
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::String(_) => write!(f, "Matcher::String({})", self.criteria()),
            Matcher::Regex(_) => write!(f, "Matcher::Regex({})", self.criteria()),
            Matcher::Eof => write!(f, "Matcher::Eof"),
            Matcher::PtyClosed => write!(f, "Matcher::PtyClosed"),
            Matcher::Custom(_) => write!(f, "Matcher::Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_matcher_is_substring() {
        let m = Matcher::string("1+1");
        assert!(m.matches(b"What is 1+1?: "));
        assert!(!m.matches(b"What is 1+2?: "));
    }

    #[test]
    fn string_matcher_is_byte_wise() {
        let m = Matcher::string("naïve");
        assert!(m.matches("a naïve question".as_bytes()));
        // A stray prefix of the multi-byte sequence is not a hit.
        assert!(!m.matches(b"na\xc3 ve"));
    }

    #[test]
    fn regex_matcher_on_raw_bytes() {
        let m = Matcher::regex(r"\d+ items").unwrap();
        assert!(m.matches(b"\xFF\xFE 42 items"));
        assert!(!m.matches(b"no items"));
    }

    #[test]
    fn custom_matcher_sees_raw_buffer() {
        let m = Matcher::custom(|buf| buf.len() >= 4);
        assert!(!m.matches(b"abc"));
        assert!(m.matches(b"abcd"));
    }

    #[test]
    fn terminal_matchers_never_match_buffer() {
        assert!(!Matcher::Eof.matches(b"anything"));
        assert!(!Matcher::PtyClosed.matches(b"anything"));
    }

    #[test]
    fn criteria_strings() {
        assert_eq!(Matcher::string("abc").criteria(), "\"abc\"");
        assert_eq!(Matcher::regex(r"\d+").unwrap().criteria(), r"/\d+/");
        assert_eq!(Matcher::Eof.criteria(), "EOF");
        assert_eq!(Matcher::PtyClosed.criteria(), "PTY closed");
        assert_eq!(Matcher::custom(|_| true).criteria(), "custom predicate");
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(Matcher::regex("(unclosed").is_err());
    }
}
