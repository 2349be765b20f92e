//! Rune-at-a-time UTF-8 decoding over a byte stream

use std::collections::VecDeque;
use std::io::{self, Read};

/// One decoded scalar together with the raw bytes it was decoded from.
///
/// For well-formed input `ch` and `as_bytes()` agree; for malformed input
/// `ch` is U+FFFD while `as_bytes()` is the single offending byte, so
/// downstream writers always see the stream verbatim.
pub(crate) struct DecodedChar {
    pub ch: char,
    bytes: [u8; 4],
    len: u8,
}

impl DecodedChar {
    fn valid(ch: char, raw: &[u8]) -> Self {
        let mut bytes = [0u8; 4];
        bytes[..raw.len()].copy_from_slice(raw);
        DecodedChar {
            ch,
            bytes,
            len: raw.len() as u8,
        }
    }

    fn invalid(byte: u8) -> Self {
        DecodedChar {
            ch: char::REPLACEMENT_CHARACTER,
            bytes: [byte, 0, 0, 0],
            len: 1,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Reads one UTF-8 scalar at a time, never consuming bytes beyond the
/// current scalar. A partial multi-byte sequence interrupted by a read
/// error (e.g. a deadline) is held and resumed on the next call, so no
/// byte is lost and matching only ever sees whole scalars. Malformed
/// bytes are yielded one at a time as U+FFFD.
pub(crate) struct Utf8Reader<R> {
    inner: R,
    pending: VecDeque<u8>,
}

impl<R: Read> Utf8Reader<R> {
    pub fn new(inner: R) -> Self {
        Utf8Reader {
            inner,
            pending: VecDeque::new(),
        }
    }

    /// Next scalar, or `None` at end of stream. Errors from the
    /// underlying reader propagate verbatim; held bytes survive them.
    pub fn read_char(&mut self) -> io::Result<Option<DecodedChar>> {
        if self.pending.is_empty() {
            match self.read_byte()? {
                Some(b) => self.pending.push_back(b),
                None => return Ok(None),
            }
        }

        let lead = self.pending[0];
        let need = match utf8_len(lead) {
            Some(n) => n,
            None => {
                self.pending.pop_front();
                return Ok(Some(DecodedChar::invalid(lead)));
            }
        };
        if need == 1 {
            self.pending.pop_front();
            return Ok(Some(DecodedChar::valid(lead as char, &[lead])));
        }

        while self.pending.len() < need {
            match self.read_byte()? {
                Some(b) => self.pending.push_back(b),
                // Stream ended mid-sequence: flush the bytes singly.
                None => {
                    let b = self.pending.pop_front().expect("pending lead byte");
                    return Ok(Some(DecodedChar::invalid(b)));
                }
            }
        }

        let mut raw = [0u8; 4];
        for (i, slot) in raw.iter_mut().enumerate().take(need) {
            *slot = self.pending[i];
        }
        match std::str::from_utf8(&raw[..need]) {
            Ok(s) => {
                let ch = s.chars().next().expect("validated scalar");
                for _ in 0..need {
                    self.pending.pop_front();
                }
                Ok(Some(DecodedChar::valid(ch, &raw[..need])))
            }
            Err(_) => {
                let b = self.pending.pop_front().expect("pending lead byte");
                Ok(Some(DecodedChar::invalid(b)))
            }
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut b = [0u8; 1];
        match self.inner.read(&mut b)? {
            0 => Ok(None),
            _ => Ok(Some(b[0])),
        }
    }
}

/// Sequence length implied by a lead byte; `None` for bytes that cannot
/// start a scalar.
fn utf8_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F => Some(1),
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}
