//! Routing console output into line-oriented test loggers

use std::io::{self, Write};

/// An output sink that forwards each completed line to a caller-provided
/// logger.
///
/// Console sinks receive bytes one scalar at a time and are flushed
/// constantly; handing a test framework's logger straight to
/// [`ConsoleBuilder::stdout`](crate::ConsoleBuilder::stdout) would
/// interleave concurrent tests' outputs at byte granularity. This writer
/// buffers until a newline and forwards whole lines (end-of-line bytes
/// stripped), so parallel tests interleave at line granularity. Any
/// unterminated remainder is forwarded when the writer is dropped.
///
/// # Examples
///
/// ```no_run
/// use ptyexpect::{testlog::LogLineWriter, Console};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let console = Console::builder()
///     .stdout(LogLineWriter::new(|line| println!("child: {line}")))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct LogLineWriter {
    line: Vec<u8>,
    logger: Box<dyn FnMut(&str) + Send>,
}

impl LogLineWriter {
    /// A writer forwarding completed lines to `logger`.
    pub fn new(logger: impl FnMut(&str) + Send + 'static) -> Self {
        LogLineWriter {
            line: Vec::new(),
            logger: Box::new(logger),
        }
    }

    fn emit_line(&mut self) {
        if self.line.last() == Some(&b'\r') {
            self.line.pop();
        }
        let text = String::from_utf8_lossy(&self.line).into_owned();
        (self.logger)(&text);
        self.line.clear();
    }
}

impl Write for LogLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            if b == b'\n' {
                self.emit_line();
            } else {
                self.line.push(b);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Deliberately not forwarding partial lines: the console flushes
        // sinks after every scalar.
        Ok(())
    }
}

impl Drop for LogLineWriter {
    fn drop(&mut self) {
        if !self.line.is_empty() {
            self.emit_line();
        }
    }
}

/// Strip trailing whitespace-only lines from a multi-line string. Useful
/// when the host logger inserts blank lines of its own around captured
/// output.
pub fn trim_trailing_blank_lines(s: &str) -> String {
    let mut lines: Vec<&str> = s.split('\n').collect();
    while let Some(last) = lines.last() {
        if last.trim().is_empty() && lines.len() > 1 {
            lines.pop();
        } else {
            break;
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<String>>>, LogLineWriter) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let writer = LogLineWriter::new(move |line| sink.lock().unwrap().push(line.to_string()));
        (lines, writer)
    }

    #[test]
    fn forwards_lines_on_newline() {
        let (lines, mut writer) = collector();

        writer.write_all(b"hel").unwrap();
        writer.flush().unwrap();
        assert!(lines.lock().unwrap().is_empty());

        writer.write_all(b"lo\nwor").unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["hello"]);

        writer.write_all(b"ld\n").unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn strips_carriage_returns() {
        let (lines, mut writer) = collector();
        writer.write_all(b"prompt\r\n").unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["prompt"]);
    }

    #[test]
    fn remainder_forwarded_on_drop() {
        let (lines, mut writer) = collector();
        writer.write_all(b"no newline").unwrap();
        drop(writer);
        assert_eq!(*lines.lock().unwrap(), vec!["no newline"]);
    }

    #[test]
    fn byte_at_a_time_writes_stay_line_granular() {
        let (lines, mut writer) = collector();
        for b in b"a\nb\n" {
            writer.write_all(&[*b]).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(*lines.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn trims_trailing_blank_lines() {
        assert_eq!(trim_trailing_blank_lines("a\nb\n\n  \n"), "a\nb");
        assert_eq!(trim_trailing_blank_lines("single"), "single");
        assert_eq!(trim_trailing_blank_lines("keep\n\ninner\n"), "keep\n\ninner");
        assert_eq!(trim_trailing_blank_lines(""), "");
        assert_eq!(trim_trailing_blank_lines("   "), "   ");
    }
}
