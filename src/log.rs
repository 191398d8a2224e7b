//! Progress log shared by the action tree, the command runner and leaves.
//!
//! Lines look like `[build] all/shared/binutils/configure: running`. The
//! binary logs to stderr with a UTC timestamp; tests capture into a buffer.

use std::cell::RefCell;
use std::fmt::Display;
use std::io::{self, Write};
use std::rc::Rc;

use time::OffsetDateTime;

const TAG: &str = "build";

/// Cloneable handle to a line-oriented log sink.
#[derive(Clone)]
pub struct Log {
    sink: Rc<RefCell<Box<dyn Write>>>,
    timestamps: bool,
}

impl Log {
    /// Log to stderr, prefixing each line with the UTC time of day.
    pub fn stderr() -> Self {
        Self {
            sink: Rc::new(RefCell::new(Box::new(io::stderr()))),
            timestamps: true,
        }
    }

    /// Log into an in-memory buffer. Returns the log and a handle for reading it back.
    pub fn buffer() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let log = Self {
            sink: Rc::new(RefCell::new(Box::new(buffer.clone()))),
            timestamps: false,
        };
        (log, buffer)
    }

    /// Discard everything.
    pub fn discard() -> Self {
        Self {
            sink: Rc::new(RefCell::new(Box::new(io::sink()))),
            timestamps: false,
        }
    }

    /// Write one line. Write errors are ignored; a broken log must not fail a build.
    pub fn line(&self, message: impl Display) {
        let mut sink = self.sink.borrow_mut();
        let _ = if self.timestamps {
            writeln!(sink, "[{}] [{TAG}] {message}", now_utc_clock())
        } else {
            writeln!(sink, "[{TAG}] {message}")
        };
        let _ = sink.flush();
    }
}

/// In-memory log contents, shared with the [`Log`] that writes into it.
#[derive(Clone, Default)]
pub struct LogBuffer(Rc<RefCell<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn now_utc_clock() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:02}:{:02}:{:02}",
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_captures_tagged_lines() {
        let (log, buffer) = Log::buffer();
        log.line("first");
        log.clone().line(format_args!("second {}", 2));

        assert_eq!(buffer.lines(), vec!["[build] first", "[build] second 2"]);
    }

    #[test]
    fn test_clock_format() {
        let clock = now_utc_clock();
        assert_eq!(clock.len(), 8);
        assert_eq!(clock.matches(':').count(), 2);
    }
}
