//! Log tailer: turns raw process output into ordered `LogRecord`s.
//!
//! - `line_buffer` - chunk to line splitting with a length cap
//! - `journal` - best-effort journal JSON decoding

mod journal;
mod line_buffer;

pub use journal::parse_line;
pub use line_buffer::{Line, LineSplitter};

use hostctl_core::{LogRecord, Severity, TRUNCATED_MARKER, now_millis};
use tracing::debug;

use crate::broadcast::Broadcast;
use crate::process::{OutputStream, ProcessOutput};

/// Turn one line into a record, or `None` for blank lines.
///
/// stdout lines go through the journal decoder; stderr lines are always raw
/// and flagged as warnings so errors from the tailing tool itself stay
/// visible.
pub fn decode_line(
    line: Line,
    stream: OutputStream,
    source: &str,
    now_ms: u64,
) -> Option<LogRecord> {
    let (bytes, truncated) = match line {
        Line::Complete(bytes) => (bytes, false),
        Line::Truncated(bytes) => (bytes, true),
    };
    let text = String::from_utf8_lossy(&bytes);
    if text.trim().is_empty() {
        return None;
    }

    if truncated {
        let severity = match stream {
            OutputStream::Stdout => Severity::INFO,
            OutputStream::Stderr => Severity::WARNING,
        };
        return Some(LogRecord::new(
            now_ms,
            format!("{text}{TRUNCATED_MARKER}"),
            source,
            severity,
        ));
    }

    match stream {
        OutputStream::Stdout => Some(parse_line(&text, source, now_ms).into_record()),
        OutputStream::Stderr => Some(LogRecord::new(now_ms, text, source, Severity::WARNING)),
    }
}

/// Drives one process's output into one broadcast channel.
pub struct LogTailer {
    source: String,
    max_line_bytes: usize,
    channel: Broadcast<LogRecord>,
}

impl LogTailer {
    pub fn new(
        source: impl Into<String>,
        max_line_bytes: usize,
        channel: Broadcast<LogRecord>,
    ) -> Self {
        Self {
            source: source.into(),
            max_line_bytes,
            channel,
        }
    }

    /// Read until the process output ends, then close the channel.
    ///
    /// Returns the number of records published.
    pub async fn run(self, mut output: ProcessOutput) -> u64 {
        let mut stdout = LineSplitter::new(self.max_line_bytes);
        let mut stderr = LineSplitter::new(self.max_line_bytes);
        let mut published = 0u64;

        while let Some(chunk) = output.recv().await {
            let splitter = match chunk.stream {
                OutputStream::Stdout => &mut stdout,
                OutputStream::Stderr => &mut stderr,
            };
            for line in splitter.push(&chunk.data) {
                published += u64::from(self.emit(line, chunk.stream));
            }
        }

        if let Some(line) = stdout.finish() {
            published += u64::from(self.emit(line, OutputStream::Stdout));
        }
        if let Some(line) = stderr.finish() {
            published += u64::from(self.emit(line, OutputStream::Stderr));
        }

        debug!(source = %self.source, published, "Log source ended");
        self.channel.close();
        published
    }

    fn emit(&self, line: Line, stream: OutputStream) -> bool {
        match decode_line(line, stream, &self.source, now_millis()) {
            Some(record) => {
                self.channel.publish(record);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{IoMode, ProcessHandle, SpawnSpec};
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn blank_lines_are_dropped() {
        assert!(decode_line(Line::Complete(b"   ".to_vec()), OutputStream::Stdout, "s", 1).is_none());
    }

    #[test]
    fn truncated_lines_carry_marker() {
        let record = decode_line(Line::Truncated(b"abcd".to_vec()), OutputStream::Stdout, "s", 1).unwrap();
        assert_eq!(record.message, format!("abcd{TRUNCATED_MARKER}"));
    }

    #[test]
    fn stderr_lines_are_warnings() {
        let record = decode_line(
            Line::Complete(b"tail: cannot open 'x' for reading".to_vec()),
            OutputStream::Stderr,
            "nginx",
            1,
        )
        .unwrap();
        assert_eq!(record.severity, Severity::WARNING);
        assert_eq!(record.source, "nginx");
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let record = decode_line(Line::Complete(vec![b'o', b'k', 0xFF]), OutputStream::Stdout, "s", 1).unwrap();
        assert_eq!(record.message, "ok\u{FFFD}");
    }

    #[tokio::test]
    async fn tails_process_output_in_order_and_closes() {
        let handle = ProcessHandle::spawn(
            SpawnSpec::new("printf", ["2024-01-01T00:00:00Z hello\n\nsecond\npartial"]),
            IoMode::Pipes,
            64 * 1024,
        )
        .unwrap();
        let channel = Broadcast::new(64, 0);
        let mut sub = channel.subscribe();
        let tailer = LogTailer::new("demo", 1024, channel.clone());

        let published = tailer.run(handle.take_output().unwrap()).await;
        assert_eq!(published, 3);
        assert!(channel.is_closed());

        let mut messages = Vec::new();
        while let Some(item) = timeout(Duration::from_secs(1), sub.recv()).await.unwrap() {
            messages.push(item.unwrap().message);
        }
        assert_eq!(messages, vec!["2024-01-01T00:00:00Z hello", "second", "partial"]);
    }
}
