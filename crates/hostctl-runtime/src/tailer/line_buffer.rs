//! Byte-level line splitting with a hard length cap.
//!
//! Process output arrives in arbitrary chunks. Partial lines are carried over
//! to the next chunk; a line that grows beyond the cap is emitted once,
//! truncated, and the rest of it is skipped up to the next newline.

/// One line cut from the output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Complete(Vec<u8>),
    /// The first `max_line_bytes` (rounded down to a UTF-8 boundary) of an
    /// over-long line
    Truncated(Vec<u8>),
}

#[derive(Debug)]
pub struct LineSplitter {
    buf: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

impl LineSplitter {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Feed a chunk, returning every line it completed.
    pub fn push(&mut self, mut data: &[u8]) -> Vec<Line> {
        let mut lines = Vec::new();
        while !data.is_empty() {
            if let Some(pos) = data.iter().position(|b| *b == b'\n') {
                let (segment, rest) = data.split_at(pos);
                data = &rest[1..];
                if self.discarding {
                    self.discarding = false;
                    self.buf.clear();
                    continue;
                }
                self.buf.extend_from_slice(segment);
                lines.push(self.take_line());
            } else {
                if !self.discarding {
                    self.buf.extend_from_slice(data);
                    if self.buf.len() > self.max_line_bytes {
                        lines.push(self.take_truncated());
                        self.discarding = true;
                    }
                }
                break;
            }
        }
        lines
    }

    /// Flush a trailing partial line at end of stream.
    pub fn finish(&mut self) -> Option<Line> {
        if self.discarding {
            self.discarding = false;
            self.buf.clear();
            return None;
        }
        if self.buf.is_empty() {
            return None;
        }
        Some(self.take_line())
    }

    fn take_line(&mut self) -> Line {
        if self.buf.len() > self.max_line_bytes {
            return self.take_truncated();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Line::Complete(std::mem::take(&mut self.buf))
    }

    fn take_truncated(&mut self) -> Line {
        let mut cut = self.max_line_bytes;
        while cut > 0 && is_continuation(self.buf[cut]) {
            cut -= 1;
        }
        self.buf.truncate(cut);
        Line::Truncated(std::mem::take(&mut self.buf))
    }
}

const fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(s: &str) -> Line {
        Line::Complete(s.as_bytes().to_vec())
    }

    #[test]
    fn carries_partial_lines_across_chunks() {
        let mut splitter = LineSplitter::new(1024);
        assert!(splitter.push(b"hel").is_empty());
        assert_eq!(splitter.push(b"lo\nwor"), vec![complete("hello")]);
        assert_eq!(splitter.push(b"ld\r\n\n"), vec![complete("world"), complete("")]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn finish_flushes_trailing_partial() {
        let mut splitter = LineSplitter::new(1024);
        splitter.push(b"no newline");
        assert_eq!(splitter.finish(), Some(complete("no newline")));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn overlong_line_is_truncated_once() {
        let mut splitter = LineSplitter::new(4);
        let lines = splitter.push(b"abcdefgh");
        assert_eq!(lines, vec![Line::Truncated(b"abcd".to_vec())]);
        // Remainder of the same line is skipped
        assert!(splitter.push(b"ijkl").is_empty());
        assert_eq!(splitter.push(b"mn\nok\n"), vec![complete("ok")]);
    }

    #[test]
    fn overlong_line_in_one_chunk() {
        let mut splitter = LineSplitter::new(4);
        let lines = splitter.push(b"abcdefgh\nxy\n");
        assert_eq!(lines, vec![Line::Truncated(b"abcd".to_vec()), complete("xy")]);
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut splitter = LineSplitter::new(4);
        // 'é' is two bytes starting at index 3
        let lines = splitter.push("abcé-tail\n".as_bytes());
        assert_eq!(lines, vec![Line::Truncated(b"abc".to_vec())]);
    }
}
