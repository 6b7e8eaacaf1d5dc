/// Splits a byte stream into ISO-8859-1 decoded lines. Accepts `\n`, `\r`
/// and `\r\n` terminators, including a `\r\n` pair split across chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
    max_line_bytes: Option<usize>,
    overflowed_bytes: usize,
    pending_cr: bool,
}

impl LineBuffer {
    pub fn new(max_line_bytes: Option<usize>) -> Self {
        Self {
            buffer: String::new(),
            max_line_bytes,
            overflowed_bytes: 0,
            pending_cr: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => lines.push(std::mem::take(&mut self.buffer)),
                b'\r' => {
                    lines.push(std::mem::take(&mut self.buffer));
                    self.pending_cr = true;
                }
                _ => {
                    if let Some(max) = self.max_line_bytes {
                        if self.buffer.len() >= max {
                            self.overflowed_bytes = self.overflowed_bytes.saturating_add(1);
                            continue;
                        }
                    }
                    // Latin-1 maps every byte to the code point of the same value.
                    self.buffer.push(char::from(byte));
                }
            }
        }
        lines
    }

    pub fn consume_overflowed_bytes(&mut self) -> usize {
        let value = self.overflowed_bytes;
        self.overflowed_bytes = 0;
        value
    }

    /// Returns the unterminated tail, if any.
    pub fn flush(&mut self) -> Option<String> {
        self.pending_cr = false;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LineBuffer;

    #[test]
    fn splits_mixed_newlines() {
        let mut buffer = LineBuffer::new(None);
        let lines = buffer.push(b"a\nb\r\nc\rd");
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(buffer.flush().as_deref(), Some("d"));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn crlf_split_across_chunks_yields_one_line() {
        let mut buffer = LineBuffer::new(None);
        assert_eq!(buffer.push(b"10, 20, A\r"), vec!["10, 20, A"]);
        assert_eq!(buffer.push(b"\n15, 25, B\n"), vec!["15, 25, B"]);
    }

    #[test]
    fn decodes_high_bytes_as_latin1() {
        let mut buffer = LineBuffer::new(None);
        let lines = buffer.push(&[b'G', 0xF6, b't', b'e', b'b', b'o', b'r', b'g', b'\n']);
        assert_eq!(lines, vec!["Göteborg"]);
    }

    #[test]
    fn truncates_lines_over_limit() {
        let mut buffer = LineBuffer::new(Some(4));
        let lines = buffer.push(b"abcdef\n");
        assert_eq!(lines, vec!["abcd"]);
        assert_eq!(buffer.consume_overflowed_bytes(), 2);
    }
}
