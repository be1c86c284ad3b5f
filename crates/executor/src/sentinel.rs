//! Recovers command boundaries from the shell's unframed output stream.
//!
//! After every command the shell prints `\n<sentinel>:<status>\n`. Everything
//! written before that line belongs to the command. The sentinel carries a
//! random token per session so command output cannot forge it by accident.

/// Where a single command is in its round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    SendingCommand,
    AwaitingSentinel,
    Captured,
}

/// Output of one command, up to its sentinel line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub output: String,
    pub exit_status: i32,
}

#[derive(Debug)]
pub struct SentinelParser {
    sentinel: String,
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched without finding a complete marker.
    scanned: usize,
}

impl SentinelParser {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            buffer: Vec::new(),
            scanned: 0,
        }
    }

    /// Parser with a fresh random sentinel.
    pub fn with_random_sentinel() -> Self {
        Self::new(format!("__SBX_{}__", uuid::Uuid::new_v4().simple()))
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Shell line that prints the sentinel together with the previous exit status.
    pub fn marker_command(&self) -> String {
        format!("printf '\\n%s:%d\\n' '{}' \"$?\"", self.sentinel)
    }

    /// Bytes received but not yet attributed to a command.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Append `bytes` and return the capture once a full sentinel line is seen.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Captured> {
        self.buffer.extend_from_slice(bytes);
        self.try_capture()
    }

    fn try_capture(&mut self) -> Option<Captured> {
        let needle = self.sentinel.as_bytes();
        // Back off far enough to catch a marker split across two reads.
        let mut from = self.scanned.saturating_sub(needle.len() + 1);

        while let Some(offset) = find(&self.buffer[from..], needle) {
            let start = from + offset;
            from = start + 1;

            // The marker always follows the newline printed just before it.
            if start == 0 || self.buffer[start - 1] != b'\n' {
                continue;
            }

            let rest = &self.buffer[start + needle.len()..];
            let Some(line_len) = rest.iter().position(|b| *b == b'\n') else {
                // Marker line not complete yet.
                self.scanned = start;
                return None;
            };

            let Some(exit_status) = parse_status(&rest[..line_len]) else {
                continue;
            };

            let line_end = start + needle.len() + line_len + 1;
            let remainder = self.buffer.split_off(line_end);
            let mut taken = std::mem::replace(&mut self.buffer, remainder);
            taken.truncate(start - 1);
            self.scanned = 0;

            return Some(Captured {
                output: normalize(&taken),
                exit_status,
            });
        }

        self.scanned = self.buffer.len();
        None
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses `:<digits>` with an optional trailing carriage return.
fn parse_status(tail: &[u8]) -> Option<i32> {
    let tail = tail.strip_suffix(b"\r").unwrap_or(tail);
    let digits = tail.strip_prefix(b":")?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn normalize(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace("\r\n", "\n")
        .trim_end_matches('\n')
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SENTINEL: &str = "__SBX_test__";

    fn stream(output: &str, status: i32) -> Vec<u8> {
        format!("{}\n{}:{}\n", output, SENTINEL, status).into_bytes()
    }

    #[test]
    fn test_captures_output_before_marker() {
        let mut parser = SentinelParser::new(SENTINEL);
        let captured = parser.feed(&stream("/archive\n", 0)).unwrap();
        assert_eq!(captured.output, "/archive");
        assert_eq!(captured.exit_status, 0);
        assert!(parser.pending().is_empty());
    }

    #[test]
    fn test_empty_output() {
        let mut parser = SentinelParser::new(SENTINEL);
        let captured = parser.feed(&stream("", 0)).unwrap();
        assert_eq!(captured.output, "");
    }

    #[test]
    fn test_output_without_trailing_newline() {
        let mut parser = SentinelParser::new(SENTINEL);
        let captured = parser.feed(&stream("no newline", 0)).unwrap();
        assert_eq!(captured.output, "no newline");
    }

    #[test]
    fn test_nonzero_status() {
        let mut parser = SentinelParser::new(SENTINEL);
        let captured = parser
            .feed(&stream("ls: cannot access 'x': No such file or directory", 2))
            .unwrap();
        assert_eq!(captured.exit_status, 2);
        assert!(captured.output.starts_with("ls: cannot access"));
    }

    #[test]
    fn test_waits_for_complete_marker_line() {
        let mut parser = SentinelParser::new(SENTINEL);
        assert!(parser.feed(b"hello\n__SBX_te").is_none());
        assert!(parser.feed(b"st__:0").is_none());
        let captured = parser.feed(b"\n").unwrap();
        assert_eq!(captured.output, "hello");
    }

    #[test]
    fn test_sentinel_mid_line_is_output() {
        let mut parser = SentinelParser::new(SENTINEL);
        let text = format!("echo {}:0", SENTINEL);
        let captured = parser.feed(&stream(&text, 0)).unwrap();
        assert_eq!(captured.output, text);
    }

    #[test]
    fn test_foreign_token_is_output() {
        let mut parser = SentinelParser::new(SENTINEL);
        let bytes = format!("a\n{}:oops\nb\n{}:0\n", SENTINEL, SENTINEL);
        let captured = parser.feed(bytes.as_bytes()).unwrap();
        assert_eq!(captured.output, format!("a\n{}:oops\nb", SENTINEL));
    }

    #[test]
    fn test_crlf_normalized() {
        let mut parser = SentinelParser::new(SENTINEL);
        let bytes = format!("one\r\ntwo\r\n\n{}:0\r\n", SENTINEL);
        let captured = parser.feed(bytes.as_bytes()).unwrap();
        assert_eq!(captured.output, "one\ntwo");
    }

    #[test]
    fn test_remainder_kept_for_next_command() {
        let mut parser = SentinelParser::new(SENTINEL);
        let mut bytes = stream("first", 0);
        bytes.extend(stream("second", 1));

        let first = parser.feed(&bytes).unwrap();
        assert_eq!(first.output, "first");

        let second = parser.feed(&[]).unwrap();
        assert_eq!(second.output, "second");
        assert_eq!(second.exit_status, 1);
    }

    #[test]
    fn test_large_output_in_small_chunks() {
        let line = "-rw-r--r-- 1 user 2.1M Jan  1 00:00 page-0001.png\n";
        let mut bytes = line.repeat(8 * 1024 * 1024 / line.len()).into_bytes();
        let body_len = bytes.len();
        bytes.extend(format!("\n{}:0\n", SENTINEL).into_bytes());

        let mut parser = SentinelParser::new(SENTINEL);
        let started = std::time::Instant::now();
        let mut captured = None;
        for chunk in bytes.chunks(4096) {
            if let Some(c) = parser.feed(chunk) {
                captured = Some(c);
                break;
            }
            // Only a partial marker line is ever left unscanned.
            assert!(parser.pending().len() - parser.scanned <= SENTINEL.len() + 4);
        }

        let captured = captured.unwrap();
        assert_eq!(captured.output.len(), body_len - 1);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_marker_split_across_reads_after_large_output() {
        let mut parser = SentinelParser::new(SENTINEL);
        let body = "x".repeat(10_000);
        assert!(parser.feed(body.as_bytes()).is_none());
        assert!(parser.feed(b"\n__SB").is_none());
        assert!(parser.feed(b"X_test__:3").is_none());
        let captured = parser.feed(b"\n").unwrap();
        assert_eq!(captured.output, body);
        assert_eq!(captured.exit_status, 3);
    }

    #[test]
    fn test_random_sentinels_differ() {
        let a = SentinelParser::with_random_sentinel();
        let b = SentinelParser::with_random_sentinel();
        assert_ne!(a.sentinel(), b.sentinel());
        assert!(a.marker_command().contains(a.sentinel()));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_capture(
            output in "[a-zA-Z0-9 ./_\n-]{0,200}",
            status in 0i32..256,
            split in 0usize..400,
        ) {
            let bytes = stream(&output, status);
            let split = split.min(bytes.len());

            let mut whole = SentinelParser::new(SENTINEL);
            let expected = whole.feed(&bytes).unwrap();

            let mut chunked = SentinelParser::new(SENTINEL);
            let first = chunked.feed(&bytes[..split]);
            let captured = match first {
                Some(c) => c,
                None => chunked.feed(&bytes[split..]).unwrap(),
            };

            prop_assert_eq!(&captured, &expected);
            prop_assert_eq!(captured.output, output.trim_end_matches('\n'));
        }
    }
}
