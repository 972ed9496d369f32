//! Newline framing for chunked response bodies.
//!
//! Transports deliver bodies as arbitrarily sized byte fragments, so a line
//! (and even a single UTF-8 character) may be split across two reads.
//! [`LineFramer`] buffers fragments and yields only complete lines, keeping
//! the unterminated tail for the next push.

use std::borrow::Cow;

/// Reassembles newline-delimited lines from raw byte fragments.
///
/// Invariant: between calls, `buffer` never contains `'\n'`.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Decoded text of the current unterminated line.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the last fragment.
    carry: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw fragment and return every line it completed, in order.
    ///
    /// Returned lines do not include the `'\n'` terminator.  Invalid UTF-8 is
    /// replaced with U+FFFD; an incomplete sequence at the end of the fragment
    /// is held back until the next push.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        self.decode(fragment);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete[..last_newline]
            .split('\n')
            .map(str::to_owned)
            .collect()
    }

    /// Return whatever is buffered (possibly empty) and clear it.
    ///
    /// Called once at transport end-of-stream to surface a final line that
    /// lacked a trailing newline.
    pub fn flush(&mut self) -> String {
        if !self.carry.is_empty() {
            let carry = std::mem::take(&mut self.carry);
            self.buffer.push_str(&String::from_utf8_lossy(&carry));
        }
        std::mem::take(&mut self.buffer)
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.carry.is_empty()
    }

    fn decode(&mut self, fragment: &[u8]) {
        let bytes: Cow<'_, [u8]> = if self.carry.is_empty() {
            Cow::Borrowed(fragment)
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(fragment);
            Cow::Owned(joined)
        };

        let mut input: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&input[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            input = &input[valid + len..];
                        }
                        None => {
                            self.carry = input[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_lines_are_returned_in_order() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"one\ntwo\nthree\n"), vec!["one", "two", "three"]);
        assert!(framer.is_empty());
    }

    #[test]
    fn unterminated_tail_is_retained() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"alpha\nbe"), vec!["alpha"]);
        assert!(!framer.is_empty());
        assert_eq!(framer.push(b"ta\n"), vec!["beta"]);
        assert!(framer.is_empty());
    }

    #[test]
    fn newline_split_across_fragments() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"data: x").is_empty());
        assert_eq!(framer.push(b"\n"), vec!["data: x"]);
        assert!(framer.push(b"").is_empty());
    }

    #[test]
    fn empty_lines_are_preserved() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn flush_returns_and_clears_tail() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"no newline").is_empty());
        assert_eq!(framer.flush(), "no newline");
        assert_eq!(framer.flush(), "");
    }

    #[test]
    fn flush_on_empty_framer_is_empty() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.flush(), "");
    }

    #[test]
    fn multibyte_character_split_across_fragments() {
        let text = "héllo → wörld\n";
        let bytes = text.as_bytes();
        let arrow = text.find('→').unwrap();

        let mut framer = LineFramer::new();
        // Split in the middle of the three-byte arrow.
        assert!(framer.push(&bytes[..arrow + 1]).is_empty());
        assert_eq!(framer.push(&bytes[arrow + 1..]), vec!["héllo → wörld"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push(b"ok\xffok\n"), vec!["ok\u{FFFD}ok"]);
    }

    #[test]
    fn dangling_partial_sequence_is_flushed_lossily() {
        let mut framer = LineFramer::new();
        assert!(framer.push(&[b'a', 0xE2, 0x86]).is_empty());
        assert_eq!(framer.flush(), "a\u{FFFD}");
    }

    #[test]
    fn byte_at_a_time_matches_whole_push() {
        let body = "data: {\"a\":1}\n\ndata: [DONE]\ntrailing";
        let mut whole = LineFramer::new();
        let expected = whole.push(body.as_bytes());

        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for byte in body.as_bytes() {
            lines.extend(framer.push(std::slice::from_ref(byte)));
        }

        assert_eq!(lines, expected);
        assert_eq!(framer.flush(), whole.flush());
    }
}
