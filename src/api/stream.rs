//! Incremental UTF-8 decoding of a streamed response body.

use std::str;

const REPLACEMENT: char = '\u{FFFD}';

/// Bytes lost at end of stream because they never formed a complete character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeTruncation {
    pub dropped_bytes: usize,
}

/// Result of [`StreamDecoder::finish`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Flush {
    pub text: String,
    pub truncation: Option<DecodeTruncation>,
}

/// Turns raw body chunks into text fragments.
///
/// A character split across two chunks is held back until the rest of its
/// bytes arrive. One decoder serves exactly one stream: `finish` consumes it.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> String {
        if self.pending.is_empty() {
            let (text, rest) = decode_prefix(chunk);
            self.pending.extend_from_slice(rest);
            return text;
        }

        let mut buffer = std::mem::take(&mut self.pending);
        buffer.extend_from_slice(chunk);
        let (text, rest) = decode_prefix(&buffer);
        self.pending = rest.to_vec();
        text
    }

    pub fn finish(self) -> Flush {
        if self.pending.is_empty() {
            return Flush::default();
        }

        let (text, rest) = decode_prefix(&self.pending);
        let truncation = (!rest.is_empty()).then_some(DecodeTruncation {
            dropped_bytes: rest.len(),
        });
        Flush { text, truncation }
    }
}

/// Decode as much of `bytes` as possible. Invalid sequences become U+FFFD;
/// an incomplete sequence at the very end is returned undecoded.
fn decode_prefix(bytes: &[u8]) -> (String, &[u8]) {
    let mut text = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                return (text, &[]);
            }
            Err(error) => {
                let (valid, after) = rest.split_at(error.valid_up_to());
                // `valid_up_to` marks a verified boundary.
                text.push_str(str::from_utf8(valid).unwrap_or_default());
                match error.error_len() {
                    Some(invalid_len) => {
                        text.push(REPLACEMENT);
                        rest = &after[invalid_len..];
                    }
                    None => return (text, after),
                }
            }
        }
    }
}
