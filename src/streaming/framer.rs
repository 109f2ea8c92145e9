//! JSON Document Framing
//!
//! The config stream carries back-to-back JSON objects with no length
//! prefix and no guaranteed delimiter, and network reads split them at
//! arbitrary points. The framer accumulates bytes and, on each attempt,
//! decodes at most one object from the front of the buffer.
//!
//! A decode that fails only because input ended early is `Incomplete`
//! (wait for more bytes). Any other syntax error, or a byte outside an
//! object, can never become valid: it is reported once as `Invalid` and
//! the framer resynchronises on the next `{` after the error. Everything
//! the framer emits depends only on the bytes received, never on how they
//! were chunked.
//!
//! An object can only complete on a `}`, so a decode is attempted only
//! after a new `}` arrives. Worst case is one re-parse of the pending
//! object per `}` it contains.

use bytes::{Buf, BytesMut};
use serde_json::Value;

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A complete document; its bytes have been consumed
    Document(Value),
    /// Need more bytes
    Incomplete,
    /// Undecodable bytes were dropped up to the next `{`
    Invalid(String),
}

#[derive(Debug)]
pub struct JsonFramer {
    buffer: BytesMut,
    /// Prefix of `buffer` already known not to close the pending object
    scanned: usize,
    /// Dropping bytes until the next `{` after an `Invalid`
    resyncing: bool,
}

impl JsonFramer {
    pub fn new() -> Self {
        JsonFramer {
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
            resyncing: false,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes waiting for the rest of a document
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_frame(&mut self) -> Frame {
        if self.resyncing {
            self.resync();
            if self.resyncing {
                return Frame::Incomplete;
            }
        }

        let leading_ws = self
            .buffer
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buffer.advance(leading_ws);
        self.scanned = self.scanned.saturating_sub(leading_ws);
        let first = match self.buffer.first() {
            Some(&b) => b,
            None => return Frame::Incomplete,
        };

        if first != b'{' {
            self.resync();
            return Frame::Invalid(format!("unexpected byte 0x{:02x} outside a document", first));
        }

        if !self.buffer[self.scanned..].contains(&b'}') {
            self.scanned = self.buffer.len();
            return Frame::Incomplete;
        }

        let attempt = {
            let mut documents =
                serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            match documents.next() {
                Some(Ok(value)) => Ok(Some((value, documents.byte_offset()))),
                Some(Err(e)) if e.is_eof() => Ok(None),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        };

        match attempt {
            Ok(Some((value, consumed))) => {
                self.buffer.advance(consumed);
                self.scanned = 0;
                Frame::Document(value)
            }
            Ok(None) => {
                self.scanned = self.buffer.len();
                Frame::Incomplete
            }
            Err(e) => {
                let resume = error_offset(&self.buffer, e.line(), e.column());
                self.buffer.advance(resume);
                self.resync();
                Frame::Invalid(e.to_string())
            }
        }
    }

    /// Drop everything before the next `{`
    fn resync(&mut self) {
        self.scanned = 0;
        match self.buffer.iter().position(|&b| b == b'{') {
            Some(start) => {
                self.buffer.advance(start);
                self.resyncing = false;
            }
            None => {
                self.buffer.clear();
                self.resyncing = true;
            }
        }
    }
}

/// Byte index of the character a decode error points at. Always at least
/// 1 so the failed object's opening `{` is never retried.
fn error_offset(buffer: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = buffer
        .split(|&b| b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    (line_start + column)
        .saturating_sub(1)
        .clamp(1, buffer.len().max(1))
}

impl Default for JsonFramer {
    fn default() -> Self {
        Self::new()
    }
}
