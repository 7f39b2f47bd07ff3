use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::domain::RecipientId;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r#""([^"]*)""#).expect("valid regex"))
}

/// Longest pending token held while waiting for its closing quote. A signed
/// 64-bit id with its opening quote needs 21 bytes.
const MAX_PENDING_TOKEN: usize = 32;

/// Incremental tokenizer for a JSON array of quoted numeric strings,
/// e.g. `["138050881","34860195"]`.
///
/// Bytes can be fed in arbitrary chunks; a token split across chunks stays
/// buffered until its closing quote (or the closing `]`) arrives. After every
/// `feed` the buffer holds at most `MAX_PENDING_TOKEN` bytes.
#[derive(Debug, Default)]
pub struct IdTokenizer {
    buf: Vec<u8>,
    started: bool,
    finished: bool,
    /// Inside an oversized string; input is dropped up to its closing quote.
    skipping: bool,
}

impl IdTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[` has been seen.
    pub fn started(&self) -> bool {
        self.started
    }

    /// `]` has been seen; further input is ignored.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Bytes currently held back waiting for more input.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed the next chunk and append every completed id to `out`, in order.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<RecipientId>) {
        if self.finished {
            return;
        }
        self.buf.extend_from_slice(chunk);

        if !self.started {
            match self.buf.iter().position(|&b| b == b'[') {
                Some(idx) => {
                    self.buf.drain(..=idx);
                    self.started = true;
                }
                None => {
                    self.buf.clear();
                    return;
                }
            }
        }

        if self.skipping {
            match self.buf.iter().position(|&b| b == b'"') {
                Some(q) => {
                    self.buf.drain(..=q);
                    self.skipping = false;
                }
                None => {
                    self.buf.clear();
                    return;
                }
            }
        }

        let mut consumed = 0usize;
        for m in token_re().find_iter(&self.buf) {
            if self.buf[consumed..m.start()].contains(&b']') {
                self.finished = true;
                break;
            }
            let inner = &self.buf[m.start() + 1..m.end() - 1];
            // Ids never contain `]`, so one inside a token closes the array (`"3]`).
            if let Some(close) = inner.iter().position(|&b| b == b']') {
                push_numeric(&inner[..close], out);
                self.finished = true;
                break;
            }
            push_numeric(inner, out);
            consumed = m.end();
        }
        if self.finished {
            self.buf.clear();
            return;
        }

        let rest = &self.buf[consumed..];
        match rest.iter().position(|&b| b == b'"' || b == b']') {
            None => self.buf.clear(),
            Some(i) if rest[i] == b']' => {
                self.finished = true;
                self.buf.clear();
            }
            Some(q) => {
                let tail = &rest[q + 1..];
                if let Some(close) = tail.iter().position(|&b| b == b']') {
                    push_numeric(&tail[..close], out);
                    self.finished = true;
                    self.buf.clear();
                    return;
                }

                // Keep only the unterminated token, starting at its quote.
                self.buf.drain(..consumed + q);
                if self.buf.len() > MAX_PENDING_TOKEN {
                    self.buf.clear();
                    self.skipping = true;
                }
            }
        }
    }

    /// Input ended. Emits a numeric token left open at end of input (`"3`).
    pub fn end_of_input(&mut self, out: &mut Vec<RecipientId>) {
        if self.started && !self.finished && !self.skipping {
            if let Some(token) = self.buf.strip_prefix(b"\"") {
                push_numeric(token, out);
            }
        }
        self.buf.clear();
    }
}

fn push_numeric(token: &[u8], out: &mut Vec<RecipientId>) {
    if let Some(id) = parse_numeric(token) {
        out.push(id);
    }
}

fn parse_numeric(token: &[u8]) -> Option<RecipientId> {
    let digits = token.strip_prefix(b"-").unwrap_or(token);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    // ASCII digits with an optional sign are always valid UTF-8.
    std::str::from_utf8(token).ok().map(RecipientId::from)
}
