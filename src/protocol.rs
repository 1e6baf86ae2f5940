/*!
 * Line Protocol Implementation
 *
 * Requests are newline-terminated lines of whitespace-separated tokens:
 * `VERB [ARG ...]`. Replies are single lines carrying a status code and,
 * for a successful GET, the value.
 */

use bytes::{Buf, BufMut, BytesMut};
use log::warn;
use std::borrow::Cow;

/// Command verbs understood by minidb
///
/// Matching is case-sensitive and exact; anything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Post,
    Get,
    Delete,
    Unknown,
}

impl Verb {
    pub fn from_token(tok: &str) -> Self {
        match tok {
            "POST" => Verb::Post,
            "GET" => Verb::Get,
            "DELETE" => Verb::Delete,
            _ => Verb::Unknown,
        }
    }
}

/// One parsed command line: the verb plus its positional arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: Verb,
    pub args: Vec<String>,
}

impl Request {
    /// Parse a raw command line
    ///
    /// # Returns
    /// * `Some(Request)` if the line holds at least one token
    /// * `None` if the line is blank
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD, with a
    /// warning, since keys and values are stored as strings.
    pub fn parse(line: &[u8]) -> Option<Request> {
        let text = String::from_utf8_lossy(line);
        if let Cow::Owned(_) = text {
            warn!("command line is not valid UTF-8, replacing invalid bytes");
        }
        let mut tokens = tokenize(&text).into_iter();
        let verb = Verb::from_token(&tokens.next()?);
        Some(Request {
            verb,
            args: tokens.collect(),
        })
    }
}

/// Split a line on whitespace, trim control characters, drop empty tokens
pub fn tokenize(line: &str) -> Vec<String> {
    line.split(char::is_whitespace)
        .map(|t| t.trim_matches(|c: char| c.is_whitespace() || c.is_control()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Outcome of a dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `0`: POST accepted or DELETE succeeded
    Ok,
    /// `0 <value>`: GET hit
    Value(String),
    /// `1`: GET/DELETE on a missing key
    NotFound,
    /// `2`: unknown verb or wrong argument count
    Invalid,
}

impl Reply {
    /// Append the wire form of this reply, newline included
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Reply::Ok => out.put_slice(b"0\n"),
            Reply::Value(v) => {
                out.reserve(v.len() + 3);
                out.put_slice(b"0 ");
                out.put_slice(v.as_bytes());
                out.put_u8(b'\n');
            }
            Reply::NotFound => out.put_slice(b"1\n"),
            Reply::Invalid => out.put_slice(b"2\n"),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(4);
        self.encode(&mut out);
        out.to_vec()
    }
}

/// Take the next complete line out of `buf`
///
/// The returned bytes exclude the `\n`. A trailing partial line is left in
/// the buffer until the rest of it arrives.
pub fn next_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line = buf.split_to(pos);
    buf.advance(1);
    Some(line)
}

/// Result of pulling from a [`LineBuffer`]
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// A full line, terminator stripped
    Complete(BytesMut),
    /// The pending line outgrew the limit and was discarded
    TooLong,
}

/// Per-connection input framing
///
/// Bytes from successive reads accumulate here and come out one line at a
/// time. Once an unterminated line exceeds `max_line` bytes it is dropped,
/// reported once as [`Line::TooLong`], and the rest of it is skipped up to
/// the next newline.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    max_line: usize,
    skipping: bool,
}

impl LineBuffer {
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            max_line,
            skipping: false,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn next_line(&mut self) -> Option<Line> {
        if self.skipping {
            match self.buf.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.buf.advance(pos + 1);
                    self.skipping = false;
                }
                None => {
                    self.buf.clear();
                    return None;
                }
            }
        }

        if let Some(line) = next_line(&mut self.buf) {
            return Some(Line::Complete(line));
        }

        if self.buf.len() > self.max_line {
            self.buf.clear();
            self.skipping = true;
            return Some(Line::TooLong);
        }
        None
    }

    /// Bytes of the current partial line
    #[inline]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Drain every complete line from `buf` into parsed requests
///
/// Blank lines are dropped, matching the "no output for zero tokens" rule.
pub fn parse_many(buf: &mut BytesMut, out: &mut Vec<Request>) {
    while let Some(line) = next_line(buf) {
        if let Some(req) = Request::parse(&line) {
            out.push(req);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_trims_and_drops_empties() {
        assert_eq!(tokenize("  POST  k\tv \r"), vec!["POST", "k", "v"]);
        assert!(tokenize(" \t\r").is_empty());
    }

    #[test]
    fn verb_is_case_sensitive() {
        assert_eq!(Verb::from_token("GET"), Verb::Get);
        assert_eq!(Verb::from_token("get"), Verb::Unknown);
        assert_eq!(Verb::from_token("DEL"), Verb::Unknown);
    }

    #[test]
    fn parse_blank_line_is_none() {
        assert_eq!(Request::parse(b"   \r"), None);
        let req = Request::parse(b"DELETE alpha\r").unwrap();
        assert_eq!(req.verb, Verb::Delete);
        assert_eq!(req.args, vec!["alpha"]);
    }

    #[test]
    fn parse_replaces_invalid_utf8() {
        let req = Request::parse(b"POST k v\xff").unwrap();
        assert_eq!(req.verb, Verb::Post);
        assert_eq!(req.args, vec!["k".to_string(), "v\u{FFFD}".to_string()]);
    }

    #[test]
    fn next_line_keeps_partial_tail() {
        let mut buf = BytesMut::from(&b"GET a\nPOST b"[..]);
        assert_eq!(&next_line(&mut buf).unwrap()[..], b"GET a");
        assert!(next_line(&mut buf).is_none());
        assert_eq!(&buf[..], b"POST b");
    }

    #[test]
    fn line_buffer_reassembles_split_reads() {
        let mut lb = LineBuffer::new(64);
        lb.extend(b"POST al");
        assert_eq!(lb.next_line(), None);
        lb.extend(b"pha 42\nGET alpha\nDEL");
        assert_eq!(lb.next_line(), Some(Line::Complete(BytesMut::from(&b"POST alpha 42"[..]))));
        assert_eq!(lb.next_line(), Some(Line::Complete(BytesMut::from(&b"GET alpha"[..]))));
        assert_eq!(lb.next_line(), None);
        assert_eq!(lb.pending(), 3);
    }

    #[test]
    fn line_buffer_drops_overlong_line_once() {
        let mut lb = LineBuffer::new(8);
        lb.extend(b"0123456789");
        assert_eq!(lb.next_line(), Some(Line::TooLong));
        assert_eq!(lb.next_line(), None);
        lb.extend(b"more tail\nGET k\n");
        assert_eq!(lb.next_line(), Some(Line::Complete(BytesMut::from(&b"GET k"[..]))));
        assert_eq!(lb.next_line(), None);
    }

    #[test]
    fn reply_encoding() {
        assert_eq!(Reply::Ok.to_bytes(), b"0\n");
        assert_eq!(Reply::Value("4 2".into()).to_bytes(), b"0 4 2\n");
        assert_eq!(Reply::NotFound.to_bytes(), b"1\n");
        assert_eq!(Reply::Invalid.to_bytes(), b"2\n");
    }
}
