//! Incremental Request Parser
//!
//! Requests are arrays of bulk strings, written as CRLF-terminated lines:
//!
//! ```text
//! *<N>\r\n
//! $<L1>\r\n<arg 1>\r\n
//! ...
//! $<LN>\r\n<arg N>\r\n
//! ```
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((args, consumed)))` - One full request was decoded, `consumed` bytes were used
//! - `Ok(None)` - The request is incomplete, read more data and retry
//! - `Err(ParseError)` - The framing is broken
//!
//! After `Ok(None)` the parser remembers how far it got. The next call must
//! pass the same buffer with more bytes appended, and decoding resumes where
//! it stopped, so every buffered byte is looked at once no matter how many
//! reads a large request is split across.
//!
//! A framing error is fatal to the connection. Once the declared lengths and
//! the actual bytes disagree there is no reliable way to find the start of
//! the next request, so the caller closes the stream instead of resyncing.
//!
//! Arguments are returned verbatim. Case folding of the command name is the
//! dispatcher's job; payload bytes are never rewritten here.

use crate::protocol::types::prefix;
use bytes::Bytes;
use std::mem;
use thiserror::Error;

/// Framing errors. Every variant terminates the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The request did not start with `*<non-negative integer>`
    #[error("malformed array header: {0:?}")]
    MalformedArrayHeader(String),

    /// An argument did not start with `$<non-negative integer>`
    #[error("malformed bulk length: {0:?}")]
    MalformedBulkLength(String),

    /// The argument line is not as long as its declared length
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The request exceeds the configured size limit
    #[error("request too large: {size} bytes (max: {max})")]
    RequestTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Default upper bound on a single request (512 MB)
pub const MAX_REQUEST_SIZE: usize = 512 * 1024 * 1024;

/// Upper bound on the capacity we pre-allocate from an untrusted header
const MAX_PREALLOC_ARGS: usize = 1024;

/// Longest `*N` / `$L` line accepted, CRLF excluded
const MAX_HEADER_LEN: usize = 32;

/// How far a partially buffered request has been decoded.
#[derive(Debug, Clone, Default)]
struct Progress {
    /// Argument count, once the array header has been read
    count: Option<usize>,
    /// Arguments decoded so far
    args: Vec<Bytes>,
    /// Offset of the next unread line
    pos: usize,
    /// Declared length of the argument whose data starts at `pos`
    bulk_len: Option<usize>,
    /// End of the region already searched for the data line's CRLF
    scanned: usize,
}

/// A request parser for the array-of-bulk-strings framing.
///
/// # Example
///
/// ```
/// use pulsekv::protocol::RespParser;
///
/// let mut parser = RespParser::new();
/// let (args, consumed) = parser
///     .parse(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
///
/// assert_eq!(args, vec!["GET", "name"]);
/// assert_eq!(consumed, 23);
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    max_request_size: usize,
    progress: Progress,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default request size limit.
    pub fn new() -> Self {
        Self::with_max_request_size(MAX_REQUEST_SIZE)
    }

    /// Creates a parser that rejects requests larger than `max` bytes.
    pub fn with_max_request_size(max: usize) -> Self {
        Self {
            max_request_size: max,
            progress: Progress::default(),
        }
    }

    /// Attempts to decode one request from the front of `buf`.
    ///
    /// After `Ok(None)`, call again with the same bytes at the front of
    /// `buf`. Any other result starts the next call from scratch.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        match self.resume(buf) {
            Ok(Some(parsed)) => {
                self.progress = Progress::default();
                Ok(Some(parsed))
            }
            Ok(None) if buf.len() > self.max_request_size => {
                self.progress = Progress::default();
                Err(ParseError::RequestTooLarge {
                    size: buf.len(),
                    max: self.max_request_size,
                })
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.progress = Progress::default();
                Err(e)
            }
        }
    }

    fn resume(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        let progress = &mut self.progress;

        let count = match progress.count {
            Some(count) => count,
            None => {
                let Some((header, next)) =
                    read_header(buf, 0).map_err(ParseError::MalformedArrayHeader)?
                else {
                    return Ok(None);
                };
                if header.first() != Some(&prefix::ARRAY) {
                    return Err(ParseError::MalformedArrayHeader(lossy(header)));
                }
                let count = parse_length(&header[1..])
                    .ok_or_else(|| ParseError::MalformedArrayHeader(lossy(header)))?;

                progress.count = Some(count);
                progress.args = Vec::with_capacity(count.min(MAX_PREALLOC_ARGS));
                progress.pos = next;
                count
            }
        };

        while progress.args.len() < count {
            let expected = match progress.bulk_len {
                Some(len) => len,
                None => {
                    let Some((line, next)) = read_header(buf, progress.pos)
                        .map_err(ParseError::MalformedBulkLength)?
                    else {
                        return Ok(None);
                    };
                    if line.first() != Some(&prefix::BULK_STRING) {
                        return Err(ParseError::MalformedBulkLength(lossy(line)));
                    }
                    let expected = parse_length(&line[1..])
                        .ok_or_else(|| ParseError::MalformedBulkLength(lossy(line)))?;

                    if expected > self.max_request_size {
                        return Err(ParseError::RequestTooLarge {
                            size: expected,
                            max: self.max_request_size,
                        });
                    }

                    progress.bulk_len = Some(expected);
                    progress.pos = next;
                    progress.scanned = next;
                    expected
                }
            };

            let Some(next) = find_data_end(progress, buf, expected)? else {
                return Ok(None);
            };

            let start = progress.pos;
            progress
                .args
                .push(Bytes::copy_from_slice(&buf[start..start + expected]));
            progress.pos = next;
            progress.bulk_len = None;
        }

        Ok(Some((mem::take(&mut progress.args), progress.pos)))
    }
}

/// Returns a `*N` or `$L` line starting at `start` (without its CRLF) and
/// the offset just past the CRLF, or None if the line is not complete yet.
///
/// A line longer than `MAX_HEADER_LEN` is returned as the error.
fn read_header(buf: &[u8], start: usize) -> Result<Option<(&[u8], usize)>, String> {
    let rest = buf.get(start..).unwrap_or_default();
    let window = &rest[..rest.len().min(MAX_HEADER_LEN + 2)];

    match find_crlf(window) {
        Some(end) => Ok(Some((&rest[..end], start + end + 2))),
        None if window.len() == MAX_HEADER_LEN + 2 => Err(lossy(&rest[..MAX_HEADER_LEN])),
        None => Ok(None),
    }
}

/// Checks the data line at `progress.pos` against its declared length.
///
/// The line runs to the first CRLF, which must start exactly `expected`
/// bytes in. Returns the offset just past that CRLF, or None while it is
/// not buffered yet. Bytes searched by earlier calls are not searched
/// again.
fn find_data_end(
    progress: &mut Progress,
    buf: &[u8],
    expected: usize,
) -> ParseResult<Option<usize>> {
    let start = progress.pos;
    let limit = start.saturating_add(expected).saturating_add(2);
    let end = buf.len().min(limit);

    // Back up one byte so a CRLF split across reads is still seen.
    let from = progress.scanned.saturating_sub(1).max(start);

    if let Some(offset) = buf.get(from..end).and_then(find_crlf) {
        let actual = from + offset - start;
        if actual == expected {
            return Ok(Some(start + expected + 2));
        }
        return Err(ParseError::LengthMismatch { expected, actual });
    }

    if end < limit {
        progress.scanned = end;
        return Ok(None);
    }

    // No CRLF where one was due: the line is longer than declared.
    let rest = &buf[start..];
    Err(ParseError::LengthMismatch {
        expected,
        actual: find_crlf(rest).unwrap_or(rest.len()),
    })
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a non-negative decimal length. Signs, blanks and overflow are
/// all rejected.
fn parse_length(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

/// Helper function to parse a single request with the default limits.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    RespParser::new().parse(buf)
}
