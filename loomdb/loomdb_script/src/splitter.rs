//! Statement splitting for SQL scripts.
//!
//! A script is cut at every `;` that is not inside a quoted literal, a
//! comment or a `BEGIN … END` block. Blocks are found by scanning ahead for
//! their `END` with the same rules, so a quoted or commented `end` does not
//! close a block, and blocks nest.
//!
//! Quotes, `q'…'` literals and blocks are only recognised at the start of a
//! statement or right after whitespace, a comment or another literal. A
//! quote anywhere else is ordinary content, so `a='x;y'` splits at its `;`.
//!
//! Blocks nest at most [`MAX_BLOCK_DEPTH`] deep; a block beyond that is
//! treated as unterminated.
//!
//! Unterminated literals, comments and blocks run to the end of the input;
//! the statement is still produced and the database gets to complain.
//!
//! The scanner works on bytes. Everything it stops at is ASCII, so every
//! position it returns is a char boundary of the input.

use log::trace;

const DELIMITER: u8 = b';';
const BLOCK_START: &[u8] = b"begin";
const BLOCK_END: &[u8] = b"end";

/// Deepest `BEGIN … END` nesting the scanner follows
pub const MAX_BLOCK_DEPTH: usize = 128;

/// What ends a scan
#[derive(Debug, Clone, Copy)]
enum Stop {
    /// An unquoted `;`
    Delimiter,
    /// A case-insensitive keyword standing as a whole word
    Keyword(&'static [u8]),
}

/// Outcome of scanning one statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scan {
    /// Byte range from the first to the last content byte, if any
    content: Option<(usize, usize)>,
    /// Position after the stop token, or the end of input
    next: usize,
    /// Whether the stop token was found
    terminated: bool,
}

/// Scan from `start` until `stop` or the end of input.
///
/// `depth` is the number of blocks enclosing `start`.
fn scan(bytes: &[u8], start: usize, stop: Stop, depth: usize) -> Scan {
    let mut pos = start;
    let mut content = None;
    let mut after_skip = true;

    while pos < bytes.len() {
        match stop {
            Stop::Delimiter if bytes[pos] == DELIMITER => {
                return Scan {
                    content,
                    next: pos + 1,
                    terminated: true,
                };
            }
            Stop::Keyword(keyword) if match_keyword(bytes, pos, keyword) => {
                return Scan {
                    content,
                    next: pos + keyword.len(),
                    terminated: true,
                };
            }
            _ => {}
        }

        if after_skip {
            if let Some(next) =
                skip_literal(bytes, pos).or_else(|| skip_block(bytes, pos, depth))
            {
                extend(&mut content, pos, next);
                pos = next;
                after_skip = true;
                continue;
            }
        }

        if let Some(next) = skip_separator(bytes, pos) {
            pos = next;
            after_skip = true;
            continue;
        }

        extend(&mut content, pos, pos + 1);
        pos += 1;
        after_skip = false;
    }

    Scan {
        content,
        next: bytes.len(),
        terminated: false,
    }
}

fn extend(content: &mut Option<(usize, usize)>, from: usize, to: usize) {
    *content = Some(match *content {
        Some((start, _)) => (start, to),
        None => (from, to),
    });
}

/// Skip a quoted or `q'…'` literal starting at `pos`.
fn skip_literal(bytes: &[u8], pos: usize) -> Option<usize> {
    match bytes[pos] {
        quote @ (b'\'' | b'"' | b'`') => Some(skip_quoted(bytes, pos + 1, quote)),
        b'q' | b'Q' if bytes.get(pos + 1) == Some(&b'\'') => skip_delimited_quote(bytes, pos + 2),
        _ => None,
    }
}

/// Skip past the closing `quote`; a backslash escapes the next byte.
fn skip_quoted(bytes: &[u8], mut pos: usize, quote: u8) -> usize {
    let mut escaped = false;
    while pos < bytes.len() {
        let byte = bytes[pos];
        pos += 1;
        if escaped {
            escaped = false;
        } else if byte == quote {
            return pos;
        } else {
            escaped = byte == b'\\';
        }
    }
    pos
}

/// Skip the body of `q'<open>…<close>'`, `pos` pointing at `<open>`.
fn skip_delimited_quote(bytes: &[u8], pos: usize) -> Option<usize> {
    match bytes.get(pos) {
        None => Some(bytes.len()),
        Some(open) if open.is_ascii_whitespace() => None,
        Some(&open) => {
            let closer = [closing_delimiter(open), b'\''];
            Some(skip_past(bytes, pos + 1, &closer))
        }
    }
}

fn closing_delimiter(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    }
}

/// Skip a `BEGIN … END` block starting at `pos`.
///
/// A bare `BEGIN` directly followed by `;` starts a transaction, not a
/// block, and is left as content.
fn skip_block(bytes: &[u8], pos: usize, depth: usize) -> Option<usize> {
    if !match_keyword(bytes, pos, BLOCK_START) {
        return None;
    }

    let body = pos + BLOCK_START.len();
    if ends_statement(bytes, body) {
        return None;
    }

    if depth >= MAX_BLOCK_DEPTH {
        trace!("Block at byte {} nests too deep, running it to the end", pos);
        return Some(bytes.len());
    }

    let inner = scan(bytes, body, Stop::Keyword(BLOCK_END), depth + 1);
    if !inner.terminated {
        trace!("Block starting at byte {} has no END", pos);
    }
    Some(inner.next)
}

/// Whether only separators stand between `pos` and a `;` or the end of input
fn ends_statement(bytes: &[u8], mut pos: usize) -> bool {
    while pos < bytes.len() {
        match skip_separator(bytes, pos) {
            Some(next) => pos = next,
            None => break,
        }
    }
    pos >= bytes.len() || bytes[pos] == DELIMITER
}

/// Skip whitespace, a `--` line comment or a `/* */` block comment.
///
/// A line comment stops before its line ending.
fn skip_separator(bytes: &[u8], pos: usize) -> Option<usize> {
    let rest = &bytes[pos..];
    if rest.first().is_some_and(u8::is_ascii_whitespace) {
        let len = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
        Some(pos + len)
    } else if rest.starts_with(b"--") {
        let comment = &rest[2..];
        let len = comment
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(comment.len());
        Some(pos + 2 + len)
    } else if rest.starts_with(b"/*") {
        Some(skip_past(bytes, pos + 2, b"*/"))
    } else {
        None
    }
}

/// Position just after the next `terminator`, or the end of input
fn skip_past(bytes: &[u8], pos: usize, terminator: &[u8]) -> usize {
    bytes[pos..]
        .windows(terminator.len())
        .position(|window| window == terminator)
        .map_or(bytes.len(), |offset| pos + offset + terminator.len())
}

/// Case-insensitive match of `keyword` at `pos` as a whole word
fn match_keyword(bytes: &[u8], pos: usize, keyword: &[u8]) -> bool {
    let end = pos + keyword.len();
    end <= bytes.len()
        && bytes[pos..end].eq_ignore_ascii_case(keyword)
        && (pos == 0 || !is_word_byte(bytes[pos - 1]))
        && (end == bytes.len() || !is_word_byte(bytes[end]))
}

/// Bytes that can be part of an identifier; non-ASCII counts as a letter
fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || !byte.is_ascii()
}

/// Splits one script into statements.
///
/// [`next_statement`](Self::next_statement) yields the raw text of each
/// statement in order; the `Iterator` implementation trims them and skips
/// empty ones.
#[derive(Debug, Clone)]
pub struct StatementSplitter<'a> {
    script: &'a str,
    pos: usize,
}

impl<'a> StatementSplitter<'a> {
    /// Start splitting `script`
    pub fn new(script: &'a str) -> Self {
        Self { script, pos: 0 }
    }

    /// Next statement, up to but excluding its `;`.
    ///
    /// Returns an empty string for a `;` with no content before it, the
    /// unterminated tail once if it has any content, and `None` after that.
    pub fn next_statement(&mut self) -> Option<&'a str> {
        let bytes = self.script.as_bytes();
        if self.pos >= bytes.len() {
            return None;
        }

        let scan = scan(bytes, self.pos, Stop::Delimiter, 0);
        self.pos = scan.next;

        match scan.content {
            Some((start, end)) => Some(&self.script[start..end]),
            None if scan.terminated => Some(""),
            None => None,
        }
    }
}

impl<'a> Iterator for StatementSplitter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(statement) = self.next_statement() {
            let statement = statement.trim();
            if !statement.is_empty() {
                return Some(statement);
            }
        }
        None
    }
}

/// Split `script` into trimmed, non-empty statements.
pub fn split_statements(script: &str) -> Vec<String> {
    StatementSplitter::new(script).map(str::to_string).collect()
}
