//! Line-oriented text codec shared by every persisted type.
//!
//! The format is a sequence of lines holding whitespace separated decimal
//! numbers, procedure identifiers and single-letter markers. Blank lines are
//! ignored on input. A value that spans several types (a workspace) is simply
//! the concatenation of their encodings, read back with one [`Decoder`].

use crate::error::DecodeError;
use crate::program::ProcIdent;
use std::fmt::{self, Write as _};
use std::io;
use std::iter::Peekable;
use std::str::{Lines, SplitWhitespace};

/// Accumulates encoded lines.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: String,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        // Formatting into a String only fails if a Display impl does.
        let _ = self.buf.write_fmt(args);
        self.buf.push('\n');
    }

    /// Appends an empty line.
    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> String {
        self.buf
    }

    /// Writes everything encoded so far to `writer`.
    pub fn write_to(&self, mut writer: impl io::Write) -> io::Result<()> {
        writer.write_all(self.buf.as_bytes())?;
        writer.flush()
    }
}

/// Reads a whole text stream for decoding.
pub fn read_text(mut reader: impl io::Read) -> Result<String, DecodeError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

/// Reads encoded lines back, tracking line numbers for error reporting.
pub struct Decoder<'a> {
    lines: Peekable<std::iter::Enumerate<Lines<'a>>>,
    last_line: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate().peekable(),
            last_line: 0,
        }
    }

    /// Returns the next non-blank line.
    pub fn line(&mut self) -> Result<Fields<'a>, DecodeError> {
        for (idx, text) in self.lines.by_ref() {
            self.last_line = idx + 1;
            if !text.trim().is_empty() {
                return Ok(Fields {
                    line: idx + 1,
                    tokens: text.split_whitespace(),
                });
            }
        }
        Err(DecodeError::UnexpectedEof {
            line: self.last_line + 1,
        })
    }

    /// Reads a line holding a single unsigned number.
    pub fn count(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let mut fields = self.line()?;
        let value = fields.uint(what)?;
        fields.finish()?;
        Ok(value)
    }

    /// Reads a line holding a single boolean flag (`0` or `1`).
    pub fn flag(&mut self, what: &'static str) -> Result<bool, DecodeError> {
        let mut fields = self.line()?;
        let value = fields.flag(what)?;
        fields.finish()?;
        Ok(value)
    }

    /// Reads a line holding one procedure identifier.
    pub fn ident(&mut self) -> Result<(ProcIdent, usize), DecodeError> {
        let mut fields = self.line()?;
        let ident = fields.ident()?;
        fields.finish()?;
        Ok((ident, fields.line()))
    }

    /// True once only blank lines remain.
    pub fn is_at_end(&mut self) -> bool {
        while let Some((_, text)) = self.lines.peek() {
            if !text.trim().is_empty() {
                return false;
            }
            self.lines.next();
        }
        true
    }

    /// Fails unless only blank lines remain.
    pub fn expect_end(&mut self) -> Result<(), DecodeError> {
        if self.is_at_end() {
            return Ok(());
        }
        match self.lines.peek() {
            Some(&(idx, text)) => Err(DecodeError::Malformed {
                line: idx + 1,
                expected: "end of input",
                found: text.trim().to_owned(),
            }),
            None => Ok(()),
        }
    }

    /// Line number of the most recently consumed line.
    pub fn last_line(&self) -> usize {
        self.last_line
    }
}

/// The tokens of one decoded line.
pub struct Fields<'a> {
    line: usize,
    tokens: SplitWhitespace<'a>,
}

impl<'a> Fields<'a> {
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn token(&mut self, expected: &'static str) -> Result<&'a str, DecodeError> {
        self.tokens.next().ok_or_else(|| DecodeError::Malformed {
            line: self.line,
            expected,
            found: "end of line".to_owned(),
        })
    }

    /// Next token if there is one; for optional trailing fields.
    pub fn optional(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }

    pub fn uint(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let token = self.token(what)?;
        token.parse().map_err(|_| DecodeError::Malformed {
            line: self.line,
            expected: what,
            found: token.to_owned(),
        })
    }

    pub fn int(&mut self, what: &'static str) -> Result<i32, DecodeError> {
        let token = self.token(what)?;
        token.parse().map_err(|_| DecodeError::Malformed {
            line: self.line,
            expected: what,
            found: token.to_owned(),
        })
    }

    pub fn flag(&mut self, what: &'static str) -> Result<bool, DecodeError> {
        match self.uint(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.out_of_range(what, other.into())),
        }
    }

    pub fn ident(&mut self) -> Result<ProcIdent, DecodeError> {
        let token = self.token("procedure identifier")?;
        ProcIdent::new(token).map_err(|_| DecodeError::Malformed {
            line: self.line,
            expected: "procedure identifier",
            found: token.to_owned(),
        })
    }

    /// Consumes a literal marker token.
    pub fn marker(&mut self, marker: &'static str) -> Result<(), DecodeError> {
        let token = self.token(marker)?;
        if token == marker {
            Ok(())
        } else {
            Err(DecodeError::Malformed {
                line: self.line,
                expected: marker,
                found: token.to_owned(),
            })
        }
    }

    /// Builds an out-of-range error located on this line.
    pub fn out_of_range(&self, what: &'static str, value: i64) -> DecodeError {
        DecodeError::OutOfRange {
            line: self.line,
            what,
            value,
        }
    }

    /// Fails if the line holds more tokens than were consumed.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(DecodeError::Malformed {
                line: self.line,
                expected: "end of line",
                found: extra.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines_and_counts_lines() {
        let mut dec = Decoder::new("3 4\n\n  \n7\n");
        let mut first = dec.line().unwrap();
        assert_eq!(first.line(), 1);
        assert_eq!(first.uint("a").unwrap(), 3);
        assert_eq!(first.int("b").unwrap(), 4);
        first.finish().unwrap();

        assert_eq!(dec.count("c").unwrap(), 7);
        assert_eq!(dec.last_line(), 4);
        assert!(dec.is_at_end());
    }

    #[test]
    fn reports_trailing_tokens() {
        let mut dec = Decoder::new("1 2\n");
        let err = dec.count("count").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { line: 1, .. }));
    }

    #[test]
    fn reports_eof_after_last_line() {
        let mut dec = Decoder::new("1\n");
        dec.count("count").unwrap();
        let err = dec.line().err().unwrap();
        assert!(matches!(err, DecodeError::UnexpectedEof { line: 2 }));
    }

    #[test]
    fn flags_must_be_zero_or_one() {
        let mut dec = Decoder::new("2\n");
        let err = dec.flag("flag").unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { value: 2, .. }));
    }

    #[test]
    fn trailing_lines_are_rejected() {
        let mut dec = Decoder::new("1\n\n2 3\n");
        dec.count("count").unwrap();
        let err = dec.expect_end().unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { line: 3, .. }));

        let mut dec = Decoder::new("1\n\n  \n");
        dec.count("count").unwrap();
        dec.expect_end().unwrap();
    }

    #[test]
    fn reads_and_writes_streams() {
        let mut enc = Encoder::new();
        enc.line(format_args!("4 2"));
        let mut out = Vec::new();
        enc.write_to(&mut out).unwrap();
        assert_eq!(read_text(out.as_slice()).unwrap(), "4 2\n");
    }

    #[test]
    fn encoder_terminates_lines() {
        let mut enc = Encoder::new();
        enc.line(format_args!("{} {}", 1, 2));
        enc.blank();
        enc.line(format_args!("R"));
        assert_eq!(enc.finish(), "1 2\n\nR\n");
    }
}
