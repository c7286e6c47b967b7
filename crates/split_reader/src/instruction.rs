//! Parsing for split selection expressions.
//!
//! ```text
//! expr  := term ('+' term)*
//! term  := name ('[' slice ']')?
//! slice := bound? ':' bound?
//! bound := integer | integer '%'
//! ```
//!
//! Parsing is purely syntactic. Split names and bound ranges are checked
//! during planning.
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::errors::{Result, SplitReadError};

/// One end of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Row index into the split.
    Absolute(i64),
    /// Percentage of the split's rows.
    Percent(i64),
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Absolute(v) => write!(f, "{v}"),
            Bound::Percent(v) => write!(f, "{v}%"),
        }
    }
}

/// A request for a (possibly sliced) single split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    pub split_name: String,
    pub start: Option<Bound>,
    pub end: Option<Bound>,
}

impl SliceRequest {
    /// Request the whole split.
    pub fn full(split_name: impl Into<String>) -> Self {
        SliceRequest {
            split_name: split_name.into(),
            start: None,
            end: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl fmt::Display for SliceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.split_name)?;
        if self.is_full() {
            return Ok(());
        }
        write!(f, "[")?;
        if let Some(start) = &self.start {
            write!(f, "{start}")?;
        }
        write!(f, ":")?;
        if let Some(end) = &self.end {
            write!(f, "{end}")?;
        }
        write!(f, "]")
    }
}

/// An ordered union of slice requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadInstruction {
    requests: Vec<SliceRequest>,
}

impl ReadInstruction {
    pub fn split(name: impl Into<String>) -> Self {
        ReadInstruction {
            requests: vec![SliceRequest::full(name)],
        }
    }

    pub fn slice(name: impl Into<String>, start: Option<Bound>, end: Option<Bound>) -> Self {
        ReadInstruction {
            requests: vec![SliceRequest {
                split_name: name.into(),
                start,
                end,
            }],
        }
    }

    pub fn requests(&self) -> &[SliceRequest] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<SliceRequest> {
        self.requests
    }
}

impl Add for ReadInstruction {
    type Output = ReadInstruction;

    fn add(mut self, rhs: ReadInstruction) -> Self::Output {
        self.requests.extend(rhs.requests);
        self
    }
}

impl fmt::Display for ReadInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, request) in self.requests.iter().enumerate() {
            if idx > 0 {
                write!(f, "+")?;
            }
            write!(f, "{request}")?;
        }
        Ok(())
    }
}

impl FromStr for ReadInstruction {
    type Err = SplitReadError;

    fn from_str(s: &str) -> Result<Self> {
        parse_instruction(s)
    }
}

/// Parse a selection expression.
pub fn parse_instruction(input: &str) -> Result<ReadInstruction> {
    Parser { input, idx: 0 }.parse()
}

#[derive(Debug)]
struct Parser<'a> {
    input: &'a str,
    /// Byte offset of the next character to process.
    idx: usize,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> Result<ReadInstruction> {
        let mut requests = Vec::new();
        loop {
            requests.push(self.parse_term()?);

            self.skip_whitespace();
            let pos = self.idx;
            match self.next_char() {
                None => break,
                Some('+') => continue,
                Some(c) => {
                    return Err(self.error(&self.input[pos..], format!("Unexpected '{c}'")));
                }
            }
        }

        Ok(ReadInstruction { requests })
    }

    fn parse_term(&mut self) -> Result<SliceRequest> {
        self.skip_whitespace();

        let name_start = self.idx;
        while let Some(c) = self.peek() {
            if !is_name_char(c) {
                break;
            }
            self.idx += c.len_utf8();
        }
        let name = &self.input[name_start..self.idx];
        if name.is_empty() {
            return Err(self.error(&self.input[name_start..], "Expected a split name"));
        }

        self.skip_whitespace();
        if self.peek() != Some('[') {
            return Ok(SliceRequest::full(name));
        }

        let open = self.idx;
        self.idx += 1;
        let close = match self.input[self.idx..].find(']') {
            Some(off) => self.idx + off,
            None => return Err(self.error(&self.input[open..], "Unbalanced '['")),
        };
        let body = &self.input[self.idx..close];
        let slice_text = &self.input[open..=close];
        if body.contains('[') {
            return Err(self.error(slice_text, "Unbalanced '['"));
        }

        let (from, to) = match body.split_once(':') {
            Some((from, to)) if !to.contains(':') => (from, to),
            _ => return Err(self.error(slice_text, "Expected exactly one ':' in slice")),
        };

        let start = self.parse_bound(from)?;
        let end = self.parse_bound(to)?;
        self.idx = close + 1;

        Ok(SliceRequest {
            split_name: name.to_string(),
            start,
            end,
        })
    }

    fn parse_bound(&self, text: &str) -> Result<Option<Bound>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (digits, percent) = match trimmed.strip_suffix('%') {
            Some(digits) => (digits.trim_end(), true),
            None => (trimmed, false),
        };

        let val: i64 = digits
            .parse()
            .map_err(|_| self.error(trimmed, "Bound is not an integer"))?;

        Ok(Some(if percent {
            Bound::Percent(val)
        } else {
            Bound::Absolute(val)
        }))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.idx += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.idx..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += c.len_utf8();
        Some(c)
    }

    fn error(&self, near: &str, msg: impl Into<String>) -> SplitReadError {
        SplitReadError::Parse {
            input: self.input.to_string(),
            near: near.to_string(),
            msg: msg.into(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}
