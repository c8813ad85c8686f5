/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A textual representation of string taint, used to carry taint across
//! process and engine boundaries:
//!
//! ```text
//! [{begin: 0, end: 5, source: 'location.hash'}, {begin: 8, end: 10, source: 'name'}]
//! ```
//!
//! Only the source of each flow survives the trip. Parsed ranges get a fresh
//! flow each, rooted at a source operation of the given name.

use std::fmt::{self, Write};

use log::debug;

use crate::flow::TaintFlow;
use crate::operation::TaintOperation;
use crate::range::TaintRange;
use crate::string_taint::StringTaint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The input does not start with `[`.
    ExpectedOpeningBracket,
    /// The list is not terminated by `]`, or characters follow it.
    ExpectedClosingBracket,
    /// A list element does not start with `{`.
    ExpectedOpeningBrace,
    ExpectedKey,
    ExpectedColon,
    /// A key value pair is followed by something other than `,` or `}`.
    ExpectedSeparator,
    InvalidInteger,
    ExpectedStringLiteral,
    UnterminatedStringLiteral,
    MissingBegin,
    MissingEnd,
    MissingSource,
    /// An element whose end is not after its begin.
    EmptyRange,
    /// An element that begins before the end of the previous one.
    OutOfOrder,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ParseError::ExpectedOpeningBracket => "expected '['",
            ParseError::ExpectedClosingBracket => "expected ']' at the end of the input",
            ParseError::ExpectedOpeningBrace => "expected '{'",
            ParseError::ExpectedKey => "expected a key",
            ParseError::ExpectedColon => "expected ':'",
            ParseError::ExpectedSeparator => "expected ',' or '}'",
            ParseError::InvalidInteger => "invalid unsigned integer",
            ParseError::ExpectedStringLiteral => "expected a quoted string",
            ParseError::UnterminatedStringLiteral => "unterminated string literal",
            ParseError::MissingBegin => "range without 'begin'",
            ParseError::MissingEnd => "range without 'end'",
            ParseError::MissingSource => "range without 'source'",
            ParseError::EmptyRange => "range does not end after its begin",
            ParseError::OutOfOrder => "range begins before the end of the previous range",
        };
        write!(f, "Invalid taint description: {message}")
    }
}

impl std::error::Error for ParseError {}

/// Writes the ranges of `taint` with the names of their sources.
///
/// Source names containing a single quote are written in double quotes. A
/// name containing both kinds of quotes cannot be read back.
pub fn serialize(taint: &StringTaint) -> String {
    let mut output = String::from("[");
    for (index, range) in taint.iter().enumerate() {
        if index > 0 {
            output.push_str(", ");
        }
        let source = range.flow().source().map_or("", TaintOperation::name);
        let quote = if source.contains('\'') { '"' } else { '\'' };
        // Writing to a String never fails.
        let _ = write!(
            output,
            "{{begin: {}, end: {}, source: {quote}{source}{quote}}}",
            range.begin(),
            range.end()
        );
    }
    output.push(']');
    output
}

/// Reads a taint description.
///
/// An error means the provenance of the string is unknown, which is not the
/// same as the string being untainted: `[]` parses to an empty taint.
pub fn parse(input: &str) -> Result<StringTaint, ParseError> {
    let mut parser = Parser {
        remaining: input.trim(),
    };
    parser.expect('[', ParseError::ExpectedOpeningBracket)?;

    let mut taint = StringTaint::new();
    parser.skip_whitespace();
    if !parser.consume(']') {
        loop {
            let element = parser.parse_element()?;
            if element.begin < taint.end() {
                return Err(ParseError::OutOfOrder);
            }
            let source = TaintOperation::new(element.source.to_owned()).source();
            taint.append(TaintRange::new(
                element.begin,
                element.end,
                TaintFlow::new(source),
            ));

            parser.skip_whitespace();
            if parser.consume(',') {
                continue;
            }
            parser.expect(']', ParseError::ExpectedClosingBracket)?;
            break;
        }
    }

    if !parser.remaining.is_empty() {
        return Err(ParseError::ExpectedClosingBracket);
    }
    Ok(taint)
}

/// Like [`parse`], but treats malformed input as untainted.
pub fn parse_or_empty(input: &str) -> StringTaint {
    parse(input).unwrap_or_else(|error| {
        debug!("Dropping taint of {input:?}: {error}");
        StringTaint::new()
    })
}

struct Element<'a> {
    begin: u32,
    end: u32,
    source: &'a str,
}

struct Parser<'a> {
    remaining: &'a str,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        self.remaining = self.remaining.trim_start();
    }

    fn consume(&mut self, expected: char) -> bool {
        match self.remaining.strip_prefix(expected) {
            Some(remaining) => {
                self.remaining = remaining;
                true
            },
            None => false,
        }
    }

    fn expect(&mut self, expected: char, error: ParseError) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.consume(expected) {
            Ok(())
        } else {
            Err(error)
        }
    }

    /// `{begin: <uint>, end: <uint>, source: '<name>'}`, keys in any order.
    fn parse_element(&mut self) -> Result<Element<'a>, ParseError> {
        self.expect('{', ParseError::ExpectedOpeningBrace)?;

        let (mut begin, mut end, mut source) = (None, None, None);
        loop {
            self.skip_whitespace();
            if self.consume('}') {
                break;
            }

            let key = self.consume_key()?;
            self.expect(':', ParseError::ExpectedColon)?;
            self.skip_whitespace();
            match key {
                "begin" => begin = Some(self.consume_integer()?),
                "end" => end = Some(self.consume_integer()?),
                "source" => source = Some(self.consume_string()?),
                _ => {
                    debug!("Ignoring unknown key {key:?} in taint description");
                    self.skip_value()?;
                },
            }

            self.skip_whitespace();
            if self.consume(',') {
                continue;
            }
            self.expect('}', ParseError::ExpectedSeparator)?;
            break;
        }

        let element = Element {
            begin: begin.ok_or(ParseError::MissingBegin)?,
            end: end.ok_or(ParseError::MissingEnd)?,
            source: source.ok_or(ParseError::MissingSource)?,
        };
        if element.end <= element.begin {
            return Err(ParseError::EmptyRange);
        }
        Ok(element)
    }

    /// A bare identifier, or a quoted one as in JSON.
    fn consume_key(&mut self) -> Result<&'a str, ParseError> {
        if self.remaining.starts_with(['\'', '"']) {
            return self.consume_string();
        }
        let length = self
            .remaining
            .find(|character: char| !(character.is_ascii_alphanumeric() || character == '_'))
            .unwrap_or(self.remaining.len());
        if length == 0 {
            return Err(ParseError::ExpectedKey);
        }
        let (key, remaining) = self.remaining.split_at(length);
        self.remaining = remaining;
        Ok(key)
    }

    fn consume_integer(&mut self) -> Result<u32, ParseError> {
        let length = self
            .remaining
            .find(|character: char| !character.is_ascii_digit())
            .unwrap_or(self.remaining.len());
        let (digits, remaining) = self.remaining.split_at(length);
        let value = digits.parse().map_err(|_| ParseError::InvalidInteger)?;
        self.remaining = remaining;
        Ok(value)
    }

    /// A string in single or double quotes. There are no escape sequences,
    /// the string ends at the next matching quote.
    fn consume_string(&mut self) -> Result<&'a str, ParseError> {
        let mut chars = self.remaining.chars();
        let quote = match chars.next() {
            Some(quote @ ('\'' | '"')) => quote,
            _ => return Err(ParseError::ExpectedStringLiteral),
        };
        let contents = chars.as_str();
        let length = contents
            .find(quote)
            .ok_or(ParseError::UnterminatedStringLiteral)?;
        self.remaining = &contents[length + quote.len_utf8()..];
        Ok(&contents[..length])
    }

    fn skip_value(&mut self) -> Result<(), ParseError> {
        if self.remaining.starts_with(['\'', '"']) {
            return self.consume_string().map(|_| ());
        }
        let length = self
            .remaining
            .find([',', '}'])
            .unwrap_or(self.remaining.len());
        self.remaining = &self.remaining[length..];
        Ok(())
    }
}
