/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Integration of taint information into host values.
//!
//! Hosts propagate taint on a best-effort basis: a string type propagates
//! taint whenever it is handed another taint aware value, and at least drops
//! taint where characters are removed or replaced. Where a host cannot do
//! that on its own, the caller is responsible for updating the taint.

use std::fmt;
use std::mem::size_of;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use static_assertions::const_assert_eq;
use thin_vec::ThinVec;

use crate::flow::TaintFlow;
use crate::operation::{TaintOperation, TaintSource};
use crate::range::TaintRange;
use crate::string_taint::StringTaint;

/// A string-like host value that carries a [`StringTaint`].
///
/// Implementors only provide access to the embedded taint and the length of
/// the value, in the units the taint is indexed with. Everything else is
/// forwarded to the [`StringTaint`].
pub trait TaintableString {
    fn taint(&self) -> &StringTaint;

    fn taint_mut(&mut self) -> &mut StringTaint;

    fn taint_length(&self) -> u32;

    /// A value is tainted if at least one of its characters is.
    fn is_tainted(&self) -> bool {
        self.taint().has_taint()
    }

    fn set_taint(&mut self, taint: StringTaint) {
        *self.taint_mut() = taint;
    }

    fn clear_taint(&mut self) {
        self.taint_mut().clear();
    }

    fn clear_taint_at(&mut self, index: u32) {
        self.taint_mut().clear_at(index);
    }

    fn clear_taint_after(&mut self, index: u32) {
        self.taint_mut().clear_after(index);
    }

    fn insert_taint_at(&mut self, index: u32, taint: &StringTaint) {
        self.taint_mut().insert(index, taint);
    }

    /// Appends the ranges of `taint`, offset by `offset`.
    fn append_taint_at(&mut self, offset: u32, taint: &StringTaint) {
        self.taint_mut().concat(taint, offset);
    }
}

/// The taint flows of a value without characters, e.g. a number parsed from
/// a tainted string.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TaintList {
    flows: ThinVec<TaintFlow>,
}

const_assert_eq!(size_of::<TaintList>(), size_of::<usize>());

impl TaintList {
    pub fn new() -> TaintList {
        TaintList::default()
    }

    /// Collects the distinct flows of a string.
    pub fn from_string_taint(taint: &StringTaint) -> TaintList {
        let mut list = TaintList::new();
        for range in taint {
            list.push(range.flow().clone());
        }
        list
    }

    /// Adds `flow` unless it is empty or already part of the list.
    pub fn push(&mut self, flow: TaintFlow) {
        if !flow.is_empty() && !self.flows.contains(&flow) {
            self.flows.push(flow);
        }
    }

    /// Extends every flow by `operation`.
    pub fn extend(&mut self, operation: TaintOperation) {
        for flow in self.flows.iter_mut() {
            flow.extend(operation.clone());
        }
    }

    pub fn is_tainted(&self) -> bool {
        !self.flows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaintFlow> {
        self.flows.iter()
    }

    pub fn clear(&mut self) {
        self.flows = ThinVec::new();
    }
}

impl<'a> IntoIterator for &'a TaintList {
    type Item = &'a TaintFlow;
    type IntoIter = std::slice::Iter<'a, TaintFlow>;

    fn into_iter(self) -> Self::IntoIter {
        self.flows.iter()
    }
}

#[derive(Debug)]
pub enum DecodeError {
    Base64(base64::DecodeError),
    Utf8(std::string::FromUtf8Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Base64(error) => write!(f, "Invalid base64 data: {error}"),
            DecodeError::Utf8(error) => write!(f, "Decoded data is not UTF-8: {error}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Base64(error) => Some(error),
            DecodeError::Utf8(error) => Some(error),
        }
    }
}

impl From<base64::DecodeError> for DecodeError {
    fn from(error: base64::DecodeError) -> Self {
        DecodeError::Base64(error)
    }
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(error: std::string::FromUtf8Error) -> Self {
        DecodeError::Utf8(error)
    }
}

/// A UTF-8 string with taint information attached to its bytes.
///
/// This is the reference host: every operation keeps the taint in step with
/// the characters, and operations that transform characters record
/// themselves on the flows of the affected ranges.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TaintedString {
    value: String,
    taint: StringTaint,
}

impl TaintedString {
    /// An untainted string.
    pub fn new(value: impl Into<String>) -> TaintedString {
        TaintedString {
            value: value.into(),
            taint: StringTaint::new(),
        }
    }

    /// A string that is tainted as a whole by a new flow rooted at `source`.
    pub fn tainted(value: impl Into<String>, source: TaintSource) -> TaintedString {
        let value = value.into();
        let taint = StringTaint::from_flow(TaintFlow::new(source), length_of(&value));
        TaintedString { value, taint }
    }

    pub fn with_taint(value: impl Into<String>, taint: StringTaint) -> TaintedString {
        let value = value.into();
        assert!(
            taint.end() <= length_of(&value),
            "Taint {taint:?} extends past the end of {value:?}"
        );
        TaintedString { value, taint }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn into_parts(self) -> (String, StringTaint) {
        (self.value, self.taint)
    }

    /// `self + other`.
    pub fn concat(&self, other: &TaintedString) -> TaintedString {
        let mut value = String::with_capacity(self.len() + other.len());
        value.push_str(&self.value);
        value.push_str(&other.value);
        TaintedString {
            value,
            taint: StringTaint::concatenate(&self.taint, self.taint_length(), &other.taint),
        }
    }

    /// The bytes in `[begin, end)`, with their flows extended by a
    /// `substring` operation.
    ///
    /// ## Panics
    /// Panics if the bounds are not on character boundaries.
    pub fn substring(&self, begin: u32, end: u32) -> TaintedString {
        let value = self
            .value
            .get(begin as usize..end as usize)
            .unwrap_or_else(|| panic!("Invalid substring [{begin}, {end}) of {:?}", self.value));
        let mut taint = self.taint.subtaint(begin, end);
        taint.extend(
            TaintOperation::with_arguments("substring", [begin.to_string(), end.to_string()])
                .native(),
        );
        TaintedString {
            value: value.to_owned(),
            taint,
        }
    }

    /// Replaces the bytes in `[begin, end)` with `replacement`, which brings
    /// its own taint along.
    ///
    /// ## Panics
    /// Panics if the bounds are not on character boundaries.
    pub fn replace_range(&mut self, begin: u32, end: u32, replacement: &TaintedString) {
        self.value
            .replace_range(begin as usize..end as usize, &replacement.value);
        self.taint.replace_with_length(
            begin,
            end,
            replacement.taint_length(),
            &replacement.taint,
        );
    }

    /// Appends untainted characters.
    pub fn push_str(&mut self, string: &str) {
        self.value.push_str(string);
    }

    pub fn push_tainted(&mut self, other: &TaintedString) {
        let offset = self.taint_length();
        self.value.push_str(&other.value);
        self.taint.concat(&other.taint, offset);
    }

    /// Shortens this string to `length` bytes, dropping the taint past it.
    ///
    /// ## Panics
    /// Panics if `length` is not on a character boundary.
    pub fn truncate(&mut self, length: u32) {
        self.value.truncate(length as usize);
        self.taint.clear_after(length);
    }

    pub fn to_uppercase(&self) -> TaintedString {
        self.map_ascii(str::to_ascii_uppercase, "toUpperCase")
    }

    pub fn to_lowercase(&self) -> TaintedString {
        self.map_ascii(str::to_ascii_lowercase, "toLowerCase")
    }

    // ASCII case mapping keeps every character at its byte offset, so the
    // ranges stay as they are.
    fn map_ascii(&self, map: fn(&str) -> String, name: &'static str) -> TaintedString {
        TaintedString {
            value: map(&self.value),
            taint: self.taint.extended(TaintOperation::new(name).native()),
        }
    }

    /// Encodes the bytes of this string as base64. The taint is re-indexed
    /// for the encoded data, rounding outwards.
    pub fn to_base64(&self) -> TaintedString {
        let value = STANDARD.encode(self.value.as_bytes());
        let mut taint = self.taint.clone();
        taint.to_base64();
        taint.clear_after(length_of(&value));
        taint.extend(TaintOperation::new("btoa").native());
        TaintedString { value, taint }
    }

    /// The inverse of [`TaintedString::to_base64`].
    pub fn from_base64(&self) -> Result<TaintedString, DecodeError> {
        let value = String::from_utf8(STANDARD.decode(self.value.as_bytes())?)?;
        let mut taint = self.taint.clone();
        taint.from_base64();
        taint.clear_after(length_of(&value));
        taint.extend(TaintOperation::new("atob").native());
        Ok(TaintedString { value, taint })
    }

    /// Quotes this string as a JSON string literal. Each escape sequence
    /// inherits the taint of the character it replaces.
    pub fn quote_json(&self) -> TaintedString {
        let mut value = String::with_capacity(self.len() + 2);
        let mut taint = StringTaint::new();
        value.push('"');
        for (index, character) in self.value.char_indices() {
            let begin = length_of(&value);
            match character {
                '"' => value.push_str("\\\""),
                '\\' => value.push_str("\\\\"),
                '\n' => value.push_str("\\n"),
                '\r' => value.push_str("\\r"),
                '\t' => value.push_str("\\t"),
                '\u{8}' => value.push_str("\\b"),
                '\u{c}' => value.push_str("\\f"),
                c if u32::from(c) < 0x20 => value.push_str(&format!("\\u{:04x}", u32::from(c))),
                c => value.push(c),
            }
            let index = length_of_index(index);
            let width = length_of_index(character.len_utf8());
            let written = length_of(&value) - begin;
            let source = self.taint.subtaint(index, index + width);
            if written == width {
                // Copied as is, byte for byte.
                taint.concat(&source, begin);
            } else if let Some(range) = source.ranges().first() {
                // Escaped characters are ASCII, so one range covers them.
                taint.append(TaintRange::new(
                    begin,
                    begin + written,
                    range.flow().clone(),
                ));
            }
        }
        value.push('"');
        TaintedString { value, taint }
    }
}

fn length_of(value: &str) -> u32 {
    length_of_index(value.len())
}

fn length_of_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or_else(|_| panic!("String of {index} bytes is too long to taint"))
}

impl TaintableString for TaintedString {
    fn taint(&self) -> &StringTaint {
        &self.taint
    }

    fn taint_mut(&mut self) -> &mut StringTaint {
        &mut self.taint
    }

    fn taint_length(&self) -> u32 {
        length_of(&self.value)
    }
}

impl From<&str> for TaintedString {
    fn from(value: &str) -> Self {
        TaintedString::new(value)
    }
}

impl fmt::Display for TaintedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taint_list_keeps_distinct_flows() {
        let flow = TaintFlow::new("source".into());
        let mut list = TaintList::new();
        list.push(flow.clone());
        list.push(flow.clone());
        list.push(TaintFlow::default());
        assert_eq!(list.len(), 1);

        list.extend("parseInt".into());
        assert!(list.is_tainted());
        assert_ne!(list.iter().next(), Some(&flow));
        list.clear();
        assert!(!list.is_tainted());
    }

    #[test]
    fn forwarding_methods_update_the_embedded_taint() {
        let mut string = TaintedString::tainted("hello", TaintOperation::new("source").source());
        assert!(string.is_tainted());
        string.clear_taint_at(0);
        string.clear_taint_after(3);
        assert_eq!(string.taint().ranges().len(), 1);
        assert_eq!(string.taint().ranges()[0].begin(), 1);
        assert_eq!(string.taint().end(), 3);
        string.clear_taint();
        assert!(!string.is_tainted());
    }

    #[test]
    fn quote_json_taints_escape_sequences() {
        let mut string = TaintedString::new("a");
        string.push_tainted(&TaintedString::tainted("\"", "source".into()));
        let quoted = string.quote_json();

        assert_eq!(quoted.as_str(), r#""a\"""#);
        let range = &quoted.taint().ranges()[0];
        assert_eq!((range.begin(), range.end()), (2, 4));
    }
}
