/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::cmp::Ordering;
use std::fmt;

use crate::flow::TaintFlow;

/// Bit width of a character in a plain (ASCII / latin1) string.
pub const OCTET_WIDTH: u32 = 8;
/// Bit width of a character in base64 encoded data.
pub const SEXTET_WIDTH: u32 = 6;

/// A range of tainted characters that all share the same taint flow.
///
/// Ranges are half-open, `[begin, end)`, and never empty once they are part
/// of a [`StringTaint`](crate::StringTaint). The only empty range is the
/// `Default` one, which is a placeholder and is never stored.
#[derive(Clone, Default)]
pub struct TaintRange {
    begin: u32,
    end: u32,
    flow: TaintFlow,
}

impl TaintRange {
    /// ## Panics
    /// Panics unless `begin < end`.
    pub fn new(begin: u32, end: u32, flow: TaintFlow) -> TaintRange {
        assert!(
            begin < end,
            "Taint range [{begin}, {end}) must not be empty or reversed"
        );
        TaintRange { begin, end, flow }
    }

    pub fn begin(&self) -> u32 {
        self.begin
    }

    /// The index of the first character after this range.
    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    pub fn flow(&self) -> &TaintFlow {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut TaintFlow {
        &mut self.flow
    }

    pub fn into_flow(self) -> TaintFlow {
        self.flow
    }

    /// ## Panics
    /// Panics unless `begin < end`.
    pub fn resize(&mut self, begin: u32, end: u32) {
        assert!(
            begin < end,
            "Cannot resize taint range to [{begin}, {end})"
        );
        self.begin = begin;
        self.end = end;
    }

    pub fn contains(&self, index: u32) -> bool {
        self.begin <= index && index < self.end
    }

    /// Whether this range shares at least one index with `[begin, end)`.
    pub fn intersects(&self, begin: u32, end: u32) -> bool {
        self.begin < end && begin < self.end
    }

    /// Returns a copy of this range moved by `offset`.
    ///
    /// ## Panics
    /// Panics if a bound leaves the `u32` domain.
    pub fn offset_by(&self, offset: i64) -> TaintRange {
        TaintRange::new(
            shifted(self.begin, offset),
            shifted(self.end, offset),
            self.flow.clone(),
        )
    }

    /// Converts the bounds of this range from octet to sextet indices, i.e.
    /// from a string to its base64 encoding.
    pub fn to_base64(&mut self) {
        self.convert_base(OCTET_WIDTH, SEXTET_WIDTH);
    }

    /// The inverse of [`TaintRange::to_base64`].
    pub fn from_base64(&mut self) {
        self.convert_base(SEXTET_WIDTH, OCTET_WIDTH);
    }

    fn convert_base(&mut self, from_width: u32, to_width: u32) {
        let begin = convert_base_begin(self.begin, from_width, to_width);
        let end = convert_base_end(self.end, from_width, to_width);
        self.resize(begin, end);
    }
}

pub(crate) fn shifted(index: u32, amount: i64) -> u32 {
    u32::try_from(i64::from(index) + amount).unwrap_or_else(|_| {
        panic!("Shifting taint index {index} by {amount} leaves the valid index range")
    })
}

// Converting between octets and sextets:
//
// Octet  |0              |1               |2             |
// --------------------------------------------------------
// Sextet |0          |1          |2          |3          |
//
// The begin index is mapped through the position of its first bit, the end
// index through the position of the last bit of the unit before it. Partial
// units are always included, so a conversion over-taints by up to one unit
// at each side instead of losing taint.

/// `floor(index * from_width / to_width)`
pub fn convert_base_begin(index: u32, from_width: u32, to_width: u32) -> u32 {
    debug_assert!(from_width > 0 && to_width > 0);
    narrow(u64::from(index) * u64::from(from_width) / u64::from(to_width))
}

/// `ceil(index * from_width / to_width)`, computed as
/// `floor((index * from_width + from_width - 1) / to_width)`.
pub fn convert_base_end(index: u32, from_width: u32, to_width: u32) -> u32 {
    debug_assert!(from_width > 0 && to_width > 0);
    let bits = u64::from(index) * u64::from(from_width) + u64::from(from_width) - 1;
    narrow(bits / u64::from(to_width))
}

fn narrow(index: u64) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

impl PartialEq for TaintRange {
    fn eq(&self, other: &TaintRange) -> bool {
        self.begin == other.begin && self.end == other.end && self.flow == other.flow
    }
}

impl Eq for TaintRange {}

/// Ranges are ordered by position. Two ranges with the same bounds but
/// different flows are incomparable.
impl PartialOrd for TaintRange {
    fn partial_cmp(&self, other: &TaintRange) -> Option<Ordering> {
        match (self.begin, self.end).cmp(&(other.begin, other.end)) {
            Ordering::Equal if self.flow != other.flow => None,
            ordering => Some(ordering),
        }
    }
}

/// A range "equals" every index it contains.
impl PartialEq<u32> for TaintRange {
    fn eq(&self, index: &u32) -> bool {
        self.contains(*index)
    }
}

/// A range is less than the indices after it and greater than the indices
/// before it, which is what binary searches over sorted ranges need.
impl PartialOrd<u32> for TaintRange {
    fn partial_cmp(&self, index: &u32) -> Option<Ordering> {
        Some(if self.end <= *index {
            Ordering::Less
        } else if self.begin > *index {
            Ordering::Greater
        } else {
            Ordering::Equal
        })
    }
}

impl fmt::Debug for TaintRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) {:?}", self.begin, self.end, self.flow)
    }
}
