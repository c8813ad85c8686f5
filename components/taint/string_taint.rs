/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Taint information of a whole string.
//!
//! Consider the following piece of JavaScript:
//!
//! ```js
//! var x = a + "foo" + b;
//! ```
//!
//! with `a` and `b` tainted strings of length three. `x` then carries two
//! taint ranges, `[0, 3)` and `[6, 9)`, each with the flow of the string it
//! was copied from.

use std::fmt;
use std::mem::size_of;

use static_assertions::const_assert_eq;
use thin_vec::ThinVec;

use crate::flow::TaintFlow;
use crate::operation::TaintOperation;
use crate::range::{TaintRange, shifted};

/// The ordered, non-overlapping taint ranges of a string.
///
/// Untainted strings are by far the common case, so an empty instance is a
/// single null-like pointer and owns no allocation. Every mutator keeps the
/// ranges sorted, disjoint and non-empty, and panics if the caller asks for
/// something that would break that.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct StringTaint {
    ranges: ThinVec<TaintRange>,
}

// Hosts embed this next to their character data.
const_assert_eq!(size_of::<StringTaint>(), size_of::<usize>());

impl StringTaint {
    /// Constructs an instance without any taint flows. This does not allocate.
    pub fn new() -> StringTaint {
        StringTaint {
            ranges: ThinVec::new(),
        }
    }

    pub fn from_range(range: TaintRange) -> StringTaint {
        let mut taint = StringTaint::new();
        taint.append(range);
        taint
    }

    /// Taints `[begin, end)` with a new flow rooted at `operation`.
    pub fn from_operation(begin: u32, end: u32, operation: TaintOperation) -> StringTaint {
        StringTaint::from_range(TaintRange::new(begin, end, TaintFlow::new(operation)))
    }

    /// Taints a whole string of `length` characters with `flow`.
    pub fn from_flow(flow: TaintFlow, length: u32) -> StringTaint {
        if length == 0 {
            return StringTaint::new();
        }
        StringTaint::from_range(TaintRange::new(0, length, flow))
    }

    /// Returns true if any characters are tainted.
    pub fn has_taint(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// The number of ranges, not the number of tainted characters.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[TaintRange] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaintRange> {
        self.ranges.iter()
    }

    /// Mutable access to the flows of the ranges. The bounds of a range can
    /// only be changed through `StringTaint` itself.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaintFlow> {
        self.ranges.iter_mut().map(TaintRange::flow_mut)
    }

    /// The end of the last tainted range, or zero.
    pub fn end(&self) -> u32 {
        self.ranges.last().map_or(0, TaintRange::end)
    }

    /// Removes all taint information and releases the range list.
    pub fn clear(&mut self) {
        self.ranges = ThinVec::new();
    }

    /// Removes all taint information for the characters in `[begin, end)`.
    /// Ranges straddling either side of the window are truncated, a range
    /// covering the whole window is split in two.
    ///
    /// ## Panics
    /// Panics if `begin > end`.
    pub fn clear_between(&mut self, begin: u32, end: u32) {
        assert!(
            begin <= end,
            "Cannot clear taint between {begin} and {end}"
        );
        if begin == end || !self.ranges.iter().any(|range| range.intersects(begin, end)) {
            return;
        }

        let mut ranges = ThinVec::with_capacity(self.ranges.len() + 1);
        for range in std::mem::take(&mut self.ranges) {
            if !range.intersects(begin, end) {
                ranges.push(range);
                continue;
            }
            if range.begin() < begin {
                ranges.push(TaintRange::new(range.begin(), begin, range.flow().clone()));
            }
            if range.end() > end {
                ranges.push(TaintRange::new(end, range.end(), range.into_flow()));
            }
        }
        self.assign(ranges);
    }

    /// Removes all taint information starting at `index`.
    pub fn clear_after(&mut self, index: u32) {
        let keep = self.ranges.partition_point(|range| range.begin() < index);
        self.ranges.truncate(keep);
        if let Some(last) = self.ranges.last_mut() {
            if last.end() > index {
                last.resize(last.begin(), index);
            }
        }
        self.release_if_empty();
    }

    /// Removes any taint information for the character at `index`.
    pub fn clear_at(&mut self, index: u32) {
        self.clear_between(index, index.saturating_add(1));
    }

    /// Shifts all taint information at or after `index` by `amount`.
    ///
    /// A range straddling `index` is split and only its tail is moved, which
    /// leaves a gap of `amount` untainted characters (e.g. room for an
    /// insertion).
    ///
    /// ## Panics
    /// Panics if a range would be moved below zero or onto its predecessor,
    /// or if a straddling range would have to be shifted by a negative
    /// amount.
    pub fn shift(&mut self, index: u32, amount: i32) {
        if amount == 0 || self.end() <= index {
            return;
        }
        let amount = i64::from(amount);

        let mut ranges = ThinVec::with_capacity(self.ranges.len() + 1);
        for range in std::mem::take(&mut self.ranges) {
            if range.begin() >= index {
                push_ordered(&mut ranges, range.offset_by(amount));
            } else if range.end() > index {
                assert!(
                    amount > 0,
                    "Cannot shift taint range [{}, {}) straddling index {index} by {amount}",
                    range.begin(),
                    range.end()
                );
                push_ordered(
                    &mut ranges,
                    TaintRange::new(range.begin(), index, range.flow().clone()),
                );
                push_ordered(
                    &mut ranges,
                    TaintRange::new(
                        shifted(index, amount),
                        shifted(range.end(), amount),
                        range.into_flow(),
                    ),
                );
            } else {
                push_ordered(&mut ranges, range);
            }
        }
        self.assign(ranges);
    }

    /// Inserts the ranges of `taint`, offset by `index`.
    ///
    /// ## Panics
    /// The window `[index, index + taint.end())` must not contain any taint.
    pub fn insert(&mut self, index: u32, taint: &StringTaint) {
        if !taint.has_taint() {
            return;
        }
        let offset = i64::from(index);
        let at = self.ranges.partition_point(|range| range.begin() < index);
        if let Some(before) = at.checked_sub(1).and_then(|i| self.ranges.get(i)) {
            assert!(
                before.end() <= index,
                "Cannot insert taint at {index}, range {before:?} is in the way"
            );
        }
        if let Some(after) = self.ranges.get(at) {
            let last = shifted(taint.end(), offset);
            assert!(
                after.begin() >= last,
                "Cannot insert taint into [{index}, {last}), range {after:?} is in the way"
            );
        }

        let mut ranges = ThinVec::with_capacity(self.ranges.len() + taint.len());
        let mut existing = std::mem::take(&mut self.ranges).into_iter();
        ranges.extend(existing.by_ref().take(at));
        ranges.extend(taint.iter().map(|range| range.offset_by(offset)));
        ranges.extend(existing);
        self.assign(ranges);
    }

    /// Replaces the taint in `[begin, end)` with `taint`, which must not
    /// extend past `end - begin`.
    pub fn replace(&mut self, begin: u32, end: u32, taint: &StringTaint) {
        self.clear_between(begin, end);
        self.insert(begin, taint);
    }

    /// Replaces the taint of `[begin, end)` as if those characters were
    /// replaced by a string of `length` characters carrying `taint`.
    ///
    /// ## Panics
    /// Panics if `begin > end`, or if `taint` covers more than `length`
    /// characters.
    pub fn replace_with_length(&mut self, begin: u32, end: u32, length: u32, taint: &StringTaint) {
        assert!(begin <= end, "Cannot replace taint between {begin} and {end}");
        assert!(
            taint.end() <= length,
            "Replacement taint ends at {} but the replacement is {length} long",
            taint.end()
        );
        self.clear_between(begin, end);
        let delta = i64::from(length) - i64::from(end - begin);
        let delta = i32::try_from(delta)
            .unwrap_or_else(|_| panic!("Replacement changes the length by {delta}"));
        self.shift(begin, delta);
        self.insert(begin, taint);
    }

    /// Returns the flow of the character at `index`, if it is tainted.
    pub fn at(&self, index: u32) -> Option<&TaintFlow> {
        let position = self.ranges.partition_point(|range| *range < index);
        self.ranges
            .get(position)
            .filter(|range| **range == index)
            .map(TaintRange::flow)
    }

    /// Sets the flow of the character at `index`.
    pub fn set(&mut self, index: u32, flow: TaintFlow) {
        // Common case: a character appended to the end of a string.
        if self.end() <= index {
            self.append(TaintRange::new(index, index.saturating_add(1), flow));
        } else {
            self.clear_at(index);
            self.insert(index, &StringTaint::from_range(TaintRange::new(0, 1, flow)));
        }
    }

    /// Returns the taint of the characters in `[begin, end)`, rebased to
    /// start at zero.
    ///
    /// ## Panics
    /// Panics if `begin > end`.
    pub fn subtaint(&self, begin: u32, end: u32) -> StringTaint {
        assert!(begin <= end, "Cannot take subtaint [{begin}, {end})");
        let mut taint = StringTaint::new();
        if begin == end {
            return taint;
        }
        let first = self.ranges.partition_point(|range| range.end() <= begin);
        for range in self.ranges[first..]
            .iter()
            .take_while(|range| range.begin() < end)
        {
            taint.append(TaintRange::new(
                range.begin().max(begin) - begin,
                range.end().min(end) - begin,
                range.flow().clone(),
            ));
        }
        taint
    }

    /// Like [`StringTaint::subtaint`], but never panics: an inverted window
    /// has no taint.
    pub fn safe_subtaint(&self, begin: u32, end: u32) -> StringTaint {
        if begin >= end {
            return StringTaint::new();
        }
        self.subtaint(begin, end)
    }

    /// Adds `operation` to the flows of all ranges.
    ///
    /// Ranges that shared a flow before share the new flow afterwards, so
    /// only one node is created per distinct flow.
    pub fn extend(&mut self, operation: TaintOperation) -> &mut StringTaint {
        let mut extended: Vec<(TaintFlow, TaintFlow)> = Vec::new();
        for flow in self.iter_mut() {
            *flow = extended_once(&mut extended, flow, &operation);
        }
        self
    }

    /// Returns a copy of this instance with every flow extended by
    /// `operation`.
    pub fn extended(&self, operation: TaintOperation) -> StringTaint {
        let mut taint = self.clone();
        taint.extend(operation);
        taint
    }

    /// Appends a range after the last one, merging the two if they are
    /// adjacent and share their flow. Empty placeholder ranges are ignored.
    ///
    /// ## Panics
    /// Panics if `range` begins before the end of the last range.
    pub fn append(&mut self, range: TaintRange) -> &mut StringTaint {
        if range.is_empty() {
            return self;
        }
        if let Some(last) = self.ranges.last_mut() {
            assert!(
                last.end() <= range.begin(),
                "Cannot append taint range {range:?} after {last:?}"
            );
            if last.end() == range.begin() && last.flow() == range.flow() {
                last.resize(last.begin(), range.end());
                return self;
            }
        }
        self.ranges.push(range);
        self
    }

    /// Appends all ranges of `other`, offset by `offset`, which must not be
    /// before the end of the last range.
    pub fn concat(&mut self, other: &StringTaint, offset: u32) -> &mut StringTaint {
        let offset = i64::from(offset);
        for range in other {
            self.append(range.offset_by(offset));
        }
        self
    }

    /// The taint of `left + right` where `left` is `left_length` characters
    /// long.
    pub fn concatenate(left: &StringTaint, left_length: u32, right: &StringTaint) -> StringTaint {
        let mut taint = left.clone();
        taint.concat(right, left_length);
        taint
    }

    /// Records that `operation` touched the characters in `[begin, end)`.
    ///
    /// Tainted parts of the window keep their history and have it extended
    /// by `operation`, untainted parts become tainted with a new flow rooted
    /// at `operation`. Taint outside of the window is left alone.
    ///
    /// ## Panics
    /// Panics if `begin > end`.
    pub fn overlay(&mut self, begin: u32, end: u32, operation: TaintOperation) -> &mut StringTaint {
        assert!(begin <= end, "Cannot overlay taint on [{begin}, {end})");
        if begin == end {
            return self;
        }

        let mut overlaid = StringTaint::new();
        let mut gap = Gap {
            cursor: begin,
            flow: None,
            operation: &operation,
        };
        let mut extended = Vec::new();

        for range in std::mem::take(&mut self.ranges) {
            if range.end() <= begin {
                overlaid.append(range);
                continue;
            }
            if range.begin() >= end {
                gap.fill(&mut overlaid, end);
                overlaid.append(range);
                continue;
            }

            let overlap_begin = range.begin().max(begin);
            let overlap_end = range.end().min(end);
            if range.begin() < begin {
                overlaid.append(TaintRange::new(range.begin(), begin, range.flow().clone()));
            }
            gap.fill(&mut overlaid, overlap_begin);
            overlaid.append(TaintRange::new(
                overlap_begin,
                overlap_end,
                extended_once(&mut extended, range.flow(), &operation),
            ));
            gap.cursor = overlap_end;
            if range.end() > end {
                overlaid.append(TaintRange::new(end, range.end(), range.into_flow()));
            }
        }
        gap.fill(&mut overlaid, end);

        *self = overlaid;
        self
    }

    /// Converts all ranges from string to base64 indices.
    pub fn to_base64(&mut self) -> &mut StringTaint {
        self.ranges.iter_mut().for_each(TaintRange::to_base64);
        self.remove_overlaps();
        self
    }

    /// Converts all ranges from base64 to string indices.
    pub fn from_base64(&mut self) -> &mut StringTaint {
        self.ranges.iter_mut().for_each(TaintRange::from_base64);
        self.remove_overlaps();
        self
    }

    /// Checks that the ranges are sorted, disjoint and non-empty.
    pub fn debug_assert_valid(&self) {
        if cfg!(debug_assertions) {
            for range in &self.ranges {
                assert!(!range.is_empty(), "Empty taint range {range:?}");
            }
            for pair in self.ranges.windows(2) {
                assert!(
                    pair[0].end() <= pair[1].begin(),
                    "Taint ranges {:?} and {:?} are out of order",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    // Base conversions round outwards, so neighbouring ranges can end up
    // overlapping. The earlier range wins the shared characters, ranges that
    // end up empty are dropped and adjacent ranges of one flow are merged.
    fn remove_overlaps(&mut self) {
        if self.ranges.len() < 2 {
            return;
        }
        let mut ranges = StringTaint::new();
        for mut range in std::mem::take(&mut self.ranges) {
            let begin = range.begin().max(ranges.end());
            if begin >= range.end() {
                continue;
            }
            range.resize(begin, range.end());
            ranges.append(range);
        }
        *self = ranges;
    }

    fn assign(&mut self, ranges: ThinVec<TaintRange>) {
        self.ranges = ranges;
        self.release_if_empty();
        self.debug_assert_valid();
    }

    fn release_if_empty(&mut self) {
        if self.ranges.is_empty() && self.ranges.capacity() > 0 {
            self.ranges = ThinVec::new();
        }
    }
}

fn push_ordered(ranges: &mut ThinVec<TaintRange>, range: TaintRange) {
    if let Some(last) = ranges.last() {
        assert!(
            last.end() <= range.begin(),
            "Shifting moves taint range {range:?} onto {last:?}"
        );
    }
    ranges.push(range);
}

// Extends `flow` by `operation`, reusing the node created for an earlier
// occurrence of the same flow.
fn extended_once(
    extended: &mut Vec<(TaintFlow, TaintFlow)>,
    flow: &TaintFlow,
    operation: &TaintOperation,
) -> TaintFlow {
    if let Some((_, new)) = extended.iter().find(|(old, _)| old == flow) {
        return new.clone();
    }
    let new = flow.extended(operation.clone());
    extended.push((flow.clone(), new.clone()));
    new
}

/// The untainted stretch of an overlay window that has not been emitted yet.
struct Gap<'a> {
    cursor: u32,
    flow: Option<TaintFlow>,
    operation: &'a TaintOperation,
}

impl Gap<'_> {
    fn fill(&mut self, taint: &mut StringTaint, until: u32) {
        if self.cursor < until {
            let operation = self.operation;
            let flow = self
                .flow
                .get_or_insert_with(|| TaintFlow::new(operation.clone()))
                .clone();
            taint.append(TaintRange::new(self.cursor, until, flow));
        }
        self.cursor = self.cursor.max(until);
    }
}

impl<'a> IntoIterator for &'a StringTaint {
    type Item = &'a TaintRange;
    type IntoIter = std::slice::Iter<'a, TaintRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl FromIterator<TaintRange> for StringTaint {
    /// Collects ranges with [`StringTaint::append`].
    fn from_iter<I: IntoIterator<Item = TaintRange>>(iter: I) -> StringTaint {
        let mut taint = StringTaint::new();
        for range in iter {
            taint.append(range);
        }
        taint
    }
}

impl fmt::Debug for StringTaint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ranges.iter()).finish()
    }
}
