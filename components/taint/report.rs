/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

use crate::operation::TaintOperation;
use crate::string_taint::StringTaint;

/// A self-contained description of one taint range, for consumers outside
/// of the engine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RangeReport {
    pub begin: u32,
    pub end: u32,
    /// The operations of the range's flow, newest first. The last entry is
    /// the source.
    pub flow: Vec<TaintOperation>,
}

pub fn describe(taint: &StringTaint) -> Vec<RangeReport> {
    taint
        .iter()
        .map(|range| RangeReport {
            begin: range.begin(),
            end: range.end(),
            flow: range
                .flow()
                .iter()
                .map(|node| node.operation().clone())
                .collect(),
        })
        .collect()
}
