/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Entry points for the places where data enters and leaves the engine.

use log::warn;
use serde::Serialize;

use crate::operation::TaintOperation;
use crate::prefs::TaintingPrefs;
use crate::report::{RangeReport, describe};
use crate::taintable::TaintableString;

/// Tainted data that reached a sink.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SinkReport {
    pub sink: String,
    pub argument: Option<String>,
    pub ranges: Vec<RangeReport>,
}

/// Taints the whole of `string` as coming from `operation`, unless the
/// source is disabled. Existing taint is kept and extended.
pub fn mark_taint_source(
    prefs: &TaintingPrefs,
    string: &mut impl TaintableString,
    operation: TaintOperation,
) {
    if !prefs.is_source_active(operation.name()) {
        return;
    }
    let length = string.taint_length();
    string
        .taint_mut()
        .overlay(0, length, operation.source().native());
}

/// Records an engine operation on the flows of an already tainted string.
pub fn mark_taint_operation(string: &mut impl TaintableString, operation: TaintOperation) {
    if string.is_tainted() {
        string.taint_mut().extend(operation.native());
    }
}

/// Checks whether tainted data reaches `sink`, returning a description of
/// its taint if it does and the sink is enabled.
pub fn report_taint_sink(
    prefs: &TaintingPrefs,
    string: &impl TaintableString,
    sink: &str,
    argument: Option<&str>,
) -> Option<SinkReport> {
    if !string.is_tainted() || !prefs.is_sink_active(sink) {
        return None;
    }
    let ranges = describe(string.taint());
    warn!(
        "Tainted data reached sink {sink} through {} range(s)",
        ranges.len()
    );
    Some(SinkReport {
        sink: sink.to_owned(),
        argument: argument.map(str::to_owned),
        ranges,
    })
}
